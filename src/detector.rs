// 该文件是 Zitai （姿态万千） 项目的一部分。
// src/detector.rs - 由姿态关键点推导人脸/手部候选区域
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use tracing::debug;

use crate::config::PoseModelKind;
use crate::keypoints::{KeypointMatrix, coco, mpi};
use crate::region::{HandRectPair, Rect};

/// 关键点参与区域推导所需的最低置信度
const CUE_SCORE_THRESHOLD: f32 = 0.25;

/// 手部区域沿肘到腕方向越过腕部的外推比例
const WRIST_EXTRAPOLATION_RATIO: f32 = 0.33;

/// 人脸区域推导所需的部位索引，随姿态模型而变
struct FaceCueIndices {
  nose: usize,
  neck: usize,
  eyes: Option<(usize, usize)>,
  ears: Option<(usize, usize)>,
}

impl FaceCueIndices {
  fn for_kind(kind: PoseModelKind) -> Self {
    match kind {
      PoseModelKind::Coco18 => Self {
        nose: coco::NOSE,
        neck: coco::NECK,
        eyes: Some((coco::L_EYE, coco::R_EYE)),
        ears: Some((coco::L_EAR, coco::R_EAR)),
      },
      // MPI 模型没有眼耳关键点，只能依靠头顶与颈部
      PoseModelKind::Mpi15 | PoseModelKind::Mpi15_4 => Self {
        nose: mpi::HEAD,
        neck: mpi::NECK,
        eyes: None,
        ears: None,
      },
    }
  }
}

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
  ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt()
}

/// 取某部位坐标，置信度不足时返回 None
fn cue(pose: &KeypointMatrix, entity: usize, part: usize) -> Option<(f32, f32)> {
  let (x, y, score) = pose.point(entity, part)?;
  (score > CUE_SCORE_THRESHOLD).then_some((x, y))
}

/// 人脸区域推导器：每个检测到的人给出一个候选区域
#[derive(Debug, Clone)]
pub struct FaceRegionDetector {
  kind: PoseModelKind,
}

impl FaceRegionDetector {
  pub fn new(kind: PoseModelKind) -> Self {
    Self { kind }
  }

  /// 对每个人：综合鼻颈距、双眼距、双耳距估计人脸正方形区域；
  /// 线索全部缺失时给出零矩形
  pub fn detect(&self, pose: &KeypointMatrix) -> Vec<Rect> {
    let indices = FaceCueIndices::for_kind(self.kind);
    let mut rects = Vec::with_capacity(pose.num_entities());

    for person in 0..pose.num_entities() {
      let mut center = (0.0f32, 0.0f32);
      let mut size = 0.0f32;
      let mut counter = 0usize;

      if let (Some(neck), Some(nose)) =
        (cue(pose, person, indices.neck), cue(pose, person, indices.nose))
      {
        center.0 += nose.0;
        center.1 += nose.1;
        size += 1.33 * distance(neck, nose);
        counter += 1;
      }

      if let Some((l, r)) = indices.eyes
        && let (Some(le), Some(re)) = (cue(pose, person, l), cue(pose, person, r))
      {
        center.0 += (le.0 + re.0) / 2.0;
        center.1 += (le.1 + re.1) / 2.0;
        size += 3.0 * distance(le, re);
        counter += 1;
      }

      if let Some((l, r)) = indices.ears
        && let (Some(le), Some(re)) = (cue(pose, person, l), cue(pose, person, r))
      {
        center.0 += (le.0 + re.0) / 2.0;
        center.1 += (le.1 + re.1) / 2.0;
        size += 2.0 * distance(le, re);
        counter += 1;
      }

      let rect = if counter > 0 {
        let n = counter as f32;
        Rect::square_around(center.0 / n, center.1 / n, size / n)
      } else {
        Rect::default()
      };
      rects.push(rect);
    }

    debug!("人脸区域推导: {} 人 -> {} 个候选区域", pose.num_entities(), rects.len());
    rects
  }
}

/// 手部区域推导器：每个人给出左右手各一个候选区域
#[derive(Debug, Clone)]
pub struct HandRegionDetector {
  _kind: PoseModelKind,
}

impl HandRegionDetector {
  pub fn new(kind: PoseModelKind) -> Self {
    // COCO 与 MPI 的肩/肘/腕索引一致
    Self { _kind: kind }
  }

  pub fn detect(&self, pose: &KeypointMatrix) -> Vec<HandRectPair> {
    let mut pairs = Vec::with_capacity(pose.num_entities());

    for person in 0..pose.num_entities() {
      pairs.push(HandRectPair {
        left: hand_rect(pose, person, coco::L_SHOULDER, coco::L_ELBOW, coco::L_WRIST),
        right: hand_rect(pose, person, coco::R_SHOULDER, coco::R_ELBOW, coco::R_WRIST),
      });
    }

    debug!("手部区域推导: {} 人 -> {} 个候选区域对", pose.num_entities(), pairs.len());
    pairs
  }
}

/// 单只手：区域中心从腕部沿肘腕方向外推，
/// 边长取 1.5 * max(肘腕距, 0.9 * 肩肘距)
fn hand_rect(
  pose: &KeypointMatrix,
  person: usize,
  shoulder: usize,
  elbow: usize,
  wrist: usize,
) -> Rect {
  let (Some(shoulder), Some(elbow), Some(wrist)) = (
    cue(pose, person, shoulder),
    cue(pose, person, elbow),
    cue(pose, person, wrist),
  ) else {
    return Rect::default();
  };

  let cx = wrist.0 + WRIST_EXTRAPOLATION_RATIO * (wrist.0 - elbow.0);
  let cy = wrist.1 + WRIST_EXTRAPOLATION_RATIO * (wrist.1 - elbow.1);
  let size = 1.5 * distance(elbow, wrist).max(0.9 * distance(shoulder, elbow));

  Rect::square_around(cx, cy, size)
}
