// 该文件是 Zitai （姿态万千） 项目的一部分。
// src/keypoints.rs - 关键点矩阵与部位索引表
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

use ndarray::Array3;

/// 每个关键点的通道数: x, y, 置信度
pub const KEYPOINT_CHANNELS: usize = 3;

/// 手部关键点数量（每只手）
pub const HAND_NUM_PARTS: usize = 21;

/// 人脸关键点数量
pub const FACE_NUM_PARTS: usize = 70;

/// 手部骨架连线：腕部到五根手指的链式连接
pub const HAND_PAIRS: [(usize, usize); 20] = [
  (0, 1), (1, 2), (2, 3), (3, 4),
  (0, 5), (5, 6), (6, 7), (7, 8),
  (0, 9), (9, 10), (10, 11), (11, 12),
  (0, 13), (13, 14), (14, 15), (15, 16),
  (0, 17), (17, 18), (18, 19), (19, 20),
];

/// COCO 18 关键点模型的部位索引
pub mod coco {
  pub const NUM_PARTS: usize = 18;

  pub const NOSE: usize = 0;
  pub const NECK: usize = 1;
  pub const R_SHOULDER: usize = 2;
  pub const R_ELBOW: usize = 3;
  pub const R_WRIST: usize = 4;
  pub const L_SHOULDER: usize = 5;
  pub const L_ELBOW: usize = 6;
  pub const L_WRIST: usize = 7;
  pub const R_HIP: usize = 8;
  pub const R_KNEE: usize = 9;
  pub const R_ANKLE: usize = 10;
  pub const L_HIP: usize = 11;
  pub const L_KNEE: usize = 12;
  pub const L_ANKLE: usize = 13;
  pub const R_EYE: usize = 14;
  pub const L_EYE: usize = 15;
  pub const R_EAR: usize = 16;
  pub const L_EAR: usize = 17;

  /// 骨架连线
  pub const PAIRS: [(usize, usize); 17] = [
    (1, 2), (1, 5), (2, 3), (3, 4), (5, 6), (6, 7),
    (1, 8), (8, 9), (9, 10), (1, 11), (11, 12), (12, 13),
    (1, 0), (0, 14), (14, 16), (0, 15), (15, 17),
  ];
}

/// MPI 15 关键点模型的部位索引
pub mod mpi {
  pub const NUM_PARTS: usize = 15;

  pub const HEAD: usize = 0;
  pub const NECK: usize = 1;
  pub const R_SHOULDER: usize = 2;
  pub const R_ELBOW: usize = 3;
  pub const R_WRIST: usize = 4;
  pub const L_SHOULDER: usize = 5;
  pub const L_ELBOW: usize = 6;
  pub const L_WRIST: usize = 7;
  pub const R_HIP: usize = 8;
  pub const R_KNEE: usize = 9;
  pub const R_ANKLE: usize = 10;
  pub const L_HIP: usize = 11;
  pub const L_KNEE: usize = 12;
  pub const L_ANKLE: usize = 13;
  pub const CHEST: usize = 14;

  /// 骨架连线
  pub const PAIRS: [(usize, usize); 14] = [
    (0, 1), (1, 2), (2, 3), (3, 4), (1, 5), (5, 6), (6, 7),
    (1, 14), (14, 8), (8, 9), (9, 10), (14, 11), (11, 12), (12, 13),
  ];
}

/// 关键点类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeypointCategory {
  Pose,
  Face,
  Hand,
}

/// 关键点矩阵，维度为 实体数 × 部位数 × (x, y, 置信度)
///
/// 每次提取调用产出一个新矩阵，调用方读取到的是快照。
#[derive(Debug, Clone, PartialEq)]
pub struct KeypointMatrix {
  data: Array3<f32>,
}

impl Default for KeypointMatrix {
  fn default() -> Self {
    Self::empty()
  }
}

impl KeypointMatrix {
  /// 空矩阵，对应"尚未检测"状态
  pub fn empty() -> Self {
    Self {
      data: Array3::zeros((0, 0, KEYPOINT_CHANNELS)),
    }
  }

  pub fn from_array(data: Array3<f32>) -> Self {
    Self { data }
  }

  /// 由按实体分组的行数据构造，各实体的部位数必须一致
  pub fn from_entities(entities: &[Vec<[f32; 3]>]) -> Option<Self> {
    let Some(first) = entities.first() else {
      return Some(Self::empty());
    };
    let parts = first.len();
    if entities.iter().any(|e| e.len() != parts) {
      return None;
    }

    let mut data = Array3::zeros((entities.len(), parts, KEYPOINT_CHANNELS));
    for (e, entity) in entities.iter().enumerate() {
      for (p, point) in entity.iter().enumerate() {
        data[[e, p, 0]] = point[0];
        data[[e, p, 1]] = point[1];
        data[[e, p, 2]] = point[2];
      }
    }
    Some(Self { data })
  }

  /// 实体（人/脸/手）数量
  pub fn num_entities(&self) -> usize {
    self.data.shape()[0]
  }

  /// 每个实体的部位数量
  pub fn num_parts(&self) -> usize {
    self.data.shape()[1]
  }

  pub fn is_empty(&self) -> bool {
    self.num_entities() == 0
  }

  /// 读取某实体某部位的 (x, y, 置信度)，越界返回 None
  pub fn point(&self, entity: usize, part: usize) -> Option<(f32, f32, f32)> {
    if entity >= self.num_entities() || part >= self.num_parts() {
      return None;
    }
    Some((
      self.data[[entity, part, 0]],
      self.data[[entity, part, 1]],
      self.data[[entity, part, 2]],
    ))
  }

  /// 某实体某部位的置信度，越界视为 0
  pub fn score(&self, entity: usize, part: usize) -> f32 {
    self.point(entity, part).map(|(_, _, s)| s).unwrap_or(0.0)
  }

  pub fn as_array(&self) -> &Array3<f32> {
    &self.data
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn two_person_matrix() -> KeypointMatrix {
    KeypointMatrix::from_entities(&[
      vec![[1.0, 2.0, 0.9], [3.0, 4.0, 0.8]],
      vec![[5.0, 6.0, 0.7], [7.0, 8.0, 0.6]],
    ])
    .unwrap()
  }

  #[test]
  fn empty_matrix_has_no_entities() {
    let m = KeypointMatrix::empty();
    assert!(m.is_empty());
    assert_eq!(m.num_entities(), 0);
    assert_eq!(m.point(0, 0), None);
    assert_eq!(m.score(0, 0), 0.0);
  }

  #[test]
  fn from_entities_builds_snapshot() {
    let m = two_person_matrix();
    assert_eq!(m.num_entities(), 2);
    assert_eq!(m.num_parts(), 2);
    assert_eq!(m.point(0, 1), Some((3.0, 4.0, 0.8)));
    assert_eq!(m.point(1, 0), Some((5.0, 6.0, 0.7)));
  }

  #[test]
  fn from_entities_rejects_ragged_input() {
    let ragged = vec![vec![[0.0; 3]; 2], vec![[0.0; 3]; 3]];
    assert!(KeypointMatrix::from_entities(&ragged).is_none());
  }

  #[test]
  fn skeleton_pairs_stay_in_range() {
    for (a, b) in coco::PAIRS {
      assert!(a < coco::NUM_PARTS && b < coco::NUM_PARTS);
    }
    for (a, b) in mpi::PAIRS {
      assert!(a < mpi::NUM_PARTS && b < mpi::NUM_PARTS);
    }
    for (a, b) in HAND_PAIRS {
      assert!(a < HAND_NUM_PARTS && b < HAND_NUM_PARTS);
    }
  }
}
