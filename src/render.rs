// 该文件是 Zitai （姿态万千） 项目的一部分。
// src/render.rs - 关键点叠加渲染
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

use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};

use crate::config::PoseModelKind;
use crate::formatter::OutputCanvas;
use crate::keypoints::{HAND_PAIRS, KeypointMatrix};

/// 关节圆点半径（像素）
const JOINT_RADIUS: i32 = 3;
/// 人脸关键点圆点半径（像素）
const FACE_DOT_RADIUS: i32 = 2;

/// HSV 转 RGBA，用于生成区分度高的部位配色
fn hsv_to_rgba(h: f32, s: f32, v: f32) -> Rgba<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgba([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
    255,
  ])
}

fn palette(count: usize) -> Vec<Rgba<u8>> {
  (0..count)
    .map(|i| hsv_to_rgba(i as f32 / count as f32 * 360.0, 0.8, 0.9))
    .collect()
}

/// 在叠加层上画一条骨架连线，两端各补一个关节点
fn draw_limb(overlay: &mut RgbaImage, a: (f32, f32), b: (f32, f32), color: Rgba<u8>) {
  draw_line_segment_mut(overlay, a, b, color);
  // 1 像素直线太细，平移一像素加粗
  draw_line_segment_mut(overlay, (a.0 + 1.0, a.1), (b.0 + 1.0, b.1), color);
  draw_filled_circle_mut(overlay, (a.0 as i32, a.1 as i32), JOINT_RADIUS, color);
  draw_filled_circle_mut(overlay, (b.0 as i32, b.1 as i32), JOINT_RADIUS, color);
}

/// 把原图坐标换算到画布坐标
fn to_canvas(point: (f32, f32, f32), scale: f32) -> (f32, f32) {
  (point.0 * scale, point.1 * scale)
}

/// 姿态渲染器：按骨架连线绘制所有人的身体关键点
#[derive(Debug, Clone)]
pub struct PoseRenderer {
  pairs: &'static [(usize, usize)],
  colors: Vec<Rgba<u8>>,
  threshold: f32,
  alpha: f32,
}

impl PoseRenderer {
  pub fn new(kind: PoseModelKind, threshold: f32, alpha: f32) -> Self {
    let pairs = kind.limb_pairs();
    Self {
      pairs,
      colors: palette(pairs.len()),
      threshold,
      alpha,
    }
  }

  pub fn render(&self, canvas: &mut OutputCanvas, keypoints: &KeypointMatrix) {
    if keypoints.is_empty() {
      return;
    }
    let scale = canvas.scale();
    let mut overlay = RgbaImage::new(canvas.width(), canvas.height());

    for person in 0..keypoints.num_entities() {
      for (limb, &(a, b)) in self.pairs.iter().enumerate() {
        let (Some(pa), Some(pb)) = (keypoints.point(person, a), keypoints.point(person, b)) else {
          continue;
        };
        if pa.2 <= self.threshold || pb.2 <= self.threshold {
          continue;
        }
        draw_limb(
          &mut overlay,
          to_canvas(pa, scale),
          to_canvas(pb, scale),
          self.colors[limb],
        );
      }
    }

    canvas.blend_overlay(&overlay, self.alpha);
  }
}

/// 人脸渲染器：关键点只画圆点，不连线
#[derive(Debug, Clone)]
pub struct FaceRenderer {
  threshold: f32,
  alpha: f32,
}

impl FaceRenderer {
  pub fn new(threshold: f32, alpha: f32) -> Self {
    Self { threshold, alpha }
  }

  pub fn render(&self, canvas: &mut OutputCanvas, keypoints: &KeypointMatrix) {
    if keypoints.is_empty() {
      return;
    }
    let scale = canvas.scale();
    let mut overlay = RgbaImage::new(canvas.width(), canvas.height());
    let color = Rgba([255, 255, 255, 255]);

    for face in 0..keypoints.num_entities() {
      for part in 0..keypoints.num_parts() {
        let Some(p) = keypoints.point(face, part) else { continue };
        if p.2 <= self.threshold {
          continue;
        }
        let (x, y) = to_canvas(p, scale);
        draw_filled_circle_mut(&mut overlay, (x as i32, y as i32), FACE_DOT_RADIUS, color);
      }
    }

    canvas.blend_overlay(&overlay, self.alpha);
  }
}

/// 手部渲染器：按 21 点手部骨架绘制，每根手指一种颜色
#[derive(Debug, Clone)]
pub struct HandRenderer {
  colors: Vec<Rgba<u8>>,
  threshold: f32,
  alpha: f32,
}

impl HandRenderer {
  pub fn new(threshold: f32, alpha: f32) -> Self {
    Self {
      // 五根手指各一色
      colors: palette(5),
      threshold,
      alpha,
    }
  }

  /// 渲染一组手（左手集或右手集）
  pub fn render(&self, canvas: &mut OutputCanvas, keypoints: &KeypointMatrix) {
    if keypoints.is_empty() {
      return;
    }
    let scale = canvas.scale();
    let mut overlay = RgbaImage::new(canvas.width(), canvas.height());

    for hand in 0..keypoints.num_entities() {
      for (limb, &(a, b)) in HAND_PAIRS.iter().enumerate() {
        let (Some(pa), Some(pb)) = (keypoints.point(hand, a), keypoints.point(hand, b)) else {
          continue;
        };
        if pa.2 <= self.threshold || pb.2 <= self.threshold {
          continue;
        }
        // 每 4 条连线属于同一根手指
        let color = self.colors[(limb / 4) % self.colors.len()];
        draw_limb(&mut overlay, to_canvas(pa, scale), to_canvas(pb, scale), color);
      }
    }

    canvas.blend_overlay(&overlay, self.alpha);
  }
}
