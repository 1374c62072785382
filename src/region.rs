// 该文件是 Zitai （姿态万千） 项目的一部分。
// src/region.rs - 固定布局的区域矩阵
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

use thiserror::Error;

/// 人脸区域矩阵的列数: x, y, 宽, 高
pub const FACE_REGION_COLS: usize = 4;
/// 手部区域矩阵的列数: 左手 x, y, 宽, 高 加右手 x, y, 宽, 高
pub const HAND_REGION_COLS: usize = 8;

#[derive(Error, Debug)]
pub enum RegionError {
  #[error("无效的人脸区域格式: 期望 Nx{FACE_REGION_COLS} 的 i32 矩阵, 实际列数为 {0}")]
  InvalidFaceShape(usize),
  #[error("无效的手部区域格式: 期望 Nx{HAND_REGION_COLS} 的 i32 矩阵, 实际列数为 {0}")]
  InvalidHandShape(usize),
  #[error("区域数据长度 {len} 不是列数 {cols} 的整数倍")]
  RaggedData { len: usize, cols: usize },
}

/// 引擎侧的矩形区域
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl Rect {
  pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
    Self { x, y, width, height }
  }

  /// 以中心点和边长构造正方形区域
  pub fn square_around(cx: f32, cy: f32, size: f32) -> Self {
    Self {
      x: cx - size / 2.0,
      y: cy - size / 2.0,
      width: size,
      height: size,
    }
  }

  /// 零矩形表示该实体没有可用区域
  pub fn is_zero(&self) -> bool {
    self.width <= 0.0 || self.height <= 0.0
  }
}

/// 一个人对应的左右手区域对
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HandRectPair {
  pub left: Rect,
  pub right: Rect,
}

/// 固定布局的整型区域矩阵，调用方可直接读回
///
/// 人脸为 Nx4，每行 (x, y, 宽, 高)；手部为 Nx8，每行先左手后右手。
#[derive(Debug, Clone, PartialEq)]
pub struct RegionMatrix {
  cols: usize,
  data: Vec<i32>,
}

impl Default for RegionMatrix {
  fn default() -> Self {
    Self { cols: 0, data: Vec::new() }
  }
}

impl RegionMatrix {
  /// 由行优先数据构造，长度必须是列数的整数倍
  pub fn from_data(cols: usize, data: Vec<i32>) -> Result<Self, RegionError> {
    if cols == 0 || data.len() % cols != 0 {
      return Err(RegionError::RaggedData { len: data.len(), cols });
    }
    Ok(Self { cols, data })
  }

  pub fn rows(&self) -> usize {
    if self.cols == 0 { 0 } else { self.data.len() / self.cols }
  }

  pub fn cols(&self) -> usize {
    self.cols
  }

  pub fn row(&self, index: usize) -> Option<&[i32]> {
    if index >= self.rows() {
      return None;
    }
    Some(&self.data[index * self.cols..(index + 1) * self.cols])
  }

  pub fn as_slice(&self) -> &[i32] {
    &self.data
  }

  /// 校验并转换为人脸矩形，列数不为 4 直接拒绝
  pub fn to_face_rects(&self) -> Result<Vec<Rect>, RegionError> {
    if self.cols != FACE_REGION_COLS {
      return Err(RegionError::InvalidFaceShape(self.cols));
    }
    Ok(
      self
        .data
        .chunks_exact(FACE_REGION_COLS)
        .map(|r| Rect::new(r[0] as f32, r[1] as f32, r[2] as f32, r[3] as f32))
        .collect(),
    )
  }

  /// 校验并转换为左右手矩形对，列数不为 8 直接拒绝
  pub fn to_hand_rects(&self) -> Result<Vec<HandRectPair>, RegionError> {
    if self.cols != HAND_REGION_COLS {
      return Err(RegionError::InvalidHandShape(self.cols));
    }
    Ok(
      self
        .data
        .chunks_exact(HAND_REGION_COLS)
        .map(|r| HandRectPair {
          left: Rect::new(r[0] as f32, r[1] as f32, r[2] as f32, r[3] as f32),
          right: Rect::new(r[4] as f32, r[5] as f32, r[6] as f32, r[7] as f32),
        })
        .collect(),
    )
  }

  /// 由引擎侧人脸矩形生成 Nx4 矩阵快照
  pub fn from_face_rects(rects: &[Rect]) -> Self {
    let mut data = Vec::with_capacity(rects.len() * FACE_REGION_COLS);
    for r in rects {
      data.extend_from_slice(&[r.x as i32, r.y as i32, r.width as i32, r.height as i32]);
    }
    Self {
      cols: FACE_REGION_COLS,
      data,
    }
  }

  /// 由引擎侧手部矩形对生成 Nx8 矩阵快照
  pub fn from_hand_rects(rects: &[HandRectPair]) -> Self {
    let mut data = Vec::with_capacity(rects.len() * HAND_REGION_COLS);
    for r in rects {
      data.extend_from_slice(&[
        r.left.x as i32,
        r.left.y as i32,
        r.left.width as i32,
        r.left.height as i32,
        r.right.x as i32,
        r.right.y as i32,
        r.right.width as i32,
        r.right.height as i32,
      ]);
    }
    Self {
      cols: HAND_REGION_COLS,
      data,
    }
  }
}
