// 该文件是 Zitai （姿态万千） 项目的一部分。
// src/model.rs - 模型后端接口
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

use std::path::PathBuf;

use image::RgbImage;
use ndarray::{Array3, Array4};
use thiserror::Error;

use crate::config::{HeatMapKind, PoseModelKind, ScaleMode};
use crate::keypoints::KeypointMatrix;
use crate::region::{HandRectPair, Rect};

#[derive(Error, Debug)]
pub enum ModelError {
  #[error("模型加载错误: {0}")]
  Load(#[from] std::io::Error),
  #[error("模型数据解析错误: {0}")]
  Parse(String),
  #[error("模型无效: {0}")]
  Invalid(String),
  #[error("推理错误: {0}")]
  Inference(String),
}

/// 模型初始化上下文，构造管线时一次性传入
#[derive(Debug, Clone)]
pub struct ModelContext {
  /// 姿态模型类别
  pub kind: PoseModelKind,
  /// 模型权重目录
  pub model_folder: PathBuf,
  /// 网络输入分辨率 (宽, 高)
  pub net_input_size: (u32, u32),
  /// 网络输出分辨率 (宽, 高)
  pub net_output_size: (u32, u32),
  /// 需要输出的热力图种类，空集表示不输出
  pub heatmap_kinds: Vec<HeatMapKind>,
  /// 热力图归一化方式
  pub scale_mode: ScaleMode,
}

/// 姿态网络的输入：多尺度 NCHW 张量加逐尺度比例
#[derive(Debug, Clone)]
pub struct NetInput {
  /// 每个尺度一个 [1, 3, 高, 宽] 张量
  pub tensors: Vec<Array4<f32>>,
  /// 各尺度相对网络输入的缩放比
  pub scale_ratios: Vec<f32>,
  /// 原始图像尺寸 (宽, 高)
  pub image_size: (u32, u32),
}

/// 姿态前向传播的输出
#[derive(Debug, Clone)]
pub struct PoseOutput {
  /// 人数 × 部位数 × (x, y, 置信度)
  pub keypoints: KeypointMatrix,
  /// 热力图，维度为 图数 × 高 × 宽；未启用时为空
  pub heatmaps: Array3<f32>,
}

impl Default for PoseOutput {
  fn default() -> Self {
    Self {
      keypoints: KeypointMatrix::empty(),
      heatmaps: Array3::zeros((0, 0, 0)),
    }
  }
}

/// 姿态提取后端，前向传播本身由实现方提供
pub trait PoseModel {
  /// 在构造线程上完成资源初始化（加载权重等），构造时即刻执行
  fn initialize(&mut self, ctx: &ModelContext) -> Result<(), ModelError>;

  fn forward(&mut self, input: &NetInput) -> Result<PoseOutput, ModelError>;
}

/// 人脸提取后端，在给定区域上运行
pub trait FaceModel {
  fn initialize(&mut self, ctx: &ModelContext) -> Result<(), ModelError>;

  fn forward(&mut self, image: &RgbImage, regions: &[Rect]) -> Result<KeypointMatrix, ModelError>;
}

/// 手部提取后端，输出固定为 [左手, 右手] 两个矩阵
pub trait HandModel {
  fn initialize(&mut self, ctx: &ModelContext) -> Result<(), ModelError>;

  fn forward(
    &mut self,
    image: &RgbImage,
    regions: &[HandRectPair],
  ) -> Result<[KeypointMatrix; 2], ModelError>;
}

/// 一套模型后端，姿态必备，人脸与手部按管线开关提供
pub struct ModelSet {
  pub pose: Box<dyn PoseModel>,
  pub face: Option<Box<dyn FaceModel>>,
  pub hand: Option<Box<dyn HandModel>>,
}

impl ModelSet {
  pub fn pose_only(pose: Box<dyn PoseModel>) -> Self {
    Self {
      pose,
      face: None,
      hand: None,
    }
  }

  pub fn with_face(mut self, face: Box<dyn FaceModel>) -> Self {
    self.face = Some(face);
    self
  }

  pub fn with_hand(mut self, hand: Box<dyn HandModel>) -> Self {
    self.hand = Some(hand);
    self
  }
}

#[cfg(feature = "replay")]
mod replay;
#[cfg(feature = "replay")]
pub use self::replay::{ReplayFile, ReplayModel};
