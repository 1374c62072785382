// 该文件是 Zitai （姿态万千） 项目的一部分。
// src/model/replay.rs - 关键点回放模型
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

use std::path::Path;

use image::RgbImage;
use ndarray::Array3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::keypoints::KeypointMatrix;
use crate::model::{FaceModel, HandModel, ModelContext, ModelError, NetInput, PoseModel, PoseOutput};
use crate::region::{HandRectPair, Rect};

/// 回放文件格式：已记录的关键点，按实体分组
///
/// 用于离线渲染与不依赖推理后端的调试。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplayFile {
  /// 人数 × 部位数 × [x, y, 置信度]
  pub pose: Vec<Vec<[f32; 3]>>,
  #[serde(default)]
  pub face: Vec<Vec<[f32; 3]>>,
  #[serde(default)]
  pub hand_left: Vec<Vec<[f32; 3]>>,
  #[serde(default)]
  pub hand_right: Vec<Vec<[f32; 3]>>,
}

impl ReplayFile {
  pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
    let raw = std::fs::read(path.as_ref())?;
    serde_json::from_slice(&raw).map_err(|e| ModelError::Parse(e.to_string()))
  }

  fn matrix(entities: &[Vec<[f32; 3]>], what: &str) -> Result<KeypointMatrix, ModelError> {
    KeypointMatrix::from_entities(entities)
      .ok_or_else(|| ModelError::Parse(format!("{} 关键点各实体的部位数不一致", what)))
  }
}

/// 回放模型：对任意输入都返回文件中记录的关键点
///
/// 同一个实例可同时充当姿态、人脸、手部后端。
#[derive(Debug, Clone, Default)]
pub struct ReplayModel {
  file: ReplayFile,
  ctx: Option<ModelContext>,
}

impl ReplayModel {
  pub fn new(file: ReplayFile) -> Self {
    Self { file, ctx: None }
  }

  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ModelError> {
    info!("加载关键点回放文件: {}", path.as_ref().display());
    let file = ReplayFile::load(path)?;
    debug!(
      "回放数据: {} 人, {} 脸, {}/{} 只左右手",
      file.pose.len(),
      file.face.len(),
      file.hand_left.len(),
      file.hand_right.len()
    );
    Ok(Self::new(file))
  }

  fn init(&mut self, ctx: &ModelContext) {
    debug!("初始化回放模型: {} @ {}", ctx.kind.token(), ctx.model_folder.display());
    self.ctx = Some(ctx.clone());
  }

  fn require_init(&self) -> Result<&ModelContext, ModelError> {
    self
      .ctx
      .as_ref()
      .ok_or_else(|| ModelError::Invalid("回放模型尚未初始化".to_string()))
  }
}

impl PoseModel for ReplayModel {
  fn initialize(&mut self, ctx: &ModelContext) -> Result<(), ModelError> {
    self.init(ctx);
    Ok(())
  }

  fn forward(&mut self, input: &NetInput) -> Result<PoseOutput, ModelError> {
    let ctx = self.require_init()?;
    debug!(
      "回放姿态前向传播: {} 个尺度, 原图 {}x{}",
      input.tensors.len(),
      input.image_size.0,
      input.image_size.1
    );

    // 回放文件不含热力图，按初始化上下文给出正确形状的零图
    let heatmaps = if ctx.heatmap_kinds.is_empty() {
      Array3::zeros((0, 0, 0))
    } else {
      let maps: usize = ctx.heatmap_kinds.iter().map(|k| k.num_maps(ctx.kind)).sum();
      let (w, h) = ctx.net_output_size;
      Array3::zeros((maps, h as usize, w as usize))
    };

    Ok(PoseOutput {
      keypoints: ReplayFile::matrix(&self.file.pose, "姿态")?,
      heatmaps,
    })
  }
}

impl FaceModel for ReplayModel {
  fn initialize(&mut self, ctx: &ModelContext) -> Result<(), ModelError> {
    self.init(ctx);
    Ok(())
  }

  fn forward(&mut self, _image: &RgbImage, regions: &[Rect]) -> Result<KeypointMatrix, ModelError> {
    self.require_init()?;
    debug!("回放人脸前向传播: {} 个区域", regions.len());
    ReplayFile::matrix(&self.file.face, "人脸")
  }
}

impl HandModel for ReplayModel {
  fn initialize(&mut self, ctx: &ModelContext) -> Result<(), ModelError> {
    self.init(ctx);
    Ok(())
  }

  fn forward(
    &mut self,
    _image: &RgbImage,
    regions: &[HandRectPair],
  ) -> Result<[KeypointMatrix; 2], ModelError> {
    self.require_init()?;
    debug!("回放手部前向传播: {} 个区域对", regions.len());
    Ok([
      ReplayFile::matrix(&self.file.hand_left, "左手")?,
      ReplayFile::matrix(&self.file.hand_right, "右手")?,
    ])
  }
}
