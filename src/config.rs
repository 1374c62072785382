// 该文件是 Zitai （姿态万千） 项目的一部分。
// src/config.rs - 管线配置与日志初始化
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
use std::sync::Once;

use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::keypoints;

/// 日志级别下限
pub const LOG_LEVEL_MIN: i32 = 0;
/// 日志级别上限，255 表示完全静默
pub const LOG_LEVEL_MAX: i32 = 255;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("日志级别超出范围 [{LOG_LEVEL_MIN}, {LOG_LEVEL_MAX}]: {0}")]
  LogLevelOutOfRange(i32),
  #[error("未知的姿态模型: {0} (可选值: COCO, MPI, MPI_4_layers)")]
  UnknownModel(String),
}

/// 姿态模型类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseModelKind {
  /// COCO 18 关键点模型
  Coco18,
  /// MPI 15 关键点模型
  Mpi15,
  /// MPI 15 关键点模型（4 层变体）
  Mpi15_4,
}

impl PoseModelKind {
  /// 从模型标记解析模型类别，未知标记直接报错，不选取默认值
  pub fn from_token(token: &str) -> Result<Self, ConfigError> {
    match token {
      "COCO" => Ok(PoseModelKind::Coco18),
      "MPI" => Ok(PoseModelKind::Mpi15),
      "MPI_4_layers" => Ok(PoseModelKind::Mpi15_4),
      other => Err(ConfigError::UnknownModel(other.to_string())),
    }
  }

  pub fn token(&self) -> &'static str {
    match self {
      PoseModelKind::Coco18 => "COCO",
      PoseModelKind::Mpi15 => "MPI",
      PoseModelKind::Mpi15_4 => "MPI_4_layers",
    }
  }

  /// 身体关键点数量
  pub fn num_parts(&self) -> usize {
    match self {
      PoseModelKind::Coco18 => keypoints::coco::NUM_PARTS,
      PoseModelKind::Mpi15 | PoseModelKind::Mpi15_4 => keypoints::mpi::NUM_PARTS,
    }
  }

  /// 骨架连线（渲染与 PAF 数量计算共用）
  pub fn limb_pairs(&self) -> &'static [(usize, usize)] {
    match self {
      PoseModelKind::Coco18 => &keypoints::coco::PAIRS,
      PoseModelKind::Mpi15 | PoseModelKind::Mpi15_4 => &keypoints::mpi::PAIRS,
    }
  }
}

/// 热力图归一化方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleMode {
  #[default]
  InputResolution,
  NetOutputResolution,
  OutputResolution,
  ZeroToOne,
  PlusMinusOne,
}

/// 热力图种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeatMapKind {
  /// 每个身体部位一张置信度图
  Parts,
  /// 背景一张
  Background,
  /// 部位亲和场，每条连线两张
  Pafs,
}

impl HeatMapKind {
  /// 启用热力图时固定输出的全集
  pub const ALL: [HeatMapKind; 3] = [HeatMapKind::Parts, HeatMapKind::Background, HeatMapKind::Pafs];

  /// 该种类在给定模型下对应的图张数
  pub fn num_maps(&self, kind: PoseModelKind) -> usize {
    match self {
      HeatMapKind::Parts => kind.num_parts(),
      HeatMapKind::Background => 1,
      HeatMapKind::Pafs => 2 * kind.limb_pairs().len(),
    }
  }
}

/// 管线配置
#[derive(Debug, Clone)]
pub struct WrapperConfig {
  /// 姿态网络输入分辨率 (宽, 高)
  pub net_pose_input_size: (u32, u32),
  /// 姿态网络输出分辨率 (宽, 高)
  pub net_pose_output_size: (u32, u32),
  /// 人脸/手部网络输入分辨率 (宽, 高)
  pub net_face_input_size: (u32, u32),
  /// 人脸/手部网络输出分辨率 (宽, 高)
  pub net_face_output_size: (u32, u32),
  /// 渲染输出分辨率 (宽, 高)
  pub output_size: (u32, u32),
  /// 姿态模型类别
  pub model_kind: PoseModelKind,
  /// 模型权重目录
  pub model_folder: PathBuf,
  /// 日志级别，0 输出全部，255 完全静默
  pub log_level: i32,
  /// 是否输出热力图（内存开销大）
  pub with_heatmaps: bool,
  /// 热力图归一化方式
  pub scale_mode: ScaleMode,
  /// 是否启用人脸管线
  pub with_face: bool,
  /// 是否启用手部管线
  pub with_hands: bool,
}

impl WrapperConfig {
  pub fn builder() -> WrapperConfigBuilder {
    WrapperConfigBuilder::default()
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.log_level < LOG_LEVEL_MIN || self.log_level > LOG_LEVEL_MAX {
      return Err(ConfigError::LogLevelOutOfRange(self.log_level));
    }
    Ok(())
  }

  /// 启用的热力图种类；未启用时为空集
  pub fn heatmap_kinds(&self) -> Vec<HeatMapKind> {
    if self.with_heatmaps {
      HeatMapKind::ALL.to_vec()
    } else {
      Vec::new()
    }
  }
}

/// 管线配置构造器
#[derive(Debug, Clone)]
pub struct WrapperConfigBuilder {
  net_pose_input_size: (u32, u32),
  net_pose_output_size: Option<(u32, u32)>,
  net_face_input_size: (u32, u32),
  net_face_output_size: Option<(u32, u32)>,
  output_size: (u32, u32),
  model_token: String,
  model_folder: PathBuf,
  log_level: i32,
  with_heatmaps: bool,
  scale_mode: ScaleMode,
  with_face: bool,
  with_hands: bool,
}

impl Default for WrapperConfigBuilder {
  fn default() -> Self {
    Self {
      net_pose_input_size: (656, 368),
      net_pose_output_size: None,
      net_face_input_size: (368, 368),
      net_face_output_size: None,
      output_size: (656, 368),
      model_token: "COCO".to_string(),
      model_folder: PathBuf::from("models"),
      log_level: LOG_LEVEL_MAX,
      with_heatmaps: false,
      scale_mode: ScaleMode::default(),
      with_face: false,
      with_hands: false,
    }
  }
}

impl WrapperConfigBuilder {
  pub fn net_pose_size(mut self, size: (u32, u32)) -> Self {
    self.net_pose_input_size = size;
    self
  }

  pub fn net_pose_output_size(mut self, size: (u32, u32)) -> Self {
    self.net_pose_output_size = Some(size);
    self
  }

  pub fn net_face_size(mut self, size: (u32, u32)) -> Self {
    self.net_face_input_size = size;
    self
  }

  pub fn net_face_output_size(mut self, size: (u32, u32)) -> Self {
    self.net_face_output_size = Some(size);
    self
  }

  pub fn output_size(mut self, size: (u32, u32)) -> Self {
    self.output_size = size;
    self
  }

  pub fn model(mut self, token: &str) -> Self {
    self.model_token = token.to_string();
    self
  }

  pub fn model_folder(mut self, folder: impl Into<PathBuf>) -> Self {
    self.model_folder = folder.into();
    self
  }

  pub fn log_level(mut self, level: i32) -> Self {
    self.log_level = level;
    self
  }

  pub fn with_heatmaps(mut self, enable: bool) -> Self {
    self.with_heatmaps = enable;
    self
  }

  pub fn scale_mode(mut self, mode: ScaleMode) -> Self {
    self.scale_mode = mode;
    self
  }

  pub fn with_face(mut self, enable: bool) -> Self {
    self.with_face = enable;
    self
  }

  pub fn with_hands(mut self, enable: bool) -> Self {
    self.with_hands = enable;
    self
  }

  pub fn build(self) -> Result<WrapperConfig, ConfigError> {
    // 模型标记先于任何默认值校验，未知标记不会退回 COCO
    let model_kind = PoseModelKind::from_token(&self.model_token)?;

    let config = WrapperConfig {
      net_pose_input_size: self.net_pose_input_size,
      // 网络输出分辨率缺省与输入一致
      net_pose_output_size: self.net_pose_output_size.unwrap_or(self.net_pose_input_size),
      net_face_input_size: self.net_face_input_size,
      net_face_output_size: self.net_face_output_size.unwrap_or(self.net_face_input_size),
      output_size: self.output_size,
      model_kind,
      model_folder: self.model_folder,
      log_level: self.log_level,
      with_heatmaps: self.with_heatmaps,
      scale_mode: self.scale_mode,
      with_face: self.with_face,
      with_hands: self.with_hands,
    };
    config.validate()?;
    Ok(config)
  }
}

static LOG_INIT: Once = Once::new();

/// 把 [0, 255] 日志级别映射到 tracing 级别
pub fn level_filter(level: i32) -> LevelFilter {
  match level {
    ..=63 => LevelFilter::TRACE,
    64..=127 => LevelFilter::DEBUG,
    128..=191 => LevelFilter::INFO,
    192..=223 => LevelFilter::WARN,
    224..=254 => LevelFilter::ERROR,
    _ => LevelFilter::OFF,
  }
}

/// 初始化进程级日志，每个进程只执行一次，重复调用为空操作
pub fn init_logging(level: i32) {
  LOG_INIT.call_once(|| {
    // 进程里可能已有订阅者（例如测试框架），初始化失败时忽略
    let _ = tracing_subscriber::fmt().with_max_level(level_filter(level)).try_init();
  });
}
