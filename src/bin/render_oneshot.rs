// 该文件是 Zitai （姿态万千） 项目的一部分。
// src/bin/render_oneshot.rs - 单帧关键点回放渲染
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

use anyhow::Result;
use clap::Parser;
use tracing::info;

use zitai::model::ReplayModel;
use zitai::{ModelSet, PoseWrapper, WrapperConfig};

/// Zitai 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 输入图片路径
  #[arg(long, value_name = "IMAGE")]
  pub image: PathBuf,

  /// 关键点回放文件路径（JSON）
  #[arg(long, value_name = "KEYPOINTS")]
  pub keypoints: PathBuf,

  /// 渲染结果输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: PathBuf,

  /// 姿态模型 (COCO, MPI, MPI_4_layers)
  #[arg(long, default_value = "COCO", value_name = "MODEL")]
  pub model: String,

  /// 渲染输出分辨率，格式 宽x高
  #[arg(long, default_value = "656x368", value_name = "SIZE")]
  pub output_size: String,

  /// 日志级别 [0, 255]，0 输出全部
  #[arg(long, default_value = "128", value_name = "LEVEL")]
  pub log_level: i32,

  /// 启用人脸管线
  #[arg(long)]
  pub with_face: bool,

  /// 启用手部管线
  #[arg(long)]
  pub with_hands: bool,
}

fn parse_size(text: &str) -> Result<(u32, u32)> {
  let (w, h) = text
    .split_once('x')
    .ok_or_else(|| anyhow::anyhow!("分辨率格式应为 宽x高: {}", text))?;
  Ok((w.parse()?, h.parse()?))
}

fn main() -> Result<()> {
  let args = Args::parse();

  let config = WrapperConfig::builder()
    .model(&args.model)
    .output_size(parse_size(&args.output_size)?)
    .log_level(args.log_level)
    .with_face(args.with_face)
    .with_hands(args.with_hands)
    .build()?;
  zitai::config::init_logging(config.log_level);

  let replay = ReplayModel::from_path(&args.keypoints)?;
  let mut models = ModelSet::pose_only(Box::new(replay.clone()));
  if args.with_face {
    models = models.with_face(Box::new(replay.clone()));
  }
  if args.with_hands {
    models = models.with_hand(Box::new(replay));
  }

  let mut wrapper = PoseWrapper::new(config, models)?;

  info!("读取图片: {}", args.image.display());
  let image = image::ImageReader::open(&args.image)?.decode()?.into_rgb8();

  info!("开始估计...");
  let now = std::time::Instant::now();
  wrapper.detect_pose(&image)?;
  if args.with_face {
    wrapper.detect_face(&image)?;
  }
  if args.with_hands {
    wrapper.detect_hands(&image)?;
  }
  info!("估计完成，耗时: {:.2?}", now.elapsed());

  let rendered = wrapper.render(&image);
  rendered.save(&args.output)?;
  info!("渲染结果已保存: {}", args.output.display());

  Ok(())
}
