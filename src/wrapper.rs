// 该文件是 Zitai （姿态万千） 项目的一部分。
// src/wrapper.rs - 姿态/人脸/手部估计管线封装
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

use image::RgbImage;
use ndarray::Array3;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{self, ConfigError, WrapperConfig};
use crate::detector::{FaceRegionDetector, HandRegionDetector};
use crate::formatter::{InputFormatter, OutputFormatter};
use crate::keypoints::{KeypointCategory, KeypointMatrix};
use crate::model::{FaceModel, HandModel, ModelContext, ModelError, ModelSet, PoseModel, PoseOutput};
use crate::region::{RegionError, RegionMatrix};
use crate::render::{FaceRenderer, HandRenderer, PoseRenderer};

// 不向调用方暴露的固定参数
const SCALE_COUNT: usize = 1;
const SCALE_GAP: f32 = 0.3; // 单尺度时不生效
const POSE_RENDER_THRESHOLD: f32 = 0.05;
const POSE_BLEND_ALPHA: f32 = 0.6;
// 人脸/手部渲染的置信度阈值与混合系数共用同一常数
const FACE_BLEND: f32 = 0.4;
const HAND_BLEND: f32 = 0.2;

#[derive(Error, Debug)]
pub enum WrapperError {
  #[error("配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("启用了{0}管线但未提供对应的模型后端")]
  MissingModel(&'static str),
  #[error("人脸网络未初始化")]
  FaceDisabled,
  #[error("手部网络未初始化")]
  HandDisabled,
  #[error(transparent)]
  Region(#[from] RegionError),
  #[error("模型错误: {0}")]
  Model(#[from] ModelError),
}

/// 引擎子对象聚合，构造时一次性建好，由封装独占
struct EngineStack {
  input_formatter: InputFormatter,
  output_formatter: OutputFormatter,
  pose_model: Box<dyn PoseModel>,
  pose_renderer: PoseRenderer,
  face_detector: FaceRegionDetector,
  face_model: Option<Box<dyn FaceModel>>,
  face_renderer: FaceRenderer,
  hand_detector: HandRegionDetector,
  hand_model: Option<Box<dyn HandModel>>,
  hand_renderer: HandRenderer,
}

/// 姿态/人脸/手部估计管线的同步封装
///
/// 所有方法都在调用线程上阻塞执行；实例不做内部加锁，
/// 跨线程使用时由调用方自行串行化。
pub struct PoseWrapper {
  engine: EngineStack,
  last_pose: PoseOutput,
  last_face: KeypointMatrix,
  last_hands: [KeypointMatrix; 2],
  face_regions: RegionMatrix,
  hand_regions: RegionMatrix,
}

impl std::fmt::Debug for PoseWrapper {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("PoseWrapper").finish_non_exhaustive()
  }
}

impl PoseWrapper {
  /// 构造管线：校验配置、初始化进程级日志、急切加载启用管线的模型
  ///
  /// 构造是阻塞且重量级的（模型加载在当前线程完成）。
  pub fn new(config: WrapperConfig, models: ModelSet) -> Result<Self, WrapperError> {
    config.validate()?;
    config::init_logging(config.log_level);

    if config.with_face && models.face.is_none() {
      return Err(WrapperError::MissingModel("人脸"));
    }
    if config.with_hands && models.hand.is_none() {
      return Err(WrapperError::MissingModel("手部"));
    }

    info!(
      "构建估计管线: 模型 {}, 人脸管线 {}, 手部管线 {}",
      config.model_kind.token(),
      config.with_face,
      config.with_hands
    );

    let pose_ctx = ModelContext {
      kind: config.model_kind,
      model_folder: config.model_folder.clone(),
      net_input_size: config.net_pose_input_size,
      net_output_size: config.net_pose_output_size,
      heatmap_kinds: config.heatmap_kinds(),
      scale_mode: config.scale_mode,
    };
    // 人脸与手部网络共用同一输入分辨率，不输出热力图
    let face_ctx = ModelContext {
      net_input_size: config.net_face_input_size,
      net_output_size: config.net_face_output_size,
      heatmap_kinds: Vec::new(),
      ..pose_ctx.clone()
    };

    let mut pose_model = models.pose;
    pose_model.initialize(&pose_ctx)?;
    debug!("姿态模型初始化完成");

    let face_model = if config.with_face {
      let mut model = models.face.ok_or(WrapperError::MissingModel("人脸"))?;
      model.initialize(&face_ctx)?;
      debug!("人脸模型初始化完成");
      Some(model)
    } else {
      None
    };

    let hand_model = if config.with_hands {
      let mut model = models.hand.ok_or(WrapperError::MissingModel("手部"))?;
      model.initialize(&face_ctx)?;
      debug!("手部模型初始化完成");
      Some(model)
    } else {
      None
    };

    let engine = EngineStack {
      input_formatter: InputFormatter::new(config.net_pose_input_size, SCALE_COUNT, SCALE_GAP),
      output_formatter: OutputFormatter::new(config.output_size),
      pose_model,
      pose_renderer: PoseRenderer::new(config.model_kind, POSE_RENDER_THRESHOLD, POSE_BLEND_ALPHA),
      face_detector: FaceRegionDetector::new(config.model_kind),
      face_model,
      face_renderer: FaceRenderer::new(FACE_BLEND, FACE_BLEND),
      hand_detector: HandRegionDetector::new(config.model_kind),
      hand_model,
      hand_renderer: HandRenderer::new(HAND_BLEND, HAND_BLEND),
    };

    Ok(Self {
      engine,
      last_pose: PoseOutput::default(),
      last_face: KeypointMatrix::empty(),
      last_hands: [KeypointMatrix::empty(), KeypointMatrix::empty()],
      face_regions: RegionMatrix::default(),
      hand_regions: RegionMatrix::default(),
    })
  }

  /// 姿态估计：格式化输入并前向传播，结果留存供后续调用读取
  pub fn detect_pose(&mut self, image: &RgbImage) -> Result<(), WrapperError> {
    let input = self.engine.input_formatter.format(image);
    self.last_pose = self.engine.pose_model.forward(&input)?;
    debug!("姿态估计完成: {} 人", self.last_pose.keypoints.num_entities());
    Ok(())
  }

  /// 人脸估计（自动区域）：由最近一次姿态结果推导每人的人脸区域
  pub fn detect_face(&mut self, image: &RgbImage) -> Result<(), WrapperError> {
    if self.engine.face_model.is_none() {
      return Err(WrapperError::FaceDisabled);
    }
    let rects = self.engine.face_detector.detect(&self.last_pose.keypoints);
    self.face_regions = RegionMatrix::from_face_rects(&rects);

    let Some(model) = self.engine.face_model.as_mut() else {
      return Err(WrapperError::FaceDisabled);
    };
    self.last_face = model.forward(image, &rects)?;
    debug!("人脸估计完成: {} 个区域", rects.len());
    Ok(())
  }

  /// 人脸估计（显式区域）：区域矩阵必须是 Nx4 的 i32 布局，
  /// 校验失败时不触碰任何引擎状态
  pub fn detect_face_with(
    &mut self,
    image: &RgbImage,
    regions: &RegionMatrix,
  ) -> Result<(), WrapperError> {
    if self.engine.face_model.is_none() {
      return Err(WrapperError::FaceDisabled);
    }
    let rects = regions.to_face_rects()?;
    self.face_regions = regions.clone();

    let Some(model) = self.engine.face_model.as_mut() else {
      return Err(WrapperError::FaceDisabled);
    };
    self.last_face = model.forward(image, &rects)?;
    debug!("人脸估计完成: {} 个外部区域", rects.len());
    Ok(())
  }

  /// 手部估计（自动区域）：由最近一次姿态结果推导每人的左右手区域对
  pub fn detect_hands(&mut self, image: &RgbImage) -> Result<(), WrapperError> {
    if self.engine.hand_model.is_none() {
      return Err(WrapperError::HandDisabled);
    }
    let rects = self.engine.hand_detector.detect(&self.last_pose.keypoints);
    self.hand_regions = RegionMatrix::from_hand_rects(&rects);

    let Some(model) = self.engine.hand_model.as_mut() else {
      return Err(WrapperError::HandDisabled);
    };
    self.last_hands = model.forward(image, &rects)?;
    debug!("手部估计完成: {} 个区域对", rects.len());
    Ok(())
  }

  /// 手部估计（显式区域）：区域矩阵必须是 Nx8 的 i32 布局（先左手后右手）
  pub fn detect_hands_with(
    &mut self,
    image: &RgbImage,
    regions: &RegionMatrix,
  ) -> Result<(), WrapperError> {
    if self.engine.hand_model.is_none() {
      return Err(WrapperError::HandDisabled);
    }
    let rects = regions.to_hand_rects()?;
    self.hand_regions = regions.clone();

    let Some(model) = self.engine.hand_model.as_mut() else {
      return Err(WrapperError::HandDisabled);
    };
    self.last_hands = model.forward(image, &rects)?;
    debug!("手部估计完成: {} 个外部区域对", rects.len());
    Ok(())
  }

  /// 把最近一次的估计结果叠加渲染到图像上
  ///
  /// 不改动入参图像，也不改动内部状态；状态不变时重复调用结果一致。
  pub fn render(&self, image: &RgbImage) -> RgbImage {
    let mut canvas = self.engine.output_formatter.format(image);

    self.engine.pose_renderer.render(&mut canvas, &self.last_pose.keypoints);
    if self.engine.face_model.is_some() {
      self.engine.face_renderer.render(&mut canvas, &self.last_face);
    }
    if self.engine.hand_model.is_some() {
      for hand in &self.last_hands {
        self.engine.hand_renderer.render(&mut canvas, hand);
      }
    }

    canvas.into_image()
  }

  /// 读取最近一次估计的关键点快照
  ///
  /// 姿态与人脸各返回一个矩阵；手部固定返回 [左手, 右手] 两个矩阵。
  /// 对应的检测从未执行时返回空矩阵而不是错误。
  pub fn keypoints(&self, category: KeypointCategory) -> Vec<KeypointMatrix> {
    match category {
      KeypointCategory::Pose => vec![self.last_pose.keypoints.clone()],
      KeypointCategory::Face => vec![self.last_face.clone()],
      KeypointCategory::Hand => self.last_hands.to_vec(),
    }
  }

  /// 最近一次姿态估计的热力图副本
  ///
  /// 返回的是防御性拷贝，调用方改动不影响内部状态；
  /// 构造时未启用热力图则始终为空。
  pub fn heatmaps(&self) -> Array3<f32> {
    self.last_pose.heatmaps.clone()
  }

  /// 最近一次人脸检测使用的区域矩阵（Nx4）
  pub fn face_regions(&self) -> &RegionMatrix {
    &self.face_regions
  }

  /// 最近一次手部检测使用的区域矩阵（Nx8）
  pub fn hand_regions(&self) -> &RegionMatrix {
    &self.hand_regions
  }
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;
  use std::rc::Rc;

  use super::*;
  use crate::keypoints::coco;
  use crate::model::NetInput;
  use crate::region::{HandRectPair, Rect};

  /// 记录收到的调用，回放固定输出
  #[derive(Default)]
  struct StubLog {
    pose_calls: usize,
    face_regions: Vec<Vec<Rect>>,
    hand_regions: Vec<Vec<HandRectPair>>,
  }

  struct StubPose {
    log: Rc<RefCell<StubLog>>,
    output: PoseOutput,
  }

  impl PoseModel for StubPose {
    fn initialize(&mut self, _ctx: &ModelContext) -> Result<(), ModelError> {
      Ok(())
    }

    fn forward(&mut self, _input: &NetInput) -> Result<PoseOutput, ModelError> {
      self.log.borrow_mut().pose_calls += 1;
      Ok(self.output.clone())
    }
  }

  struct StubFace {
    log: Rc<RefCell<StubLog>>,
    output: KeypointMatrix,
  }

  impl FaceModel for StubFace {
    fn initialize(&mut self, _ctx: &ModelContext) -> Result<(), ModelError> {
      Ok(())
    }

    fn forward(&mut self, _image: &RgbImage, regions: &[Rect]) -> Result<KeypointMatrix, ModelError> {
      self.log.borrow_mut().face_regions.push(regions.to_vec());
      Ok(self.output.clone())
    }
  }

  struct StubHand {
    log: Rc<RefCell<StubLog>>,
    output: [KeypointMatrix; 2],
  }

  impl HandModel for StubHand {
    fn initialize(&mut self, _ctx: &ModelContext) -> Result<(), ModelError> {
      Ok(())
    }

    fn forward(
      &mut self,
      _image: &RgbImage,
      regions: &[HandRectPair],
    ) -> Result<[KeypointMatrix; 2], ModelError> {
      self.log.borrow_mut().hand_regions.push(regions.to_vec());
      Ok(self.output.clone())
    }
  }

  fn full_person() -> Vec<[f32; 3]> {
    let mut person = vec![[0.0f32; 3]; coco::NUM_PARTS];
    for (i, p) in person.iter_mut().enumerate() {
      *p = [10.0 + i as f32 * 5.0, 20.0 + i as f32 * 3.0, 0.9];
    }
    person
  }

  fn pose_output(persons: usize, heatmaps: bool) -> PoseOutput {
    let entities: Vec<_> = (0..persons).map(|_| full_person()).collect();
    PoseOutput {
      keypoints: KeypointMatrix::from_entities(&entities).unwrap(),
      heatmaps: if heatmaps {
        Array3::from_elem((2, 4, 4), 0.5)
      } else {
        Array3::zeros((0, 0, 0))
      },
    }
  }

  fn face_matrix() -> KeypointMatrix {
    KeypointMatrix::from_entities(&[vec![[30.0, 30.0, 0.9]; 70]]).unwrap()
  }

  fn hand_matrices() -> [KeypointMatrix; 2] {
    [
      KeypointMatrix::from_entities(&[vec![[1.0, 1.0, 0.9]; 21]]).unwrap(),
      KeypointMatrix::from_entities(&[vec![[2.0, 2.0, 0.9]; 21]]).unwrap(),
    ]
  }

  fn build_wrapper(
    with_face: bool,
    with_hands: bool,
    persons: usize,
    heatmaps: bool,
  ) -> (PoseWrapper, Rc<RefCell<StubLog>>) {
    let log = Rc::new(RefCell::new(StubLog::default()));
    let mut models = ModelSet::pose_only(Box::new(StubPose {
      log: log.clone(),
      output: pose_output(persons, heatmaps),
    }));
    if with_face {
      models = models.with_face(Box::new(StubFace {
        log: log.clone(),
        output: face_matrix(),
      }));
    }
    if with_hands {
      models = models.with_hand(Box::new(StubHand {
        log: log.clone(),
        output: hand_matrices(),
      }));
    }

    let config = WrapperConfig::builder()
      .output_size((64, 64))
      .with_heatmaps(heatmaps)
      .with_face(with_face)
      .with_hands(with_hands)
      .build()
      .unwrap();
    (PoseWrapper::new(config, models).unwrap(), log)
  }

  fn test_image() -> RgbImage {
    RgbImage::from_pixel(64, 64, image::Rgb([40, 80, 120]))
  }

  #[test]
  fn construction_rejects_out_of_range_log_level() {
    let mut config = WrapperConfig::builder().build().unwrap();
    config.log_level = 300;
    let models = ModelSet::pose_only(Box::new(StubPose {
      log: Rc::new(RefCell::new(StubLog::default())),
      output: PoseOutput::default(),
    }));
    let err = PoseWrapper::new(config, models).unwrap_err();
    assert!(matches!(err, WrapperError::Config(ConfigError::LogLevelOutOfRange(300))));
  }

  #[test]
  fn construction_rejects_missing_backend_for_enabled_pipeline() {
    let config = WrapperConfig::builder().with_face(true).build().unwrap();
    let models = ModelSet::pose_only(Box::new(StubPose {
      log: Rc::new(RefCell::new(StubLog::default())),
      output: PoseOutput::default(),
    }));
    assert!(matches!(
      PoseWrapper::new(config, models).unwrap_err(),
      WrapperError::MissingModel(_)
    ));
  }

  #[test]
  fn disabled_pipelines_always_error() {
    let (mut wrapper, _) = build_wrapper(false, false, 1, false);
    let image = test_image();
    wrapper.detect_pose(&image).unwrap();

    assert!(matches!(wrapper.detect_face(&image), Err(WrapperError::FaceDisabled)));
    assert!(matches!(wrapper.detect_hands(&image), Err(WrapperError::HandDisabled)));

    let face_regions = RegionMatrix::from_data(4, vec![0, 0, 10, 10]).unwrap();
    assert!(matches!(
      wrapper.detect_face_with(&image, &face_regions),
      Err(WrapperError::FaceDisabled)
    ));
  }

  #[test]
  fn keypoints_are_empty_before_any_detect() {
    let (wrapper, _) = build_wrapper(true, true, 1, false);
    assert!(wrapper.keypoints(KeypointCategory::Pose)[0].is_empty());
    assert!(wrapper.keypoints(KeypointCategory::Face)[0].is_empty());
    let hands = wrapper.keypoints(KeypointCategory::Hand);
    assert_eq!(hands.len(), 2);
    assert!(hands[0].is_empty() && hands[1].is_empty());
    assert_eq!(wrapper.heatmaps().len(), 0);
  }

  #[test]
  fn detect_pose_retains_result() {
    let (mut wrapper, log) = build_wrapper(false, false, 2, false);
    wrapper.detect_pose(&test_image()).unwrap();
    assert_eq!(log.borrow().pose_calls, 1);
    let pose = &wrapper.keypoints(KeypointCategory::Pose)[0];
    assert_eq!(pose.num_entities(), 2);
    assert_eq!(pose.num_parts(), coco::NUM_PARTS);
  }

  #[test]
  fn auto_face_derives_one_region_per_person() {
    let (mut wrapper, log) = build_wrapper(true, false, 2, false);
    let image = test_image();
    wrapper.detect_pose(&image).unwrap();
    wrapper.detect_face(&image).unwrap();

    assert_eq!(wrapper.face_regions().rows(), 2);
    assert_eq!(wrapper.face_regions().cols(), 4);
    assert_eq!(log.borrow().face_regions[0].len(), 2);
    assert!(!wrapper.keypoints(KeypointCategory::Face)[0].is_empty());
  }

  #[test]
  fn auto_face_before_pose_runs_over_zero_regions() {
    let (mut wrapper, log) = build_wrapper(true, false, 1, false);
    wrapper.detect_face(&test_image()).unwrap();
    assert_eq!(wrapper.face_regions().rows(), 0);
    assert_eq!(log.borrow().face_regions[0].len(), 0);
  }

  #[test]
  fn explicit_face_regions_are_stored_as_is() {
    let (mut wrapper, log) = build_wrapper(true, false, 1, false);
    let regions = RegionMatrix::from_data(4, vec![5, 6, 20, 20, 50, 60, 30, 30]).unwrap();
    wrapper.detect_face_with(&test_image(), &regions).unwrap();

    assert_eq!(wrapper.face_regions(), &regions);
    let sent = &log.borrow().face_regions[0];
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], Rect::new(5.0, 6.0, 20.0, 20.0));
  }

  #[test]
  fn invalid_region_shape_fails_before_engine_call() {
    let (mut wrapper, log) = build_wrapper(true, true, 1, false);
    let image = test_image();

    let good = RegionMatrix::from_data(4, vec![1, 2, 3, 4]).unwrap();
    wrapper.detect_face_with(&image, &good).unwrap();

    let bad = RegionMatrix::from_data(5, vec![0; 5]).unwrap();
    assert!(matches!(
      wrapper.detect_face_with(&image, &bad),
      Err(WrapperError::Region(RegionError::InvalidFaceShape(5)))
    ));
    // 校验失败后区域与结果保持不变，引擎也没有被调用
    assert_eq!(wrapper.face_regions(), &good);
    assert_eq!(log.borrow().face_regions.len(), 1);

    let bad_hand = RegionMatrix::from_data(4, vec![0; 4]).unwrap();
    assert!(wrapper.detect_hands_with(&image, &bad_hand).is_err());
    assert!(log.borrow().hand_regions.is_empty());
  }

  #[test]
  fn hand_keypoints_come_back_left_then_right() {
    let (mut wrapper, _) = build_wrapper(false, true, 1, false);
    let image = test_image();
    wrapper.detect_pose(&image).unwrap();
    wrapper.detect_hands(&image).unwrap();

    assert_eq!(wrapper.hand_regions().cols(), 8);
    let hands = wrapper.keypoints(KeypointCategory::Hand);
    assert_eq!(hands[0].point(0, 0).unwrap().0, 1.0);
    assert_eq!(hands[1].point(0, 0).unwrap().0, 2.0);
  }

  #[test]
  fn render_is_pure_and_idempotent() {
    let (mut wrapper, _) = build_wrapper(true, true, 1, false);
    let image = test_image();
    wrapper.detect_pose(&image).unwrap();
    wrapper.detect_face(&image).unwrap();
    wrapper.detect_hands(&image).unwrap();

    let before = image.clone();
    let first = wrapper.render(&image);
    let second = wrapper.render(&image);
    assert_eq!(image, before);
    assert_eq!(first, second);
  }

  #[test]
  fn heatmaps_return_defensive_copy() {
    let (mut wrapper, _) = build_wrapper(false, false, 1, true);
    wrapper.detect_pose(&test_image()).unwrap();

    let mut maps = wrapper.heatmaps();
    assert_eq!(maps.shape(), &[2, 4, 4]);
    maps[[0, 0, 0]] = 42.0;

    let fresh = wrapper.heatmaps();
    assert_eq!(fresh[[0, 0, 0]], 0.5);
  }
}
