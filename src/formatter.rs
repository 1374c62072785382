// 该文件是 Zitai （姿态万千） 项目的一部分。
// src/formatter.rs - 图像与引擎表示之间的格式转换
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

use image::{Rgb32FImage, RgbImage, RgbaImage, imageops};
use ndarray::Array4;
use tracing::debug;

use crate::model::NetInput;

/// 输入格式化器：RGB 图像转多尺度 NCHW 网络输入
#[derive(Debug, Clone)]
pub struct InputFormatter {
  net_size: (u32, u32),
  scale_count: usize,
  scale_gap: f32,
}

impl InputFormatter {
  pub fn new(net_size: (u32, u32), scale_count: usize, scale_gap: f32) -> Self {
    Self {
      net_size,
      scale_count,
      scale_gap,
    }
  }

  /// 逐尺度缩放并归一化，输出网络输入张量与各尺度比例
  pub fn format(&self, image: &RgbImage) -> NetInput {
    let mut tensors = Vec::with_capacity(self.scale_count);
    let mut scale_ratios = Vec::with_capacity(self.scale_count);

    for i in 0..self.scale_count {
      let ratio = 1.0 - i as f32 * self.scale_gap;
      tensors.push(self.tensor_at_scale(image, ratio));
      scale_ratios.push(ratio);
    }

    debug!(
      "输入格式化完成: {} 个尺度, 网络输入 {}x{}",
      self.scale_count, self.net_size.0, self.net_size.1
    );

    NetInput {
      tensors,
      scale_ratios,
      image_size: (image.width(), image.height()),
    }
  }

  /// 保持纵横比缩放到网络输入尺寸，空余处补黑，像素归一化为 v/256 - 0.5
  fn tensor_at_scale(&self, image: &RgbImage, ratio: f32) -> Array4<f32> {
    let (net_w, net_h) = self.net_size;
    let scale = ratio * fit_scale((image.width(), image.height()), self.net_size);
    let scaled_w = ((image.width() as f32 * scale).round() as u32).max(1).min(net_w);
    let scaled_h = ((image.height() as f32 * scale).round() as u32).max(1).min(net_h);

    let resized = imageops::resize(image, scaled_w, scaled_h, imageops::FilterType::Triangle);

    let mut tensor = Array4::from_elem((1, 3, net_h as usize, net_w as usize), -0.5);
    for (x, y, pixel) in resized.enumerate_pixels() {
      for c in 0..3 {
        tensor[[0, c, y as usize, x as usize]] = pixel.0[c] as f32 / 256.0 - 0.5;
      }
    }
    tensor
  }
}

/// 渲染画布：输出分辨率的浮点图像加输入到输出的比例
#[derive(Debug, Clone)]
pub struct OutputCanvas {
  pixels: Rgb32FImage,
  scale: f32,
}

impl OutputCanvas {
  /// 原图坐标到画布坐标的比例
  pub fn scale(&self) -> f32 {
    self.scale
  }

  pub fn width(&self) -> u32 {
    self.pixels.width()
  }

  pub fn height(&self) -> u32 {
    self.pixels.height()
  }

  /// 把 RGBA 叠加层按给定混合系数合入画布，透明像素跳过
  pub fn blend_overlay(&mut self, overlay: &RgbaImage, alpha: f32) {
    debug_assert_eq!((overlay.width(), overlay.height()), (self.width(), self.height()));
    let alpha = alpha.clamp(0.0, 1.0);
    for (x, y, pixel) in overlay.enumerate_pixels() {
      if pixel.0[3] == 0 {
        continue;
      }
      let dst = self.pixels.get_pixel_mut(x, y);
      for c in 0..3 {
        dst.0[c] = (1.0 - alpha) * dst.0[c] + alpha * pixel.0[c] as f32;
      }
    }
  }

  /// 转回 8 位 RGB 图像
  pub fn into_image(self) -> RgbImage {
    let (w, h) = (self.pixels.width(), self.pixels.height());
    let mut out = RgbImage::new(w, h);
    for (x, y, pixel) in self.pixels.enumerate_pixels() {
      let mut rgb = [0u8; 3];
      for c in 0..3 {
        rgb[c] = pixel.0[c].round().clamp(0.0, 255.0) as u8;
      }
      out.put_pixel(x, y, image::Rgb(rgb));
    }
    out
  }
}

/// 输出格式化器：RGB 图像转渲染画布
#[derive(Debug, Clone)]
pub struct OutputFormatter {
  output_size: (u32, u32),
}

impl OutputFormatter {
  pub fn new(output_size: (u32, u32)) -> Self {
    Self { output_size }
  }

  /// 保持纵横比缩放到输出尺寸，像素保留 0..255 浮点范围
  pub fn format(&self, image: &RgbImage) -> OutputCanvas {
    let (out_w, out_h) = self.output_size;
    let scale = fit_scale((image.width(), image.height()), self.output_size);
    let scaled_w = ((image.width() as f32 * scale).round() as u32).max(1).min(out_w);
    let scaled_h = ((image.height() as f32 * scale).round() as u32).max(1).min(out_h);

    let resized = imageops::resize(image, scaled_w, scaled_h, imageops::FilterType::Triangle);

    let mut pixels = Rgb32FImage::new(out_w, out_h);
    for (x, y, pixel) in resized.enumerate_pixels() {
      let dst = pixels.get_pixel_mut(x, y);
      for c in 0..3 {
        dst.0[c] = pixel.0[c] as f32;
      }
    }

    OutputCanvas { pixels, scale }
  }
}

/// 保持纵横比放入目标尺寸所需的缩放比
fn fit_scale(from: (u32, u32), to: (u32, u32)) -> f32 {
  let sx = to.0 as f32 / from.0 as f32;
  let sy = to.1 as f32 / from.1 as f32;
  sx.min(sy)
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  fn gradient_image(w: u32, h: u32) -> RgbImage {
    RgbImage::from_fn(w, h, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]))
  }

  #[test]
  fn input_tensor_shape_and_ratio() {
    let formatter = InputFormatter::new((656, 368), 1, 0.3);
    let input = formatter.format(&gradient_image(1312, 736));
    assert_eq!(input.tensors.len(), 1);
    assert_eq!(input.scale_ratios, vec![1.0]);
    assert_eq!(input.tensors[0].shape(), &[1, 3, 368, 656]);
    assert_eq!(input.image_size, (1312, 736));
  }

  #[test]
  fn input_pixels_are_normalized() {
    let formatter = InputFormatter::new((8, 8), 1, 0.3);
    let white = RgbImage::from_pixel(8, 8, Rgb([255, 255, 255]));
    let input = formatter.format(&white);
    let v = input.tensors[0][[0, 0, 0, 0]];
    assert!((v - (255.0 / 256.0 - 0.5)).abs() < 1e-6);

    // 黑边填充值等于 0 像素的归一化结果
    let tall = RgbImage::from_pixel(2, 8, Rgb([255, 255, 255]));
    let input = formatter.format(&tall);
    assert!((input.tensors[0][[0, 0, 0, 7]] - (-0.5)).abs() < 1e-6);
  }

  #[test]
  fn multi_scale_ratios_step_by_gap() {
    let formatter = InputFormatter::new((64, 64), 3, 0.3);
    let input = formatter.format(&gradient_image(64, 64));
    assert_eq!(input.scale_ratios.len(), 3);
    assert!((input.scale_ratios[1] - 0.7).abs() < 1e-6);
    assert!((input.scale_ratios[2] - 0.4).abs() < 1e-6);
  }

  #[test]
  fn canvas_scale_tracks_resize() {
    let formatter = OutputFormatter::new((320, 240));
    let canvas = formatter.format(&gradient_image(640, 480));
    assert_eq!((canvas.width(), canvas.height()), (320, 240));
    assert!((canvas.scale() - 0.5).abs() < 1e-6);
  }

  #[test]
  fn canvas_round_trips_to_u8() {
    let formatter = OutputFormatter::new((16, 16));
    let src = RgbImage::from_pixel(16, 16, Rgb([12, 34, 56]));
    let out = formatter.format(&src).into_image();
    // 同尺寸时不缩放，像素应当保持
    assert_eq!(out.get_pixel(3, 5), src.get_pixel(3, 5));
  }

  #[test]
  fn blend_overlay_mixes_by_alpha() {
    let formatter = OutputFormatter::new((4, 4));
    let black = RgbImage::new(4, 4);
    let mut canvas = formatter.format(&black);

    let mut overlay = RgbaImage::new(4, 4);
    overlay.put_pixel(1, 1, image::Rgba([100, 200, 50, 255]));
    canvas.blend_overlay(&overlay, 0.5);

    let out = canvas.into_image();
    assert_eq!(out.get_pixel(1, 1).0, [50, 100, 25]);
    // 透明像素不改动
    assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0]);
  }
}
