// 该文件是 Pingzi （瓶子） 项目的一部分。
// src/dataset/transform.rs - 保持标注一致的图像变换
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

//! # 图像变换
//!
//! [`TransformPipeline`] 只描述要做哪些变换以及各自的概率，构造后不再修改；
//! [`RandomTransforms`] 持有随机数发生器，按配置对图像和标注同时变换。
//!
//! 几何变换（翻转、旋转）会同步调整边界框，光度变换（亮度、对比度、色调、模糊）
//! 不改变边界框。旋转后完全移出画面的框会被丢弃，因此输出的标注可能比输入少。

use image::{Rgb, RgbImage, imageops};
use imageproc::geometric_transformations::{Interpolation, rotate_about_center};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
  Result,
  label::{Annotation, LabeledBox, NormBox},
};

/// 一次变换的结果
#[derive(Debug, Clone)]
pub struct Transformed {
  pub image: RgbImage,
  pub annotation: Annotation,
}

/// 图像变换引擎
pub trait TransformEngine {
  fn transform(&mut self, image: &RgbImage, annotation: &Annotation) -> Result<Transformed>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformStep {
  HorizontalFlip,
  /// 亮度与对比度，取值范围为 ±limit
  BrightnessContrast {
    brightness_limit: f32,
    contrast_limit: f32,
  },
  /// 色调（角度）、饱和度与明度（比例）
  HueSaturationValue {
    hue_shift_deg: f32,
    sat_shift: f32,
    val_shift: f32,
  },
  /// 绕中心旋转，角度在 ±limit_deg 内均匀采样
  Rotate { limit_deg: f32 },
  /// 高斯模糊
  Blur { sigma: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepConfig {
  pub step: TransformStep,
  pub probability: f64,
}

/// 变换流水线配置
#[derive(Debug, Clone, PartialEq)]
pub struct TransformPipeline {
  steps: Vec<StepConfig>,
}

impl Default for TransformPipeline {
  fn default() -> Self {
    Self::new(vec![
      StepConfig {
        step: TransformStep::HorizontalFlip,
        probability: 0.5,
      },
      StepConfig {
        step: TransformStep::BrightnessContrast {
          brightness_limit: 0.2,
          contrast_limit: 0.2,
        },
        probability: 0.2,
      },
      StepConfig {
        step: TransformStep::HueSaturationValue {
          hue_shift_deg: 20.0,
          sat_shift: 0.3,
          val_shift: 0.2,
        },
        probability: 0.2,
      },
      StepConfig {
        step: TransformStep::Rotate { limit_deg: 10.0 },
        probability: 0.5,
      },
      // 与 3x3 核的模糊程度相当
      StepConfig {
        step: TransformStep::Blur { sigma: 0.8 },
        probability: 0.2,
      },
    ])
  }
}

impl TransformPipeline {
  pub fn new(steps: Vec<StepConfig>) -> Self {
    Self { steps }
  }

  pub fn steps(&self) -> &[StepConfig] {
    &self.steps
  }
}

/// 按概率随机应用变换
pub struct RandomTransforms<R: Rng> {
  pipeline: TransformPipeline,
  rng: R,
}

impl<R: Rng> RandomTransforms<R> {
  pub fn new(pipeline: TransformPipeline, rng: R) -> Self {
    Self { pipeline, rng }
  }

  pub fn pipeline(&self) -> &TransformPipeline {
    &self.pipeline
  }
}

impl RandomTransforms<StdRng> {
  /// 指定种子时结果可复现，否则从系统熵初始化
  pub fn with_seed(pipeline: TransformPipeline, seed: Option<u64>) -> Self {
    let rng = match seed {
      Some(seed) => StdRng::seed_from_u64(seed),
      None => StdRng::from_entropy(),
    };
    Self::new(pipeline, rng)
  }
}

impl<R: Rng> TransformEngine for RandomTransforms<R> {
  fn transform(&mut self, image: &RgbImage, annotation: &Annotation) -> Result<Transformed> {
    let mut image = image.clone();
    let mut items = annotation.items().to_vec();

    for StepConfig { step, probability } in self.pipeline.steps.iter().copied() {
      if !self.rng.gen_bool(probability.clamp(0.0, 1.0)) {
        continue;
      }

      match step {
        TransformStep::HorizontalFlip => {
          image = imageops::flip_horizontal(&image);
          for item in items.iter_mut() {
            item.bbox.cx = 1.0 - item.bbox.cx;
          }
        }
        TransformStep::BrightnessContrast {
          brightness_limit,
          contrast_limit,
        } => {
          let alpha = 1.0 + symmetric(&mut self.rng, contrast_limit);
          let beta = symmetric(&mut self.rng, brightness_limit) * 255.0;
          brightness_contrast(&mut image, alpha, beta);
        }
        TransformStep::HueSaturationValue {
          hue_shift_deg,
          sat_shift,
          val_shift,
        } => {
          let hue = symmetric(&mut self.rng, hue_shift_deg);
          let sat = 1.0 + symmetric(&mut self.rng, sat_shift);
          let val = 1.0 + symmetric(&mut self.rng, val_shift);
          hue_saturation_value(&mut image, hue, sat, val);
        }
        TransformStep::Rotate { limit_deg } => {
          let theta = symmetric(&mut self.rng, limit_deg).to_radians();
          items = rotate_boxes(&items, image.width(), image.height(), theta);
          image = rotate_about_center(&image, theta, Interpolation::Bilinear, Rgb([0, 0, 0]));
        }
        TransformStep::Blur { sigma } => {
          image = imageops::blur(&image, sigma);
        }
      }
    }

    Ok(Transformed {
      image,
      annotation: Annotation::new(items),
    })
  }
}

fn symmetric<R: Rng>(rng: &mut R, limit: f32) -> f32 {
  let limit = limit.abs();
  if limit == 0.0 {
    return 0.0;
  }
  rng.gen_range(-limit..=limit)
}

fn brightness_contrast(image: &mut RgbImage, alpha: f32, beta: f32) {
  for pixel in image.pixels_mut() {
    for c in pixel.0.iter_mut() {
      *c = (*c as f32 * alpha + beta).round().clamp(0.0, 255.0) as u8;
    }
  }
}

fn hue_saturation_value(image: &mut RgbImage, hue_shift: f32, sat_scale: f32, val_scale: f32) {
  for pixel in image.pixels_mut() {
    let (h, s, v) = rgb_to_hsv(pixel.0);
    let h = (h + hue_shift).rem_euclid(360.0);
    let s = (s * sat_scale).clamp(0.0, 1.0);
    let v = (v * val_scale).clamp(0.0, 1.0);
    pixel.0 = hsv_to_rgb(h, s, v);
  }
}

fn rgb_to_hsv(rgb: [u8; 3]) -> (f32, f32, f32) {
  let [r, g, b] = rgb.map(|c| c as f32 / 255.0);
  let max = r.max(g).max(b);
  let min = r.min(g).min(b);
  let delta = max - min;

  let h = if delta == 0.0 {
    0.0
  } else if max == r {
    60.0 * ((g - b) / delta).rem_euclid(6.0)
  } else if max == g {
    60.0 * ((b - r) / delta + 2.0)
  } else {
    60.0 * ((r - g) / delta + 4.0)
  };
  let s = if max == 0.0 { 0.0 } else { delta / max };
  (h, s, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [u8; 3] {
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

  [r, g, b].map(|c| ((c + m) * 255.0).round().clamp(0.0, 255.0) as u8)
}

/// 与 `rotate_about_center` 相同的映射旋转各框的四个角点，取外接矩形并裁剪到画面内
///
/// 图像坐标系 y 轴向下，正角度为顺时针。裁剪后宽或高不为正的框被丢弃。
pub(crate) fn rotate_boxes(
  items: &[LabeledBox],
  width: u32,
  height: u32,
  theta: f32,
) -> Vec<LabeledBox> {
  let (w, h) = (width as f32, height as f32);
  let (cx, cy) = (w / 2.0, h / 2.0);
  let (sin, cos) = theta.sin_cos();

  items
    .iter()
    .filter_map(|item| {
      let [x_min, y_min, x_max, y_max] = item.bbox.to_xyxy();
      let corners = [
        (x_min * w, y_min * h),
        (x_max * w, y_min * h),
        (x_min * w, y_max * h),
        (x_max * w, y_max * h),
      ];

      let mut hull = [f32::MAX, f32::MAX, f32::MIN, f32::MIN];
      for (x, y) in corners {
        let (dx, dy) = (x - cx, y - cy);
        let rx = cos * dx - sin * dy + cx;
        let ry = sin * dx + cos * dy + cy;
        hull[0] = hull[0].min(rx);
        hull[1] = hull[1].min(ry);
        hull[2] = hull[2].max(rx);
        hull[3] = hull[3].max(ry);
      }

      let x_min = hull[0].clamp(0.0, w) / w;
      let y_min = hull[1].clamp(0.0, h) / h;
      let x_max = hull[2].clamp(0.0, w) / w;
      let y_max = hull[3].clamp(0.0, h) / h;
      if x_max - x_min <= 0.0 || y_max - y_min <= 0.0 {
        return None;
      }

      Some(LabeledBox {
        bbox: NormBox::from_xyxy([x_min, y_min, x_max, y_max]),
        class_id: item.class_id,
      })
    })
    .collect()
}
