// 该文件是 Pingzi （瓶子） 项目的一部分。
// src/model.rs - 检测模型
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

use std::sync::Arc;

use image::RgbImage;
use thiserror::Error;
use url::Url;

use crate::FromUrl;

/// 检测模型
///
/// 输入为任意尺寸的 RGB 帧，输出框为该帧的像素坐标。
pub trait Model {
  type Error: std::error::Error + Send + Sync + 'static;

  fn infer(&self, image: &RgbImage) -> Result<DetectResult, Self::Error>;
}

impl<M: Model + ?Sized> Model for Arc<M> {
  type Error = M::Error;

  fn infer(&self, image: &RgbImage) -> Result<DetectResult, Self::Error> {
    (**self).infer(image)
  }
}

impl<M: Model + ?Sized> Model for &M {
  type Error = M::Error;

  fn infer(&self, image: &RgbImage) -> Result<DetectResult, Self::Error> {
    (**self).infer(image)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn new(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectItem> {
    self.items.iter()
  }
}

#[cfg(feature = "model_onnx")]
mod onnx_yolo;
#[cfg(feature = "model_onnx")]
pub use self::onnx_yolo::{OnnxYolo, OnnxYoloBuilder, OnnxYoloError};

#[derive(Error, Debug)]
pub enum ModelError {
  #[cfg(feature = "model_onnx")]
  #[error("ONNX 模型错误: {0}")]
  OnnxYoloError(#[from] OnnxYoloError),
  #[error("模型后端 '{0}' 未启用或不存在")]
  BackendUnavailable(String),
}

/// 按 URL 方案选择的模型后端
pub enum ModelWrapper {
  #[cfg(feature = "model_onnx")]
  OnnxYolo(OnnxYolo),
}

impl FromUrl for ModelWrapper {
  type Error = ModelError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "model_onnx")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == OnnxYoloBuilder::SCHEME {
        let model = OnnxYoloBuilder::from_url(url)?.build()?;
        return Ok(ModelWrapper::OnnxYolo(model));
      }
    }
    Err(ModelError::BackendUnavailable(url.scheme().to_string()))
  }
}

impl Model for ModelWrapper {
  type Error = ModelError;

  fn infer(&self, image: &RgbImage) -> Result<DetectResult, Self::Error> {
    match *self {
      #[cfg(feature = "model_onnx")]
      ModelWrapper::OnnxYolo(ref model) => model.infer(image).map_err(ModelError::from),
    }
  }
}

/// 解码 `[1, 4 + nc, N]` 形式的 YOLO 输出
///
/// 每个候选为 (cx, cy, w, h, 各类别得分)，坐标位于模型输入尺度，
/// 按 `scale_x`/`scale_y` 映射回原图像素坐标。
pub fn decode_yolo_output(
  data: &[f32],
  num_channels: usize,
  num_candidates: usize,
  conf_threshold: f32,
  scale_x: f32,
  scale_y: f32,
) -> Vec<DetectItem> {
  if num_channels <= 4 || data.len() < num_channels * num_candidates {
    return Vec::new();
  }

  let num_classes = num_channels - 4;
  let mut items = Vec::new();
  for i in 0..num_candidates {
    let (class_id, score) = (0..num_classes)
      .map(|c| (c, data[(4 + c) * num_candidates + i]))
      .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

    if score < conf_threshold {
      continue;
    }

    let cx = data[i];
    let cy = data[num_candidates + i];
    let w = data[2 * num_candidates + i];
    let h = data[3 * num_candidates + i];

    items.push(DetectItem {
      class_id: class_id as u32,
      score,
      bbox: [
        (cx - w / 2.0) * scale_x,
        (cy - h / 2.0) * scale_y,
        (cx + w / 2.0) * scale_x,
        (cy + h / 2.0) * scale_y,
      ],
    });
  }
  items
}

/// 两个 xyxy 框的交并比
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - inter;
  if union <= 0.0 { 0.0 } else { inter / union }
}

/// 按类别做非极大值抑制，结果按得分降序
pub fn non_max_suppression(mut items: Vec<DetectItem>, iou_threshold: f32) -> Vec<DetectItem> {
  items.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut kept: Vec<DetectItem> = Vec::with_capacity(items.len());
  for item in items {
    let suppressed = kept
      .iter()
      .any(|k| k.class_id == item.class_id && iou(&k.bbox, &item.bbox) > iou_threshold);
    if !suppressed {
      kept.push(item);
    }
  }
  kept
}
