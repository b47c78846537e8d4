// 该文件是 Pingzi （瓶子） 项目的一部分。
// src/model/onnx_yolo.rs - ONNX Runtime YOLO 检测模型
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

//! # ONNX YOLO 模型
//!
//! 加载 Ultralytics 导出的 YOLO ONNX 模型：
//!
//! ```text
//! onnx:///artifacts/best.onnx?size=640&conf=0.25&iou=0.45
//! ```
//!
//! - `size`: 模型输入边长，默认 640
//! - `conf`: 候选框得分阈值，默认 0.25
//! - `iou`: NMS 交并比阈值，默认 0.45

use std::{collections::HashMap, sync::Mutex};

use image::{RgbImage, imageops::FilterType};
use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  url_path,
  model::{DetectResult, Model, decode_yolo_output, non_max_suppression},
};

#[derive(Error, Debug)]
pub enum OnnxYoloError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("模型加载错误: {0}")]
  ModelLoadError(String),
  #[error("推理错误: {0}")]
  InferenceError(String),
  #[error("模型输出形状不支持: {0:?}")]
  UnsupportedOutput(Vec<i64>),
}

pub struct OnnxYoloBuilder {
  model_path: String,
  input_size: u32,
  conf_threshold: f32,
  iou_threshold: f32,
}

impl FromUrlWithScheme for OnnxYoloBuilder {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxYoloBuilder {
  type Error = OnnxYoloError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(OnnxYoloError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    Ok(OnnxYoloBuilder {
      model_path: url_path(url),
      input_size: query
        .get("size")
        .and_then(|v| v.parse().ok())
        .unwrap_or(640),
      conf_threshold: query
        .get("conf")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.25),
      iou_threshold: query
        .get("iou")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0.45),
    })
  }
}

impl OnnxYoloBuilder {
  pub fn build(self) -> Result<OnnxYolo, OnnxYoloError> {
    info!("加载模型文件: {}", self.model_path);
    let session = Session::builder()
      .map_err(model_load_error)?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(model_load_error)?
      .commit_from_file(&self.model_path)
      .map_err(model_load_error)?;
    info!("模型加载完成");

    Ok(OnnxYolo {
      session: Mutex::new(session),
      input_size: self.input_size,
      conf_threshold: self.conf_threshold,
      iou_threshold: self.iou_threshold,
    })
  }
}

fn model_load_error(e: impl std::fmt::Display) -> OnnxYoloError {
  OnnxYoloError::ModelLoadError(e.to_string())
}

fn inference_error(e: impl std::fmt::Display) -> OnnxYoloError {
  OnnxYoloError::InferenceError(e.to_string())
}

pub struct OnnxYolo {
  session: Mutex<Session>,
  input_size: u32,
  conf_threshold: f32,
  iou_threshold: f32,
}

impl OnnxYolo {
  /// 缩放到模型输入尺寸并转为 NCHW、[0, 1] 浮点
  fn preprocess(&self, image: &RgbImage) -> Vec<f32> {
    let size = self.input_size;
    let resized = image::imageops::resize(image, size, size, FilterType::Triangle);

    let plane = (size * size) as usize;
    let mut data = vec![0f32; plane * 3];
    for (idx, pixel) in resized.pixels().enumerate() {
      for c in 0..3 {
        data[c * plane + idx] = pixel[c] as f32 / 255.0;
      }
    }
    data
  }
}

impl Model for OnnxYolo {
  type Error = OnnxYoloError;

  fn infer(&self, image: &RgbImage) -> Result<DetectResult, Self::Error> {
    let size = self.input_size as usize;

    let input = Tensor::from_array((
      [1usize, 3, size, size],
      self.preprocess(image).into_boxed_slice(),
    ))
    .map_err(inference_error)?;

    let mut session = self
      .session
      .lock()
      .map_err(|_| OnnxYoloError::InferenceError("模型会话锁已损坏".to_string()))?;
    let outputs = session
      .run(ort::inputs![input])
      .map_err(inference_error)?;
    let (shape, data) = outputs[0]
      .try_extract_tensor::<f32>()
      .map_err(inference_error)?;

    let dims: Vec<i64> = shape.iter().copied().collect();
    debug!("模型输出形状: {:?}", dims);
    let (num_channels, num_candidates) = match dims.as_slice() {
      [1, c, n] if *c > 4 && *n > 0 => (*c as usize, *n as usize),
      _ => return Err(OnnxYoloError::UnsupportedOutput(dims)),
    };

    let scale_x = image.width() as f32 / size as f32;
    let scale_y = image.height() as f32 / size as f32;
    let items = decode_yolo_output(
      data,
      num_channels,
      num_candidates,
      self.conf_threshold,
      scale_x,
      scale_y,
    );
    let items = non_max_suppression(items, self.iou_threshold);
    debug!("检测到 {} 个物体", items.len());

    Ok(DetectResult::new(items))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn url_query_overrides_defaults() {
    let url = Url::parse("onnx:///artifacts/best.onnx?size=320&iou=0.5").unwrap();
    let builder = OnnxYoloBuilder::from_url(&url).unwrap();
    assert_eq!(builder.model_path, "/artifacts/best.onnx");
    assert_eq!(builder.input_size, 320);
    assert_eq!(builder.conf_threshold, 0.25);
    assert_eq!(builder.iou_threshold, 0.5);
  }

  #[test]
  fn model_path_is_decoded() {
    let url = Url::parse("onnx:///my models/瓶子.onnx").unwrap();
    let builder = OnnxYoloBuilder::from_url(&url).unwrap();
    assert_eq!(builder.model_path, "/my models/瓶子.onnx");
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("image:///artifacts/best.onnx").unwrap();
    assert!(matches!(
      OnnxYoloBuilder::from_url(&url),
      Err(OnnxYoloError::SchemeMismatch(_))
    ));
  }
}
