// 该文件是 Pingzi （瓶子） 项目的一部分。
// src/config.rs - 配置文件
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

//! # 配置
//!
//! 所有字段都有默认值，配置文件缺失或只写了部分字段时其余字段取默认值。
//!
//! ```toml
//! [split]
//! train_ratio = 0.7
//! seed = 42
//!
//! [live]
//! model = "onnx:///artifacts/best.onnx"
//! camera = "v4l2:///dev/video1"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{Context, Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  pub split: SplitConfig,
  pub augment: AugmentConfig,
  pub consolidate: ConsolidateConfig,
  pub manifest: ManifestConfig,
  pub live: LiveConfig,
  pub server: ServerConfig,
}

impl AppConfig {
  /// 读取配置文件；`path` 为空时返回默认配置
  pub fn load(path: Option<&Path>) -> Result<Self> {
    let Some(path) = path else {
      return Ok(Self::default());
    };

    info!("读取配置文件: {}", path.display());
    let text =
      std::fs::read_to_string(path).with_context(|| format!("读取配置文件 {}", path.display()))?;
    Self::parse(&text)
  }

  pub fn parse(text: &str) -> Result<Self> {
    toml::from_str(text).map_err(|e| Error::config(format!("配置文件解析失败: {}", e)))
  }
}

/// 数据集划分配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
  pub image_dir: PathBuf,
  pub label_dir: PathBuf,
  pub output_dir: PathBuf,
  pub train_ratio: f64,
  pub val_ratio: f64,
  pub test_ratio: f64,
  /// 随机种子，缺省时每次划分结果不同
  pub seed: Option<u64>,
}

impl Default for SplitConfig {
  fn default() -> Self {
    Self {
      image_dir: PathBuf::from("data/raw/images"),
      label_dir: PathBuf::from("data/raw/annotations"),
      output_dir: PathBuf::from("data/annotated"),
      train_ratio: 0.7,
      val_ratio: 0.2,
      test_ratio: 0.1,
      seed: None,
    }
  }
}

/// 数据增强配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentConfig {
  pub input_image_dir: PathBuf,
  pub input_label_dir: PathBuf,
  pub output_image_dir: PathBuf,
  pub output_label_dir: PathBuf,
  pub aug_per_image: usize,
  pub seed: Option<u64>,
}

impl Default for AugmentConfig {
  fn default() -> Self {
    Self {
      input_image_dir: PathBuf::from("data/annotated/train/images"),
      input_label_dir: PathBuf::from("data/annotated/train/labels"),
      output_image_dir: PathBuf::from("data/augmented/train/images"),
      output_label_dir: PathBuf::from("data/augmented/train/labels"),
      aug_per_image: 2,
      seed: None,
    }
  }
}

/// 增强数据合并配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidateConfig {
  pub cleanup: bool,
}

impl Default for ConsolidateConfig {
  fn default() -> Self {
    Self { cleanup: true }
  }
}

/// 数据集清单配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestConfig {
  pub path: PathBuf,
  pub names: Vec<String>,
}

impl Default for ManifestConfig {
  fn default() -> Self {
    Self {
      path: PathBuf::from("data.yaml"),
      names: vec!["bottle".to_string()],
    }
  }
}

/// 交互模式的默认输出：启用 `gstreamer_output` 时为显示窗口，否则按日期记录到目录
#[cfg(feature = "gstreamer_output")]
pub const DEFAULT_LIVE_OUTPUT: &str = "gst://display";
#[cfg(not(feature = "gstreamer_output"))]
pub const DEFAULT_LIVE_OUTPUT: &str = "folder:///tmp/pingzi/record";

/// 实时推理配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
  /// 模型 URL，例如 `onnx:///artifacts/best.onnx?size=640`
  pub model: String,
  pub class_names: Vec<String>,
  /// 输入 URL，`v4l2://` 需要 `v4l2_input` 特性，`gst://` 需要 `gstreamer_input` 特性
  pub camera: String,
  /// 交互模式下的输出 URL
  pub output: String,
  /// 标注文字所用字体，缺省时在系统常见位置查找
  pub font: Option<PathBuf>,
  pub known_width_cm: f32,
  pub focal_length_px: f32,
  pub max_frames: Option<usize>,
}

impl Default for LiveConfig {
  fn default() -> Self {
    Self {
      model: "onnx:///artifacts/best.onnx".to_string(),
      class_names: vec!["bottle".to_string()],
      camera: "v4l2:///dev/video1".to_string(),
      output: DEFAULT_LIVE_OUTPUT.to_string(),
      font: None,
      known_width_cm: 13.0,
      focal_length_px: 1080.0,
      max_frames: None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub bind: String,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      bind: "127.0.0.1:5000".to_string(),
    }
  }
}
