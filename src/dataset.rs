// 该文件是 Pingzi （瓶子） 项目的一部分。
// src/dataset.rs - 数据集准备
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

//! # 数据集准备
//!
//! 训练数据的目录结构：
//!
//! ```text
//! data/annotated/
//! ├── train/{images,labels}
//! ├── val/{images,labels}
//! └── test/{images,labels}
//! ```
//!
//! 各阶段依次为划分、增强、合并与清单生成，由 [`pipeline::TrainingPipeline`] 串联。

use std::{
  fmt,
  fs,
  path::{Path, PathBuf},
};

use crate::{Context, Result};

pub mod augment;
pub mod consolidate;
pub mod manifest;
pub mod pipeline;
pub mod split;
pub mod transform;

pub use self::augment::{AugmentReport, Augmentor};
pub use self::consolidate::{ConsolidateReport, Consolidator};
pub use self::manifest::DatasetManifest;
pub use self::pipeline::{PipelineReport, TrainingPipeline};
pub use self::split::{PartitionReport, SplitRatios, SplitReport, Splitter};
pub use self::transform::{RandomTransforms, TransformEngine, TransformPipeline, Transformed};

/// 支持的图像扩展名（不区分大小写）
pub const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

pub const IMAGES_DIR: &str = "images";
pub const LABELS_DIR: &str = "labels";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
  Train,
  Val,
  Test,
}

impl Partition {
  pub const ALL: [Partition; 3] = [Partition::Train, Partition::Val, Partition::Test];

  pub fn name(&self) -> &'static str {
    match self {
      Partition::Train => "train",
      Partition::Val => "val",
      Partition::Test => "test",
    }
  }

  pub fn from_name(name: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|p| p.name() == name)
  }

  pub fn dir(&self, base: &Path) -> PathBuf {
    base.join(self.name())
  }

  pub fn images_dir(&self, base: &Path) -> PathBuf {
    self.dir(base).join(IMAGES_DIR)
  }

  pub fn labels_dir(&self, base: &Path) -> PathBuf {
    self.dir(base).join(LABELS_DIR)
  }
}

impl fmt::Display for Partition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

pub fn is_image_file(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| {
      IMAGE_EXTENSIONS
        .iter()
        .any(|known| ext.eq_ignore_ascii_case(known))
    })
    .unwrap_or(false)
}

/// 列出目录下的图像文件名，按文件名排序
pub fn list_images(dir: &Path) -> Result<Vec<String>> {
  let mut names = list_files(dir)?;
  names.retain(|name| is_image_file(Path::new(name)));
  Ok(names)
}

/// 列出目录下的普通文件名，按文件名排序
pub fn list_files(dir: &Path) -> Result<Vec<String>> {
  let entries = fs::read_dir(dir).with_context(|| format!("读取目录 {}", dir.display()))?;

  let mut names = Vec::new();
  for entry in entries {
    let entry = entry.with_context(|| format!("读取目录项 {}", dir.display()))?;
    let file_type = entry
      .file_type()
      .with_context(|| format!("读取文件类型 {}", entry.path().display()))?;
    if file_type.is_file() {
      names.push(entry.file_name().to_string_lossy().into_owned());
    }
  }
  names.sort();
  Ok(names)
}

pub(crate) fn create_dir_all(dir: &Path) -> Result<()> {
  fs::create_dir_all(dir).with_context(|| format!("创建目录 {}", dir.display()))
}

pub(crate) fn copy_file(src: &Path, dst: &Path) -> Result<()> {
  fs::copy(src, dst)
    .map(|_| ())
    .with_context(|| format!("复制 {} 到 {}", src.display(), dst.display()))
}
