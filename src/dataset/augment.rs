// 该文件是 Pingzi （瓶子） 项目的一部分。
// src/dataset/augment.rs - 训练集数据增强
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

use std::path::{Path, PathBuf};

use image::ImageReader;
use tracing::{debug, info, warn};

use crate::{
  Context, Result,
  config::AugmentConfig,
  dataset::{copy_file, create_dir_all, list_images, transform::TransformEngine},
  label::{Annotation, label_file_name},
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AugmentReport {
  pub output_image_dir: PathBuf,
  pub output_label_dir: PathBuf,
  /// 原样复制的源图像
  pub originals: Vec<String>,
  /// 写出的增强图像
  pub variants: Vec<String>,
  /// 因没有剩余边界框而丢弃的增强结果（不含扩展名）
  pub discarded: Vec<String>,
  /// 缺少标签而跳过的源图像
  pub skipped: Vec<String>,
}

/// 数据增强驱动
#[derive(Debug, Clone)]
pub struct Augmentor {
  input_image_dir: PathBuf,
  input_label_dir: PathBuf,
  output_image_dir: PathBuf,
  output_label_dir: PathBuf,
  aug_per_image: usize,
}

impl Augmentor {
  pub fn new(
    input_image_dir: impl Into<PathBuf>,
    input_label_dir: impl Into<PathBuf>,
    output_image_dir: impl Into<PathBuf>,
    output_label_dir: impl Into<PathBuf>,
  ) -> Self {
    Self {
      input_image_dir: input_image_dir.into(),
      input_label_dir: input_label_dir.into(),
      output_image_dir: output_image_dir.into(),
      output_label_dir: output_label_dir.into(),
      aug_per_image: 2,
    }
  }

  pub fn from_config(config: &AugmentConfig) -> Self {
    Self::new(
      &config.input_image_dir,
      &config.input_label_dir,
      &config.output_image_dir,
      &config.output_label_dir,
    )
    .with_aug_per_image(config.aug_per_image)
  }

  pub fn with_aug_per_image(mut self, aug_per_image: usize) -> Self {
    self.aug_per_image = aug_per_image;
    self
  }

  pub fn output_dirs(&self) -> (&Path, &Path) {
    (&self.output_image_dir, &self.output_label_dir)
  }

  pub fn run<E: TransformEngine>(&self, engine: &mut E) -> Result<AugmentReport> {
    info!("开始数据增强: {}", self.input_image_dir.display());
    create_dir_all(&self.output_image_dir)?;
    create_dir_all(&self.output_label_dir)?;

    let images = list_images(&self.input_image_dir)?;
    info!("找到 {} 张待增强图像", images.len());

    let mut report = AugmentReport {
      output_image_dir: self.output_image_dir.clone(),
      output_label_dir: self.output_label_dir.clone(),
      ..AugmentReport::default()
    };

    for image_name in &images {
      self.augment_one(image_name, engine, &mut report)?;
    }

    info!(
      "数据增强完成: 原图 {}, 增强 {}, 丢弃 {}, 跳过 {}",
      report.originals.len(),
      report.variants.len(),
      report.discarded.len(),
      report.skipped.len()
    );
    Ok(report)
  }

  fn augment_one<E: TransformEngine>(
    &self,
    image_name: &str,
    engine: &mut E,
    report: &mut AugmentReport,
  ) -> Result<()> {
    let image_path = self.input_image_dir.join(image_name);
    let label_name = label_file_name(image_name);
    let label_path = self.input_label_dir.join(&label_name);

    if !label_path.is_file() {
      warn!("图像 {} 没有标签, 跳过", image_name);
      report.skipped.push(image_name.to_string());
      return Ok(());
    }

    let image = ImageReader::open(&image_path)
      .with_context(|| format!("打开图像 {}", image_path.display()))?
      .decode()
      .with_context(|| format!("解码图像 {}", image_path.display()))?
      .to_rgb8();
    let annotation = Annotation::read(&label_path)?;

    copy_file(&image_path, &self.output_image_dir.join(image_name))?;
    copy_file(&label_path, &self.output_label_dir.join(&label_name))?;
    report.originals.push(image_name.to_string());

    let path = Path::new(image_name);
    let stem = path
      .file_stem()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_default();
    let extension = path
      .extension()
      .map(|s| s.to_string_lossy().into_owned())
      .unwrap_or_else(|| "jpg".to_string());

    for i in 0..self.aug_per_image {
      let variant = format!("{}_aug{}", stem, i);
      let transformed = engine.transform(&image, &annotation)?;

      if transformed.annotation.is_empty() {
        warn!("增强图像 {} 没有有效的边界框, 丢弃", variant);
        report.discarded.push(variant);
        continue;
      }

      let variant_image = format!("{}.{}", variant, extension);
      let variant_image_path = self.output_image_dir.join(&variant_image);
      transformed
        .image
        .save(&variant_image_path)
        .with_context(|| format!("保存图像 {}", variant_image_path.display()))?;
      transformed
        .annotation
        .write(&self.output_label_dir.join(label_file_name(&variant_image)))?;

      debug!(
        "写出增强图像 {} ({} 个目标)",
        variant_image,
        transformed.annotation.len()
      );
      report.variants.push(variant_image);
    }

    Ok(())
  }
}
