// 该文件是 Pingzi （瓶子） 项目的一部分。
// src/dataset/split.rs - 训练/验证/测试集划分
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

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use tracing::{debug, info, warn};

use crate::{
  Error, Result,
  config::SplitConfig,
  dataset::{Partition, copy_file, create_dir_all, list_images},
  label::label_file_name,
};

const RATIO_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitRatios {
  pub train: f64,
  pub val: f64,
  pub test: f64,
}

impl Default for SplitRatios {
  fn default() -> Self {
    Self {
      train: 0.7,
      val: 0.2,
      test: 0.1,
    }
  }
}

impl SplitRatios {
  pub fn new(train: f64, val: f64, test: f64) -> Result<Self> {
    let ratios = Self { train, val, test };
    ratios.validate()?;
    Ok(ratios)
  }

  pub fn validate(&self) -> Result<()> {
    for (name, value) in [("train", self.train), ("val", self.val), ("test", self.test)] {
      if !(0.0..=1.0).contains(&value) {
        return Err(Error::config(format!(
          "{} 比例 {} 超出 [0, 1] 范围",
          name, value
        )));
      }
    }

    let sum = self.train + self.val + self.test;
    if sum > 1.0 + RATIO_TOLERANCE {
      return Err(Error::config(format!("划分比例之和 {} 大于 1", sum)));
    }
    Ok(())
  }

  /// 各分区的数量，按 train, val, test 顺序
  ///
  /// train 与 val 向下取整，剩余全部归入 test。
  pub fn sizes(&self, total: usize) -> [usize; 3] {
    let train = ((total as f64) * self.train).floor() as usize;
    let val = ((total as f64) * self.val).floor() as usize;
    let train = train.min(total);
    let val = val.min(total - train);
    [train, val, total - train - val]
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartitionReport {
  pub dir: PathBuf,
  pub images: Vec<String>,
  /// 缺少标签、仅复制了图像的文件
  pub unlabeled: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitReport {
  pub train: PartitionReport,
  pub val: PartitionReport,
  pub test: PartitionReport,
}

impl SplitReport {
  pub fn partition(&self, partition: Partition) -> &PartitionReport {
    match partition {
      Partition::Train => &self.train,
      Partition::Val => &self.val,
      Partition::Test => &self.test,
    }
  }

  fn partition_mut(&mut self, partition: Partition) -> &mut PartitionReport {
    match partition {
      Partition::Train => &mut self.train,
      Partition::Val => &mut self.val,
      Partition::Test => &mut self.test,
    }
  }

  pub fn total(&self) -> usize {
    self.train.images.len() + self.val.images.len() + self.test.images.len()
  }
}

/// 数据集划分器
#[derive(Debug, Clone)]
pub struct Splitter {
  image_dir: PathBuf,
  label_dir: PathBuf,
  output_dir: PathBuf,
  ratios: SplitRatios,
  seed: Option<u64>,
}

impl Splitter {
  pub fn new(
    image_dir: impl Into<PathBuf>,
    label_dir: impl Into<PathBuf>,
    output_dir: impl Into<PathBuf>,
  ) -> Self {
    Self {
      image_dir: image_dir.into(),
      label_dir: label_dir.into(),
      output_dir: output_dir.into(),
      ratios: SplitRatios::default(),
      seed: None,
    }
  }

  pub fn from_config(config: &SplitConfig) -> Result<Self> {
    let ratios = SplitRatios::new(config.train_ratio, config.val_ratio, config.test_ratio)?;
    Ok(
      Self::new(&config.image_dir, &config.label_dir, &config.output_dir)
        .with_ratios(ratios)
        .with_seed(config.seed),
    )
  }

  pub fn with_ratios(mut self, ratios: SplitRatios) -> Self {
    self.ratios = ratios;
    self
  }

  pub fn with_seed(mut self, seed: Option<u64>) -> Self {
    self.seed = seed;
    self
  }

  pub fn output_dir(&self) -> &Path {
    &self.output_dir
  }

  pub fn run(&self) -> Result<SplitReport> {
    info!("开始划分数据集: {}", self.image_dir.display());
    self.ratios.validate()?;

    for partition in Partition::ALL {
      create_dir_all(&partition.images_dir(&self.output_dir))?;
      create_dir_all(&partition.labels_dir(&self.output_dir))?;
    }

    let mut images = list_images(&self.image_dir)?;
    match self.seed {
      Some(seed) => images.shuffle(&mut StdRng::seed_from_u64(seed)),
      None => images.shuffle(&mut rand::thread_rng()),
    }

    let [train, val, _] = self.ratios.sizes(images.len());
    info!(
      "共 {} 张图像: train {}, val {}, test {}",
      images.len(),
      train,
      val,
      images.len() - train - val
    );

    let (train_files, rest) = images.split_at(train);
    let (val_files, test_files) = rest.split_at(val);

    let mut report = SplitReport::default();
    for (partition, files) in [
      (Partition::Train, train_files),
      (Partition::Val, val_files),
      (Partition::Test, test_files),
    ] {
      *report.partition_mut(partition) = self.copy_files(partition, files)?;
    }

    info!("数据集划分完成");
    Ok(report)
  }

  fn copy_files(&self, partition: Partition, files: &[String]) -> Result<PartitionReport> {
    let images_dir = partition.images_dir(&self.output_dir);
    let labels_dir = partition.labels_dir(&self.output_dir);
    let mut report = PartitionReport {
      dir: partition.dir(&self.output_dir),
      ..PartitionReport::default()
    };

    for image_name in files {
      let label_name = label_file_name(image_name);
      copy_file(&self.image_dir.join(image_name), &images_dir.join(image_name))?;

      let src_label = self.label_dir.join(&label_name);
      if src_label.is_file() {
        copy_file(&src_label, &labels_dir.join(&label_name))?;
      } else {
        warn!("图像 {} 没有对应的标签文件, 仅复制图像", image_name);
        report.unlabeled.push(image_name.clone());
      }
      report.images.push(image_name.clone());
    }

    debug!("{} 分区复制了 {} 张图像", partition, report.images.len());
    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use std::{collections::HashSet, fs};

  use super::*;

  #[test]
  fn sizes_follow_floor_and_remainder() {
    let ratios = SplitRatios::default();
    assert_eq!(ratios.sizes(100), [70, 20, 10]);
    assert_eq!(ratios.sizes(10), [7, 2, 1]);
    assert_eq!(ratios.sizes(3), [2, 0, 1]);
    assert_eq!(ratios.sizes(0), [0, 0, 0]);
  }

  #[test]
  fn sizes_always_cover_total() {
    let cases = [(0.7, 0.2, 0.1), (0.5, 0.5, 0.0), (0.0, 0.0, 1.0), (0.33, 0.33, 0.34)];
    for (train, val, test) in cases {
      let ratios = SplitRatios::new(train, val, test).unwrap();
      for total in 0..200 {
        let [a, b, c] = ratios.sizes(total);
        assert_eq!(a + b + c, total);
        assert_eq!(a, ((total as f64) * train).floor() as usize);
      }
    }
  }

  #[test]
  fn invalid_ratios_are_rejected() {
    assert!(SplitRatios::new(0.8, 0.3, 0.1).is_err());
    assert!(SplitRatios::new(-0.1, 0.5, 0.1).is_err());
    assert!(SplitRatios::new(1.5, 0.0, 0.0).is_err());
    assert!(SplitRatios::new(0.7, 0.2, 0.1 + 1e-9).is_ok());
  }

  fn make_raw(dir: &Path, count: usize) -> (PathBuf, PathBuf) {
    let images = dir.join("raw/images");
    let labels = dir.join("raw/annotations");
    fs::create_dir_all(&images).unwrap();
    fs::create_dir_all(&labels).unwrap();
    for i in 0..count {
      fs::write(images.join(format!("img_{:03}.jpg", i)), b"jpg").unwrap();
      fs::write(labels.join(format!("img_{:03}.txt", i)), "0 0.5 0.5 0.1 0.1\n").unwrap();
    }
    (images, labels)
  }

  #[test]
  fn partitions_are_disjoint_and_complete() {
    let dir = tempfile::tempdir().unwrap();
    let (images, labels) = make_raw(dir.path(), 23);
    let report = Splitter::new(&images, &labels, dir.path().join("annotated"))
      .run()
      .unwrap();

    let mut seen = HashSet::new();
    for partition in Partition::ALL {
      for name in &report.partition(partition).images {
        assert!(seen.insert(name.clone()), "{} 出现了两次", name);
      }
    }
    assert_eq!(seen.len(), 23);
    assert_eq!(report.train.images.len(), 16);
    assert_eq!(report.val.images.len(), 4);
    assert_eq!(report.test.images.len(), 3);
  }

  #[test]
  fn seed_makes_split_reproducible() {
    let dir = tempfile::tempdir().unwrap();
    let (images, labels) = make_raw(dir.path(), 30);
    let a = Splitter::new(&images, &labels, dir.path().join("a"))
      .with_seed(Some(42))
      .run()
      .unwrap();
    let b = Splitter::new(&images, &labels, dir.path().join("b"))
      .with_seed(Some(42))
      .run()
      .unwrap();
    assert_eq!(a.train.images, b.train.images);
    assert_eq!(a.test.images, b.test.images);
  }

  #[test]
  fn missing_label_still_copies_image() {
    let dir = tempfile::tempdir().unwrap();
    let (images, labels) = make_raw(dir.path(), 1);
    fs::remove_file(labels.join("img_000.txt")).unwrap();
    let out = dir.path().join("annotated");

    let report = Splitter::new(&images, &labels, &out)
      .with_ratios(SplitRatios::new(1.0, 0.0, 0.0).unwrap())
      .run()
      .unwrap();

    assert_eq!(report.train.unlabeled, vec!["img_000.jpg".to_string()]);
    assert!(out.join("train/images/img_000.jpg").is_file());
    assert!(!out.join("train/labels/img_000.txt").exists());
  }

  #[test]
  fn empty_source_creates_directories() {
    let dir = tempfile::tempdir().unwrap();
    let (images, labels) = make_raw(dir.path(), 0);
    let out = dir.path().join("annotated");
    let report = Splitter::new(&images, &labels, &out).run().unwrap();
    assert_eq!(report.total(), 0);
    for partition in Partition::ALL {
      assert!(partition.images_dir(&out).is_dir());
      assert!(partition.labels_dir(&out).is_dir());
    }
  }

  #[test]
  fn missing_source_dir_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Splitter::new(dir.path().join("nope"), dir.path(), dir.path().join("out"))
      .run()
      .unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
  }
}
