// 该文件是 Pingzi （瓶子） 项目的一部分。
// src/dataset/consolidate.rs - 增强数据合并回训练集
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

use std::{
  fs,
  path::{Path, PathBuf},
};

use tracing::{debug, info};

use crate::{
  Context, Error, Result,
  dataset::{Partition, copy_file, create_dir_all, list_files},
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConsolidateReport {
  pub images_copied: usize,
  pub labels_copied: usize,
  /// 已删除的暂存目录
  pub removed: Option<PathBuf>,
}

/// 把暂存目录中的图像和标签平铺复制到训练集目录
#[derive(Debug, Clone)]
pub struct Consolidator {
  src_image_dir: PathBuf,
  src_label_dir: PathBuf,
  dst_image_dir: PathBuf,
  dst_label_dir: PathBuf,
  cleanup: bool,
}

impl Consolidator {
  pub fn new(
    src_image_dir: impl Into<PathBuf>,
    src_label_dir: impl Into<PathBuf>,
    dst_image_dir: impl Into<PathBuf>,
    dst_label_dir: impl Into<PathBuf>,
  ) -> Self {
    Self {
      src_image_dir: src_image_dir.into(),
      src_label_dir: src_label_dir.into(),
      dst_image_dir: dst_image_dir.into(),
      dst_label_dir: dst_label_dir.into(),
      cleanup: true,
    }
  }

  pub fn with_cleanup(mut self, cleanup: bool) -> Self {
    self.cleanup = cleanup;
    self
  }

  pub fn run(&self) -> Result<ConsolidateReport> {
    info!(
      "合并 {} 与 {} 到训练集",
      self.src_image_dir.display(),
      self.src_label_dir.display()
    );
    create_dir_all(&self.dst_image_dir)?;
    create_dir_all(&self.dst_label_dir)?;

    let images_copied = copy_flat(&self.src_image_dir, &self.dst_image_dir)?;
    let labels_copied = copy_flat(&self.src_label_dir, &self.dst_label_dir)?;
    info!("合并完成: 图像 {}, 标签 {}", images_copied, labels_copied);

    let removed = if self.cleanup {
      let root = self.staging_root()?;
      fs::remove_dir_all(&root).with_context(|| format!("删除暂存目录 {}", root.display()))?;
      info!("已删除暂存目录: {}", root.display());
      Some(root)
    } else {
      None
    };

    Ok(ConsolidateReport {
      images_copied,
      labels_copied,
      removed,
    })
  }

  /// 暂存根目录：两个暂存目录的公共祖先，若其本身是分区目录则再上移一级
  ///
  /// 两个暂存目录必须是同级目录，且根目录不能包含目标目录。
  ///
  /// `data/augmented/train/{images,labels}` 对应 `data/augmented`。
  pub fn staging_root(&self) -> Result<PathBuf> {
    let images = canonical(&self.src_image_dir)?;
    let labels = canonical(&self.src_label_dir)?;

    let mut root = common_ancestor(&images, &labels);
    // 只删除由两个兄弟暂存目录构成的根目录
    let siblings = images != labels
      && images.parent() == Some(root.as_path())
      && labels.parent() == Some(root.as_path());
    if !siblings {
      return Err(Error::config(format!(
        "暂存目录 {} 与 {} 不是同级目录, 拒绝删除 {}",
        images.display(),
        labels.display(),
        root.display()
      )));
    }
    let is_partition = root
      .file_name()
      .and_then(|name| name.to_str())
      .and_then(Partition::from_name)
      .is_some();
    if is_partition && let Some(parent) = root.parent() {
      root = parent.to_path_buf();
    }

    for dst in [&self.dst_image_dir, &self.dst_label_dir] {
      let dst = canonical(dst)?;
      if dst.starts_with(&root) {
        return Err(Error::config(format!(
          "暂存目录 {} 包含目标目录 {}, 拒绝删除",
          root.display(),
          dst.display()
        )));
      }
    }

    Ok(root)
  }
}

fn canonical(path: &Path) -> Result<PathBuf> {
  fs::canonicalize(path).with_context(|| format!("解析路径 {}", path.display()))
}

fn common_ancestor(a: &Path, b: &Path) -> PathBuf {
  a.components()
    .zip(b.components())
    .take_while(|(x, y)| x == y)
    .map(|(x, _)| x)
    .collect()
}

/// 复制目录下的普通文件，同名文件覆盖，返回复制数量
fn copy_flat(src: &Path, dst: &Path) -> Result<usize> {
  let files = list_files(src)?;
  for name in &files {
    copy_file(&src.join(name), &dst.join(name))?;
  }
  debug!("{} -> {}: {} 个文件", src.display(), dst.display(), files.len());
  Ok(files.len())
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeSet;

  use super::*;

  fn staging(dir: &Path) -> (PathBuf, PathBuf) {
    let images = dir.join("augmented/train/images");
    let labels = dir.join("augmented/train/labels");
    fs::create_dir_all(&images).unwrap();
    fs::create_dir_all(&labels).unwrap();
    fs::write(images.join("a_aug0.jpg"), b"img").unwrap();
    fs::write(labels.join("a_aug0.txt"), "0 0.5 0.5 0.1 0.1\n").unwrap();
    (images, labels)
  }

  fn listing(dir: &Path) -> BTreeSet<String> {
    list_files(dir).unwrap().into_iter().collect()
  }

  #[test]
  fn copies_and_removes_staging_root() {
    let dir = tempfile::tempdir().unwrap();
    let (images, labels) = staging(dir.path());
    let dst_images = dir.path().join("annotated/train/images");
    let dst_labels = dir.path().join("annotated/train/labels");

    let report = Consolidator::new(&images, &labels, &dst_images, &dst_labels)
      .run()
      .unwrap();

    assert_eq!(report.images_copied, 1);
    assert_eq!(report.labels_copied, 1);
    assert!(dst_images.join("a_aug0.jpg").is_file());
    assert!(dst_labels.join("a_aug0.txt").is_file());
    assert!(!dir.path().join("augmented").exists());
    assert_eq!(
      report.removed.unwrap(),
      fs::canonicalize(dir.path()).unwrap().join("augmented")
    );
  }

  #[test]
  fn running_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let (images, labels) = staging(dir.path());
    let dst_images = dir.path().join("annotated/train/images");
    let dst_labels = dir.path().join("annotated/train/labels");
    let consolidator =
      Consolidator::new(&images, &labels, &dst_images, &dst_labels).with_cleanup(false);

    consolidator.run().unwrap();
    let first = (listing(&dst_images), listing(&dst_labels));
    consolidator.run().unwrap();
    assert_eq!(first, (listing(&dst_images), listing(&dst_labels)));
    assert!(images.is_dir());
  }

  #[test]
  fn copy_failure_leaves_staging_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let (images, _) = staging(dir.path());
    let missing_labels = dir.path().join("augmented/train/missing");

    let err = Consolidator::new(
      &images,
      &missing_labels,
      dir.path().join("annotated/train/images"),
      dir.path().join("annotated/train/labels"),
    )
    .run()
    .unwrap_err();
    assert!(matches!(err, Error::Io { .. }));
    assert!(images.join("a_aug0.jpg").is_file());
  }

  #[test]
  fn refuses_to_remove_root_containing_destination() {
    let dir = tempfile::tempdir().unwrap();
    let images = dir.path().join("data/train/images_aug");
    let labels = dir.path().join("data/train/labels_aug");
    fs::create_dir_all(&images).unwrap();
    fs::create_dir_all(&labels).unwrap();

    let err = Consolidator::new(
      &images,
      &labels,
      dir.path().join("data/train/images"),
      dir.path().join("data/train/labels"),
    )
    .run()
    .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert!(images.is_dir());
  }

  #[test]
  fn refuses_unrelated_staging_directories() {
    let dir = tempfile::tempdir().unwrap();
    let images = dir.path().join("home/downloads/aug_images");
    let labels = dir.path().join("home/work/aug_labels");
    fs::create_dir_all(&images).unwrap();
    fs::create_dir_all(&labels).unwrap();

    let consolidator = Consolidator::new(
      &images,
      &labels,
      dir.path().join("annotated/train/images"),
      dir.path().join("annotated/train/labels"),
    );
    assert!(matches!(consolidator.staging_root(), Err(Error::Config(_))));
    assert!(matches!(consolidator.run(), Err(Error::Config(_))));
    assert!(dir.path().join("home/downloads").is_dir());
    assert!(labels.is_dir());
  }

  #[test]
  fn common_ancestor_of_siblings() {
    assert_eq!(
      common_ancestor(Path::new("/a/b/c/images"), Path::new("/a/b/c/labels")),
      PathBuf::from("/a/b/c")
    );
  }
}
