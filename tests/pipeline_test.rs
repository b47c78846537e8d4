// 该文件是 Pingzi （瓶子） 项目的一部分。
// tests/pipeline_test.rs - 训练数据流水线集成测试
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
  collections::HashSet,
  fs,
  path::{Path, PathBuf},
};

use image::{Rgb, RgbImage};
use pingzi::{
  config::AppConfig,
  dataset::{DatasetManifest, Partition, TrainingPipeline, list_files},
  label::{Annotation, LabeledBox, NormBox},
};

const TOTAL: usize = 100;
const UNLABELED: &str = "img_042.png";

struct Fixture {
  _dir: tempfile::TempDir,
  root: PathBuf,
  config: AppConfig,
}

fn fixture() -> Fixture {
  let dir = tempfile::tempdir().unwrap();
  let root = dir.path().to_path_buf();
  let raw_images = root.join("raw/images");
  let raw_labels = root.join("raw/annotations");
  fs::create_dir_all(&raw_images).unwrap();
  fs::create_dir_all(&raw_labels).unwrap();

  let annotation = Annotation::new(vec![LabeledBox {
    bbox: NormBox::new(0.5, 0.5, 0.4, 0.4),
    class_id: 0,
  }]);

  for i in 0..TOTAL {
    let name = format!("img_{:03}.png", i);
    RgbImage::from_pixel(16, 16, Rgb([i as u8, 100, 200]))
      .save(raw_images.join(&name))
      .unwrap();
    if name != UNLABELED {
      annotation
        .write(&raw_labels.join(format!("img_{:03}.txt", i)))
        .unwrap();
    }
  }

  let mut config = AppConfig::default();
  config.split.image_dir = raw_images;
  config.split.label_dir = raw_labels;
  config.split.output_dir = root.join("annotated");
  config.split.seed = Some(7);
  config.augment.output_image_dir = root.join("augmented/train/images");
  config.augment.output_label_dir = root.join("augmented/train/labels");
  config.augment.seed = Some(7);
  config.manifest.path = root.join("data.yaml");

  Fixture {
    _dir: dir,
    root,
    config,
  }
}

fn names(dir: &Path) -> HashSet<String> {
  list_files(dir).unwrap().into_iter().collect()
}

#[test]
fn pipeline_produces_training_layout() {
  let fixture = fixture();
  let report = TrainingPipeline::from(&fixture.config).run().unwrap();

  let base = fixture.root.join("annotated");
  assert_eq!(report.split.train.images.len(), 70);
  assert_eq!(report.split.val.images.len(), 20);
  assert_eq!(report.split.test.images.len(), 10);
  assert_eq!(report.split.total(), TOTAL);

  // 划分后的分区互不相交
  let mut seen = HashSet::new();
  for partition in Partition::ALL {
    for name in &report.split.partition(partition).images {
      assert!(seen.insert(name.clone()), "{} 出现在多个分区", name);
    }
  }

  // 无标签图像被复制但没有标签
  let unlabeled_partition = Partition::ALL
    .into_iter()
    .find(|p| report.split.partition(*p).unlabeled.contains(&UNLABELED.to_string()))
    .unwrap();
  assert!(
    unlabeled_partition
      .images_dir(&base)
      .join(UNLABELED)
      .is_file()
  );
  assert!(
    !unlabeled_partition
      .labels_dir(&base)
      .join("img_042.txt")
      .exists()
  );

  // 增强结果已合并进训练集
  let augment = &report.augment;
  assert_eq!(
    augment.variants.len() + augment.discarded.len(),
    2 * augment.originals.len()
  );
  let train_images = names(&Partition::Train.images_dir(&base));
  let train_labels = names(&Partition::Train.labels_dir(&base));
  assert_eq!(train_images.len(), 70 + augment.variants.len());
  for variant in &augment.variants {
    assert!(train_images.contains(variant));
    let label = variant.replace(".png", ".txt");
    assert!(train_labels.contains(&label));
    let annotation = Annotation::read(&Partition::Train.labels_dir(&base).join(label)).unwrap();
    assert!(!annotation.is_empty());
  }

  // 暂存目录被删除
  assert_eq!(
    report.consolidate.removed.as_deref(),
    Some(fs::canonicalize(&fixture.root).unwrap().join("augmented").as_path())
  );
  assert!(!fixture.root.join("augmented").exists());

  // 清单
  let manifest = DatasetManifest::read(&fixture.root.join("data.yaml")).unwrap();
  assert_eq!(manifest.nc, 1);
  assert_eq!(manifest.names, vec!["bottle".to_string()]);
  assert_eq!(manifest.train, Partition::Train.images_dir(&base));
  assert_eq!(manifest.val, Partition::Val.images_dir(&base));
  assert_eq!(manifest.test, Partition::Test.images_dir(&base));
}

#[test]
fn seeded_pipeline_is_reproducible() {
  let first = fixture();
  let second = fixture();
  let a = TrainingPipeline::from(&first.config).run().unwrap();
  let b = TrainingPipeline::from(&second.config).run().unwrap();

  assert_eq!(a.split.train.images, b.split.train.images);
  assert_eq!(a.split.val.images, b.split.val.images);
  assert_eq!(a.split.test.images, b.split.test.images);
  assert_eq!(a.augment.variants, b.augment.variants);
}

#[test]
fn pipeline_keeps_staging_without_cleanup() {
  let mut fixture = fixture();
  fixture.config.consolidate.cleanup = false;
  let report = TrainingPipeline::from(&fixture.config).run().unwrap();

  assert!(report.consolidate.removed.is_none());
  assert!(fixture.root.join("augmented/train/images").is_dir());
}

#[test]
fn invalid_ratios_stop_before_any_output() {
  let mut fixture = fixture();
  fixture.config.split.train_ratio = 0.9;
  fixture.config.split.val_ratio = 0.9;

  assert!(TrainingPipeline::from(&fixture.config).run().is_err());
  assert!(!fixture.root.join("annotated").exists());
  assert!(!fixture.root.join("data.yaml").exists());
}
