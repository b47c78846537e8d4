// 该文件是 Pingzi （瓶子） 项目的一部分。
// src/dataset/pipeline.rs - 训练数据准备流水线
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

use tracing::{error, info};

use crate::{
  Result,
  config::{AppConfig, AugmentConfig, ConsolidateConfig, ManifestConfig, SplitConfig},
  dataset::{
    Partition,
    augment::{AugmentReport, Augmentor},
    consolidate::{ConsolidateReport, Consolidator},
    manifest::DatasetManifest,
    split::{SplitReport, Splitter},
    transform::{RandomTransforms, TransformEngine, TransformPipeline},
  },
};

#[derive(Debug, Clone)]
pub struct PipelineReport {
  pub split: SplitReport,
  pub augment: AugmentReport,
  pub consolidate: ConsolidateReport,
  pub manifest: DatasetManifest,
}

/// 划分 -> 增强 -> 合并 -> 清单，依次执行，任一阶段失败即终止
#[derive(Debug, Clone, Default)]
pub struct TrainingPipeline {
  pub split: SplitConfig,
  pub augment: AugmentConfig,
  pub consolidate: ConsolidateConfig,
  pub manifest: ManifestConfig,
}

impl From<&AppConfig> for TrainingPipeline {
  fn from(config: &AppConfig) -> Self {
    Self {
      split: config.split.clone(),
      augment: config.augment.clone(),
      consolidate: config.consolidate.clone(),
      manifest: config.manifest.clone(),
    }
  }
}

impl TrainingPipeline {
  /// 使用默认变换配置运行
  pub fn run(&self) -> Result<PipelineReport> {
    let mut engine = RandomTransforms::with_seed(TransformPipeline::default(), self.augment.seed);
    self.run_with(&mut engine)
  }

  pub fn run_with<E: TransformEngine>(&self, engine: &mut E) -> Result<PipelineReport> {
    info!("训练数据流水线开始");
    let result = self.run_stages(engine);
    match &result {
      Ok(_) => info!("训练数据流水线完成"),
      Err(e) => error!("训练数据流水线失败: {}", e),
    }
    result
  }

  fn run_stages<E: TransformEngine>(&self, engine: &mut E) -> Result<PipelineReport> {
    info!("步骤 1: 划分数据集");
    let splitter = Splitter::from_config(&self.split)?;
    let split = splitter.run()?;

    let base = splitter.output_dir();
    let train_images = Partition::Train.images_dir(base);
    let train_labels = Partition::Train.labels_dir(base);

    info!("步骤 2: 增强训练集");
    let augmentor = Augmentor::new(
      &train_images,
      &train_labels,
      &self.augment.output_image_dir,
      &self.augment.output_label_dir,
    )
    .with_aug_per_image(self.augment.aug_per_image);
    let augment = augmentor.run(engine)?;

    info!("步骤 3: 合并增强数据");
    let consolidate = Consolidator::new(
      &augment.output_image_dir,
      &augment.output_label_dir,
      &train_images,
      &train_labels,
    )
    .with_cleanup(self.consolidate.cleanup)
    .run()?;

    info!("步骤 4: 生成数据集清单");
    let manifest = DatasetManifest::new(base, self.manifest.names.clone());
    manifest.write(&self.manifest.path)?;

    Ok(PipelineReport {
      split,
      augment,
      consolidate,
      manifest,
    })
  }
}
