// 该文件是 Pingzi （瓶子） 项目的一部分。
// src/dataset/manifest.rs - 数据集清单 data.yaml
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

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{Context, Error, Result, dataset::Partition};

/// 训练框架读取的数据集描述
///
/// ```yaml
/// train: data/annotated/train/images
/// val: data/annotated/val/images
/// test: data/annotated/test/images
/// nc: 1
/// names:
/// - bottle
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetManifest {
  pub train: PathBuf,
  pub val: PathBuf,
  pub test: PathBuf,
  pub nc: usize,
  pub names: Vec<String>,
}

impl DatasetManifest {
  /// 以划分输出目录为根生成清单，`nc` 取类别名数量
  pub fn new(base: &Path, names: Vec<String>) -> Self {
    Self {
      train: Partition::Train.images_dir(base),
      val: Partition::Val.images_dir(base),
      test: Partition::Test.images_dir(base),
      nc: names.len(),
      names,
    }
  }

  pub fn to_yaml(&self) -> Result<String> {
    serde_yaml::to_string(self).context("序列化数据集清单")
  }

  pub fn from_yaml(text: &str) -> Result<Self> {
    let manifest: Self = serde_yaml::from_str(text).context("解析数据集清单")?;
    if manifest.nc != manifest.names.len() {
      return Err(Error::config(format!(
        "数据集清单 nc = {} 与类别名数量 {} 不一致",
        manifest.nc,
        manifest.names.len()
      )));
    }
    Ok(manifest)
  }

  pub fn write(&self, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).with_context(|| format!("创建目录 {}", parent.display()))?;
    }

    std::fs::write(path, self.to_yaml()?)
      .with_context(|| format!("写入数据集清单 {}", path.display()))?;
    info!("数据集清单已写入: {}", path.display());
    Ok(())
  }

  pub fn read(path: &Path) -> Result<Self> {
    let text = std::fs::read_to_string(path)
      .with_context(|| format!("读取数据集清单 {}", path.display()))?;
    Self::from_yaml(&text)
  }
}
