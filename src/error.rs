// 该文件是 Pingzi （瓶子） 项目的一部分。
// src/error.rs - 统一错误类型
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

use std::path::PathBuf;

use thiserror::Error;

use crate::{input::InputError, model::ModelError, output::OutputError};

/// 项目统一错误类型
///
/// 每个变体都携带原始错误以及出错时的上下文（操作与路径），
/// 由各流水线阶段或请求处理函数向上传播，不做局部恢复或重试。
#[derive(Error, Debug)]
pub enum Error {
  #[error("{context}: {source}")]
  Io {
    context: String,
    #[source]
    source: std::io::Error,
  },
  #[error("{context}: {source}")]
  Image {
    context: String,
    #[source]
    source: image::ImageError,
  },
  #[error("标签文件 {} 第 {line} 行格式错误: {message}", path.display())]
  LabelParse {
    path: PathBuf,
    line: usize,
    message: String,
  },
  #[error("配置错误: {0}")]
  Config(String),
  #[error("数据集清单错误: {context}: {source}")]
  Manifest {
    context: String,
    #[source]
    source: serde_yaml::Error,
  },
  #[error("输入错误: {0}")]
  Input(#[from] InputError),
  #[error("输出错误: {0}")]
  Output(#[from] OutputError),
  #[error("模型错误: {0}")]
  Model(#[from] ModelError),
  #[error("编码错误: {0}")]
  Encode(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  pub fn config(message: impl Into<String>) -> Self {
    Error::Config(message.into())
  }
}

/// 为底层错误附加上下文
pub trait Context<T> {
  fn context<C: Into<String>>(self, context: C) -> Result<T>;

  fn with_context<C: Into<String>, F: FnOnce() -> C>(self, f: F) -> Result<T>;
}

impl<T> Context<T> for std::result::Result<T, std::io::Error> {
  fn context<C: Into<String>>(self, context: C) -> Result<T> {
    self.map_err(|source| Error::Io {
      context: context.into(),
      source,
    })
  }

  fn with_context<C: Into<String>, F: FnOnce() -> C>(self, f: F) -> Result<T> {
    self.map_err(|source| Error::Io {
      context: f().into(),
      source,
    })
  }
}

impl<T> Context<T> for std::result::Result<T, image::ImageError> {
  fn context<C: Into<String>>(self, context: C) -> Result<T> {
    self.map_err(|source| Error::Image {
      context: context.into(),
      source,
    })
  }

  fn with_context<C: Into<String>, F: FnOnce() -> C>(self, f: F) -> Result<T> {
    self.map_err(|source| Error::Image {
      context: f().into(),
      source,
    })
  }
}

impl<T> Context<T> for std::result::Result<T, serde_yaml::Error> {
  fn context<C: Into<String>>(self, context: C) -> Result<T> {
    self.map_err(|source| Error::Manifest {
      context: context.into(),
      source,
    })
  }

  fn with_context<C: Into<String>, F: FnOnce() -> C>(self, f: F) -> Result<T> {
    self.map_err(|source| Error::Manifest {
      context: f().into(),
      source,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn io_context_keeps_cause_and_context() {
    let result: std::result::Result<(), _> = Err(std::io::Error::new(
      std::io::ErrorKind::NotFound,
      "missing",
    ));
    let err = result.context("复制文件 a.jpg").unwrap_err();
    assert!(err.to_string().contains("复制文件 a.jpg"));
    assert!(err.to_string().contains("missing"));
    assert!(std::error::Error::source(&err).is_some());
  }

  #[test]
  fn label_parse_mentions_path_and_line() {
    let err = Error::LabelParse {
      path: PathBuf::from("labels/a.txt"),
      line: 3,
      message: "bad".to_string(),
    };
    let text = err.to_string();
    assert!(text.contains("labels/a.txt"));
    assert!(text.contains('3'));
  }
}
