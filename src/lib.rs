// 该文件是 Pingzi （瓶子） 项目的一部分。
// src/lib.rs - 库主文件
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

pub mod annotate;
pub mod config;
pub mod dataset;
pub mod distance;
pub mod error;
pub mod input;
pub mod label;
pub mod model;
pub mod output;
pub mod task;
#[cfg(feature = "web")]
pub mod web;

pub use self::error::{Context, Error, Result};

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// 解码 URL 中经过百分号编码的路径，例如 `my%20frames` -> `my frames`
pub fn url_path(url: &url::Url) -> String {
  let bytes = urlencoding::decode_binary(url.path().as_bytes());
  String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn url_path_is_percent_decoded() {
    let url = url::Url::parse("image:///data/my frames/瓶子.png").unwrap();
    assert_eq!(url.path(), "/data/my%20frames/%E7%93%B6%E5%AD%90.png");
    assert_eq!(url_path(&url), "/data/my frames/瓶子.png");
  }

  #[test]
  fn plain_url_path_is_unchanged() {
    let url = url::Url::parse("folder:///tmp/record?always").unwrap();
    assert_eq!(url_path(&url), "/tmp/record");
  }
}
