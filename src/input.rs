// 该文件是 Pingzi （瓶子） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use image::RgbImage;
use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme};

/// 一帧输入
#[derive(Debug, Clone)]
pub struct Frame {
  pub image: RgbImage,
  /// 帧序号，从 0 开始
  pub index: u64,
  pub timestamp_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSourceType {
  Image,
  V4l2,
  GStreamer,
}

/// 输入源：逐帧产出 [`Frame`]，返回 `None` 表示结束
pub trait InputSource: Iterator<Item = Result<Frame, InputError>> {
  fn source_type(&self) -> InputSourceType;
}

mod image_source;
pub use self::image_source::{ImageSource, ImageSourceError};

#[cfg(feature = "v4l2_input")]
mod v4l2_source;
#[cfg(feature = "v4l2_input")]
pub use self::v4l2_source::{V4l2Source, V4l2SourceError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{
  GStreamerInput, GStreamerInputError, GStreamerInputPipelineBuilder,
};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("图像输入错误: {0}")]
  ImageSourceError(#[from] ImageSourceError),
  #[cfg(feature = "v4l2_input")]
  #[error("V4L2 输入错误: {0}")]
  V4l2SourceError(#[from] V4l2SourceError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer 输入错误: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
  #[error("无效的输入 URL: {0}")]
  InvalidUrl(#[from] url::ParseError),
  #[error("URI 方案不匹配或未启用: {0}")]
  SchemeMismatch(String),
}

pub enum InputWrapper {
  Image(ImageSource),
  #[cfg(feature = "v4l2_input")]
  V4l2(V4l2Source),
  #[cfg(feature = "gstreamer_input")]
  GStreamer(GStreamerInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      ImageSource::SCHEME => Ok(InputWrapper::Image(ImageSource::from_url(url)?)),
      #[cfg(feature = "v4l2_input")]
      V4l2Source::SCHEME => Ok(InputWrapper::V4l2(V4l2Source::from_url(url)?)),
      #[cfg(feature = "gstreamer_input")]
      GStreamerInputPipelineBuilder::SCHEME => {
        let input = GStreamerInputPipelineBuilder::from_url(url)?.build()?;
        Ok(InputWrapper::GStreamer(input))
      }
      scheme => Err(InputError::SchemeMismatch(scheme.to_string())),
    }
  }
}

/// 解析 URL 并打开输入源
pub fn open_source(url: &str) -> Result<InputWrapper, InputError> {
  let url = Url::parse(url)?;
  InputWrapper::from_url(&url)
}

impl Iterator for InputWrapper {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::Image(input) => input.next(),
      #[cfg(feature = "v4l2_input")]
      InputWrapper::V4l2(input) => input.next(),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamer(input) => input.next(),
    }
  }
}

impl InputSource for InputWrapper {
  fn source_type(&self) -> InputSourceType {
    match self {
      InputWrapper::Image(input) => input.source_type(),
      #[cfg(feature = "v4l2_input")]
      InputWrapper::V4l2(input) => input.source_type(),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamer(input) => input.source_type(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_scheme_is_rejected() {
    let err = open_source("rtsp://camera.local/stream").err().unwrap();
    assert!(matches!(err, InputError::SchemeMismatch(s) if s == "rtsp"));
  }

  #[test]
  fn malformed_url_is_rejected() {
    assert!(matches!(
      open_source("not a url").err().unwrap(),
      InputError::InvalidUrl(_)
    ));
  }

  #[test]
  fn image_url_opens_image_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    RgbImage::new(4, 3).save(&path).unwrap();

    let url = Url::from_file_path(&path).unwrap();
    let url = format!("image://{}", url.path());
    let mut source = open_source(&url).unwrap();
    assert_eq!(source.source_type(), InputSourceType::Image);
    let frame = source.next().unwrap().unwrap();
    assert_eq!(frame.image.dimensions(), (4, 3));
    assert!(source.next().is_none());
  }

  #[test]
  fn image_url_with_spaced_directory() {
    let dir = tempfile::tempdir().unwrap();
    let frames = dir.path().join("my frames/瓶子");
    std::fs::create_dir_all(&frames).unwrap();
    RgbImage::new(4, 3).save(frames.join("a.png")).unwrap();
    RgbImage::new(4, 3).save(frames.join("b.png")).unwrap();

    let source = open_source(&format!("image://{}", frames.display())).unwrap();
    assert_eq!(source.count(), 2);
  }
}
