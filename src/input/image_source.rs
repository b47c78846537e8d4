// 该文件是 Pingzi （瓶子） 项目的一部分。
// src/input/image_source.rs - 图片输入源
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
  collections::VecDeque,
  path::{Path, PathBuf},
  time::Instant,
};

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::debug;
use url::Url;

use super::{Frame, InputError, InputSource, InputSourceType};
use crate::{FromUrl, FromUrlWithScheme, dataset::is_image_file, url_path};

#[derive(Error, Debug)]
pub enum ImageSourceError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无法读取 {path}: {source}")]
  IoError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("无法解码图片 {path}: {source}")]
  DecodeError {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },
}

/// 图片输入源
///
/// 可以是单个图片文件、一个图片目录（按文件名顺序逐张读取），
/// 或一段已在内存中的图片数据。
pub struct ImageSource {
  /// 待读取的文件
  paths: VecDeque<PathBuf>,
  /// 已解码、尚未产出的图片
  pending: Option<RgbImage>,
  frame_index: u64,
  start_time: Instant,
}

impl FromUrlWithScheme for ImageSource {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageSource {
  type Error = ImageSourceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageSourceError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }
    Self::open(Path::new(&url_path(url)))
  }
}

impl ImageSource {
  /// 打开图片文件或图片目录
  pub fn open(path: &Path) -> Result<Self, ImageSourceError> {
    let io_error = |source| ImageSourceError::IoError {
      path: path.to_path_buf(),
      source,
    };

    let paths = if path.is_dir() {
      let mut paths = Vec::new();
      for entry in std::fs::read_dir(path).map_err(io_error)? {
        let entry_path = entry.map_err(io_error)?.path();
        if entry_path.is_file() && is_image_file(&entry_path) {
          paths.push(entry_path);
        }
      }
      paths.sort();
      paths
    } else {
      // 文件不存在时立即报错
      std::fs::metadata(path).map_err(io_error)?;
      vec![path.to_path_buf()]
    };

    debug!("图片输入源 {}: {} 张图片", path.display(), paths.len());
    Ok(Self {
      paths: paths.into(),
      pending: None,
      frame_index: 0,
      start_time: Instant::now(),
    })
  }

  /// 从内存中的图片数据（例如上传的文件）创建单帧输入源
  pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageSourceError> {
    let image = image::load_from_memory(bytes)
      .map_err(|source| ImageSourceError::DecodeError {
        path: PathBuf::from("<memory>"),
        source,
      })?
      .to_rgb8();

    Ok(Self {
      paths: VecDeque::new(),
      pending: Some(image),
      frame_index: 0,
      start_time: Instant::now(),
    })
  }

  fn decode(path: &Path) -> Result<RgbImage, ImageSourceError> {
    let image = ImageReader::open(path)
      .map_err(|source| ImageSourceError::IoError {
        path: path.to_path_buf(),
        source,
      })?
      .decode()
      .map_err(|source| ImageSourceError::DecodeError {
        path: path.to_path_buf(),
        source,
      })?;
    Ok(image.to_rgb8())
  }
}

impl Iterator for ImageSource {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let image = match self.pending.take() {
      Some(image) => Ok(image),
      None => Self::decode(&self.paths.pop_front()?),
    };

    let frame = image.map(|image| Frame {
      image,
      index: self.frame_index,
      timestamp_ms: self.start_time.elapsed().as_millis() as u64,
    });
    self.frame_index += 1;
    Some(frame.map_err(InputError::from))
  }
}

impl InputSource for ImageSource {
  fn source_type(&self) -> InputSourceType {
    InputSourceType::Image
  }
}

#[cfg(test)]
mod tests {
  use image::Rgb;

  use super::*;

  #[test]
  fn directory_is_read_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    RgbImage::from_pixel(2, 2, Rgb([1, 1, 1]))
      .save(dir.path().join("b.png"))
      .unwrap();
    RgbImage::from_pixel(3, 3, Rgb([2, 2, 2]))
      .save(dir.path().join("a.png"))
      .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

    let frames: Vec<Frame> = ImageSource::open(dir.path())
      .unwrap()
      .map(|f| f.unwrap())
      .collect();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].image.dimensions(), (3, 3));
    assert_eq!(frames[0].index, 0);
    assert_eq!(frames[1].index, 1);
  }

  #[test]
  fn missing_file_fails_on_open() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      ImageSource::open(&dir.path().join("none.jpg")).err().unwrap(),
      ImageSourceError::IoError { .. }
    ));
  }

  #[test]
  fn bytes_yield_single_frame() {
    let mut buf = Vec::new();
    RgbImage::from_pixel(5, 4, Rgb([9, 8, 7]))
      .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
      .unwrap();

    let mut source = ImageSource::from_bytes(&buf).unwrap();
    let frame = source.next().unwrap().unwrap();
    assert_eq!(frame.image.get_pixel(0, 0), &Rgb([9, 8, 7]));
    assert!(source.next().is_none());
  }

  #[test]
  fn garbage_bytes_fail_to_decode() {
    assert!(matches!(
      ImageSource::from_bytes(b"not an image").err().unwrap(),
      ImageSourceError::DecodeError { .. }
    ));
  }

  #[test]
  fn corrupt_file_yields_error_item() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.jpg");
    std::fs::write(&path, b"garbage").unwrap();
    let mut source = ImageSource::open(&path).unwrap();
    assert!(source.next().unwrap().is_err());
    assert!(source.next().is_none());
  }
}
