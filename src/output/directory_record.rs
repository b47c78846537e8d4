// 该文件是 Pingzi （瓶子） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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
  fs::File,
  io::BufWriter,
  path::{Path, PathBuf},
  sync::Mutex,
};

use chrono::{Datelike, Utc};
use image::RgbImage;
use thiserror::Error;
use tracing::debug;

use crate::{FromUrl, FromUrlWithScheme, annotate::Detection, output::Render, url_path};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("帧计数器不可用")]
  CounterPoisoned,
}

/// 按日期归档的记录输出
///
/// 每帧写入 `<dir>/<年>/<月>/<日>/<时-分-秒>-<序号>.jpg` 以及同名 `.json`
/// 检测记录。默认只记录有目标的帧，URL 带 `always` 时记录全部帧。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  frame_counter: Mutex<u16>,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(url_path(uri)),
      frame_counter: Mutex::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> Result<u16, DirectoryRecordOutputError> {
    let mut counter = self
      .frame_counter
      .lock()
      .map_err(|_| DirectoryRecordOutputError::CounterPoisoned)?;
    let id = counter.wrapping_add(1);
    *counter = id;
    Ok(id)
  }

  fn frame_path(&self) -> Result<PathBuf, DirectoryRecordOutputError> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.jpg",
      now.format("%H-%M-%S"),
      self.frame_id()?
    )))
  }

  fn write_detections(
    path: &Path,
    detections: &[Detection],
  ) -> Result<(), DirectoryRecordOutputError> {
    let writer = BufWriter::new(File::create(path.with_extension("json"))?);
    serde_json::to_writer_pretty(writer, detections)?;
    Ok(())
  }
}

impl Render for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, image: &RgbImage, detections: &[Detection]) -> Result<(), Self::Error> {
    if !self.always && detections.is_empty() {
      return Ok(());
    }

    let path = self.frame_path()?;
    image.save(&path)?;
    Self::write_detections(&path, detections)?;
    debug!("记录帧: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
      for entry in std::fs::read_dir(current).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else {
          files.push(path);
        }
      }
    }
    files.sort();
    files
  }

  fn output(dir: &Path, query: &str) -> DirectoryRecordOutput {
    let url = url::Url::parse(&format!("folder://{}{}", dir.display(), query)).unwrap();
    DirectoryRecordOutput::from_url(&url).unwrap()
  }

  #[test]
  fn empty_frames_are_skipped_by_default() {
    let dir = tempfile::tempdir().unwrap();
    output(dir.path(), "")
      .render_result(&RgbImage::new(4, 4), &[])
      .unwrap();
    assert!(files_under(dir.path()).is_empty());
  }

  #[test]
  fn always_records_empty_frames() {
    let dir = tempfile::tempdir().unwrap();
    output(dir.path(), "?always")
      .render_result(&RgbImage::new(4, 4), &[])
      .unwrap();
    assert_eq!(files_under(dir.path()).len(), 2);
  }

  #[test]
  fn detections_are_written_next_to_frame() {
    let dir = tempfile::tempdir().unwrap();
    let detections = vec![Detection {
      label: "bottle".to_string(),
      confidence: 0.9,
      distance_cm: 120.0,
      bbox: [1, 2, 3, 4],
    }];
    output(dir.path(), "")
      .render_result(&RgbImage::new(4, 4), &detections)
      .unwrap();

    let files = files_under(dir.path());
    assert_eq!(files.len(), 2);
    let json = files
      .iter()
      .find(|p| p.extension().is_some_and(|e| e == "json"))
      .unwrap();
    let read: Vec<Detection> =
      serde_json::from_str(&std::fs::read_to_string(json).unwrap()).unwrap();
    assert_eq!(read, detections);
  }
}
