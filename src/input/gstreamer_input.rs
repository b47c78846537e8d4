// 该文件是 Pingzi （瓶子） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 输入
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

//! # GStreamer 视频输入
//!
//! 支持两类 URL：
//!
//! - `gst://camera/dev/video0?width=640&height=480&fps=30` 摄像头
//! - `gst://file/path/to/video.mp4` 视频文件
//!
//! 两者都可以追加 `rotate=90|180|270`。
//!
//! 使用前需要安装 GStreamer 开发库，例如 Ubuntu/Debian 上：
//!
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```

use std::{collections::HashMap, time::Instant};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use super::{Frame, InputError, InputSource, InputSourceType};
use crate::{FromUrl, FromUrlWithScheme, url_path};

#[derive(Error, Debug)]
pub enum GStreamerInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer 布尔操作错误: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("找不到 appsink 元素")]
  AppSinkNotFound,
  #[error("无法从 caps 获取视频信息")]
  VideoInfoError,
  #[error("不支持的视频格式")]
  UnsupportedFormat,
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("缓冲区大小不匹配: 期望 {expected} 字节, 实际 {actual} 字节")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("状态改变错误: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

pub enum GStreamerInputBuilderItem {
  FileSource(String),
  CameraSource {
    camera: String,
    width: u32,
    height: u32,
    fps: u32,
  },
  VideoFlip {
    method: u32,
  },
  TargetFormat {
    format: String,
  },
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::FileSource(path) => {
        format!("filesrc location={} ! decodebin", path)
      }
      GStreamerInputBuilderItem::CameraSource {
        camera,
        width,
        height,
        fps,
      } => format!(
        "v4l2src device={} ! videoconvert ! videoscale ! video/x-raw,width={},height={},framerate={}/1",
        camera, width, height, fps
      ),
      GStreamerInputBuilderItem::VideoFlip { method } => {
        format!("videoflip method={}", method)
      }
      GStreamerInputBuilderItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
    }
  }
}

/// GStreamer 输入管道构建器
pub struct GStreamerInputPipelineBuilder {
  items: Vec<GStreamerInputBuilderItem>,
}

impl GStreamerInputPipelineBuilder {
  fn video_flip(rotate: Option<&String>) -> Option<GStreamerInputBuilderItem> {
    let method = match rotate?.as_str() {
      "90" => 1,
      "180" => 2,
      "270" => 3,
      _ => return None,
    };
    Some(GStreamerInputBuilderItem::VideoFlip { method })
  }

  pub fn pipeline_description(&self) -> String {
    let basic_pipeline = self
      .items
      .iter()
      .map(GStreamerInputBuilderItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    format!(
      "{} ! appsink max-buffers=2 drop=true name=sink",
      basic_pipeline
    )
  }

  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    gst::init()?;

    let full_pipeline = self.pipeline_description();
    info!("GStreamer 输入管道: {}", full_pipeline);

    let pipeline = gst::parse::launch(&full_pipeline)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("无法创建管道".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkNotFound)?;

    pipeline.set_state(gst::State::Playing)?;

    Ok(GStreamerInput {
      pipeline,
      appsink,
      frame_index: 0,
      start_time: Instant::now(),
    })
  }
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();
    let parse = |key: &str, default: u32| {
      query
        .get(key)
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
    };

    let mut items = Vec::new();
    match url.host_str() {
      Some("camera") => items.push(GStreamerInputBuilderItem::CameraSource {
        camera: url_path(url),
        width: parse("width", 640),
        height: parse("height", 480),
        fps: parse("fps", 30),
      }),
      Some("file") => items.push(GStreamerInputBuilderItem::FileSource(url_path(url))),
      _ => return Err(GStreamerInputError::SchemeMismatch),
    }

    if let Some(video_flip) = Self::video_flip(query.get("rotate")) {
      items.push(video_flip);
    }
    items.push(GStreamerInputBuilderItem::TargetFormat {
      format: "RGB".to_string(),
    });

    Ok(GStreamerInputPipelineBuilder { items })
  }
}

/// GStreamer 视频输入
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  frame_index: u64,
  start_time: Instant,
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("停止 GStreamer 管道失败: {}", e);
    }
  }
}

impl GStreamerInput {
  /// 拉取下一帧，流结束时返回 `None`
  fn pull_sample(&self) -> Option<gst::Sample> {
    self
      .appsink
      .pull_sample()
      .map_err(|e| {
        if !self.appsink.is_eos() {
          error!("拉取帧失败: {}", e);
        }
        e
      })
      .ok()
  }
}

impl Iterator for GStreamerInput {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let sample = self.pull_sample()?;
    let frame = convert_sample(sample).map(|image| Frame {
      image,
      index: self.frame_index,
      timestamp_ms: self.start_time.elapsed().as_millis() as u64,
    });
    self.frame_index += 1;
    Some(frame.map_err(InputError::from))
  }
}

impl InputSource for GStreamerInput {
  fn source_type(&self) -> InputSourceType {
    InputSourceType::GStreamer
  }
}

fn convert_sample(sample: gst::Sample) -> Result<RgbImage, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("样本中没有缓冲区".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("样本中没有 caps".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;
  if video_info.format() != gst_video::VideoFormat::Rgb {
    return Err(GStreamerInputError::UnsupportedFormat);
  }

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  // 行可能按 4 字节对齐
  let stride = video_info.stride()[0] as usize;

  let map = buffer
    .map_readable()
    .map_err(|e| GStreamerInputError::PipelineError(format!("无法映射缓冲区: {}", e)))?;
  let data = map.as_slice();

  let expected = stride * (height.saturating_sub(1)) + width * 3;
  if data.len() < expected {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  let mut rgb = Vec::with_capacity(width * height * 3);
  for row in 0..height {
    let start = row * stride;
    rgb.extend_from_slice(&data[start..start + width * 3]);
  }

  RgbImage::from_raw(width as u32, height as u32, rgb).ok_or(
    GStreamerInputError::BufferSizeMismatch {
      expected: width * height * 3,
      actual: data.len(),
    },
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn camera_url_builds_v4l2_pipeline() {
    let url = Url::parse("gst://camera/dev/video0?width=320&height=240&fps=15&rotate=180").unwrap();
    let desc = GStreamerInputPipelineBuilder::from_url(&url)
      .unwrap()
      .pipeline_description();
    assert!(desc.starts_with("v4l2src device=/dev/video0"));
    assert!(desc.contains("width=320,height=240,framerate=15/1"));
    assert!(desc.contains("videoflip method=2"));
    assert!(desc.ends_with("appsink max-buffers=2 drop=true name=sink"));
  }

  #[test]
  fn file_url_builds_decode_pipeline() {
    let url = Url::parse("gst://file/videos/a.mp4").unwrap();
    let desc = GStreamerInputPipelineBuilder::from_url(&url)
      .unwrap()
      .pipeline_description();
    assert!(desc.starts_with("filesrc location=/videos/a.mp4 ! decodebin"));
  }

  #[test]
  fn unknown_host_is_rejected() {
    let url = Url::parse("gst://rtsp/stream").unwrap();
    assert!(GStreamerInputPipelineBuilder::from_url(&url).is_err());
  }
}
