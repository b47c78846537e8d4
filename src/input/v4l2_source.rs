// 该文件是 Pingzi （瓶子） 项目的一部分。
// src/input/v4l2_source.rs - V4L2 摄像头输入源
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

use std::{collections::HashMap, pin::Pin, time::Instant};

use image::RgbImage;
use thiserror::Error;
use tracing::info;
use url::Url;
use v4l::{
  FourCC,
  buffer::Type,
  io::{mmap::Stream, traits::CaptureStream},
  prelude::*,
  video::Capture,
};

use super::{Frame, InputError, InputSource, InputSourceType};
use crate::{FromUrl, FromUrlWithScheme, url_path};

#[derive(Error, Debug)]
pub enum V4l2SourceError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("无法打开设备 {device}: {source}")]
  OpenError {
    device: String,
    #[source]
    source: std::io::Error,
  },
  #[error("无法设置视频格式: {0}")]
  FormatError(std::io::Error),
  #[error("无法创建捕获流: {0}")]
  StreamError(std::io::Error),
  #[error("无法捕获帧: {0}")]
  CaptureError(std::io::Error),
  #[error("帧数据长度 {actual} 与 {width}x{height} 不符")]
  FrameSizeError { width: u32, height: u32, actual: usize },
}

/// V4L2 摄像头输入源，采集 YUYV 并转换为 RGB
///
/// 由于 v4l 库的 Stream 需要引用 Device，我们使用 Pin<Box<Device>> 来保证
/// Device 的内存地址稳定，从而可以安全地创建引用它的 Stream。
pub struct V4l2Source {
  device: Pin<Box<Device>>,
  /// 捕获流（生命周期与 device 关联）
  stream: Option<Stream<'static>>,
  frame_index: u64,
  width: u32,
  height: u32,
  start_time: Instant,
}

impl FromUrlWithScheme for V4l2Source {
  const SCHEME: &'static str = "v4l2";
}

impl FromUrl for V4l2Source {
  type Error = V4l2SourceError;

  /// `v4l2:///dev/video1?width=640&height=480`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(V4l2SourceError::SchemeMismatch(url.scheme().to_string()));
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();
    let width = query
      .get("width")
      .and_then(|v| v.parse().ok())
      .unwrap_or(640);
    let height = query
      .get("height")
      .and_then(|v| v.parse().ok())
      .unwrap_or(480);

    Self::new(&url_path(url), width, height)
  }
}

impl V4l2Source {
  pub fn new(device_path: &str, width: u32, height: u32) -> Result<Self, V4l2SourceError> {
    let device = Box::pin(Device::with_path(device_path).map_err(|source| {
      V4l2SourceError::OpenError {
        device: device_path.to_string(),
        source,
      }
    })?);

    let mut format = device.format().map_err(V4l2SourceError::FormatError)?;
    format.width = width;
    format.height = height;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device
      .set_format(&format)
      .map_err(V4l2SourceError::FormatError)?;
    info!(
      "打开摄像头 {}: {}x{} {}",
      device_path, format.width, format.height, format.fourcc
    );

    let mut source = Self {
      device,
      stream: None,
      frame_index: 0,
      width: format.width,
      height: format.height,
      start_time: Instant::now(),
    };

    // SAFETY: Stream 借用 Device，这里把借用的生命周期延长到 'static，需要以下条件同时成立:
    // 1. device 被 Pin<Box> 固定在堆上，source 移动时 Device 的地址不变
    // 2. stream 与 device 存放在同一结构体中，device 不会被单独替换或释放
    // 3. Drop 顺序：Drop::drop 中先 take() 释放 stream，随后字段析构才释放 device
    // 任何修改这些字段或 Drop 实现的改动都必须保持上述顺序
    let device_ref: &Device = &source.device;
    let stream = unsafe {
      let device_static: &'static Device = std::mem::transmute(device_ref);
      Stream::with_buffers(device_static, Type::VideoCapture, 4)
        .map_err(V4l2SourceError::StreamError)?
    };

    source.stream = Some(stream);
    Ok(source)
  }

  /// YUYV (YUV 4:2:2) 转 RGB，每 4 字节对应两个像素
  fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);

    for chunk in yuyv.chunks_exact(4) {
      let u = chunk[1] as f32 - 128.0;
      let v = chunk[3] as f32 - 128.0;
      for y in [chunk[0] as f32, chunk[2] as f32] {
        let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
        let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
        let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
        rgb.extend_from_slice(&[r, g, b]);
      }
    }

    rgb
  }
}

impl Drop for V4l2Source {
  fn drop(&mut self) {
    // stream 借用了 device，必须先于 device 释放，见 new 中的 SAFETY 说明
    drop(self.stream.take());
  }
}

impl Iterator for V4l2Source {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let stream = self.stream.as_mut()?;

    let frame = match stream.next() {
      Ok((buffer, _meta)) => {
        let expected = (self.width * self.height * 2) as usize;
        let buffer = &buffer[..buffer.len().min(expected)];
        let rgb = Self::yuyv_to_rgb(buffer, self.width, self.height);
        let actual = rgb.len();
        RgbImage::from_raw(self.width, self.height, rgb)
          .map(|image| Frame {
            image,
            index: self.frame_index,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
          })
          .ok_or(V4l2SourceError::FrameSizeError {
            width: self.width,
            height: self.height,
            actual,
          })
      }
      Err(e) => Err(V4l2SourceError::CaptureError(e)),
    };

    self.frame_index += 1;
    Some(frame.map_err(InputError::from))
  }
}

impl InputSource for V4l2Source {
  fn source_type(&self) -> InputSourceType {
    InputSourceType::V4l2
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn grey_yuyv_maps_to_grey_rgb() {
    let rgb = V4l2Source::yuyv_to_rgb(&[128, 128, 64, 128], 2, 1);
    assert_eq!(rgb, vec![128, 128, 128, 64, 64, 64]);
  }
}
