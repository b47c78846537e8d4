// 该文件是 Pingzi （瓶子） 项目的一部分。
// src/output/gstreamer_display.rs - GStreamer 窗口显示输出
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

//! # GStreamer 窗口显示
//!
//! URL: `gst://display?fps=30`
//!
//! 帧通过 `appsrc ! videoconvert ! autovideosink` 显示在本地窗口中。
//! 窗口被关闭或管道出错后 [`Render::is_closed`] 返回 `true`。

use std::{
  collections::HashMap,
  sync::{
    Mutex,
    atomic::{AtomicBool, Ordering},
  },
};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use image::RgbImage;
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, annotate::Detection, output::Render};

#[derive(Error, Debug)]
pub enum GStreamerDisplayOutputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("GStreamer 错误: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer 布尔操作错误: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("找不到 appsrc 元素")]
  AppSrcNotFound,
  #[error("管道错误: {0}")]
  PipelineError(String),
  #[error("状态改变错误: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

const PIPELINE: &str = "appsrc name=src is-live=true format=time ! videoconvert ! autovideosink sync=false";

struct StreamState {
  size: Option<(u32, u32)>,
  frame_count: u64,
}

pub struct GStreamerDisplayOutput {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  fps: u64,
  state: Mutex<StreamState>,
  closed: AtomicBool,
}

impl FromUrlWithScheme for GStreamerDisplayOutput {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerDisplayOutput {
  type Error = GStreamerDisplayOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME || url.host_str() != Some("display") {
      return Err(GStreamerDisplayOutputError::SchemeMismatch(url.to_string()));
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();
    let fps = query
      .get("fps")
      .and_then(|v| v.parse::<u64>().ok())
      .filter(|&fps| fps > 0)
      .unwrap_or(30);

    gst::init()?;
    info!("GStreamer 显示管道: {}", PIPELINE);

    let pipeline = gst::parse::launch(PIPELINE)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerDisplayOutputError::PipelineError("无法创建管道".to_string()))?;
    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerDisplayOutputError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerDisplayOutputError::AppSrcNotFound)?;

    pipeline.set_state(gst::State::Playing)?;

    Ok(GStreamerDisplayOutput {
      pipeline,
      appsrc,
      fps,
      state: Mutex::new(StreamState {
        size: None,
        frame_count: 0,
      }),
      closed: AtomicBool::new(false),
    })
  }
}

impl Drop for GStreamerDisplayOutput {
  fn drop(&mut self) {
    let _ = self.appsrc.end_of_stream();
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("停止 GStreamer 显示管道失败: {}", e);
    }
  }
}

impl GStreamerDisplayOutput {
  /// 非阻塞地检查总线上的错误与流结束消息
  fn poll_bus(&self) {
    let Some(bus) = self.pipeline.bus() else {
      return;
    };
    while let Some(message) = bus.pop_filtered(&[gst::MessageType::Error, gst::MessageType::Eos])
    {
      match message.view() {
        gst::MessageView::Error(err) => {
          warn!("显示窗口已关闭: {}", err.error());
        }
        _ => info!("显示管道已结束"),
      }
      self.closed.store(true, Ordering::SeqCst);
    }
  }
}

impl Render for GStreamerDisplayOutput {
  type Error = GStreamerDisplayOutputError;

  fn render_result(&self, image: &RgbImage, _detections: &[Detection]) -> Result<(), Self::Error> {
    let mut state = self
      .state
      .lock()
      .map_err(|_| GStreamerDisplayOutputError::PipelineError("状态锁不可用".to_string()))?;

    let size = image.dimensions();
    if state.size != Some(size) {
      let caps = gst::Caps::builder("video/x-raw")
        .field("format", "RGB")
        .field("width", size.0 as i32)
        .field("height", size.1 as i32)
        .field("framerate", gst::Fraction::new(self.fps as i32, 1))
        .build();
      self.appsrc.set_caps(Some(&caps));
      state.size = Some(size);
    }

    let frame_duration = 1_000_000_000 / self.fps;
    let mut buffer = gst::Buffer::from_mut_slice(image.as_raw().clone());
    if let Some(buffer_ref) = buffer.get_mut() {
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(
        state.frame_count * frame_duration,
      ));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(frame_duration));
    }
    state.frame_count += 1;

    self
      .appsrc
      .push_buffer(buffer)
      .map_err(|e| GStreamerDisplayOutputError::PipelineError(format!("推送帧失败: {:?}", e)))?;
    Ok(())
  }

  fn is_closed(&self) -> bool {
    self.poll_bus();
    self.closed.load(Ordering::SeqCst)
  }
}
