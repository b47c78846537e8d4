// 该文件是 Pingzi （瓶子） 项目的一部分。
// src/task.rs - 实时检测任务
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

//! 三种实时检测方式共用同一套标注逻辑：
//!
//! - [`InteractiveTask`]：逐帧渲染到输出端，直到流结束、中断、窗口关闭或达到帧数上限
//! - [`MjpegStream`]：按需拉取的 MJPEG 分块序列
//! - [`single_shot`]：单帧推理

use std::{
  iter::FusedIterator,
  sync::mpsc::{self, Receiver},
  thread,
  time::{Duration, Instant},
};

use image::RgbImage;
use tracing::{debug, error, info, warn};

use crate::{
  annotate::{Annotator, Detection},
  input::{Frame, InputError, open_source},
  model::Model,
  output::{Render, mjpeg::mjpeg_chunk},
};

/// 一次会话的结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
  /// 输入流结束
  Completed,
  /// 收到中断信号
  Interrupted,
  /// 达到帧数上限
  FrameLimit,
  /// 输出端被关闭
  OutputClosed,
  /// 无法打开输入源
  SourceUnavailable,
}

/// 注册 Ctrl-C 处理，返回中断信号的接收端
///
/// 收到信号 30 秒后仍未退出则强制结束进程。
pub fn interrupt_channel() -> Result<Receiver<()>, ctrlc::Error> {
  let (tx, rx) = mpsc::channel();

  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;

  Ok(rx)
}

/// 对一帧推理并标注，返回标注后的帧与检测结果
pub fn single_shot<M: Model>(
  model: &M,
  annotator: &Annotator,
  mut image: RgbImage,
) -> anyhow::Result<(RgbImage, Vec<Detection>)> {
  let now = Instant::now();
  let result = model.infer(&image)?;
  debug!("推理完成，耗时: {:.2?}", now.elapsed());
  let detections = annotator.annotate(&mut image, &result);
  Ok((image, detections))
}

/// 交互式任务：读取、推理、标注并渲染每一帧
#[derive(Default, Debug)]
pub struct InteractiveTask {
  max_frames: Option<usize>,
  interrupt: Option<Receiver<()>>,
}

impl InteractiveTask {
  pub fn with_max_frames(mut self, max_frames: Option<usize>) -> Self {
    self.max_frames = max_frames;
    self
  }

  pub fn with_interrupt(mut self, interrupt: Receiver<()>) -> Self {
    self.interrupt = Some(interrupt);
    self
  }

  /// 打开 `camera` 并运行；输入源无法打开时记录错误并返回 [`SessionOutcome::SourceUnavailable`]
  pub fn run_url<M, O>(
    self,
    camera: &str,
    model: &M,
    annotator: &Annotator,
    output: &O,
  ) -> anyhow::Result<SessionOutcome>
  where
    M: Model,
    O: Render,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    match open_source(camera) {
      Ok(input) => self.run(input, model, annotator, output),
      Err(e) => {
        error!("无法打开摄像头 {}: {}", camera, e);
        Ok(SessionOutcome::SourceUnavailable)
      }
    }
  }

  pub fn run<I, M, O>(
    self,
    input: I,
    model: &M,
    annotator: &Annotator,
    output: &O,
  ) -> anyhow::Result<SessionOutcome>
  where
    I: Iterator<Item = Result<Frame, InputError>>,
    M: Model,
    O: Render,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    info!("开始任务...");

    let mut frame_count = 0;
    let mut now = Instant::now();
    let mut outcome = SessionOutcome::Completed;
    for frame in input {
      let frame = match frame {
        Ok(frame) => frame,
        Err(e) => {
          error!("读取帧失败: {}", e);
          break;
        }
      };

      frame_count += 1;
      debug!("处理第 {} 帧图像", frame.index);
      let (image, detections) = single_shot(model, annotator, frame.image)?;
      let elapsed_a = now.elapsed();
      output.render_result(&image, &detections)?;
      let elapsed_b = now.elapsed();
      now = Instant::now();
      debug!("推理完成，耗时: {:.2?} / {:.2?}", elapsed_a, elapsed_b);

      if self.max_frames.is_some_and(|n| frame_count >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_count);
        outcome = SessionOutcome::FrameLimit;
        break;
      }
      if output.is_closed() {
        info!("输出已关闭，退出任务循环");
        outcome = SessionOutcome::OutputClosed;
        break;
      }
      if let Some(rx) = &self.interrupt
        && rx.try_recv().is_ok()
      {
        warn!("中断信号接收，退出任务循环");
        outcome = SessionOutcome::Interrupted;
        break;
      }
    }

    info!("任务完成，共处理 {} 帧: {:?}", frame_count, outcome);
    Ok(outcome)
  }
}

/// 按需拉取的 MJPEG 流
///
/// 每次 `next` 读取一帧，推理、标注并编码为一个 MJPEG 分块。
/// 输入结束或任一步骤失败后流即结束，不会重新开始。
pub struct MjpegStream<I, M> {
  input: Option<I>,
  model: M,
  annotator: Annotator,
}

impl<M: Model> MjpegStream<crate::input::InputWrapper, M> {
  /// 打开 `camera`；失败时记录错误并返回一个空流
  pub fn open(camera: &str, model: M, annotator: Annotator) -> Self {
    let input = match open_source(camera) {
      Ok(input) => Some(input),
      Err(e) => {
        error!("无法打开摄像头 {}: {}", camera, e);
        None
      }
    };

    Self {
      input,
      model,
      annotator,
    }
  }
}

impl<I, M> MjpegStream<I, M>
where
  I: Iterator<Item = Result<Frame, InputError>>,
  M: Model,
{
  pub fn new(input: I, model: M, annotator: Annotator) -> Self {
    Self {
      input: Some(input),
      model,
      annotator,
    }
  }

  fn next_chunk(&mut self, frame: Frame) -> anyhow::Result<Vec<u8>> {
    let (image, _detections) = single_shot(&self.model, &self.annotator, frame.image)?;
    Ok(mjpeg_chunk(&image)?)
  }
}

impl<I, M> Iterator for MjpegStream<I, M>
where
  I: Iterator<Item = Result<Frame, InputError>>,
  M: Model,
{
  type Item = Vec<u8>;

  fn next(&mut self) -> Option<Self::Item> {
    let frame = match self.input.as_mut()?.next() {
      Some(Ok(frame)) => frame,
      Some(Err(e)) => {
        error!("读取帧失败: {}", e);
        self.input = None;
        return None;
      }
      None => {
        info!("视频流结束");
        self.input = None;
        return None;
      }
    };

    match self.next_chunk(frame) {
      Ok(chunk) => Some(chunk),
      Err(e) => {
        error!("视频流处理失败: {}", e);
        self.input = None;
        None
      }
    }
  }
}

impl<I, M> FusedIterator for MjpegStream<I, M>
where
  I: Iterator<Item = Result<Frame, InputError>>,
  M: Model,
{
}
