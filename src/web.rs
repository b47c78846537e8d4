// 该文件是 Pingzi （瓶子） 项目的一部分。
// src/web.rs - HTTP 服务
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

//! # HTTP 服务
//!
//! - `GET /`：页面
//! - `GET /video_feed`：服务器摄像头的 MJPEG 流
//! - `POST /predict_frame`：上传一帧（multipart 字段 `frame`），返回 `{"detections": [...]}`

use std::sync::Arc;

use axum::{
  Json, Router,
  body::Body,
  extract::{Multipart, State},
  http::{StatusCode, header},
  response::{Html, IntoResponse, Response},
  routing::{get, post},
};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info};

use crate::{
  annotate::{Annotator, Detection},
  input::ImageSource,
  model::Model,
  output::mjpeg::MJPEG_CONTENT_TYPE,
  task::{MjpegStream, single_shot},
};

const INDEX_HTML: &str = include_str!("web/index.html");
const FRAME_FIELD: &str = "frame";

/// 所有请求共享的状态，模型只加载一次
pub struct WebState<M> {
  model: Arc<M>,
  annotator: Annotator,
  camera: String,
}

impl<M> Clone for WebState<M> {
  fn clone(&self) -> Self {
    Self {
      model: Arc::clone(&self.model),
      annotator: self.annotator.clone(),
      camera: self.camera.clone(),
    }
  }
}

impl<M> WebState<M> {
  pub fn new(model: Arc<M>, annotator: Annotator, camera: impl Into<String>) -> Self {
    Self {
      model,
      annotator,
      camera: camera.into(),
    }
  }
}

pub fn router<M>(state: WebState<M>) -> Router
where
  M: Model + Send + Sync + 'static,
{
  Router::new()
    .route("/", get(index))
    .route("/video_feed", get(video_feed::<M>))
    .route("/predict_frame", post(predict_frame::<M>))
    .with_state(state)
}

/// 监听 `bind` 并处理请求，收到 Ctrl-C 后退出
pub async fn serve<M>(state: WebState<M>, bind: &str) -> anyhow::Result<()>
where
  M: Model + Send + Sync + 'static,
{
  let listener = tokio::net::TcpListener::bind(bind).await?;
  info!("HTTP 服务监听: {}", listener.local_addr()?);

  axum::serve(listener, router(state))
    .with_graceful_shutdown(async {
      if let Err(e) = tokio::signal::ctrl_c().await {
        error!("无法监听中断信号: {}", e);
      }
      info!("收到中断信号，停止服务");
    })
    .await?;
  Ok(())
}

async fn index() -> Html<&'static str> {
  Html(INDEX_HTML)
}

/// 每个客户端独占一个阻塞线程与一个摄像头会话，客户端断开后会话随之关闭
async fn video_feed<M>(State(state): State<WebState<M>>) -> Response
where
  M: Model + Send + Sync + 'static,
{
  let (tx, rx) = mpsc::channel::<Result<Vec<u8>, std::io::Error>>(2);

  std::thread::spawn(move || {
    let stream = MjpegStream::open(&state.camera, state.model, state.annotator);
    for chunk in stream {
      if tx.blocking_send(Ok(chunk)).is_err() {
        info!("视频流客户端已断开");
        break;
      }
    }
    debug!("视频流会话结束");
  });

  (
    [(header::CONTENT_TYPE, MJPEG_CONTENT_TYPE)],
    Body::from_stream(ReceiverStream::new(rx)),
  )
    .into_response()
}

async fn predict_frame<M>(State(state): State<WebState<M>>, mut multipart: Multipart) -> Response
where
  M: Model + Send + Sync + 'static,
{
  let bytes = match frame_field(&mut multipart).await {
    Ok(Some(bytes)) => bytes,
    Ok(None) => return error_response(StatusCode::BAD_REQUEST, "缺少 frame 字段"),
    Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
  };

  let result =
    tokio::task::spawn_blocking(move || detect_upload(&*state.model, &state.annotator, &bytes))
      .await;

  match result {
    Ok(Ok(detections)) => Json(json!({ "detections": detections })).into_response(),
    Ok(Err(e)) => {
      error!("上传帧处理失败: {}", e);
      error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
    }
    Err(e) => {
      error!("上传帧处理任务失败: {}", e);
      error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
    }
  }
}

async fn frame_field(
  multipart: &mut Multipart,
) -> Result<Option<Vec<u8>>, axum::extract::multipart::MultipartError> {
  while let Some(field) = multipart.next_field().await? {
    if field.name() == Some(FRAME_FIELD) {
      return Ok(Some(field.bytes().await?.to_vec()));
    }
  }
  Ok(None)
}

/// 解码上传的图片并检测
pub fn detect_upload<M: Model>(
  model: &M,
  annotator: &Annotator,
  bytes: &[u8],
) -> anyhow::Result<Vec<Detection>> {
  let frame = ImageSource::from_bytes(bytes)?
    .next()
    .ok_or_else(|| anyhow::anyhow!("上传内容中没有图像"))??;
  let (_image, detections) = single_shot(model, annotator, frame.image)?;
  Ok(detections)
}

fn error_response(status: StatusCode, message: impl ToString) -> Response {
  (status, Json(json!({ "error": message.to_string() }))).into_response()
}
