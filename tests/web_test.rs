// 该文件是 Pingzi （瓶子） 项目的一部分。
// tests/web_test.rs - HTTP 服务集成测试
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

#![cfg(feature = "web")]

use std::{convert::Infallible, io::Cursor, sync::Arc};

use axum::{
  Router,
  body::Body,
  http::{Request, StatusCode, header},
};
use image::{ImageFormat, RgbImage};
use pingzi::{
  annotate::Annotator,
  distance::DistanceEstimator,
  model::{DetectItem, DetectResult, Model},
  web::{WebState, router},
};
use serde_json::Value;
use tower::ServiceExt;

const BOUNDARY: &str = "pingzi-test-boundary";

struct FixedModel;

impl Model for FixedModel {
  type Error = Infallible;

  fn infer(&self, _image: &RgbImage) -> Result<DetectResult, Self::Error> {
    Ok(DetectResult::new(vec![
      DetectItem {
        class_id: 0,
        score: 0.95,
        bbox: [10.0, 10.0, 118.0, 50.0],
      },
      DetectItem {
        class_id: 0,
        score: 0.5,
        bbox: [0.0, 0.0, 20.0, 20.0],
      },
    ]))
  }
}

fn app() -> Router {
  let annotator = Annotator::new(vec!["bottle".to_string()], DistanceEstimator::default());
  router(WebState::new(
    Arc::new(FixedModel),
    annotator,
    "image:///nonexistent/camera",
  ))
}

fn png_bytes() -> Vec<u8> {
  let mut buf = Vec::new();
  RgbImage::new(160, 120)
    .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
    .unwrap();
  buf
}

fn multipart_request(field: &str, data: &[u8]) -> Request<Body> {
  let mut body = Vec::new();
  body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
  body.extend_from_slice(
    format!(
      "Content-Disposition: form-data; name=\"{}\"; filename=\"frame.png\"\r\n",
      field
    )
    .as_bytes(),
  );
  body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
  body.extend_from_slice(data);
  body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

  Request::builder()
    .method("POST")
    .uri("/predict_frame")
    .header(
      header::CONTENT_TYPE,
      format!("multipart/form-data; boundary={}", BOUNDARY),
    )
    .body(Body::from(body))
    .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
  let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
    .await
    .unwrap();
  serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn index_page_is_served() {
  let response = app()
    .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);

  let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
    .await
    .unwrap();
  let html = String::from_utf8(bytes.to_vec()).unwrap();
  assert!(html.contains("/video_feed"));
  assert!(html.contains("/predict_frame"));
}

#[tokio::test]
async fn predict_frame_returns_detections() {
  let response = app()
    .oneshot(multipart_request("frame", &png_bytes()))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);

  let json = json_body(response).await;
  let detections = json["detections"].as_array().unwrap();
  assert_eq!(detections.len(), 1);
  assert_eq!(detections[0]["label"], "bottle");
  assert_eq!(detections[0]["bbox"], serde_json::json!([10, 10, 118, 50]));
  assert!((detections[0]["distance_cm"].as_f64().unwrap() - 130.0).abs() < 1e-3);
}

#[tokio::test]
async fn predict_frame_without_frame_field_is_bad_request() {
  let response = app()
    .oneshot(multipart_request("image", &png_bytes()))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::BAD_REQUEST);
  assert!(json_body(response).await["error"].is_string());
}

#[tokio::test]
async fn undecodable_frame_is_server_error() {
  let response = app()
    .oneshot(multipart_request("frame", b"not an image"))
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
  assert!(json_body(response).await["error"].is_string());
}

#[tokio::test]
async fn video_feed_without_camera_is_empty_stream() {
  let response = app()
    .oneshot(
      Request::builder()
        .uri("/video_feed")
        .body(Body::empty())
        .unwrap(),
    )
    .await
    .unwrap();
  assert_eq!(response.status(), StatusCode::OK);
  assert_eq!(
    response.headers()[header::CONTENT_TYPE],
    "multipart/x-mixed-replace; boundary=frame"
  );

  let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
    .await
    .unwrap();
  assert!(bytes.is_empty());
}
