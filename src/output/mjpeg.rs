// 该文件是 Pingzi （瓶子） 项目的一部分。
// src/output/mjpeg.rs - MJPEG 分块编码
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

//! `multipart/x-mixed-replace` 视频流的分块格式。
//!
//! 每一块为：
//!
//! ```text
//! --frame\r\n
//! Content-Type: image/jpeg\r\n
//! \r\n
//! <JPEG 数据>\r\n
//! ```

use std::io::Cursor;

use image::{ImageFormat, RgbImage};

use crate::{Error, Result};

pub const MJPEG_BOUNDARY: &str = "frame";
pub const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const CHUNK_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
const CHUNK_TRAILER: &[u8] = b"\r\n";

pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>> {
  let mut buf = Vec::new();
  image
    .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
    .map_err(|e| Error::Encode(format!("JPEG 编码失败: {}", e)))?;
  Ok(buf)
}

/// 将一帧编码为一个完整的 MJPEG 分块
pub fn mjpeg_chunk(image: &RgbImage) -> Result<Vec<u8>> {
  let jpeg = encode_jpeg(image)?;
  let mut chunk = Vec::with_capacity(CHUNK_HEADER.len() + jpeg.len() + CHUNK_TRAILER.len());
  chunk.extend_from_slice(CHUNK_HEADER);
  chunk.extend_from_slice(&jpeg);
  chunk.extend_from_slice(CHUNK_TRAILER);
  Ok(chunk)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn chunk_is_framed() {
    let chunk = mjpeg_chunk(&RgbImage::new(8, 8)).unwrap();
    assert!(chunk.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
    assert!(chunk.ends_with(b"\r\n"));

    let jpeg = &chunk[CHUNK_HEADER.len()..chunk.len() - CHUNK_TRAILER.len()];
    // JPEG SOI / EOI
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
  }

  #[test]
  fn content_type_names_boundary() {
    assert!(MJPEG_CONTENT_TYPE.ends_with(&format!("boundary={}", MJPEG_BOUNDARY)));
  }
}
