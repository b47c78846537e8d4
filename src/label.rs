// 该文件是 Pingzi （瓶子） 项目的一部分。
// src/label.rs - YOLO 标签文件编解码
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

//! # 标签编解码
//!
//! 每张图像对应一个同名 `.txt` 标签文件，每行一个目标：
//!
//! ```text
//! <class_id> <cx> <cy> <w> <h>
//! ```
//!
//! 坐标均为相对图像尺寸归一化到 [0, 1] 的中心点与宽高。
//! 类别编号可能被写成 `0.0` 这样的浮点形式，解析时会按浮点读取后向零截断。

use std::{fmt::Write as _, fs, path::Path};

use crate::{Context, Error, Result};

/// 标签文件扩展名
pub const LABEL_EXTENSION: &str = "txt";

/// 归一化边界框 (cx, cy, w, h)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormBox {
  pub cx: f32,
  pub cy: f32,
  pub w: f32,
  pub h: f32,
}

impl NormBox {
  pub fn new(cx: f32, cy: f32, w: f32, h: f32) -> Self {
    Self { cx, cy, w, h }
  }

  /// 转换为归一化角点 [x_min, y_min, x_max, y_max]
  pub fn to_xyxy(&self) -> [f32; 4] {
    [
      self.cx - self.w / 2.0,
      self.cy - self.h / 2.0,
      self.cx + self.w / 2.0,
      self.cy + self.h / 2.0,
    ]
  }

  /// 由归一化角点构造，不做裁剪
  pub fn from_xyxy(xyxy: [f32; 4]) -> Self {
    let [x_min, y_min, x_max, y_max] = xyxy;
    Self {
      cx: (x_min + x_max) / 2.0,
      cy: (y_min + y_max) / 2.0,
      w: x_max - x_min,
      h: y_max - y_min,
    }
  }
}

impl From<[f32; 4]> for NormBox {
  fn from(v: [f32; 4]) -> Self {
    NormBox::new(v[0], v[1], v[2], v[3])
  }
}

impl From<NormBox> for [f32; 4] {
  fn from(b: NormBox) -> Self {
    [b.cx, b.cy, b.w, b.h]
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabeledBox {
  pub bbox: NormBox,
  pub class_id: u32,
}

/// 单张图像的标注
///
/// 边界框与类别编号成对存储，两者长度一致、下标对齐。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Annotation {
  items: Vec<LabeledBox>,
}

impl Annotation {
  pub fn new(items: Vec<LabeledBox>) -> Self {
    Self { items }
  }

  /// 由两条平行序列构造，长度不一致时报错
  pub fn from_parallel(boxes: &[NormBox], class_ids: &[u32]) -> Result<Self> {
    if boxes.len() != class_ids.len() {
      return Err(Error::config(format!(
        "边界框数量 {} 与类别数量 {} 不一致",
        boxes.len(),
        class_ids.len()
      )));
    }

    let items = boxes
      .iter()
      .zip(class_ids)
      .map(|(bbox, class_id)| LabeledBox {
        bbox: *bbox,
        class_id: *class_id,
      })
      .collect();
    Ok(Self { items })
  }

  pub fn items(&self) -> &[LabeledBox] {
    &self.items
  }

  pub fn boxes(&self) -> Vec<NormBox> {
    self.items.iter().map(|item| item.bbox).collect()
  }

  pub fn class_ids(&self) -> Vec<u32> {
    self.items.iter().map(|item| item.class_id).collect()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn push(&mut self, bbox: NormBox, class_id: u32) {
    self.items.push(LabeledBox { bbox, class_id });
  }

  /// 解析标签文本，`path` 仅用于错误信息
  pub fn parse(text: &str, path: &Path) -> Result<Self> {
    let mut items = Vec::new();
    for (idx, line) in text.lines().enumerate() {
      if let Some(item) = parse_line(line, path, idx + 1)? {
        items.push(item);
      }
    }
    Ok(Self { items })
  }

  pub fn read(path: &Path) -> Result<Self> {
    let text =
      fs::read_to_string(path).with_context(|| format!("读取标签文件 {}", path.display()))?;
    Self::parse(&text, path)
  }

  /// 编码为标签文本，每个目标一行
  pub fn encode(&self) -> String {
    let mut out = String::new();
    for LabeledBox { bbox, class_id } in &self.items {
      // 写入 String 不会失败
      let _ = writeln!(
        out,
        "{} {} {} {} {}",
        class_id, bbox.cx, bbox.cy, bbox.w, bbox.h
      );
    }
    out
  }

  pub fn write(&self, path: &Path) -> Result<()> {
    fs::write(path, self.encode()).with_context(|| format!("写入标签文件 {}", path.display()))
  }
}

fn parse_line(line: &str, path: &Path, line_num: usize) -> Result<Option<LabeledBox>> {
  let trimmed = line.trim();
  if trimmed.is_empty() {
    return Ok(None);
  }

  let parse_error = |message: String| Error::LabelParse {
    path: path.to_path_buf(),
    line: line_num,
    message,
  };

  let tokens: Vec<&str> = trimmed.split_whitespace().take(6).collect();
  if tokens.len() != 5 {
    return Err(parse_error(format!("期望 5 个字段, 实际 {} 个", tokens.len())));
  }

  let class_id = tokens[0]
    .parse::<f64>()
    .ok()
    .filter(|v| v.is_finite() && *v >= 0.0 && *v <= u32::MAX as f64)
    .map(|v| v.trunc() as u32)
    .ok_or_else(|| parse_error(format!("无效的类别编号 '{}'", tokens[0])))?;

  let mut values = [0f32; 4];
  for (value, token) in values.iter_mut().zip(&tokens[1..]) {
    *value = token
      .parse::<f32>()
      .ok()
      .filter(|v| v.is_finite())
      .ok_or_else(|| parse_error(format!("无效的坐标 '{}'", token)))?;
  }

  Ok(Some(LabeledBox {
    bbox: NormBox::from(values),
    class_id,
  }))
}

/// 图像对应的标签文件名：同名主干加 `.txt`
pub fn label_file_name(image_name: &str) -> String {
  let stem = Path::new(image_name)
    .file_stem()
    .map(|s| s.to_string_lossy().into_owned())
    .unwrap_or_else(|| image_name.to_string());
  format!("{}.{}", stem, LABEL_EXTENSION)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample() -> Annotation {
    Annotation::from_parallel(
      &[
        NormBox::new(0.5, 0.25, 0.3, 0.1),
        NormBox::new(0.123_456_79, 0.9, 0.05, 0.333_333_34),
      ],
      &[0, 3],
    )
    .unwrap()
  }

  #[test]
  fn parses_float_looking_class_id() {
    let ann = Annotation::parse("0.0 0.5 0.5 0.2 0.4\n1.0 0.1 0.1 0.1 0.1\n", Path::new("a.txt"))
      .unwrap();
    assert_eq!(ann.class_ids(), vec![0, 1]);
    assert_eq!(ann.boxes()[0], NormBox::new(0.5, 0.5, 0.2, 0.4));
  }

  #[test]
  fn skips_blank_lines() {
    let ann = Annotation::parse("\n  \n0 0.5 0.5 0.2 0.4\n\n", Path::new("a.txt")).unwrap();
    assert_eq!(ann.len(), 1);
  }

  #[test]
  fn rejects_short_and_long_rows() {
    let err = Annotation::parse("0 0.1 0.2", Path::new("a.txt")).unwrap_err();
    assert!(matches!(err, Error::LabelParse { line: 1, .. }));

    let err = Annotation::parse("0 0.1 0.2 0.3 0.4\n0 0.1 0.2 0.3 0.4 0.5", Path::new("a.txt"))
      .unwrap_err();
    assert!(matches!(err, Error::LabelParse { line: 2, .. }));
  }

  #[test]
  fn rejects_negative_class_and_bad_coordinate() {
    assert!(Annotation::parse("-1 0.1 0.2 0.3 0.4", Path::new("a.txt")).is_err());
    assert!(Annotation::parse("0 0.1 abc 0.3 0.4", Path::new("a.txt")).is_err());
    assert!(Annotation::parse("0 0.1 NaN 0.3 0.4", Path::new("a.txt")).is_err());
  }

  #[test]
  fn encode_then_parse_is_lossless() {
    let ann = sample();
    let back = Annotation::parse(&ann.encode(), Path::new("a.txt")).unwrap();
    assert_eq!(back, ann);
  }

  #[test]
  fn empty_annotation_round_trips() {
    let ann = Annotation::default();
    assert_eq!(ann.encode(), "");
    let back = Annotation::parse(&ann.encode(), Path::new("a.txt")).unwrap();
    assert!(back.is_empty());
  }

  #[test]
  fn parallel_lists_must_align() {
    let err = Annotation::from_parallel(&[NormBox::new(0.5, 0.5, 0.1, 0.1)], &[]).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
  }

  #[test]
  fn file_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("img_001.txt");
    let ann = sample();
    ann.write(&path).unwrap();
    assert_eq!(Annotation::read(&path).unwrap(), ann);
  }

  #[test]
  fn label_name_follows_image_stem() {
    assert_eq!(label_file_name("img_001.jpg"), "img_001.txt");
    assert_eq!(label_file_name("a.b.png"), "a.b.txt");
  }

  #[test]
  fn xyxy_conversion_is_consistent() {
    let b = NormBox::new(0.5, 0.5, 0.2, 0.4);
    let back = NormBox::from_xyxy(b.to_xyxy());
    approx::assert_abs_diff_eq!(back.cx, b.cx, epsilon = 1e-6);
    approx::assert_abs_diff_eq!(back.h, b.h, epsilon = 1e-6);
  }
}
