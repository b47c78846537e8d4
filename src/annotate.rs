// 该文件是 Pingzi （瓶子） 项目的一部分。
// src/annotate.rs - 检测结果标注与测距
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

use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{config::LiveConfig, distance::DistanceEstimator, model::DetectResult};

/// 低于该置信度的检测结果不绘制也不上报
pub const CONFIDENCE_THRESHOLD: f32 = 0.8;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_OFFSET: i32 = 10;

const SYSTEM_FONTS: [&str; 4] = [
  "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
  "/usr/share/fonts/TTF/DejaVuSans.ttf",
  "/usr/share/fonts/dejavu/DejaVuSans.ttf",
  "/System/Library/Fonts/Supplemental/Arial.ttf",
];

/// 单个检测结果，可直接序列化为 JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
  pub label: String,
  pub confidence: f32,
  /// 估计距离（厘米），无法估计时为 -1
  pub distance_cm: f32,
  /// 像素坐标 [x1, y1, x2, y2]
  pub bbox: [i32; 4],
}

/// 帧标注器
///
/// 过滤低置信度结果，估计距离，在帧上绘制边框与文字。
#[derive(Clone)]
pub struct Annotator {
  class_names: Vec<String>,
  estimator: DistanceEstimator,
  font: Option<FontArc>,
  font_scale: PxScale,
}

impl Annotator {
  pub fn new(class_names: Vec<String>, estimator: DistanceEstimator) -> Self {
    Self {
      class_names,
      estimator,
      font: None,
      font_scale: PxScale::from(LABEL_FONT_SIZE),
    }
  }

  pub fn from_config(config: &LiveConfig) -> Self {
    Self::new(config.class_names.clone(), DistanceEstimator::from(config))
      .with_font(load_font(config.font.as_deref()))
  }

  pub fn with_font(mut self, font: Option<FontArc>) -> Self {
    self.font = font;
    self
  }

  pub fn class_name(&self, class_id: u32) -> String {
    self
      .class_names
      .get(class_id as usize)
      .cloned()
      .unwrap_or_else(|| format!("class_{}", class_id))
  }

  /// 在 `image` 上绘制并返回保留下来的检测结果
  pub fn annotate(&self, image: &mut RgbImage, result: &DetectResult) -> Vec<Detection> {
    let mut detections = Vec::new();

    for item in result.iter() {
      if item.score < CONFIDENCE_THRESHOLD {
        continue;
      }

      let [x1, y1, x2, y2] = item.bbox.map(|v| v as i32);
      let pixel_width = item.bbox[2].trunc() - item.bbox[0].trunc();
      let distance_cm = self.estimator.estimate(pixel_width);
      let name = self.class_name(item.class_id);
      let label = format!("{} {:.2}, {:.1}cm", name, item.score, distance_cm);

      let [cx1, cy1, cx2, cy2] = clamp_to_frame(image, [x1, y1, x2, y2]);
      self.draw_box(image, [cx1, cy1, cx2, cy2]);
      if let Some(font) = &self.font {
        draw_text_mut(
          image,
          BOX_COLOR,
          cx1,
          cy1 - LABEL_OFFSET - LABEL_FONT_SIZE as i32,
          self.font_scale,
          font,
          &label,
        );
      }
      debug!("{}", label);

      detections.push(Detection {
        label: name,
        confidence: item.score,
        distance_cm,
        bbox: [x1, y1, x2, y2],
      });
    }

    detections
  }

  /// 2 像素宽的边框，角点包含在内
  fn draw_box(&self, image: &mut RgbImage, [x1, y1, x2, y2]: [i32; 4]) {
    if x2 <= x1 || y2 <= y1 {
      return;
    }

    let width = (x2 - x1 + 1) as u32;
    let height = (y2 - y1 + 1) as u32;
    draw_hollow_rect_mut(image, Rect::at(x1, y1).of_size(width, height), BOX_COLOR);
    if width > 2 && height > 2 {
      draw_hollow_rect_mut(
        image,
        Rect::at(x1 + 1, y1 + 1).of_size(width - 2, height - 2),
        BOX_COLOR,
      );
    }
  }
}

/// 把角点限制在帧外 2 像素以内，画面外的边仍然落在画面外
fn clamp_to_frame(image: &RgbImage, [x1, y1, x2, y2]: [i32; 4]) -> [i32; 4] {
  let max_x = image.width().min(i32::MAX as u32 - 2) as i32 + 1;
  let max_y = image.height().min(i32::MAX as u32 - 2) as i32 + 1;
  [
    x1.clamp(-2, max_x),
    y1.clamp(-2, max_y),
    x2.clamp(-2, max_x),
    y2.clamp(-2, max_y),
  ]
}

/// 加载标注字体：优先使用配置的路径，其次在系统常见位置查找
///
/// 找不到字体时返回 `None`，此时只绘制边框。
pub fn load_font(path: Option<&Path>) -> Option<FontArc> {
  if let Some(path) = path {
    match read_font(path) {
      Some(font) => return Some(font),
      None => warn!("无法加载字体 {}, 尝试系统字体", path.display()),
    }
  }

  let font = SYSTEM_FONTS
    .iter()
    .find_map(|candidate| read_font(Path::new(candidate)));
  if font.is_none() {
    warn!("未找到可用字体, 标注将不显示文字");
  }
  font
}

fn read_font(path: &Path) -> Option<FontArc> {
  let data = std::fs::read(path).ok()?;
  let font = FontArc::try_from_vec(data).ok()?;
  debug!("使用字体: {}", path.display());
  Some(font)
}
