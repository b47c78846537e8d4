// 该文件是 Pingzi （瓶子） 项目的一部分。
// src/distance.rs - 单目测距
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

use tracing::{debug, warn};

use crate::config::LiveConfig;

/// 无法估计距离时返回的哨兵值
pub const INVALID_DISTANCE: f32 = -1.0;

/// 针孔相机模型测距
///
/// `distance = known_width * focal_length / pixel_width`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistanceEstimator {
  pub known_width_cm: f32,
  pub focal_length_px: f32,
}

impl Default for DistanceEstimator {
  fn default() -> Self {
    Self {
      known_width_cm: 13.0,
      focal_length_px: 1080.0,
    }
  }
}

impl From<&LiveConfig> for DistanceEstimator {
  fn from(config: &LiveConfig) -> Self {
    Self::new(config.known_width_cm, config.focal_length_px)
  }
}

impl DistanceEstimator {
  pub fn new(known_width_cm: f32, focal_length_px: f32) -> Self {
    Self {
      known_width_cm,
      focal_length_px,
    }
  }

  /// 估计距离（厘米），像素宽度非正或非有限值时返回 [`INVALID_DISTANCE`]
  pub fn estimate(&self, pixel_width: f32) -> f32 {
    if !pixel_width.is_finite() || pixel_width <= 0.0 {
      warn!("像素宽度无效: {}, 无法估计距离", pixel_width);
      return INVALID_DISTANCE;
    }

    let distance = (self.known_width_cm * self.focal_length_px) / pixel_width;
    debug!("像素宽度 {} -> 距离 {:.2} cm", pixel_width, distance);
    distance
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_relative_eq;

  #[test]
  fn default_calibration() {
    let estimator = DistanceEstimator::default();
    assert_relative_eq!(estimator.estimate(108.0), 130.0);
    assert_relative_eq!(estimator.estimate(1080.0), 13.0);
  }

  #[test]
  fn non_positive_width_is_sentinel() {
    let estimator = DistanceEstimator::default();
    assert_eq!(estimator.estimate(0.0), INVALID_DISTANCE);
    assert_eq!(estimator.estimate(-5.0), INVALID_DISTANCE);
  }

  #[test]
  fn non_finite_width_is_sentinel() {
    let estimator = DistanceEstimator::default();
    assert_eq!(estimator.estimate(f32::INFINITY), INVALID_DISTANCE);
    assert_eq!(estimator.estimate(f32::NAN), INVALID_DISTANCE);
  }

  #[test]
  fn distance_shrinks_as_width_grows() {
    let estimator = DistanceEstimator::new(7.0, 900.0);
    assert!(estimator.estimate(50.0) > estimator.estimate(100.0));
  }

  #[test]
  fn built_from_live_config() {
    let config = LiveConfig {
      known_width_cm: 10.0,
      focal_length_px: 500.0,
      ..LiveConfig::default()
    };
    let estimator = DistanceEstimator::from(&config);
    assert_relative_eq!(estimator.estimate(50.0), 100.0);
  }
}
