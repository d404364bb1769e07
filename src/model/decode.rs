// 该文件是 Fangwei （方位） 项目的一部分。
// src/model/decode.rs - 输出解码与方位角计算
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

//! # 检测结果解码
//!
//! 每个输出单元为 `(cx, cy, w, h, objectness, scores...)`，坐标归一化到 [0, 1]。
//! 取分数最大的类别，置信度严格大于阈值才保留。
//!
//! 像素坐标：
//!
//! - `center_x = trunc(cx * W)`，`width = trunc(w * W)`，纵向同理
//! - `x = trunc(center_x - width / 2)`，`y = trunc(center_y - height / 2)`
//!
//! 方位角以画面中心为视轴，向左为正：
//!
//! - `left  = round2((W / 2 - (center_x - width / 2)) * angle_scale)`
//! - `right = round2((W / 2 - (center_x + width / 2)) * angle_scale)`
//!
//! 例如 1280 宽的画面中居中、宽 320 像素的目标，默认系数下为 `4.05` 与 `-4.05`。

use crate::model::{Bearing, BoundingBox, CELL_HEADER_LEN, Detection, RawOutput};

/// 每像素对应的水平角度（度）
pub const DEFAULT_ANGLE_SCALE: f64 = 0.02532;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeParams {
  /// 置信度阈值，严格大于才保留
  pub confidence: f32,
  /// 每像素角度
  pub angle_scale: f64,
}

impl Default for DecodeParams {
  fn default() -> Self {
    Self {
      confidence: 0.5,
      angle_scale: DEFAULT_ANGLE_SCALE,
    }
  }
}

/// 把原始输出解码为候选检测结果，保持层内、层间的原始顺序
pub fn decode(
  raw: &RawOutput,
  frame_width: u32,
  frame_height: u32,
  params: &DecodeParams,
) -> Vec<Detection> {
  let width = frame_width as f64;
  let height = frame_height as f64;

  raw
    .layers
    .iter()
    .flat_map(|layer| layer.cells())
    .filter_map(|cell| decode_cell(cell, width, height, params))
    .collect()
}

fn decode_cell(cell: &[f32], frame_width: f64, frame_height: f64, params: &DecodeParams) -> Option<Detection> {
  let (class_id, confidence) = argmax(&cell[CELL_HEADER_LEN..])?;
  if !(confidence > params.confidence) {
    return None;
  }

  // `as` 向零截断
  let center_x = (cell[0] as f64 * frame_width) as i32;
  let center_y = (cell[1] as f64 * frame_height) as i32;
  let width = (cell[2] as f64 * frame_width) as i32;
  let height = (cell[3] as f64 * frame_height) as i32;

  let bbox = BoundingBox {
    x: (center_x as f64 - width as f64 / 2.0) as i32,
    y: (center_y as f64 - height as f64 / 2.0) as i32,
    width,
    height,
  };

  Some(Detection {
    bbox,
    class_id,
    confidence,
    bearing: bearing(center_x, width, frame_width, params.angle_scale),
  })
}

/// 第一个最大值胜出
fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
  let mut iter = scores.iter().copied().enumerate();
  let first = iter.next()?;
  Some(iter.fold(first, |best, (i, s)| if s > best.1 { (i, s) } else { best }))
}

/// 由未裁剪的框计算左右边缘的方位角，保留两位小数
pub fn bearing(center_x: i32, width: i32, frame_width: f64, angle_scale: f64) -> Bearing {
  let boresight = frame_width / 2.0;
  let half = width as f64 / 2.0;
  Bearing {
    left: round2((boresight - (center_x as f64 - half)) * angle_scale),
    right: round2((boresight - (center_x as f64 + half)) * angle_scale),
  }
}

fn round2(value: f64) -> f64 {
  (value * 100.0).round() / 100.0
}
