// 该文件是 Fangwei （方位） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

//! # 非极大值抑制
//!
//! 与类别无关的贪心抑制，置信度相同时保持解码顺序。
//! 对自身的输出再次执行时结果不变。

use crate::model::Detection;

/// 贪心 IoU 抑制，与类别无关
///
/// 先按 `score_threshold` 重新过滤，再按置信度降序（稳定排序）依次保留，
/// 与已保留框 IoU 超过 `overlap_threshold` 的候选被丢弃。
/// 返回保留项在输入中的下标，升序排列。
pub fn suppress(candidates: &[Detection], score_threshold: f32, overlap_threshold: f32) -> Vec<usize> {
  let mut order: Vec<usize> = (0..candidates.len())
    .filter(|&i| candidates[i].confidence > score_threshold)
    .collect();
  order.sort_by(|&a, &b| {
    candidates[b]
      .confidence
      .total_cmp(&candidates[a].confidence)
  });

  let mut kept: Vec<usize> = Vec::with_capacity(order.len());
  for i in order {
    let bbox = &candidates[i].bbox;
    let overlapped = kept
      .iter()
      .any(|&k| candidates[k].bbox.iou(bbox) > overlap_threshold);
    if !overlapped {
      kept.push(i);
    }
  }

  kept.sort_unstable();
  kept
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{Bearing, BoundingBox};

  fn det(x: i32, y: i32, w: i32, h: i32, confidence: f32) -> Detection {
    Detection {
      bbox: BoundingBox::new(x, y, w, h),
      class_id: 0,
      confidence,
      bearing: Bearing::default(),
    }
  }

  #[test]
  fn keeps_the_stronger_of_two_overlapping_boxes() {
    let candidates = vec![det(10, 10, 100, 100, 0.4), det(12, 12, 100, 100, 0.9)];
    assert_eq!(suppress(&candidates, 0.3, 0.3), vec![1]);
  }

  #[test]
  fn disjoint_boxes_survive_in_decode_order() {
    let candidates = vec![
      det(0, 0, 10, 10, 0.6),
      det(100, 100, 10, 10, 0.9),
      det(200, 0, 10, 10, 0.7),
    ];
    assert_eq!(suppress(&candidates, 0.5, 0.3), vec![0, 1, 2]);
  }

  #[test]
  fn idempotent() {
    let candidates = vec![
      det(0, 0, 50, 50, 0.8),
      det(5, 5, 50, 50, 0.7),
      det(200, 200, 30, 30, 0.6),
      det(210, 205, 30, 30, 0.95),
      det(400, 0, 10, 10, 0.55),
    ];
    let first = suppress(&candidates, 0.5, 0.3);
    let survivors: Vec<Detection> = first.iter().map(|&i| candidates[i].clone()).collect();
    let second = suppress(&survivors, 0.5, 0.3);
    assert_eq!(second, (0..survivors.len()).collect::<Vec<_>>());
  }

  #[test]
  fn equal_scores_prefer_earlier_candidate() {
    let candidates = vec![det(0, 0, 10, 10, 0.7), det(1, 1, 10, 10, 0.7)];
    assert_eq!(suppress(&candidates, 0.5, 0.3), vec![0]);
  }

  #[test]
  fn score_floor_is_reapplied() {
    let candidates = vec![det(0, 0, 10, 10, 0.5), det(50, 50, 10, 10, 0.2)];
    assert!(suppress(&candidates, 0.5, 0.3).is_empty());
    assert!(suppress(&[], 0.5, 0.3).is_empty());
  }

  #[test]
  fn overlap_at_threshold_is_kept() {
    // IoU = 50 / 150
    let candidates = vec![det(0, 0, 10, 10, 0.9), det(5, 0, 10, 10, 0.8)];
    assert_eq!(suppress(&candidates, 0.5, 0.5), vec![0, 1]);
    assert_eq!(suppress(&candidates, 0.5, 0.3), vec![0]);
  }

  #[test]
  fn class_agnostic() {
    let mut a = det(0, 0, 10, 10, 0.9);
    let mut b = det(0, 0, 10, 10, 0.8);
    a.class_id = 1;
    b.class_id = 2;
    assert_eq!(suppress(&[a, b], 0.5, 0.3), vec![0]);
  }
}
