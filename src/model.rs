// 该文件是 Fangwei （方位） 项目的一部分。
// src/model.rs - 模型与检测结果
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

use image::Rgb;
use thiserror::Error;

use crate::frame::NchwBlob;

/// 模型输入边长
pub const MODEL_INPUT_SIZE: u32 = 416;

/// 模型输入张量
pub type ModelInput = NchwBlob<MODEL_INPUT_SIZE, MODEL_INPUT_SIZE>;

/// 每个输出单元中类别分数之前的列数：cx, cy, w, h, objectness
pub const CELL_HEADER_LEN: usize = 5;

/// 外部推理后端
///
/// 实现者只负责前向计算，预处理与后处理都在本库中完成。
pub trait Inference {
  type Error: std::error::Error + Send + Sync + 'static;

  fn forward(&self, input: &ModelInput) -> Result<RawOutput, Self::Error>;
}

impl<T: Inference + ?Sized> Inference for &T {
  type Error = T::Error;

  fn forward(&self, input: &ModelInput) -> Result<RawOutput, Self::Error> {
    (**self).forward(input)
  }
}

/// 类别名称与颜色查询
pub trait LabelLookup {
  fn label_name(&self, class_id: usize) -> &str;
  fn label_color(&self, class_id: usize) -> Rgb<u8>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
  #[error("输出层列数过少: {stride}（至少需要 {}）", CELL_HEADER_LEN + 1)]
  StrideTooSmall { stride: usize },
  #[error("输出层数据长度 {len} 不是列数 {stride} 的整数倍")]
  RaggedLayer { len: usize, stride: usize },
}

/// 单个输出层，按行存放的二维矩阵
///
/// 每一行为 `(cx, cy, w, h, objectness, scores...)`，坐标归一化到 [0, 1]。
#[derive(Debug, Clone, PartialEq)]
pub struct OutputLayer {
  data: Vec<f32>,
  stride: usize,
}

impl OutputLayer {
  pub fn new(data: Vec<f32>, stride: usize) -> Result<Self, ModelError> {
    if stride <= CELL_HEADER_LEN {
      return Err(ModelError::StrideTooSmall { stride });
    }
    if data.len() % stride != 0 {
      return Err(ModelError::RaggedLayer {
        len: data.len(),
        stride,
      });
    }
    Ok(Self { data, stride })
  }

  pub fn stride(&self) -> usize {
    self.stride
  }

  pub fn class_count(&self) -> usize {
    self.stride - CELL_HEADER_LEN
  }

  pub fn len(&self) -> usize {
    self.data.len() / self.stride
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn cells(&self) -> impl Iterator<Item = &[f32]> {
    self.data.chunks_exact(self.stride)
  }
}

/// 模型原始输出
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawOutput {
  pub layers: Vec<OutputLayer>,
}

impl RawOutput {
  pub fn new(layers: Vec<OutputLayer>) -> Self {
    Self { layers }
  }

  pub fn cell_count(&self) -> usize {
    self.layers.iter().map(OutputLayer::len).sum()
  }
}

/// 像素坐标下的边界框，左上角加宽高，不做裁剪
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BoundingBox {
  pub x: i32,
  pub y: i32,
  pub width: i32,
  pub height: i32,
}

impl BoundingBox {
  pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
    Self {
      x,
      y,
      width,
      height,
    }
  }

  pub fn area(&self) -> i64 {
    if self.width <= 0 || self.height <= 0 {
      return 0;
    }
    self.width as i64 * self.height as i64
  }

  pub fn intersection_area(&self, other: &BoundingBox) -> i64 {
    let x1 = self.x.max(other.x) as i64;
    let y1 = self.y.max(other.y) as i64;
    let x2 = (self.x as i64 + self.width as i64).min(other.x as i64 + other.width as i64);
    let y2 = (self.y as i64 + self.height as i64).min(other.y as i64 + other.height as i64);
    if x2 <= x1 || y2 <= y1 {
      return 0;
    }
    (x2 - x1) * (y2 - y1)
  }

  /// 交并比，并集为零时返回 0
  pub fn iou(&self, other: &BoundingBox) -> f32 {
    let inter = self.intersection_area(other);
    let union = self.area() + other.area() - inter;
    if union <= 0 {
      return 0.0;
    }
    (inter as f64 / union as f64) as f32
  }
}

/// 方位角（度），正值表示位于视轴左侧
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bearing {
  pub left: f64,
  pub right: f64,
}

/// 一个检测结果
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub bbox: BoundingBox,
  pub class_id: usize,
  pub confidence: f32,
  pub bearing: Bearing,
}

pub mod blob;
pub mod decode;
pub mod detector;
pub mod labels;
pub mod nms;

#[cfg(feature = "onnx_model")]
mod onnx;
#[cfg(feature = "onnx_model")]
pub use self::onnx::{OnnxModelError, OnnxYolo, WEIGHTS_FILE};

pub use self::blob::{ChannelOrder, to_blob};
pub use self::decode::{DEFAULT_ANGLE_SCALE, DecodeParams, decode};
pub use self::detector::{Detector, DetectorError};
pub use self::labels::{LabelError, Labels};
pub use self::nms::suppress;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn layer_rejects_short_rows() {
    assert_eq!(
      OutputLayer::new(vec![0.0; 5], 5),
      Err(ModelError::StrideTooSmall { stride: 5 })
    );
    assert_eq!(
      OutputLayer::new(vec![0.0; 7], 6),
      Err(ModelError::RaggedLayer { len: 7, stride: 6 })
    );
  }

  #[test]
  fn layer_iterates_cells() {
    let layer = OutputLayer::new((0..12).map(|v| v as f32).collect(), 6).unwrap();
    assert_eq!(layer.len(), 2);
    assert_eq!(layer.class_count(), 1);
    let cells: Vec<_> = layer.cells().collect();
    assert_eq!(cells[1][0], 6.0);
    assert!(OutputLayer::new(Vec::new(), 6).unwrap().is_empty());
  }

  #[test]
  fn iou_of_identical_and_disjoint_boxes() {
    let a = BoundingBox::new(0, 0, 10, 10);
    let b = BoundingBox::new(20, 20, 10, 10);
    assert_eq!(a.iou(&a), 1.0);
    assert_eq!(a.iou(&b), 0.0);
  }

  #[test]
  fn iou_of_half_overlap() {
    let a = BoundingBox::new(0, 0, 10, 10);
    let b = BoundingBox::new(5, 0, 10, 10);
    // 50 / 150
    assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
  }

  #[test]
  fn degenerate_boxes_have_zero_iou() {
    let a = BoundingBox::new(3, 3, 0, 0);
    assert_eq!(a.iou(&a), 0.0);
    let b = BoundingBox::new(3, 3, -4, 2);
    assert_eq!(b.area(), 0);
  }
}
