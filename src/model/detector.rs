// 该文件是 Fangwei （方位） 项目的一部分。
// src/model/detector.rs - 检测器
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

use std::time::Instant;

use image::RgbImage;
use thiserror::Error;
use tracing::debug;

use crate::model::{
  Inference, MODEL_INPUT_SIZE, RawOutput,
  blob::{ChannelOrder, to_blob},
};

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("输入帧为空: {width}x{height}")]
  EmptyFrame { width: u32, height: u32 },
  #[error("推理失败: {0}")]
  Inference(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// 检测器：预处理后同步调用推理后端
pub struct Detector<M> {
  model: M,
  channel_order: ChannelOrder,
}

impl<M: Inference> Detector<M> {
  pub fn new(model: M) -> Self {
    Self {
      model,
      channel_order: ChannelOrder::default(),
    }
  }

  pub fn with_channel_order(mut self, channel_order: ChannelOrder) -> Self {
    self.channel_order = channel_order;
    self
  }

  pub fn model(&self) -> &M {
    &self.model
  }

  /// 对一帧执行推理，返回未经修改的原始输出
  pub fn infer(&self, image: &RgbImage) -> Result<RawOutput, DetectorError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(DetectorError::EmptyFrame { width, height });
    }

    let now = Instant::now();
    let blob = to_blob::<MODEL_INPUT_SIZE, MODEL_INPUT_SIZE>(image, self.channel_order);
    let preprocess = now.elapsed();

    let output = self
      .model
      .forward(&blob)
      .map_err(|e| DetectorError::Inference(Box::new(e)))?;
    debug!(
      "预处理耗时: {:.2?}，推理耗时: {:.2?}，输出 {} 层 {} 个单元",
      preprocess,
      now.elapsed() - preprocess,
      output.layers.len(),
      output.cell_count()
    );

    Ok(output)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{ModelInput, OutputLayer};
  use image::Rgb;
  use std::sync::Mutex;

  #[derive(Default)]
  struct Probe {
    seen: Mutex<Vec<[usize; 4]>>,
    first_value: Mutex<Option<f32>>,
  }

  #[derive(Debug, thiserror::Error)]
  #[error("probe failure")]
  struct ProbeError;

  impl Inference for Probe {
    type Error = ProbeError;

    fn forward(&self, input: &ModelInput) -> Result<RawOutput, Self::Error> {
      self.seen.lock().unwrap().push(input.shape());
      *self.first_value.lock().unwrap() = input.as_slice().first().copied();
      Ok(RawOutput::new(vec![
        OutputLayer::new(vec![0.5, 0.5, 0.1, 0.1, 1.0, 0.9], 6).unwrap(),
      ]))
    }
  }

  struct Failing;

  impl Inference for Failing {
    type Error = ProbeError;

    fn forward(&self, _input: &ModelInput) -> Result<RawOutput, Self::Error> {
      Err(ProbeError)
    }
  }

  #[test]
  fn forwards_square_blob_and_returns_output_untouched() {
    let detector = Detector::new(Probe::default());
    let image = RgbImage::from_pixel(1280, 720, Rgb([255, 255, 255]));
    let output = detector.infer(&image).unwrap();
    assert_eq!(output.cell_count(), 1);
    assert_eq!(
      detector.model().seen.lock().unwrap().as_slice(),
      &[[1, 3, 416, 416]]
    );
    assert_eq!(*detector.model().first_value.lock().unwrap(), Some(1.0));
  }

  #[test]
  fn rejects_empty_frames() {
    let detector = Detector::new(Probe::default());
    let image = RgbImage::new(0, 0);
    assert!(matches!(
      detector.infer(&image),
      Err(DetectorError::EmptyFrame { .. })
    ));
  }

  #[test]
  fn inference_errors_are_boxed() {
    let detector = Detector::new(Failing);
    let image = RgbImage::new(8, 8);
    let err = detector.infer(&image).unwrap_err();
    assert!(matches!(err, DetectorError::Inference(_)));
    assert!(err.to_string().contains("probe failure"));
  }
}
