// 该文件是 Fangwei （方位） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理后端
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

//! # ONNX Runtime 推理后端
//!
//! 模型目录中需包含 `yolov3.onnx`。输入为 `[1, 3, 416, 416]` 的浮点张量，
//! 每个输出张量的最后一维是单元长度，其余维度展平为单元数，
//! 依输出顺序组成 [`RawOutput`] 的各层。

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use ort::{session::Session, value::Tensor};
use thiserror::Error;
use tracing::info;

use crate::model::{Inference, ModelError, ModelInput, OutputLayer, RawOutput};

/// 模型目录中的权重文件名
pub const WEIGHTS_FILE: &str = "yolov3.onnx";

#[derive(Error, Debug)]
pub enum OnnxModelError {
  #[error("权重文件不存在: {0}")]
  MissingWeights(PathBuf),
  #[error("ONNX Runtime 错误: {0}")]
  Runtime(#[from] ort::Error),
  #[error("输出张量形状无效: {0:?}")]
  InvalidShape(Vec<i64>),
  #[error("输出层错误: {0}")]
  Layer(#[from] ModelError),
  #[error("推理会话锁已损坏")]
  Poisoned,
}

/// 基于 ONNX Runtime 的 YOLO 推理
///
/// 会话的 `run` 需要可变借用，这里用互斥锁串行化调用。
pub struct OnnxYolo {
  session: Mutex<Session>,
}

impl OnnxYolo {
  pub fn load(path: impl AsRef<Path>) -> Result<Self, OnnxModelError> {
    let path = path.as_ref();
    if !path.is_file() {
      return Err(OnnxModelError::MissingWeights(path.to_path_buf()));
    }

    let session = Session::builder()?.commit_from_file(path)?;
    info!("已加载 ONNX 模型: {}", path.display());
    Ok(Self {
      session: Mutex::new(session),
    })
  }

  /// 从模型目录加载 `yolov3.onnx`
  pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self, OnnxModelError> {
    Self::load(dir.as_ref().join(WEIGHTS_FILE))
  }
}

impl Inference for OnnxYolo {
  type Error = OnnxModelError;

  fn forward(&self, input: &ModelInput) -> Result<RawOutput, Self::Error> {
    let tensor = Tensor::from_array((input.shape(), input.as_slice().to_vec()))?;

    let mut session = self
      .session
      .lock()
      .map_err(|_| OnnxModelError::Poisoned)?;
    let outputs = session.run(ort::inputs![tensor])?;

    let mut layers = Vec::with_capacity(outputs.len());
    for value in outputs.values() {
      let (shape, data) = value.try_extract_tensor::<f32>()?;
      let stride = match shape.last() {
        Some(&dim) if dim > 0 => dim as usize,
        _ => return Err(OnnxModelError::InvalidShape(shape.to_vec())),
      };
      layers.push(OutputLayer::new(data.to_vec(), stride)?);
    }

    Ok(RawOutput::new(layers))
  }
}
