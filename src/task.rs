// 该文件是 Fangwei （方位） 项目的一部分。
// src/task.rs - 逐帧处理任务
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

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  frame::Frame,
  input::InputError,
  model::{
    DEFAULT_ANGLE_SCALE, DecodeParams, Detector, DetectorError, Inference, LabelLookup, decode,
    suppress,
  },
  output::{Annotator, Sink, SinkError, VideoBackend},
  shutdown::{Outcome, ShutdownController},
};

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("置信度阈值必须在 [0, 1] 内: {0}")]
  Confidence(f32),
  #[error("NMS 阈值必须在 [0, 1] 内: {0}")]
  NmsThreshold(f32),
  #[error("角度系数必须为有限正数: {0}")]
  AngleScale(f64),
}

/// 每次运行的检测参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineConfig {
  pub confidence: f32,
  pub nms_threshold: f32,
  pub angle_scale: f64,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      confidence: 0.5,
      nms_threshold: 0.3,
      angle_scale: DEFAULT_ANGLE_SCALE,
    }
  }
}

impl PipelineConfig {
  pub fn validate(self) -> Result<Self, ConfigError> {
    if !(0.0..=1.0).contains(&self.confidence) {
      return Err(ConfigError::Confidence(self.confidence));
    }
    if !(0.0..=1.0).contains(&self.nms_threshold) {
      return Err(ConfigError::NmsThreshold(self.nms_threshold));
    }
    if !self.angle_scale.is_finite() || self.angle_scale <= 0.0 {
      return Err(ConfigError::AngleScale(self.angle_scale));
    }
    Ok(self)
  }

  pub fn decode_params(&self) -> DecodeParams {
    DecodeParams {
      confidence: self.confidence,
      angle_scale: self.angle_scale,
    }
  }
}

#[derive(Error, Debug)]
pub enum TaskError {
  #[error("输入错误: {0}")]
  Input(#[from] InputError),
  #[error("检测错误: {0}")]
  Detector(#[from] DetectorError),
  #[error("输出错误: {0}")]
  Sink(#[from] SinkError),
}

/// 一次运行需要的全部对象
///
/// 输出与退出控制器以 `Arc` 共享，中断看门狗持有同一份引用。
pub struct PipelineContext<M, L, B: VideoBackend> {
  pub config: PipelineConfig,
  pub detector: Detector<M>,
  pub labels: L,
  pub annotator: Annotator,
  pub sink: Arc<Sink<B>>,
  pub shutdown: Arc<ShutdownController>,
}

impl<M, L, B> PipelineContext<M, L, B>
where
  M: Inference,
  L: LabelLookup,
  B: VideoBackend,
{
  fn interrupted(&self) -> bool {
    self.shutdown.is_requested()
  }

  /// 处理一帧；返回 `None` 表示在阶段之间观察到中断
  fn process(&self, frame: Frame) -> Result<Option<usize>, TaskError> {
    let now = Instant::now();
    let raw = self.detector.infer(&frame.image)?;
    if self.interrupted() {
      return Ok(None);
    }

    let candidates = decode(
      &raw,
      frame.width(),
      frame.height(),
      &self.config.decode_params(),
    );
    let kept: Vec<_> = suppress(
      &candidates,
      self.config.confidence,
      self.config.nms_threshold,
    )
    .into_iter()
    .map(|i| candidates[i].clone())
    .collect();
    debug!(
      "第 {} 帧: 候选 {} 个，保留 {} 个",
      frame.index,
      candidates.len(),
      kept.len()
    );
    if self.interrupted() {
      return Ok(None);
    }

    let index = frame.index;
    let mut image = frame.image;
    self.annotator.annotate(&mut image, &kept, &self.labels);
    if self.interrupted() {
      return Ok(None);
    }

    self.sink.emit(&image)?;
    info!("第 {} 帧处理完成，耗时: {:.2?}", index, now.elapsed());
    Ok(Some(kept.len()))
  }

  fn close_after_error(&self) {
    if let Err(e) = self.sink.close() {
      error!("释放输出失败: {}", e);
    }
    self.shutdown.mark_terminated();
  }
}

/// 一次运行的统计
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
  pub frames: u64,
  pub detections: usize,
  pub outcome: Outcome,
}

pub trait Task<I, C>: Sized {
  type Error;
  fn run_task(self, input: I, context: &C) -> Result<RunSummary, Self::Error>;
}

#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<u64>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<u64>) -> Self {
    self.frame_number = frame_number;
    self
  }
}

impl<I, M, L, B> Task<I, PipelineContext<M, L, B>> for ContinuousTask
where
  I: Iterator<Item = Result<Frame, InputError>>,
  M: Inference,
  L: LabelLookup,
  B: VideoBackend,
{
  type Error = TaskError;

  fn run_task(
    self,
    mut input: I,
    context: &PipelineContext<M, L, B>,
  ) -> Result<RunSummary, Self::Error> {
    info!("开始任务...");
    let mut frames = 0u64;
    let mut detections = 0usize;

    let outcome = loop {
      if context.interrupted() {
        break Outcome::Interrupted;
      }
      if self.frame_number.is_some_and(|n| frames >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frames);
        break Outcome::Completed;
      }

      let frame = match input.next() {
        Some(Ok(frame)) => frame,
        Some(Err(e)) => {
          error!("读取输入失败: {}", e);
          context.close_after_error();
          return Err(e.into());
        }
        None => {
          info!("输入结束");
          break Outcome::Completed;
        }
      };
      if context.interrupted() {
        break Outcome::Interrupted;
      }

      match context.process(frame) {
        Ok(Some(count)) => {
          frames += 1;
          detections += count;
        }
        Ok(None) => break Outcome::Interrupted,
        Err(e) => {
          error!("处理帧失败: {}", e);
          context.close_after_error();
          return Err(e);
        }
      }
    };

    match outcome {
      Outcome::Interrupted => {
        warn!("中断信号接收，退出任务循环");
        context.shutdown.shut_down(context.sink.as_ref());
      }
      _ => {
        let released = context.sink.close();
        context.shutdown.mark_terminated();
        released?;
      }
    }

    let summary = RunSummary {
      frames,
      detections,
      outcome,
    };
    info!(
      "任务完成，共处理 {} 帧，检测到 {} 个目标",
      summary.frames, summary.detections
    );
    Ok(summary)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_config_is_valid() {
    let config = PipelineConfig::default().validate().unwrap();
    assert_eq!(config.confidence, 0.5);
    assert_eq!(config.nms_threshold, 0.3);
    assert_eq!(config.angle_scale, 0.02532);
  }

  #[test]
  fn out_of_range_config_is_rejected() {
    let config = PipelineConfig {
      confidence: 1.5,
      ..Default::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::Confidence(_))));

    let config = PipelineConfig {
      nms_threshold: -0.1,
      ..Default::default()
    };
    assert!(matches!(config.validate(), Err(ConfigError::NmsThreshold(_))));

    for angle_scale in [0.0, -1.0, f64::NAN, f64::INFINITY] {
      let config = PipelineConfig {
        angle_scale,
        ..Default::default()
      };
      assert!(matches!(config.validate(), Err(ConfigError::AngleScale(_))));
    }
  }

  #[test]
  fn decode_params_follow_config() {
    let config = PipelineConfig {
      confidence: 0.7,
      angle_scale: 0.1,
      ..Default::default()
    };
    let params = config.decode_params();
    assert_eq!(params.confidence, 0.7);
    assert_eq!(params.angle_scale, 0.1);
  }
}
