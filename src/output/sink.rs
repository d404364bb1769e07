// 该文件是 Fangwei （方位） 项目的一部分。
// src/output/sink.rs - 帧输出汇
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

//! # 输出汇
//!
//! 第一帧到达时按其尺寸打开输出流，之后的帧按调用顺序写入。
//! 写入与关闭共用同一把锁，因此主循环与中断处理线程可以安全地并发调用，
//! 且输出流最多被释放一次。
//!
//! 状态转移：`Unopened -> Open -> Closed`，或 `Unopened -> Closed`。

use std::sync::{Mutex, MutexGuard, PoisonError};

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::output::{LiveDisplay, StreamSpec, VideoBackend, VideoStream};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum SinkError {
  #[error("输出已关闭")]
  Closed,
  #[error("帧尺寸 {actual:?} 与输出流尺寸 {expected:?} 不一致")]
  DimensionMismatch {
    expected: (u32, u32),
    actual: (u32, u32),
  },
  #[error("打开输出流失败: {0}")]
  Open(#[source] BoxError),
  #[error("写入输出流失败: {0}")]
  Write(#[source] BoxError),
  #[error("释放输出流失败: {0}")]
  Release(#[source] BoxError),
}

enum SinkState<S> {
  Unopened,
  Open {
    stream: S,
    spec: StreamSpec,
    frames: u64,
  },
  Closed,
}

struct SinkInner<S> {
  state: SinkState<S>,
  display: Option<Box<dyn LiveDisplay + Send>>,
}

pub struct Sink<B: VideoBackend> {
  backend: B,
  fps: u32,
  inner: Mutex<SinkInner<B::Stream>>,
}

impl<B: VideoBackend> Sink<B> {
  pub fn new(backend: B) -> Self {
    Self {
      backend,
      fps: crate::output::DEFAULT_FPS,
      inner: Mutex::new(SinkInner {
        state: SinkState::Unopened,
        display: None,
      }),
    }
  }

  pub fn with_fps(mut self, fps: u32) -> Self {
    self.fps = fps;
    self
  }

  /// 同时镜像到实时显示
  pub fn with_display(self, display: Box<dyn LiveDisplay + Send>) -> Self {
    self.lock().display = Some(display);
    self
  }

  // 锁中毒时沿用内部状态，保证关闭路径总能执行
  fn lock(&self) -> MutexGuard<'_, SinkInner<B::Stream>> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// 写入一帧；第一次调用时打开输出流
  pub fn emit(&self, frame: &RgbImage) -> Result<(), SinkError> {
    let mut inner = self.lock();
    let dimensions = frame.dimensions();

    if let SinkState::Unopened = inner.state {
      let mut spec = StreamSpec::new(dimensions.0, dimensions.1);
      spec.fps = self.fps;
      let stream = self
        .backend
        .open(&spec)
        .map_err(|e| SinkError::Open(Box::new(e)))?;
      info!(
        "输出流已打开: {}x{} @ {} fps, {}",
        spec.width,
        spec.height,
        spec.fps,
        spec.fourcc_str()
      );
      inner.state = SinkState::Open {
        stream,
        spec,
        frames: 0,
      };
    }

    let SinkState::Open {
      stream,
      spec,
      frames,
    } = &mut inner.state
    else {
      return Err(SinkError::Closed);
    };

    let expected = (spec.width, spec.height);
    if expected != dimensions {
      return Err(SinkError::DimensionMismatch {
        expected,
        actual: dimensions,
      });
    }
    stream
      .write(frame)
      .map_err(|e| SinkError::Write(Box::new(e)))?;
    *frames += 1;

    if let Some(display) = inner.display.as_mut() {
      if let Err(e) = display.show(frame) {
        warn!("实时显示失败，已忽略: {}", e);
      }
    }

    Ok(())
  }

  /// 刷新并释放输出流，可重复调用
  ///
  /// 返回本次调用是否真正释放了输出流。
  pub fn close(&self) -> Result<bool, SinkError> {
    let mut inner = self.lock();
    inner.display = None;

    match std::mem::replace(&mut inner.state, SinkState::Closed) {
      SinkState::Open { stream, frames, .. } => {
        stream
          .release()
          .map_err(|e| SinkError::Release(Box::new(e)))?;
        info!("输出流已释放，共写入 {} 帧", frames);
        Ok(true)
      }
      SinkState::Unopened => {
        debug!("输出流尚未打开，直接关闭");
        Ok(false)
      }
      SinkState::Closed => Ok(false),
    }
  }

  pub fn is_closed(&self) -> bool {
    matches!(self.lock().state, SinkState::Closed)
  }

  /// 输出流尺寸，未打开时为 `None`
  pub fn dimensions(&self) -> Option<(u32, u32)> {
    match &self.lock().state {
      SinkState::Open { spec, .. } => Some((spec.width, spec.height)),
      _ => None,
    }
  }

  pub fn frames_written(&self) -> u64 {
    match &self.lock().state {
      SinkState::Open { frames, .. } => *frames,
      _ => 0,
    }
  }
}
