// 该文件是 Fangwei （方位） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频文件与摄像头输入
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

//! # GStreamer 输入模块
//!
//! - 视频文件：`filesrc ! decodebin ! videoconvert ! appsink`，逐帧解码，不丢帧
//! - 摄像头：`v4l2src ! videoconvert ! appsink`，作为 [`Capture`] 在采集线程中使用
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```

use std::path::{Path, PathBuf};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use super::{Capture, FrameCounter};
use crate::{FromUrl, FromUrlWithScheme, frame::Frame};

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// URI scheme 不匹配
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("File not found: {0}")]
  NotFound(PathBuf),
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsink 元素
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  /// 无法转换元素为 appsink
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  /// 无法从 caps 获取视频信息
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 缓冲区大小不匹配
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

/// 启动以 RGB appsink 结尾的管道
struct RgbPipeline {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
}

impl RgbPipeline {
  fn launch(source: &str, appsink_props: &str) -> Result<Self, GStreamerInputError> {
    gst::init()?;

    let description = format!(
      "{} ! videoconvert ! video/x-raw,format=RGB ! appsink name=sink {}",
      source, appsink_props
    );
    info!("GStreamer pipeline description: {}", description);

    let pipeline = gst::parse::launch(&description)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;
    Ok(Self { pipeline, appsink })
  }

  /// 拉取下一帧；流结束时返回 `Ok(None)`
  fn pull(&self) -> Result<Option<RgbImage>, GStreamerInputError> {
    match self.appsink.pull_sample() {
      Ok(sample) => sample_to_image(&sample).map(Some),
      Err(_) if self.appsink.is_eos() => Ok(None),
      Err(e) => {
        error!("Failed to pull sample: {}", e);
        Err(GStreamerInputError::from(e))
      }
    }
  }
}

impl Drop for RgbPipeline {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

/// 视频文件输入
pub struct GStreamerFileSource {
  inner: RgbPipeline,
  counter: FrameCounter,
  finished: bool,
}

impl GStreamerFileSource {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, GStreamerInputError> {
    let path = path.as_ref();
    if !path.is_file() {
      return Err(GStreamerInputError::NotFound(path.to_path_buf()));
    }
    let source = format!("filesrc location=\"{}\" ! decodebin", path.display());
    let inner = RgbPipeline::launch(&source, "max-buffers=1 drop=false sync=false")?;
    Ok(Self {
      inner,
      counter: FrameCounter::default(),
      finished: false,
    })
  }
}

impl FromUrlWithScheme for GStreamerFileSource {
  const SCHEME: &'static str = "gstfile";
}

impl FromUrl for GStreamerFileSource {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }
    Self::open(url.path())
  }
}

impl Iterator for GStreamerFileSource {
  type Item = Result<Frame, GStreamerInputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }
    match self.inner.pull() {
      Ok(Some(image)) => Some(Ok(self.counter.stamp(image))),
      Ok(None) => {
        info!("视频文件读取完毕");
        self.finished = true;
        None
      }
      Err(e) => {
        self.finished = true;
        Some(Err(e))
      }
    }
  }
}

/// 通过 `v4l2src` 读取摄像头
pub struct GStreamerCameraCapture {
  inner: RgbPipeline,
}

impl GStreamerCameraCapture {
  pub fn open(device: &str) -> Result<Self, GStreamerInputError> {
    let source = format!("v4l2src device={}", device);
    let inner = RgbPipeline::launch(&source, "max-buffers=1 drop=true")?;
    Ok(Self { inner })
  }
}

impl Capture for GStreamerCameraCapture {
  type Error = GStreamerInputError;

  fn capture(&mut self) -> Result<Option<RgbImage>, Self::Error> {
    self.inner.pull()
  }
}

/// 将 RGB sample 复制为 `RgbImage`，去掉行尾填充
fn sample_to_image(sample: &gst::Sample) -> Result<RgbImage, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  let stride = video_info.stride()[0] as usize;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();

  let row = width * 3;
  let expected = stride * height.saturating_sub(1) + row;
  if height == 0 || data.len() < expected {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  let mut pixels = Vec::with_capacity(row * height);
  for y in 0..height {
    pixels.extend_from_slice(&data[y * stride..y * stride + row]);
  }

  RgbImage::from_raw(width as u32, height as u32, pixels).ok_or(
    GStreamerInputError::BufferSizeMismatch {
      expected: row * height,
      actual: data.len(),
    },
  )
}
