// 该文件是 Fangwei （方位） 项目的一部分。
// src/output/gstreamer_video_output.rs - GStreamer 视频文件输出
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

//! # GStreamer 视频文件输出模块
//!
//! 将标注后的帧以 Motion-JPEG 编码写入视频文件。
//!
//! ## 支持的格式
//!
//! - **AVI** - `avimux`
//! - **MKV** (Matroska) - `matroskamux`
//!
//! ## URL Scheme
//!
//! `gstvideo:///path/to/output.avi`

use std::path::{Path, PathBuf};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{StreamSpec, VideoBackend, VideoStream},
};

/// 等待 EOS 落盘的最长时间
const EOS_TIMEOUT_SECS: u64 = 5;

/// GStreamer 视频输出错误类型
#[derive(Error, Debug)]
pub enum GStreamerVideoOutputError {
  /// URI scheme 不匹配
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsrc 元素
  #[error("Failed to get appsrc element")]
  AppSrcNotFound,
  /// 无法转换元素为 appsrc
  #[error("Failed to convert element to appsrc")]
  AppSrcConversionFailed,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  /// 缓冲区创建错误
  #[error("Buffer creation error")]
  BufferCreationError,
  /// 帧尺寸与已打开的流不一致
  #[error("Frame size mismatch: stream is {expected:?}, frame is {actual:?}")]
  FrameSizeMismatch {
    expected: (u32, u32),
    actual: (u32, u32),
  },
}

/// GStreamer 视频文件输出
#[derive(Debug, Clone)]
pub struct GStreamerVideoOutput {
  path: PathBuf,
}

impl GStreamerVideoOutput {
  pub fn new(path: impl AsRef<Path>) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
    }
  }

  fn muxer(&self) -> &'static str {
    match self.path.extension().and_then(|e| e.to_str()) {
      Some(ext) if ext.eq_ignore_ascii_case("mkv") => "matroskamux",
      _ => "avimux",
    }
  }
}

impl FromUrlWithScheme for GStreamerVideoOutput {
  const SCHEME: &'static str = "gstvideo";
}

impl FromUrl for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(GStreamerVideoOutputError::SchemeMismatch);
    }
    Ok(Self::new(url.path()))
  }
}

impl VideoBackend for GStreamerVideoOutput {
  type Stream = GStreamerVideoStream;
  type Error = GStreamerVideoOutputError;

  fn open(&self, spec: &StreamSpec) -> Result<Self::Stream, Self::Error> {
    // Initialize GStreamer (subsequent calls are safe no-ops)
    gst::init()?;

    let pipeline_desc = format!(
      "appsrc name=src ! videoconvert ! jpegenc ! {} ! filesink location=\"{}\"",
      self.muxer(),
      self.path.display()
    );
    info!("Creating video output pipeline: {}", pipeline_desc);

    let pipeline = gst::parse::launch(&pipeline_desc)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| {
        GStreamerVideoOutputError::PipelineError("Failed to create pipeline".to_string())
      })?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerVideoOutputError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerVideoOutputError::AppSrcConversionFailed)?;

    // RGB 行按 4 字节对齐，写入时按 stride 重排
    let video_info =
      gst_video::VideoInfo::builder(gst_video::VideoFormat::Rgb, spec.width, spec.height)
        .fps(gst::Fraction::new(spec.fps as i32, 1))
        .build()?;
    let caps = video_info.to_caps()?;

    appsrc.set_caps(Some(&caps));
    appsrc.set_format(gst::Format::Time);

    pipeline.set_state(gst::State::Playing)?;

    info!(
      "Video output initialized: {}x{} @ {} fps -> {}",
      spec.width,
      spec.height,
      spec.fps,
      self.path.display()
    );

    Ok(GStreamerVideoStream {
      pipeline,
      appsrc,
      width: spec.width,
      height: spec.height,
      stride: video_info.stride()[0] as usize,
      buffer_size: video_info.size(),
      fps: spec.fps.max(1) as u64,
      frame_count: 0,
    })
  }
}

pub struct GStreamerVideoStream {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  width: u32,
  height: u32,
  stride: usize,
  buffer_size: usize,
  fps: u64,
  frame_count: u64,
}

impl VideoStream for GStreamerVideoStream {
  type Error = GStreamerVideoOutputError;

  fn write(&mut self, frame: &RgbImage) -> Result<(), Self::Error> {
    if frame.dimensions() != (self.width, self.height) {
      return Err(GStreamerVideoOutputError::FrameSizeMismatch {
        expected: (self.width, self.height),
        actual: frame.dimensions(),
      });
    }
    let data = pad_rows(
      frame.as_raw(),
      self.width as usize * 3,
      self.stride,
      self.buffer_size,
    );
    let mut buffer = gst::Buffer::from_mut_slice(data);

    let frame_duration = 1_000_000_000 / self.fps;
    {
      let buffer_ref = buffer
        .get_mut()
        .ok_or(GStreamerVideoOutputError::BufferCreationError)?;
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(
        self.frame_count * frame_duration,
      ));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(frame_duration));
    }
    self.frame_count += 1;

    self.appsrc.push_buffer(buffer).map_err(|e| {
      GStreamerVideoOutputError::PipelineError(format!("Failed to push buffer: {:?}", e))
    })?;

    Ok(())
  }

  fn release(self) -> Result<(), Self::Error> {
    // Send EOS to properly close the file
    self.appsrc.end_of_stream().map_err(|e| {
      GStreamerVideoOutputError::PipelineError(format!("Failed to send EOS: {:?}", e))
    })?;

    let mut result = Ok(());
    if let Some(bus) = self.pipeline.bus() {
      let message = bus.timed_pop_filtered(
        gst::ClockTime::from_seconds(EOS_TIMEOUT_SECS),
        &[gst::MessageType::Eos, gst::MessageType::Error],
      );
      match message.as_ref().map(|m| m.view()) {
        Some(gst::MessageView::Error(err)) => {
          result = Err(GStreamerVideoOutputError::PipelineError(
            err.error().to_string(),
          ));
        }
        Some(_) => {}
        None => warn!("等待 EOS 超时，视频文件可能不完整"),
      }
    }

    self.pipeline.set_state(gst::State::Null)?;
    info!(
      "Video output closed. Total frames written: {}",
      self.frame_count
    );
    result
  }
}

/// 把紧密排列的行复制到按 `stride` 对齐、总长 `size` 的缓冲区
fn pad_rows(packed: &[u8], row: usize, stride: usize, size: usize) -> Vec<u8> {
  if row == stride && packed.len() == size {
    return packed.to_vec();
  }
  let mut data = vec![0u8; size];
  for (line, dst) in packed.chunks_exact(row).zip(data.chunks_mut(stride)) {
    let len = row.min(dst.len());
    dst[..len].copy_from_slice(&line[..len]);
  }
  data
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn odd_width_rows_are_padded_to_stride() {
    // 5 像素宽的 RGB 行为 15 字节，对齐到 16
    let packed: Vec<u8> = (1..=30).collect();
    let data = pad_rows(&packed, 15, 16, 32);
    assert_eq!(data.len(), 32);
    assert_eq!(&data[0..15], &packed[0..15]);
    assert_eq!(data[15], 0);
    assert_eq!(&data[16..31], &packed[15..30]);
    assert_eq!(data[31], 0);
  }

  #[test]
  fn aligned_rows_are_copied_as_is() {
    let packed: Vec<u8> = (0..24).collect();
    assert_eq!(pad_rows(&packed, 12, 12, 24), packed);
  }

  #[test]
  fn native_854_wide_frame_fills_the_padded_buffer() {
    let (width, height) = (854usize, 480usize);
    let row = width * 3;
    let stride = (row + 3) / 4 * 4;
    assert_eq!(stride, 2564);
    let packed = vec![7u8; row * height];
    let data = pad_rows(&packed, row, stride, stride * height);
    assert_eq!(data.len(), 1_230_720);
    let last = (height - 1) * stride;
    assert!(data[last..last + row].iter().all(|&b| b == 7));
    assert!(data[last + row..].iter().all(|&b| b == 0));
  }

  #[test]
  fn file_extension_selects_muxer() {
    assert_eq!(GStreamerVideoOutput::new("/tmp/a.mkv").muxer(), "matroskamux");
    assert_eq!(GStreamerVideoOutput::new("/tmp/a.avi").muxer(), "avimux");
  }
}
