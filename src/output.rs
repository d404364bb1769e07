// 该文件是 Fangwei （方位） 项目的一部分。
// src/output.rs - 输出定义
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

use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;
use url::Url;

use crate::FromUrl;
#[cfg(any(feature = "directory_record", feature = "gstreamer_output"))]
use crate::FromUrlWithScheme;

/// 输出流默认帧率
pub const DEFAULT_FPS: u32 = 30;
/// 输出流默认编码
pub const DEFAULT_FOURCC: [u8; 4] = *b"MJPG";

/// 打开输出流所需的参数，尺寸取自第一帧
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
  pub width: u32,
  pub height: u32,
  pub fps: u32,
  pub fourcc: [u8; 4],
}

impl StreamSpec {
  pub fn new(width: u32, height: u32) -> Self {
    Self {
      width,
      height,
      fps: DEFAULT_FPS,
      fourcc: DEFAULT_FOURCC,
    }
  }

  pub fn fourcc_str(&self) -> String {
    String::from_utf8_lossy(&self.fourcc).into_owned()
  }
}

/// 持久化视频输出后端
pub trait VideoBackend {
  type Stream: VideoStream;
  type Error: std::error::Error + Send + Sync + 'static;

  fn open(&self, spec: &StreamSpec) -> Result<Self::Stream, Self::Error>;
}

/// 已打开的视频流
pub trait VideoStream {
  type Error: std::error::Error + Send + Sync + 'static;

  fn write(&mut self, frame: &RgbImage) -> Result<(), Self::Error>;
  /// 刷新并释放底层资源
  fn release(self) -> Result<(), Self::Error>;
}

pub type DisplayError = Box<dyn std::error::Error + Send + Sync>;

/// 实时显示，尽力而为
pub trait LiveDisplay {
  fn show(&mut self, frame: &RgbImage) -> Result<(), DisplayError>;
}

pub mod draw;
pub mod sink;

pub use self::draw::{Annotator, AnnotatorError};
pub use self::sink::{Sink, SinkError};

#[cfg(feature = "directory_record")]
mod directory_record;
#[cfg(feature = "directory_record")]
pub use self::directory_record::{DirectoryRecord, DirectoryRecordError, DirectoryRecordStream};

#[cfg(feature = "gstreamer_output")]
mod gstreamer_video_output;
#[cfg(feature = "gstreamer_output")]
pub use self::gstreamer_video_output::{
  GStreamerVideoOutput, GStreamerVideoOutputError, GStreamerVideoStream,
};

#[cfg(feature = "gstreamer_output")]
mod gstreamer_display;
#[cfg(feature = "gstreamer_output")]
pub use self::gstreamer_display::GStreamerDisplay;

#[derive(Error, Debug)]
pub enum OutputError {
  #[cfg(feature = "directory_record")]
  #[error("目录记录输出错误: {0}")]
  DirectoryRecordError(#[from] DirectoryRecordError),
  #[cfg(feature = "gstreamer_output")]
  #[error("GStreamer 视频输出错误: {0}")]
  GStreamerVideoOutputError(#[from] GStreamerVideoOutputError),
  #[error("不支持的输出: {0}")]
  UnsupportedOutput(PathBuf),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("无效的输出 URI: {0}")]
  InvalidUrl(String),
}

/// 按路径或 URI 选择的输出后端
pub enum VideoOutput {
  #[cfg(feature = "directory_record")]
  DirectoryRecord(DirectoryRecord),
  #[cfg(feature = "gstreamer_output")]
  GStreamerVideoOutput(GStreamerVideoOutput),
}

pub enum VideoOutputStream {
  #[cfg(feature = "directory_record")]
  DirectoryRecord(DirectoryRecordStream),
  #[cfg(feature = "gstreamer_output")]
  GStreamerVideoOutput(GStreamerVideoStream),
}

impl VideoOutput {
  /// 目录或无扩展名的路径写入帧目录，`.avi`/`.mkv` 写入视频文件
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, OutputError> {
    let path = path.as_ref();
    let extension = path
      .extension()
      .and_then(|e| e.to_str())
      .map(str::to_ascii_lowercase);

    match extension.as_deref() {
      #[cfg(feature = "directory_record")]
      None => Ok(VideoOutput::DirectoryRecord(DirectoryRecord::new(path))),
      #[cfg(feature = "directory_record")]
      Some(_) if path.is_dir() => Ok(VideoOutput::DirectoryRecord(DirectoryRecord::new(path))),
      #[cfg(feature = "gstreamer_output")]
      Some("avi") | Some("mkv") => Ok(VideoOutput::GStreamerVideoOutput(
        GStreamerVideoOutput::new(path),
      )),
      _ => Err(OutputError::UnsupportedOutput(path.to_path_buf())),
    }
  }
}

impl VideoOutput {
  /// `folder://`、`gstvideo://` 形式按 URI 解析，其余按路径处理
  pub fn from_target(target: &str) -> Result<Self, OutputError> {
    if target.contains("://") {
      let url =
        Url::parse(target).map_err(|e| OutputError::InvalidUrl(format!("{}: {}", target, e)))?;
      return Self::from_url(&url);
    }
    Self::from_path(target)
  }
}

impl FromUrl for VideoOutput {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "directory_record")]
      DirectoryRecord::SCHEME => Ok(VideoOutput::DirectoryRecord(DirectoryRecord::from_url(
        url,
      )?)),
      #[cfg(feature = "gstreamer_output")]
      GStreamerVideoOutput::SCHEME => Ok(VideoOutput::GStreamerVideoOutput(
        GStreamerVideoOutput::from_url(url)?,
      )),
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl VideoBackend for VideoOutput {
  type Stream = VideoOutputStream;
  type Error = OutputError;

  fn open(&self, spec: &StreamSpec) -> Result<Self::Stream, Self::Error> {
    match self {
      #[cfg(feature = "directory_record")]
      VideoOutput::DirectoryRecord(output) => {
        Ok(VideoOutputStream::DirectoryRecord(output.open(spec)?))
      }
      #[cfg(feature = "gstreamer_output")]
      VideoOutput::GStreamerVideoOutput(output) => {
        Ok(VideoOutputStream::GStreamerVideoOutput(output.open(spec)?))
      }
      #[allow(unreachable_patterns)]
      _ => {
        let _ = spec;
        unreachable!("未启用任何输出后端")
      }
    }
  }
}

impl VideoStream for VideoOutputStream {
  type Error = OutputError;

  fn write(&mut self, frame: &RgbImage) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "directory_record")]
      VideoOutputStream::DirectoryRecord(stream) => Ok(stream.write(frame)?),
      #[cfg(feature = "gstreamer_output")]
      VideoOutputStream::GStreamerVideoOutput(stream) => Ok(stream.write(frame)?),
      #[allow(unreachable_patterns)]
      _ => {
        let _ = frame;
        unreachable!("未启用任何输出后端")
      }
    }
  }

  fn release(self) -> Result<(), Self::Error> {
    match self {
      #[cfg(feature = "directory_record")]
      VideoOutputStream::DirectoryRecord(stream) => Ok(stream.release()?),
      #[cfg(feature = "gstreamer_output")]
      VideoOutputStream::GStreamerVideoOutput(stream) => Ok(stream.release()?),
      #[allow(unreachable_patterns)]
      _ => unreachable!("未启用任何输出后端"),
    }
  }
}
