// 该文件是 Fangwei （方位） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use std::path::Path;
use std::time::Instant;

use image::RgbImage;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame};

mod camera;
pub use self::camera::{CAMERA_HEIGHT, CAMERA_WIDTH, CameraSource, Capture};

#[cfg(feature = "read_image_file")]
mod image_sequence;
#[cfg(feature = "read_image_file")]
pub use self::image_sequence::{ImageSequenceError, ImageSequenceSource, is_image_path};

#[cfg(feature = "v4l_input")]
mod v4l_capture;
#[cfg(feature = "v4l_input")]
pub use self::v4l_capture::{V4lCapture, V4lCaptureError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerCameraCapture, GStreamerFileSource, GStreamerInputError};

/// 默认摄像头设备
pub const DEFAULT_CAMERA_DEVICE: &str = "/dev/video0";

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("图像序列输入错误: {0}")]
  ImageSequenceError(#[from] ImageSequenceError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer 输入错误: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
  #[error("摄像头错误: {0}")]
  Camera(#[source] BoxError),
  #[error("采集线程已退出")]
  WorkerGone,
  #[error("无效的摄像头参数: {0}")]
  InvalidCameraOption(String),
  #[error("不支持的输入: {0}")]
  UnsupportedInput(String),
  #[error("无效的输入 URI: {0}")]
  InvalidUrl(String),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 为帧编号并打时间戳
#[derive(Debug)]
pub struct FrameCounter {
  next: u64,
  start: Instant,
}

impl Default for FrameCounter {
  fn default() -> Self {
    Self {
      next: 0,
      start: Instant::now(),
    }
  }
}

impl FrameCounter {
  pub fn stamp(&mut self, image: RgbImage) -> Frame {
    let frame = Frame::new(image, self.next, self.start.elapsed());
    self.next += 1;
    frame
  }
}

/// 摄像头参数，例如 `camera:///dev/video1?width=1280&height=720`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraOptions {
  pub device: String,
  pub width: u32,
  pub height: u32,
}

impl CameraOptions {
  pub fn new(device: impl Into<String>) -> Self {
    Self {
      device: device.into(),
      width: CAMERA_WIDTH,
      height: CAMERA_HEIGHT,
    }
  }
}

impl Default for CameraOptions {
  fn default() -> Self {
    Self::new(DEFAULT_CAMERA_DEVICE)
  }
}

impl FromUrlWithScheme for CameraOptions {
  const SCHEME: &'static str = "camera";
}

impl FromUrl for CameraOptions {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InputError::SchemeMismatch);
    }

    let mut options = match url.path() {
      "" | "/" => CameraOptions::default(),
      path => CameraOptions::new(path),
    };
    for (key, value) in url.query_pairs() {
      let parse = |v: &str| {
        v.parse::<u32>()
          .ok()
          .filter(|&v| v > 0)
          .ok_or_else(|| InputError::InvalidCameraOption(format!("{}={}", key, v)))
      };
      match key.as_ref() {
        "width" => options.width = parse(value.as_ref())?,
        "height" => options.height = parse(value.as_ref())?,
        _ => {}
      }
    }
    Ok(options)
  }
}

pub enum InputWrapper {
  Camera(CameraSource),
  #[cfg(feature = "read_image_file")]
  ImageSequence(ImageSequenceSource),
  #[cfg(feature = "gstreamer_input")]
  GStreamerFile(GStreamerFileSource),
}

impl Iterator for InputWrapper {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::Camera(input) => input.next(),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageSequence(input) => input.next().map(|r| r.map_err(InputError::from)),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerFile(input) => input.next().map(|r| r.map_err(InputError::from)),
    }
  }
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      CameraOptions::SCHEME => open_camera(&CameraOptions::from_url(url)?).map(InputWrapper::Camera),
      #[cfg(feature = "read_image_file")]
      ImageSequenceSource::SCHEME => Ok(InputWrapper::ImageSequence(
        ImageSequenceSource::from_url(url)?,
      )),
      #[cfg(feature = "gstreamer_input")]
      GStreamerFileSource::SCHEME => Ok(InputWrapper::GStreamerFile(
        GStreamerFileSource::from_url(url)?,
      )),
      _ => Err(InputError::SchemeMismatch),
    }
  }
}

/// 按输入描述选择输入源
///
/// - `camera`：默认摄像头设备
/// - `camera:///dev/videoN?width=..&height=..`
/// - `image:///path`：图像文件或图像目录
/// - `gstfile:///path`：视频文件（需要 `gstreamer_input`）
/// - 普通路径：图像文件或图像目录，其余按视频文件处理
pub fn open_source(input: &str, default_device: &str) -> Result<InputWrapper, InputError> {
  if input == CameraOptions::SCHEME {
    return open_camera(&CameraOptions::new(default_device)).map(InputWrapper::Camera);
  }
  if input.contains("://") {
    let url = Url::parse(input).map_err(|e| InputError::InvalidUrl(format!("{}: {}", input, e)))?;
    info!("按 URI 打开输入: {}", url);
    return InputWrapper::from_url(&url);
  }

  let path = Path::new(input);

  #[cfg(feature = "read_image_file")]
  {
    if path.is_dir() || is_image_path(path) {
      info!("打开图像输入: {}", path.display());
      return Ok(InputWrapper::ImageSequence(ImageSequenceSource::open(path)?));
    }
  }

  open_video_file(path)
}

#[cfg(feature = "gstreamer_input")]
fn open_video_file(path: &Path) -> Result<InputWrapper, InputError> {
  info!("打开视频文件输入: {}", path.display());
  Ok(InputWrapper::GStreamerFile(GStreamerFileSource::open(path)?))
}

#[cfg(not(feature = "gstreamer_input"))]
fn open_video_file(path: &Path) -> Result<InputWrapper, InputError> {
  Err(InputError::UnsupportedInput(path.display().to_string()))
}

/// 打开摄像头，采集在独立线程中进行
pub fn open_camera(options: &CameraOptions) -> Result<CameraSource, InputError> {
  info!(
    "打开摄像头: {} ({}x{})",
    options.device, options.width, options.height
  );
  spawn_camera(options)
}

#[cfg(feature = "v4l_input")]
fn spawn_camera(options: &CameraOptions) -> Result<CameraSource, InputError> {
  let device = options.device.clone();
  let (width, height) = (options.width, options.height);
  CameraSource::spawn(
    move || V4lCapture::open(&device, width, height).map_err(|e| InputError::Camera(Box::new(e))),
    width,
    height,
  )
}

#[cfg(all(feature = "gstreamer_input", not(feature = "v4l_input")))]
fn spawn_camera(options: &CameraOptions) -> Result<CameraSource, InputError> {
  let device = options.device.clone();
  CameraSource::spawn(
    move || GStreamerCameraCapture::open(&device).map_err(InputError::from),
    options.width,
    options.height,
  )
}

#[cfg(not(any(feature = "v4l_input", feature = "gstreamer_input")))]
fn spawn_camera(options: &CameraOptions) -> Result<CameraSource, InputError> {
  Err(InputError::UnsupportedInput(options.device.clone()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn camera_url_with_options() {
    let url = Url::parse("camera:///dev/video2?width=640&height=480").unwrap();
    let options = CameraOptions::from_url(&url).unwrap();
    assert_eq!(
      options,
      CameraOptions {
        device: "/dev/video2".to_string(),
        width: 640,
        height: 480,
      }
    );
  }

  #[test]
  fn camera_url_defaults() {
    let url = Url::parse("camera://").unwrap();
    let options = CameraOptions::from_url(&url).unwrap();
    assert_eq!(options, CameraOptions::default());
    assert_eq!((options.width, options.height), (1280, 720));
  }

  #[test]
  fn camera_url_rejects_bad_values() {
    let url = Url::parse("camera:///dev/video0?width=0").unwrap();
    assert!(matches!(
      CameraOptions::from_url(&url),
      Err(InputError::InvalidCameraOption(_))
    ));
    let url = Url::parse("file:///dev/video0").unwrap();
    assert!(matches!(
      CameraOptions::from_url(&url),
      Err(InputError::SchemeMismatch)
    ));
  }

  #[test]
  fn frame_counter_numbers_frames() {
    let mut counter = FrameCounter::default();
    let a = counter.stamp(RgbImage::new(1, 1));
    let b = counter.stamp(RgbImage::new(1, 1));
    assert_eq!((a.index, b.index), (0, 1));
    assert!(b.timestamp >= a.timestamp);
  }

  #[cfg(all(feature = "read_image_file", not(feature = "gstreamer_input")))]
  #[test]
  fn unknown_file_type_is_unsupported() {
    assert!(matches!(
      open_source("/nonexistent/clip.mp4", DEFAULT_CAMERA_DEVICE),
      Err(InputError::UnsupportedInput(_))
    ));
  }

  #[test]
  fn unknown_scheme_is_rejected() {
    assert!(matches!(
      open_source("rtsp://example.com/live", DEFAULT_CAMERA_DEVICE),
      Err(InputError::SchemeMismatch)
    ));
    assert!(matches!(
      open_source("camera://[bad", DEFAULT_CAMERA_DEVICE),
      Err(InputError::InvalidUrl(_))
    ));
  }

  #[cfg(feature = "read_image_file")]
  #[test]
  fn image_scheme_opens_image_sequence() {
    let dir = tempfile::tempdir().unwrap();
    RgbImage::new(4, 4).save(dir.path().join("a.png")).unwrap();
    RgbImage::new(4, 4).save(dir.path().join("b.jpg")).unwrap();
    let input = format!("image://{}", dir.path().display());
    let source = open_source(&input, DEFAULT_CAMERA_DEVICE).unwrap();
    assert!(matches!(source, InputWrapper::ImageSequence(_)));
    assert_eq!(source.count(), 2);
  }

  #[cfg(feature = "gstreamer_input")]
  #[test]
  fn gstfile_scheme_reports_missing_file() {
    assert!(matches!(
      open_source("gstfile:///nonexistent/clip.mp4", DEFAULT_CAMERA_DEVICE),
      Err(InputError::GStreamerInputError(GStreamerInputError::NotFound(_)))
    ));
  }

  #[cfg(feature = "read_image_file")]
  #[test]
  fn directory_opens_image_sequence() {
    let dir = tempfile::tempdir().unwrap();
    RgbImage::new(4, 4).save(dir.path().join("a.png")).unwrap();
    let source = open_source(dir.path().to_str().unwrap(), DEFAULT_CAMERA_DEVICE).unwrap();
    assert!(matches!(source, InputWrapper::ImageSequence(_)));
    assert_eq!(source.count(), 1);
  }
}
