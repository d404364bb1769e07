// 该文件是 Fangwei （方位） 项目的一部分。
// src/input/v4l_capture.rs - V4L2 摄像头采集
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

use image::RgbImage;
use thiserror::Error;
use tracing::info;
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture as _;

use super::Capture;

#[derive(Error, Debug)]
pub enum V4lCaptureError {
  #[error("无法打开设备 {device}: {source}")]
  Open {
    device: String,
    #[source]
    source: std::io::Error,
  },
  #[error("设备不支持 YUYV 格式")]
  UnsupportedPixelFormat,
  #[error("V4L 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("缓冲区大小不匹配: 期望 {expected} 字节，实际 {actual} 字节")]
  BufferSizeMismatch { expected: usize, actual: usize },
}

/// 以 YUYV 格式读取 V4L2 设备
pub struct V4lCapture {
  stream: Stream<'static>,
  width: u32,
  height: u32,
}

impl V4lCapture {
  pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, V4lCaptureError> {
    let device = Device::with_path(device_path).map_err(|source| V4lCaptureError::Open {
      device: device_path.to_string(),
      source,
    })?;

    let mut format = device.format()?;
    format.width = width;
    format.height = height;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device.set_format(&format)?;
    if format.fourcc != FourCC::new(b"YUYV") {
      return Err(V4lCaptureError::UnsupportedPixelFormat);
    }

    // 流持有设备句柄的引用计数，不借用 `device`
    let stream = Stream::with_buffers(&device, Type::VideoCapture, 4)?;
    info!(
      "V4L2 设备 {} 已打开: {}x{}",
      device_path, format.width, format.height
    );

    Ok(Self {
      stream,
      width: format.width,
      height: format.height,
    })
  }
}

impl Capture for V4lCapture {
  type Error = V4lCaptureError;

  fn capture(&mut self) -> Result<Option<RgbImage>, Self::Error> {
    let (buffer, _meta) = CaptureStream::next(&mut self.stream)?;
    let expected = (self.width * self.height * 2) as usize;
    if buffer.len() < expected {
      return Err(V4lCaptureError::BufferSizeMismatch {
        expected,
        actual: buffer.len(),
      });
    }
    let rgb = yuyv_to_rgb(&buffer[..expected]);
    Ok(RgbImage::from_raw(self.width, self.height, rgb))
  }
}

/// YUYV 4:2:2 转 RGB，每 4 字节生成两个像素
fn yuyv_to_rgb(yuyv: &[u8]) -> Vec<u8> {
  let mut rgb = Vec::with_capacity(yuyv.len() / 2 * 3);

  for chunk in yuyv.chunks_exact(4) {
    let u = chunk[1] as f32 - 128.0;
    let v = chunk[3] as f32 - 128.0;
    for y in [chunk[0] as f32, chunk[2] as f32] {
      let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
      let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
      let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
      rgb.extend_from_slice(&[r, g, b]);
    }
  }

  rgb
}
