// 该文件是 Fangwei （方位） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

//! # 帧目录输出
//!
//! 每帧编码为一张 JPEG，合起来即 Motion-JPEG 序列：
//!
//! ```text
//! run/
//!   frame_000000.jpg
//!   frame_000001.jpg
//!   stream.json      # 尺寸、帧率、编码、帧数与起止时间
//! ```
//!
//! ## URL Scheme
//!
//! `folder:///path/to/run?quality=90`，`quality` 取值 1 - 100。

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use image::{RgbImage, codecs::jpeg::JpegEncoder};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

use crate::{
  FromUrl, FromUrlWithScheme,
  output::{StreamSpec, VideoBackend, VideoStream},
};

/// 清单文件名
pub const MANIFEST_FILE: &str = "stream.json";

const DEFAULT_QUALITY: u8 = 90;

#[derive(Error, Debug)]
pub enum DirectoryRecordError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("清单序列化错误: {0}")]
  ManifestError(#[from] serde_json::Error),
}

/// 以 Motion-JPEG 帧序列的形式写入目录
///
/// 每帧一个 `frame_NNNNNN.jpg`，释放时写入 `stream.json` 清单。
#[derive(Debug, Clone)]
pub struct DirectoryRecord {
  directory: PathBuf,
  quality: u8,
}

impl DirectoryRecord {
  pub fn new(directory: impl AsRef<Path>) -> Self {
    Self {
      directory: directory.as_ref().to_path_buf(),
      quality: DEFAULT_QUALITY,
    }
  }

  pub fn with_quality(mut self, quality: u8) -> Self {
    self.quality = quality.clamp(1, 100);
    self
  }

  pub fn directory(&self) -> &Path {
    &self.directory
  }

  pub fn quality(&self) -> u8 {
    self.quality
  }
}

impl FromUrlWithScheme for DirectoryRecord {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecord {
  type Error = DirectoryRecordError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordError::SchemeMismatch);
    }

    let quality = uri
      .query_pairs()
      .find(|(k, _)| k == "quality")
      .and_then(|(_, v)| v.parse::<u8>().ok())
      .unwrap_or(DEFAULT_QUALITY);

    Ok(DirectoryRecord::new(uri.path()).with_quality(quality))
  }
}

impl VideoBackend for DirectoryRecord {
  type Stream = DirectoryRecordStream;
  type Error = DirectoryRecordError;

  fn open(&self, spec: &StreamSpec) -> Result<Self::Stream, Self::Error> {
    std::fs::create_dir_all(&self.directory)?;
    debug!("目录记录输出: {}", self.directory.display());

    Ok(DirectoryRecordStream {
      directory: self.directory.clone(),
      quality: self.quality,
      spec: *spec,
      frames: 0,
      created_at: Utc::now(),
    })
  }
}

pub struct DirectoryRecordStream {
  directory: PathBuf,
  quality: u8,
  spec: StreamSpec,
  frames: u64,
  created_at: DateTime<Utc>,
}

impl DirectoryRecordStream {
  fn frame_path(&self) -> PathBuf {
    self.directory.join(format!("frame_{:06}.jpg", self.frames))
  }
}

impl VideoStream for DirectoryRecordStream {
  type Error = DirectoryRecordError;

  fn write(&mut self, frame: &RgbImage) -> Result<(), Self::Error> {
    let path = self.frame_path();
    let mut writer = BufWriter::new(File::create(&path)?);
    JpegEncoder::new_with_quality(&mut writer, self.quality)
      .encode_image(frame)
      .map_err(|e| {
        error!("写入帧失败: {}: {}", path.display(), e);
        e
      })?;
    writer.flush()?;
    self.frames += 1;
    Ok(())
  }

  fn release(self) -> Result<(), Self::Error> {
    let manifest = json!({
      "width": self.spec.width,
      "height": self.spec.height,
      "fps": self.spec.fps,
      "fourcc": self.spec.fourcc_str(),
      "frames": self.frames,
      "created_at": self.created_at.to_rfc3339(),
      "closed_at": Utc::now().to_rfc3339(),
    });
    let mut writer = BufWriter::new(File::create(self.directory.join(MANIFEST_FILE))?);
    serde_json::to_writer_pretty(&mut writer, &manifest)?;
    writer.flush()?;
    debug!("清单已写入，共 {} 帧", self.frames);
    Ok(())
  }
}
