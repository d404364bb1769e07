// 该文件是 Fangwei （方位） 项目的一部分。
// src/input/image_sequence.rs - 图像文件/目录输入
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

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use super::FrameCounter;
use crate::{FromUrl, FromUrlWithScheme, frame::Frame};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum ImageSequenceError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("路径不存在: {0}")]
  NotFound(PathBuf),
  #[error("目录中没有图像文件: {0}")]
  Empty(PathBuf),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("无法解码图像 {path}: {source}")]
  Decode {
    path: PathBuf,
    #[source]
    source: image::ImageError,
  },
}

pub fn is_image_path(path: &Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|ext| IMAGE_EXTENSIONS.iter().any(|x| ext.eq_ignore_ascii_case(x)))
}

/// 逐个读取单张图像或目录中的全部图像（按文件名排序）
///
/// 图像在迭代时才解码。
#[derive(Debug)]
pub struct ImageSequenceSource {
  paths: VecDeque<PathBuf>,
  counter: FrameCounter,
}

impl ImageSequenceSource {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageSequenceError> {
    let path = path.as_ref();
    if !path.exists() {
      return Err(ImageSequenceError::NotFound(path.to_path_buf()));
    }

    let paths: VecDeque<PathBuf> = if path.is_dir() {
      let mut entries = std::fs::read_dir(path)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
      entries.retain(|p| p.is_file() && is_image_path(p));
      entries.sort();
      if entries.is_empty() {
        return Err(ImageSequenceError::Empty(path.to_path_buf()));
      }
      entries.into()
    } else {
      VecDeque::from([path.to_path_buf()])
    };

    info!("图像输入共 {} 个文件", paths.len());
    Ok(Self {
      paths,
      counter: FrameCounter::default(),
    })
  }

  /// 尚未读取的图像数量
  pub fn remaining(&self) -> usize {
    self.paths.len()
  }
}

impl FromUrlWithScheme for ImageSequenceSource {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageSequenceSource {
  type Error = ImageSequenceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageSequenceError::SchemeMismatch);
    }
    Self::open(url.path())
  }
}

impl Iterator for ImageSequenceSource {
  type Item = Result<Frame, ImageSequenceError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.paths.pop_front()?;
    debug!("读取图像: {}", path.display());

    let decoded = ImageReader::open(&path)
      .map_err(ImageSequenceError::from)
      .and_then(|reader| {
        reader
          .with_guessed_format()
          .map_err(ImageSequenceError::from)
      })
      .and_then(|reader| {
        reader.decode().map_err(|source| ImageSequenceError::Decode {
          path: path.clone(),
          source,
        })
      });

    Some(decoded.map(|image| self.counter.stamp(image.to_rgb8())))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  #[test]
  fn directory_is_read_in_name_order() {
    let dir = tempfile::tempdir().unwrap();
    RgbImage::from_pixel(4, 4, Rgb([2, 0, 0]))
      .save(dir.path().join("b.png"))
      .unwrap();
    RgbImage::from_pixel(4, 4, Rgb([1, 0, 0]))
      .save(dir.path().join("a.png"))
      .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "not an image").unwrap();

    let source = ImageSequenceSource::open(dir.path()).unwrap();
    assert_eq!(source.remaining(), 2);
    let frames: Vec<Frame> = source.map(Result::unwrap).collect();
    assert_eq!(frames[0].image.get_pixel(0, 0), &Rgb([1, 0, 0]));
    assert_eq!(frames[1].image.get_pixel(0, 0), &Rgb([2, 0, 0]));
    assert_eq!((frames[0].index, frames[1].index), (0, 1));
  }

  #[test]
  fn single_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("one.png");
    RgbImage::new(8, 6).save(&path).unwrap();
    let frames: Vec<_> = ImageSequenceSource::open(&path).unwrap().collect();
    assert_eq!(frames.len(), 1);
    let frame = frames.into_iter().next().unwrap().unwrap();
    assert_eq!((frame.width(), frame.height()), (8, 6));
  }

  #[test]
  fn missing_and_empty_inputs() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      ImageSequenceSource::open(dir.path()),
      Err(ImageSequenceError::Empty(_))
    ));
    assert!(matches!(
      ImageSequenceSource::open(dir.path().join("nope.png")),
      Err(ImageSequenceError::NotFound(_))
    ));
  }

  #[test]
  fn corrupt_image_is_an_error_item() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.jpg");
    std::fs::write(&path, b"garbage").unwrap();
    let mut source = ImageSequenceSource::open(&path).unwrap();
    assert!(matches!(
      source.next(),
      Some(Err(ImageSequenceError::Decode { .. }))
    ));
    assert!(source.next().is_none());
  }

  #[test]
  fn extension_filter() {
    assert!(is_image_path(Path::new("a/b.JPG")));
    assert!(is_image_path(Path::new("x.jpeg")));
    assert!(!is_image_path(Path::new("x.mp4")));
    assert!(!is_image_path(Path::new("x")));
  }
}
