// 该文件是 Fangwei （方位） 项目的一部分。
// src/model/labels.rs - 类别标签与配色
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

use image::Rgb;
use thiserror::Error;
use tracing::info;

use crate::model::LabelLookup;

/// 模型目录中的标签文件名
pub const LABELS_FILE: &str = "coco.names";

const UNKNOWN_LABEL: &str = "unknown";

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("标签文件不存在: {0}")]
  Missing(PathBuf),
  #[error("读取标签文件失败: {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("标签文件为空: {0}")]
  Empty(PathBuf),
}

/// 每行一个类别名称，颜色按类别数在色环上均匀分布
#[derive(Debug, Clone)]
pub struct Labels {
  names: Vec<String>,
  colors: Vec<Rgb<u8>>,
}

impl Labels {
  pub fn load(path: impl AsRef<Path>) -> Result<Self, LabelError> {
    let path = path.as_ref();
    if !path.is_file() {
      return Err(LabelError::Missing(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path).map_err(|source| LabelError::Io {
      path: path.to_path_buf(),
      source,
    })?;
    let names: Vec<String> = content
      .trim()
      .lines()
      .map(|line| line.trim().to_string())
      .collect();
    if names.iter().all(String::is_empty) {
      return Err(LabelError::Empty(path.to_path_buf()));
    }

    info!("已加载 {} 个类别标签: {}", names.len(), path.display());
    Ok(Self::from_names(names))
  }

  /// 从模型目录加载 `coco.names`
  pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self, LabelError> {
    Self::load(dir.as_ref().join(LABELS_FILE))
  }

  pub fn from_names<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
    let names: Vec<String> = names.into_iter().map(Into::into).collect();
    let count = names.len().max(1);
    let colors = (0..count)
      .map(|i| {
        let hue = (i as f32 / count as f32) * 360.0;
        hsv_to_rgb(hue, 0.8, 0.9)
      })
      .collect();
    Self { names, colors }
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }
}

impl LabelLookup for Labels {
  fn label_name(&self, class_id: usize) -> &str {
    self
      .names
      .get(class_id)
      .map(String::as_str)
      .unwrap_or(UNKNOWN_LABEL)
  }

  fn label_color(&self, class_id: usize) -> Rgb<u8> {
    self.colors[class_id % self.colors.len()]
  }
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  #[test]
  fn loads_one_name_per_line() {
    let dir = tempfile::tempdir().unwrap();
    let mut file = std::fs::File::create(dir.path().join(LABELS_FILE)).unwrap();
    writeln!(file, "person\nbicycle\ncar\n").unwrap();

    let labels = Labels::load_from_dir(dir.path()).unwrap();
    assert_eq!(labels.len(), 3);
    assert_eq!(labels.label_name(0), "person");
    assert_eq!(labels.label_name(2), "car");
    assert_eq!(labels.label_name(3), UNKNOWN_LABEL);
  }

  #[test]
  fn missing_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
      Labels::load_from_dir(dir.path()),
      Err(LabelError::Missing(_))
    ));
  }

  #[test]
  fn blank_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(LABELS_FILE);
    std::fs::write(&path, "\n  \n").unwrap();
    assert!(matches!(Labels::load(&path), Err(LabelError::Empty(_))));
  }

  #[test]
  fn palette_is_deterministic_and_distinct() {
    let a = Labels::from_names(["a", "b", "c", "d"]);
    let b = Labels::from_names(["a", "b", "c", "d"]);
    assert_eq!(a.label_color(1), b.label_color(1));
    assert_ne!(a.label_color(0), a.label_color(2));
    // 越界下标循环取色
    assert_eq!(a.label_color(5), a.label_color(1));
  }

  #[test]
  fn hsv_primaries() {
    assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), Rgb([255, 0, 0]));
    assert_eq!(hsv_to_rgb(120.0, 1.0, 1.0), Rgb([0, 255, 0]));
    assert_eq!(hsv_to_rgb(240.0, 1.0, 1.0), Rgb([0, 0, 255]));
  }
}
