// 该文件是 Fangwei （方位） 项目的一部分。
// src/model/blob.rs - 模型输入预处理
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

use std::borrow::Cow;

use image::{RgbImage, imageops::FilterType};

use crate::frame::NchwBlob;

/// 模型期望的通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ChannelOrder {
  #[default]
  Rgb,
  Bgr,
}

/// 将 RGB 图像缩放到 `W x H`（不裁剪），按 1/255 归一化后写成 NCHW 张量
pub fn to_blob<const W: u32, const H: u32>(image: &RgbImage, order: ChannelOrder) -> NchwBlob<W, H> {
  let resized: Cow<'_, RgbImage> = if image.dimensions() == (W, H) {
    Cow::Borrowed(image)
  } else {
    Cow::Owned(image::imageops::resize(image, W, H, FilterType::Triangle))
  };

  let mut blob = NchwBlob::<W, H>::default();
  let plane = (W as usize) * (H as usize);
  let slice = blob.as_mut();

  for (i, pixel) in resized.pixels().enumerate() {
    for c in 0..3 {
      let src = match order {
        ChannelOrder::Rgb => c,
        ChannelOrder::Bgr => 2 - c,
      };
      slice[c * plane + i] = pixel[src] as f32 / 255.0;
    }
  }

  blob
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn planes_are_scaled_and_ordered() {
    let image = RgbImage::from_pixel(4, 4, Rgb([255, 0, 51]));
    let blob = to_blob::<4, 4>(&image, ChannelOrder::Rgb);
    let data = blob.as_slice();
    assert_eq!(blob.shape(), [1, 3, 4, 4]);
    assert!(data[..16].iter().all(|&v| v == 1.0));
    assert!(data[16..32].iter().all(|&v| v == 0.0));
    assert!(data[32..].iter().all(|&v| (v - 0.2).abs() < 1e-6));
  }

  #[test]
  fn bgr_swaps_red_and_blue() {
    let image = RgbImage::from_pixel(2, 2, Rgb([255, 0, 0]));
    let blob = to_blob::<2, 2>(&image, ChannelOrder::Bgr);
    let data = blob.as_slice();
    assert!(data[..4].iter().all(|&v| v == 0.0));
    assert!(data[8..].iter().all(|&v| v == 1.0));
  }

  #[test]
  fn resizes_without_cropping() {
    let image = RgbImage::from_pixel(64, 32, Rgb([10, 20, 30]));
    let blob = to_blob::<8, 8>(&image, ChannelOrder::Rgb);
    assert_eq!(blob.as_slice().len(), 3 * 8 * 8);
    assert!(
      blob.as_slice()[..64]
        .iter()
        .all(|&v| (v - 10.0 / 255.0).abs() < 1.5 / 255.0)
    );
  }
}
