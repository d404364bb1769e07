// 该文件是 Fangwei （方位） 项目的一部分。
// src/output/draw.rs - 检测结果标注
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

use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use thiserror::Error;

use crate::model::{BoundingBox, Detection, LabelLookup};

const LABEL_FONT_SIZE: f32 = 16.0;
/// 文本与边框之间的间距
const LABEL_MARGIN: i32 = 5;
/// 文本起点离开画布超过此距离时必然不可见
const TEXT_EXTENT_LIMIT: i32 = 4096;

#[derive(Error, Debug)]
pub enum AnnotatorError {
  #[error("无法加载字体")]
  InvalidFont,
}

/// 标注器：边框、类别、置信度与方位角
pub struct Annotator {
  font: FontArc,
  font_scale: PxScale,
  /// 行高（上升部加下降部）
  line_height: i32,
}

impl Annotator {
  pub fn new() -> Result<Self, AnnotatorError> {
    // 使用内置的默认字体数据
    let font_data = include_bytes!("../../assets/DejaVuSans.ttf");
    let font = FontArc::try_from_slice(font_data).map_err(|_| AnnotatorError::InvalidFont)?;
    let font_scale = PxScale::from(LABEL_FONT_SIZE);
    let line_height = font.as_scaled(font_scale).height().ceil() as i32;

    Ok(Self {
      font,
      font_scale,
      line_height,
    })
  }

  /// 原地标注，超出画布的部分被裁掉，完全在画布外的检测结果不画
  pub fn annotate<L: LabelLookup + ?Sized>(
    &self,
    image: &mut RgbImage,
    detections: &[Detection],
    labels: &L,
  ) {
    for detection in detections {
      if !overlaps_canvas(image, &detection.bbox) {
        continue;
      }
      let color = labels.label_color(detection.class_id);
      draw_box(image, &detection.bbox, color);

      let text = label_text(detection, labels.label_name(detection.class_id));
      let (x, y) = self.label_origin(&detection.bbox);
      let x = x.clamp(-TEXT_EXTENT_LIMIT, canvas_extent(image.width()));
      let y = y.clamp(-TEXT_EXTENT_LIMIT, canvas_extent(image.height()));
      draw_text_mut(image, color, x, y, self.font_scale, &self.font, &text);
    }
  }

  /// 文本底边位于框顶上方 5 像素；越过画面顶部时改放在框内
  fn label_origin(&self, bbox: &BoundingBox) -> (i32, i32) {
    let above = bbox
      .y
      .saturating_sub(LABEL_MARGIN)
      .saturating_sub(self.line_height);
    if above >= 0 {
      (bbox.x, above)
    } else {
      (bbox.x, bbox.y.saturating_add(LABEL_MARGIN).max(0))
    }
  }
}

/// 标签文本
pub fn label_text(detection: &Detection, name: &str) -> String {
  format!(
    "{}: {:.4}, angle-l:{}, angle-r:{}",
    name, detection.confidence, detection.bearing.left, detection.bearing.right
  )
}

/// 框（含边线）与画布是否相交
fn overlaps_canvas(image: &RgbImage, bbox: &BoundingBox) -> bool {
  let (x0, y0) = (bbox.x as i64, bbox.y as i64);
  let (x1, y1) = (x0 + bbox.width as i64, y0 + bbox.height as i64);
  x1 >= 0 && y1 >= 0 && x0 < image.width() as i64 && y0 < image.height() as i64
}

fn canvas_extent(size: u32) -> i32 {
  i32::try_from(size).unwrap_or(i32::MAX)
}

/// `(x, y)` 到 `(x + w, y + h)` 的 2 像素边框
///
/// 伸出画布的边被收到画布外两像素处，可见部分与原框一致。
/// 调用前需确认框与画布相交。
fn draw_box(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
  if bbox.width <= 0 || bbox.height <= 0 {
    return;
  }

  let (canvas_w, canvas_h) = (image.width() as i64, image.height() as i64);
  let (x0, y0) = (bbox.x as i64, bbox.y as i64);
  let (x1, y1) = (x0 + bbox.width as i64, y0 + bbox.height as i64);
  let (x0, y0) = (x0.max(-2), y0.max(-2));
  let (x1, y1) = (x1.min(canvas_w + 1), y1.min(canvas_h + 1));
  let (width, height) = (x1 - x0, y1 - y0);

  let outer = Rect::at(x0 as i32, y0 as i32).of_size(width as u32 + 1, height as u32 + 1);
  draw_hollow_rect_mut(image, outer, color);

  // 绘制第二个边框以增加可见度
  if width > 1 && height > 1 {
    let inner =
      Rect::at(x0 as i32 + 1, y0 as i32 + 1).of_size(width as u32 - 1, height as u32 - 1);
    draw_hollow_rect_mut(image, inner, color);
  }
}
