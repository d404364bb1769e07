// 该文件是 Fangwei （方位） 项目的一部分。
// src/output/gstreamer_display.rs - GStreamer 实时窗口
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

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use image::RgbImage;
use tracing::{info, warn};

use crate::output::{DisplayError, LiveDisplay};

/// 通过 `autovideosink` 显示标注后的帧
///
/// 管道在第一帧到达时按其尺寸建立。
#[derive(Default)]
pub struct GStreamerDisplay {
  pipeline: Option<(gst::Pipeline, gst_app::AppSrc)>,
}

impl GStreamerDisplay {
  pub fn new() -> Self {
    Self::default()
  }

  fn build(width: u32, height: u32) -> Result<(gst::Pipeline, gst_app::AppSrc), DisplayError> {
    gst::init()?;

    let pipeline = gst::parse::launch(
      "appsrc name=src is-live=true format=time max-buffers=1 leaky-type=downstream ! \
       videoconvert ! autovideosink sync=false",
    )?
    .downcast::<gst::Pipeline>()
    .map_err(|_| "Failed to create display pipeline")?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or("Failed to get appsrc element")?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| "Failed to convert element to appsrc")?;

    let caps = gst::Caps::builder("video/x-raw")
      .field("format", "RGB")
      .field("width", width as i32)
      .field("height", height as i32)
      .field("framerate", gst::Fraction::new(0, 1))
      .build();
    appsrc.set_caps(Some(&caps));

    pipeline.set_state(gst::State::Playing)?;
    info!("实时显示窗口已打开: {}x{}", width, height);
    Ok((pipeline, appsrc))
  }
}

impl LiveDisplay for GStreamerDisplay {
  fn show(&mut self, frame: &RgbImage) -> Result<(), DisplayError> {
    if self.pipeline.is_none() {
      self.pipeline = Some(Self::build(frame.width(), frame.height())?);
    }
    let Some((_, appsrc)) = self.pipeline.as_ref() else {
      return Ok(());
    };

    let buffer = gst::Buffer::from_mut_slice(frame.as_raw().clone());
    appsrc
      .push_buffer(buffer)
      .map_err(|e| format!("Failed to push buffer: {:?}", e))?;
    Ok(())
  }
}

impl Drop for GStreamerDisplay {
  fn drop(&mut self) {
    if let Some((pipeline, _)) = self.pipeline.take() {
      if let Err(e) = pipeline.set_state(gst::State::Null) {
        warn!("Failed to stop display pipeline: {}", e);
      }
    }
  }
}
