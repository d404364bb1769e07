// 该文件是 Fangwei （方位） 项目的一部分。
// src/input/camera.rs - 摄像头采集线程
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

//! # 摄像头输入
//!
//! 设备在常驻的采集线程中打开并读取，主循环每要一帧才发出一次请求，
//! 因此任意时刻最多只有一次采集在进行，也不会预读。
//! 采集到的帧统一缩放到 1280x720。

use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use image::{RgbImage, imageops::FilterType};
use tracing::{debug, error, info};

use super::{FrameCounter, InputError};
use crate::frame::Frame;

pub const CAMERA_WIDTH: u32 = 1280;
pub const CAMERA_HEIGHT: u32 = 720;

/// 阻塞式的单帧采集
///
/// 返回 `Ok(None)` 表示设备不再产生帧。
pub trait Capture {
  type Error: std::error::Error + Send + Sync + 'static;

  fn capture(&mut self) -> Result<Option<RgbImage>, Self::Error>;
}

type Reply = Result<Option<RgbImage>, InputError>;

pub struct CameraSource {
  requests: Option<SyncSender<()>>,
  replies: Receiver<Reply>,
  worker: Option<JoinHandle<()>>,
  counter: FrameCounter,
  exhausted: bool,
}

impl CameraSource {
  /// 启动采集线程
  ///
  /// `open` 在采集线程内、第一次请求到达时执行，设备句柄不需要跨线程移动。
  pub fn spawn<C, F>(open: F, width: u32, height: u32) -> Result<Self, InputError>
  where
    C: Capture + 'static,
    F: FnOnce() -> Result<C, InputError> + Send + 'static,
  {
    let (request_tx, request_rx) = mpsc::sync_channel::<()>(1);
    let (reply_tx, reply_rx) = mpsc::sync_channel::<Reply>(1);

    let worker = thread::Builder::new()
      .name("camera-capture".to_string())
      .spawn(move || capture_loop(open, request_rx, reply_tx, width, height))
      .map_err(|e| InputError::Camera(Box::new(e)))?;

    Ok(Self {
      requests: Some(request_tx),
      replies: reply_rx,
      worker: Some(worker),
      counter: FrameCounter::default(),
      exhausted: false,
    })
  }
}

fn capture_loop<C, F>(
  open: F,
  requests: Receiver<()>,
  replies: SyncSender<Reply>,
  width: u32,
  height: u32,
) where
  C: Capture,
  F: FnOnce() -> Result<C, InputError>,
{
  if requests.recv().is_err() {
    return;
  }

  let mut capture = match open() {
    Ok(capture) => capture,
    Err(e) => {
      error!("无法打开摄像头: {}", e);
      let _ = replies.send(Err(e));
      return;
    }
  };
  info!("摄像头采集线程已启动");

  loop {
    let reply = match capture.capture() {
      Ok(Some(image)) => Ok(Some(fit(image, width, height))),
      Ok(None) => Ok(None),
      Err(e) => Err(InputError::Camera(Box::new(e))),
    };
    let last = !matches!(reply, Ok(Some(_)));
    if replies.send(reply).is_err() || last {
      break;
    }
    if requests.recv().is_err() {
      break;
    }
  }
  debug!("摄像头采集线程退出");
}

fn fit(image: RgbImage, width: u32, height: u32) -> RgbImage {
  if image.dimensions() == (width, height) {
    image
  } else {
    image::imageops::resize(&image, width, height, FilterType::Triangle)
  }
}

impl Iterator for CameraSource {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.exhausted {
      return None;
    }
    let requests = self.requests.as_ref()?;
    if requests.send(()).is_err() {
      self.exhausted = true;
      return Some(Err(InputError::WorkerGone));
    }

    match self.replies.recv() {
      Ok(Ok(Some(image))) => Some(Ok(self.counter.stamp(image))),
      Ok(Ok(None)) => {
        info!("摄像头没有更多帧");
        self.exhausted = true;
        None
      }
      Ok(Err(e)) => {
        self.exhausted = true;
        Some(Err(e))
      }
      Err(_) => {
        self.exhausted = true;
        Some(Err(InputError::WorkerGone))
      }
    }
  }
}

impl Drop for CameraSource {
  fn drop(&mut self) {
    // 先断开请求通道，采集线程在下一次等待时退出
    self.requests.take();
    if let Some(worker) = self.worker.take() {
      if worker.join().is_err() {
        error!("摄像头采集线程异常退出");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;
  use std::collections::VecDeque;
  use std::sync::Arc;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
  use std::time::Duration;

  #[derive(Debug, thiserror::Error)]
  #[error("设备断开")]
  struct Unplugged;

  struct Fake {
    frames: VecDeque<Result<RgbImage, Unplugged>>,
    calls: Arc<AtomicUsize>,
  }

  impl Capture for Fake {
    type Error = Unplugged;

    fn capture(&mut self) -> Result<Option<RgbImage>, Self::Error> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      self.frames.pop_front().transpose()
    }
  }

  fn fake(
    frames: Vec<Result<RgbImage, Unplugged>>,
  ) -> (CameraSource, Arc<AtomicUsize>, Arc<AtomicBool>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let opened = Arc::new(AtomicBool::new(false));
    let (c, o) = (calls.clone(), opened.clone());
    let source = CameraSource::spawn(
      move || {
        o.store(true, Ordering::SeqCst);
        Ok(Fake {
          frames: frames.into(),
          calls: c,
        })
      },
      CAMERA_WIDTH,
      CAMERA_HEIGHT,
    )
    .unwrap();
    (source, calls, opened)
  }

  #[test]
  fn frames_are_resized_to_camera_size() {
    let (mut source, _, _) = fake(vec![Ok(RgbImage::from_pixel(640, 480, Rgb([9, 9, 9])))]);
    let frame = source.next().unwrap().unwrap();
    assert_eq!((frame.width(), frame.height()), (1280, 720));
    assert_eq!(frame.image.get_pixel(640, 360), &Rgb([9, 9, 9]));
  }

  #[test]
  fn nothing_is_captured_before_a_request() {
    let (mut source, calls, opened) = fake(vec![Ok(RgbImage::new(1280, 720))]);
    thread::sleep(Duration::from_millis(50));
    assert!(!opened.load(Ordering::SeqCst));
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    source.next().unwrap().unwrap();
    assert!(opened.load(Ordering::SeqCst));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn one_capture_per_request() {
    let frames = (0..4).map(|_| Ok(RgbImage::new(1280, 720))).collect();
    let (mut source, calls, _) = fake(frames);
    for expected in 1..=3 {
      source.next().unwrap().unwrap();
      thread::sleep(Duration::from_millis(10));
      assert_eq!(calls.load(Ordering::SeqCst), expected);
    }
  }

  #[test]
  fn frames_are_numbered() {
    let frames = (0..3).map(|_| Ok(RgbImage::new(1280, 720))).collect();
    let (source, _, _) = fake(frames);
    let indices: Vec<u64> = source.map(|f| f.unwrap().index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
  }

  #[test]
  fn capture_error_ends_the_stream() {
    let (mut source, _, _) = fake(vec![Ok(RgbImage::new(1280, 720)), Err(Unplugged)]);
    assert!(source.next().unwrap().is_ok());
    assert!(matches!(source.next(), Some(Err(InputError::Camera(_)))));
    assert!(source.next().is_none());
  }

  #[test]
  fn open_failure_is_reported_once() {
    let mut source = CameraSource::spawn(
      || -> Result<Fake, InputError> { Err(InputError::UnsupportedInput("/dev/video9".to_string())) },
      CAMERA_WIDTH,
      CAMERA_HEIGHT,
    )
    .unwrap();
    assert!(matches!(
      source.next(),
      Some(Err(InputError::UnsupportedInput(_)))
    ));
    assert!(source.next().is_none());
  }

  #[test]
  fn dropping_an_idle_source_joins_the_worker() {
    let (source, calls, _) = fake(vec![]);
    drop(source);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
  }
}
