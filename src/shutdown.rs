// 该文件是 Fangwei （方位） 项目的一部分。
// src/shutdown.rs - 中断与优雅退出
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

//! # 中断处理
//!
//! 中断处理函数只置位请求标志并启动看门狗，资源释放由主循环在阶段之间完成。
//! 若主循环在宽限期内没有结束，看门狗自行关闭输出并以状态码 1 退出进程。
//! 宽限期内再次收到中断信号时立即以状态码 1 退出，不再等待输出刷新。
//!
//! 状态：`Running -> ShuttingDown -> Terminated`，`Terminated` 为终态。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::output::{Sink, VideoBackend};

/// 默认宽限期
pub const DEFAULT_GRACE: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum ShutdownError {
  #[error("无法设置中断处理函数: {0}")]
  Handler(#[from] ctrlc::Error),
}

/// 可在退出时释放的资源
pub trait GracefulClose {
  /// 幂等；返回是否真正释放了资源
  fn close_gracefully(&self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}

impl<B: VideoBackend> GracefulClose for Sink<B> {
  fn close_gracefully(&self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
    Ok(self.close()?)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ShutdownState {
  Running = 0,
  ShuttingDown = 1,
  Terminated = 2,
}

impl From<u8> for ShutdownState {
  fn from(value: u8) -> Self {
    match value {
      0 => ShutdownState::Running,
      1 => ShutdownState::ShuttingDown,
      _ => ShutdownState::Terminated,
    }
  }
}

/// 一次运行的结局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  /// 输入耗尽或达到帧数上限
  Completed,
  /// 收到中断
  Interrupted,
  /// 不可恢复的错误
  Failed,
}

impl Outcome {
  pub fn exit_code(self) -> u8 {
    match self {
      Outcome::Completed => 0,
      Outcome::Interrupted => 1,
      Outcome::Failed => 2,
    }
  }
}

#[derive(Debug)]
pub struct ShutdownController {
  state: AtomicU8,
  requested: AtomicBool,
  grace: Duration,
}

impl Default for ShutdownController {
  fn default() -> Self {
    Self::new()
  }
}

impl ShutdownController {
  pub fn new() -> Self {
    Self {
      state: AtomicU8::new(ShutdownState::Running as u8),
      requested: AtomicBool::new(false),
      grace: DEFAULT_GRACE,
    }
  }

  pub fn with_grace(mut self, grace: Duration) -> Self {
    self.grace = grace;
    self
  }

  pub fn grace(&self) -> Duration {
    self.grace
  }

  /// 请求退出；仅第一次调用返回 `true`
  pub fn request(&self) -> bool {
    !self.requested.swap(true, Ordering::SeqCst)
  }

  pub fn is_requested(&self) -> bool {
    self.requested.load(Ordering::SeqCst)
  }

  pub fn state(&self) -> ShutdownState {
    self.state.load(Ordering::SeqCst).into()
  }

  /// 关闭资源并进入终态，只有第一个调用者会执行关闭
  pub fn shut_down<C: GracefulClose + ?Sized>(&self, resource: &C) -> Outcome {
    self.requested.store(true, Ordering::SeqCst);

    if self
      .state
      .compare_exchange(
        ShutdownState::Running as u8,
        ShutdownState::ShuttingDown as u8,
        Ordering::SeqCst,
        Ordering::SeqCst,
      )
      .is_err()
    {
      debug!("退出流程已在进行");
      return Outcome::Interrupted;
    }

    match resource.close_gracefully() {
      Ok(true) => info!("输出已刷新并释放"),
      Ok(false) => info!("没有需要释放的输出"),
      Err(e) => error!("释放输出失败: {}", e),
    }
    self.state.store(ShutdownState::Terminated as u8, Ordering::SeqCst);
    Outcome::Interrupted
  }

  /// 主循环正常结束后标记终态
  pub fn mark_terminated(&self) {
    self.state.store(ShutdownState::Terminated as u8, Ordering::SeqCst);
  }

  /// 宽限期到期时的处理；返回是否需要强制退出进程
  ///
  /// 资源自身的锁保证这里的关闭不会与主循环中的关闭交错。
  pub fn on_grace_expired<C: GracefulClose + ?Sized>(&self, resource: &C) -> bool {
    if self.state() == ShutdownState::Terminated {
      return false;
    }
    warn!("主循环未在 {:.0?} 内退出，强制关闭", self.grace);
    if let Err(e) = resource.close_gracefully() {
      error!("强制释放输出失败: {}", e);
    }
    self.state.store(ShutdownState::Terminated as u8, Ordering::SeqCst);
    true
  }

  /// 重复的中断信号；返回是否需要立即退出进程
  pub fn on_repeated_signal(&self) -> bool {
    if self.state() == ShutdownState::Terminated {
      debug!("已退出，忽略重复的中断信号");
      return false;
    }
    warn!("再次收到中断信号，立即退出");
    true
  }

  /// 安装 Ctrl-C 处理函数
  pub fn install_handler<C>(self: &Arc<Self>, resource: Arc<C>) -> Result<(), ShutdownError>
  where
    C: GracefulClose + Send + Sync + 'static,
  {
    let controller = Arc::clone(self);
    ctrlc::set_handler(move || {
      if !controller.request() {
        if controller.on_repeated_signal() {
          std::process::exit(Outcome::Interrupted.exit_code() as i32);
        }
        return;
      }
      warn!("收到中断信号，准备退出...");

      let controller = Arc::clone(&controller);
      let resource = Arc::clone(&resource);
      thread::spawn(move || {
        thread::sleep(controller.grace);
        if controller.on_grace_expired(resource.as_ref()) {
          warn!("强制退出程序");
          std::process::exit(Outcome::Interrupted.exit_code() as i32);
        }
      });
    })?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicUsize;

  #[derive(Default)]
  struct Counter {
    closes: AtomicUsize,
    released: AtomicBool,
  }

  impl GracefulClose for Counter {
    fn close_gracefully(&self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
      self.closes.fetch_add(1, Ordering::SeqCst);
      Ok(!self.released.swap(true, Ordering::SeqCst))
    }
  }

  #[test]
  fn starts_running() {
    let controller = ShutdownController::new();
    assert_eq!(controller.state(), ShutdownState::Running);
    assert!(!controller.is_requested());
    assert_eq!(controller.grace(), DEFAULT_GRACE);
  }

  #[test]
  fn request_reports_first_call_only() {
    let controller = ShutdownController::new();
    assert!(controller.request());
    assert!(!controller.request());
    assert!(controller.is_requested());
    assert_eq!(controller.state(), ShutdownState::Running);
  }

  #[test]
  fn shut_down_closes_exactly_once() {
    let controller = ShutdownController::new();
    let resource = Counter::default();
    assert_eq!(controller.shut_down(&resource), Outcome::Interrupted);
    assert_eq!(controller.shut_down(&resource), Outcome::Interrupted);
    assert_eq!(resource.closes.load(Ordering::SeqCst), 1);
    assert_eq!(controller.state(), ShutdownState::Terminated);
    assert!(controller.is_requested());
  }

  #[test]
  fn concurrent_shut_down_closes_once() {
    let controller = Arc::new(ShutdownController::new());
    let resource = Arc::new(Counter::default());
    let handles: Vec<_> = (0..8)
      .map(|_| {
        let controller = controller.clone();
        let resource = resource.clone();
        thread::spawn(move || controller.shut_down(resource.as_ref()))
      })
      .collect();
    for handle in handles {
      assert_eq!(handle.join().unwrap(), Outcome::Interrupted);
    }
    assert_eq!(resource.closes.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn grace_expiry_after_clean_exit_is_a_no_op() {
    let controller = ShutdownController::new();
    let resource = Counter::default();
    controller.mark_terminated();
    assert!(!controller.on_grace_expired(&resource));
    assert_eq!(resource.closes.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn grace_expiry_while_running_forces_close() {
    let controller = ShutdownController::new().with_grace(Duration::from_millis(1));
    let resource = Counter::default();
    controller.request();
    assert!(controller.on_grace_expired(&resource));
    assert_eq!(resource.closes.load(Ordering::SeqCst), 1);
    assert_eq!(controller.state(), ShutdownState::Terminated);
    // 主循环随后观察到中断，不再重复关闭
    controller.shut_down(&resource);
    assert_eq!(resource.closes.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn repeated_signal_forces_exit_until_terminated() {
    let controller = ShutdownController::new();
    assert!(controller.request());
    assert!(!controller.request());
    assert!(controller.on_repeated_signal());

    controller.shut_down(&Counter::default());
    assert!(!controller.on_repeated_signal());
  }

  #[test]
  fn exit_codes() {
    assert_eq!(Outcome::Completed.exit_code(), 0);
    assert_eq!(Outcome::Interrupted.exit_code(), 1);
    assert_eq!(Outcome::Failed.exit_code(), 2);
  }
}
