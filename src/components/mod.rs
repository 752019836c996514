//! 后台组件模块
//! Background components module
//!
//! 提供统一的组件生命周期接口，用于管理工作池的周期性组件
//! Provides a unified component lifecycle interface for managing the pool's
//! periodic components
//!
//! # 实现者 / Implementors
//!
//! - [`Promoter`](promoter::Promoter) - 将到期的延迟条目晋升回优先级通道
//!   Promotes ripe delayed entries back to their priority lanes
//! - [`Reaper`](reaper::Reaper) - 回收租约过期的在途条目
//!   Reaps in-flight entries whose lease has expired
//!
//! [`Worker`](worker::Worker) 没有实现此 trait：它的循环绑定具体模型且
//! 由取消令牌驱动，而不是固定的 tick 间隔。
//! [`Worker`](worker::Worker) does not implement this trait: its loop is
//! bound to a concrete model and driven by a cancellation token rather than
//! a fixed tick interval.

use std::sync::Arc;
use tokio::task::JoinHandle;

pub mod promoter;
pub mod reaper;
pub mod worker;

/// 组件生命周期管理接口
/// Component lifecycle management interface
pub trait ComponentLifecycle {
  /// 启动组件的后台任务
  /// Start the component's background task
  fn start(self: Arc<Self>) -> JoinHandle<()>;

  /// 发送关闭信号；组件在完成当前一轮后停止
  /// Send the shutdown signal; the component stops after finishing its current round
  fn shutdown(&self);

  /// 检查组件是否已停止
  /// Check whether the component has stopped
  fn is_done(&self) -> bool;
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicBool, Ordering};

  struct TestComponent {
    done: Arc<AtomicBool>,
  }

  impl ComponentLifecycle for TestComponent {
    fn start(self: Arc<Self>) -> JoinHandle<()> {
      tokio::spawn(async move {
        loop {
          if self.done.load(Ordering::Relaxed) {
            break;
          }
          tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
      })
    }

    fn shutdown(&self) {
      self.done.store(true, Ordering::Relaxed);
    }

    fn is_done(&self) -> bool {
      self.done.load(Ordering::Relaxed)
    }
  }

  #[tokio::test]
  async fn test_lifecycle_trait() {
    let component = Arc::new(TestComponent {
      done: Arc::new(AtomicBool::new(false)),
    });

    assert!(!component.is_done());
    let handle = component.clone().start();

    component.shutdown();
    assert!(component.is_done());
    handle.await.unwrap();
  }
}
