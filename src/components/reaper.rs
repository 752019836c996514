//! Reaper 模块
//! Reaper module
//!
//! 定期回收租约已过期的在途条目（工作者崩溃后遗留在 `queue:processing` 中的条目），
//! 经延迟集合重新入队。
//! Periodically reaps in-flight entries whose lease has expired (entries left
//! in `queue:processing` after a worker crash), requeueing them via the
//! delayed set.
//!
//! 代价是合法但慢于 task_timeout 的任务可能被执行两次；
//! 因此适配器契约要求尽可能幂等。
//! The trade-off is that a legitimately slow task past task_timeout may run
//! twice; the adapter contract should therefore be idempotent where possible.
//! 回收路径不消耗任务的重试额度。
//! The reap path does not consume the task's retry budget.

use crate::base::constants::DEFAULT_REAP_INTERVAL;
use crate::base::QueueBroker;
use crate::components::ComponentLifecycle;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Reaper 配置
/// Reaper configuration
#[derive(Debug, Clone)]
pub struct ReaperConfig {
  /// 回收间隔
  /// Reap interval
  pub interval: Duration,
}

impl Default for ReaperConfig {
  fn default() -> Self {
    Self {
      interval: DEFAULT_REAP_INTERVAL,
    }
  }
}

/// Reaper - 负责回收过期的在途条目
/// Reaper - responsible for reaping expired in-flight entries
pub struct Reaper {
  broker: Arc<dyn QueueBroker>,
  config: ReaperConfig,
  done: Arc<AtomicBool>,
}

impl Reaper {
  /// 创建新的 Reaper
  /// Create a new Reaper
  pub fn new(broker: Arc<dyn QueueBroker>, config: ReaperConfig) -> Self {
    Self {
      broker,
      config,
      done: Arc::new(AtomicBool::new(false)),
    }
  }

  /// 启动 Reaper
  /// Start the Reaper
  pub fn start(self: Arc<Self>) -> JoinHandle<()> {
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(self.config.interval);
      loop {
        interval.tick().await;

        if self.done.load(Ordering::Relaxed) {
          tracing::debug!("Reaper: shutting down");
          break;
        }

        match self.broker.reap_expired(Utc::now()).await {
          Ok(reaped) if reaped > 0 => {
            tracing::warn!(reaped, "Reaper: expired in-flight tasks requeued");
          }
          Ok(_) => {}
          Err(e) => {
            tracing::error!("Reaper error: {}", e);
          }
        }
      }
    })
  }

  /// 停止 Reaper
  /// Stop the Reaper
  pub fn shutdown(&self) {
    self.done.store(true, Ordering::Relaxed);
  }

  /// 检查是否已完成
  /// Check if done
  pub fn is_done(&self) -> bool {
    self.done.load(Ordering::Relaxed)
  }
}

impl ComponentLifecycle for Reaper {
  fn start(self: Arc<Self>) -> JoinHandle<()> {
    Reaper::start(self)
  }

  fn shutdown(&self) {
    Reaper::shutdown(self)
  }

  fn is_done(&self) -> bool {
    Reaper::is_done(self)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::memdb::MemoryQueue;

  #[test]
  fn test_reaper_config_default() {
    let config = ReaperConfig::default();
    assert_eq!(config.interval, Duration::from_secs(60));
  }

  #[tokio::test]
  async fn test_reaper_shutdown() {
    let broker = Arc::new(MemoryQueue::default());
    let reaper = Reaper::new(broker, ReaperConfig::default());

    assert!(!reaper.is_done());
    reaper.shutdown();
    assert!(reaper.is_done());
  }
}
