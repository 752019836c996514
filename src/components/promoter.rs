//! Promoter 模块
//! Promoter module
//!
//! 定期检查延迟集合，将到期（score ≤ now）的条目移回各自的优先级通道
//! Periodically checks the delayed set and moves ripe (score ≤ now) entries
//! back to their priority lanes

use crate::base::constants::DEFAULT_PROMOTE_INTERVAL;
use crate::base::QueueBroker;
use crate::components::ComponentLifecycle;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Promoter 配置
/// Promoter configuration
#[derive(Debug, Clone)]
pub struct PromoterConfig {
  /// 检查间隔
  /// Check interval
  pub interval: Duration,
}

impl Default for PromoterConfig {
  fn default() -> Self {
    Self {
      interval: DEFAULT_PROMOTE_INTERVAL,
    }
  }
}

/// Promoter - 负责晋升到期的延迟条目
/// Promoter - responsible for promoting ripe delayed entries
pub struct Promoter {
  broker: Arc<dyn QueueBroker>,
  config: PromoterConfig,
  done: Arc<AtomicBool>,
}

impl Promoter {
  /// 创建新的 Promoter
  /// Create a new Promoter
  pub fn new(broker: Arc<dyn QueueBroker>, config: PromoterConfig) -> Self {
    Self {
      broker,
      config,
      done: Arc::new(AtomicBool::new(false)),
    }
  }

  /// 启动 Promoter
  /// Start the Promoter
  pub fn start(self: Arc<Self>) -> JoinHandle<()> {
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(self.config.interval);
      loop {
        interval.tick().await;

        if self.done.load(Ordering::Relaxed) {
          tracing::debug!("Promoter: shutting down");
          break;
        }

        match self.broker.promote_delayed(Utc::now()).await {
          Ok(moved) if moved > 0 => {
            tracing::debug!(moved, "Promoter: delayed tasks promoted");
          }
          Ok(_) => {}
          Err(e) => {
            tracing::error!("Promoter error: {}", e);
          }
        }
      }
    })
  }

  /// 停止 Promoter
  /// Stop the Promoter
  pub fn shutdown(&self) {
    self.done.store(true, Ordering::Relaxed);
  }

  /// 检查是否已完成
  /// Check if done
  pub fn is_done(&self) -> bool {
    self.done.load(Ordering::Relaxed)
  }
}

impl ComponentLifecycle for Promoter {
  fn start(self: Arc<Self>) -> JoinHandle<()> {
    Promoter::start(self)
  }

  fn shutdown(&self) {
    Promoter::shutdown(self)
  }

  fn is_done(&self) -> bool {
    Promoter::is_done(self)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::memdb::MemoryQueue;

  #[test]
  fn test_promoter_config_default() {
    let config = PromoterConfig::default();
    assert_eq!(config.interval, Duration::from_secs(10));
  }

  #[tokio::test]
  async fn test_promoter_shutdown() {
    let broker = Arc::new(MemoryQueue::default());
    let promoter = Promoter::new(broker, PromoterConfig::default());

    assert!(!promoter.is_done());
    promoter.shutdown();
    assert!(promoter.is_done());
  }
}
