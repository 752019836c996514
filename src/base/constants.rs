use std::time::Duration;

/// 默认最大重试次数
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// 默认任务租约超时时间
/// Default in-flight lease timeout
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(5 * 60); // 5 分钟

/// 默认重试延迟
/// Default retry delay
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(60);

/// 单条优先级通道的默认容量上限
/// Default capacity cap for a single priority lane
pub const DEFAULT_MAX_QUEUE_SIZE: u64 = 10_000;

/// 默认出队等待时间（降低空转）
/// Default dequeue wait (reduces spinning)
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// 默认心跳间隔
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// 延迟任务晋升间隔
/// Delayed entry promotion interval
pub const DEFAULT_PROMOTE_INTERVAL: Duration = Duration::from_secs(10);

/// 过期在途任务回收间隔
/// Expired in-flight entry reap interval
pub const DEFAULT_REAP_INTERVAL: Duration = Duration::from_secs(60);

/// 工作者健康巡检间隔
/// Worker health sweep interval
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// 关闭时等待工作者退出的上限
/// Upper bound on waiting for workers to exit during shutdown
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// 版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_constants() {
    assert_eq!(DEFAULT_MAX_RETRIES, 3);
    assert_eq!(DEFAULT_TASK_TIMEOUT, Duration::from_secs(300));
    assert_eq!(DEFAULT_MAX_QUEUE_SIZE, 10_000);
  }
}
