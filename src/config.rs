//! 配置模块
//! Configuration module
//!
//! 定义了调度引擎的配置选项：存储连接、队列键名与时限、工作池节奏
//! Defines configuration options for the scheduling engine: store connections,
//! queue key names and time limits, worker pool cadence

use crate::base::constants::{
  DEFAULT_HEALTH_CHECK_INTERVAL, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_MAX_QUEUE_SIZE,
  DEFAULT_POLL_INTERVAL, DEFAULT_PROMOTE_INTERVAL, DEFAULT_REAP_INTERVAL, DEFAULT_RETRY_DELAY,
  DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_TASK_TIMEOUT,
};
use crate::base::keys;
use crate::error::{Error, Result};
use std::time::Duration;

/// 数据库配置
/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
  /// 连接 URL（postgres://... 或测试场景下 sqlite::memory:）
  /// Connection URL (postgres://... or sqlite::memory: under test)
  pub url: String,
  /// 连接池上限
  /// Connection pool cap
  pub max_connections: u32,
}

impl Default for DatabaseConfig {
  fn default() -> Self {
    Self {
      url: "postgres://localhost/llmq".to_string(),
      max_connections: 10,
    }
  }
}

/// Redis 配置
/// Redis configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
  /// 连接 URL
  /// Connection URL
  pub url: String,
}

impl Default for RedisConfig {
  fn default() -> Self {
    Self {
      url: "redis://127.0.0.1:6379".to_string(),
    }
  }
}

/// 队列配置 - 键名、容量与时限
/// Queue configuration - key names, capacity, and time limits
#[derive(Debug, Clone)]
pub struct QueueConfig {
  /// 高优先级通道键名
  /// High priority lane key name
  pub high_key: String,
  /// 中优先级通道键名
  /// Medium priority lane key name
  pub medium_key: String,
  /// 低优先级通道键名
  /// Low priority lane key name
  pub low_key: String,
  /// 在途有序集合键名
  /// In-flight sorted set key name
  pub processing_key: String,
  /// 延迟有序集合键名
  /// Delayed sorted set key name
  pub delayed_key: String,
  /// 单条通道的容量上限，超过则入队失败
  /// Per-lane capacity cap; enqueue fails beyond it
  pub max_queue_size: u64,
  /// 在途租约时长；超过后条目由回收器重新入队
  /// In-flight lease duration; entries past it are requeued by the reaper
  pub task_timeout: Duration,
  /// 重试与回收路径使用的延迟
  /// Delay used by the retry and reap paths
  pub retry_delay: Duration,
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self {
      high_key: keys::HIGH_LANE.to_string(),
      medium_key: keys::MEDIUM_LANE.to_string(),
      low_key: keys::LOW_LANE.to_string(),
      processing_key: keys::PROCESSING_SET.to_string(),
      delayed_key: keys::DELAYED_SET.to_string(),
      max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
      task_timeout: DEFAULT_TASK_TIMEOUT,
      retry_delay: DEFAULT_RETRY_DELAY,
    }
  }
}

impl QueueConfig {
  /// 按数值优先级选择通道键；未知数值回落到中优先级
  /// Select the lane key for a numeric priority; unknown values fall back to medium
  pub fn lane_key(&self, priority: i32) -> &str {
    match priority {
      3 => &self.high_key,
      1 => &self.low_key,
      _ => &self.medium_key,
    }
  }

  /// 按准入顺序（高 → 中 → 低）返回三条通道键
  /// Return the three lane keys in admission order (high → medium → low)
  pub fn lanes(&self) -> [&str; 3] {
    [&self.high_key, &self.medium_key, &self.low_key]
  }

  /// 在途集合的二级索引键
  /// Secondary index key of the in-flight set
  pub fn processing_index_key(&self) -> String {
    keys::processing_index_key(&self.processing_key)
  }
}

/// 工作池配置
/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
  /// 空队列时的出队等待时间
  /// Dequeue wait when the queue is empty
  pub poll_interval: Duration,
  /// 工作者心跳间隔
  /// Worker heartbeat interval
  pub heartbeat_interval: Duration,
  /// 延迟条目晋升间隔
  /// Delayed entry promotion interval
  pub promote_interval: Duration,
  /// 过期在途条目回收间隔
  /// Expired in-flight entry reap interval
  pub reap_interval: Duration,
  /// 工作者健康巡检间隔
  /// Worker health sweep interval
  pub health_check_interval: Duration,
  /// 关闭时等待工作者退出的上限
  /// Upper bound on waiting for workers during shutdown
  pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      poll_interval: DEFAULT_POLL_INTERVAL,
      heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
      promote_interval: DEFAULT_PROMOTE_INTERVAL,
      reap_interval: DEFAULT_REAP_INTERVAL,
      health_check_interval: DEFAULT_HEALTH_CHECK_INTERVAL,
      shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
    }
  }
}

/// 引擎配置
/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
  pub database: DatabaseConfig,
  pub redis: RedisConfig,
  pub queue: QueueConfig,
  pub worker: WorkerConfig,
}

impl Config {
  /// 创建默认配置
  /// Create the default configuration
  pub fn new() -> Self {
    Self::default()
  }

  /// 从环境变量读取覆盖项
  /// Read overrides from environment variables
  ///
  /// 支持 `DATABASE_URL`、`REDIS_URL`、`LLMQ_MAX_QUEUE_SIZE`、
  /// `LLMQ_TASK_TIMEOUT_SECS`、`LLMQ_RETRY_DELAY_SECS`
  /// Honors `DATABASE_URL`, `REDIS_URL`, `LLMQ_MAX_QUEUE_SIZE`,
  /// `LLMQ_TASK_TIMEOUT_SECS`, `LLMQ_RETRY_DELAY_SECS`
  pub fn from_env() -> Result<Self> {
    let mut config = Self::default();

    if let Ok(url) = std::env::var("DATABASE_URL") {
      config.database.url = url;
    }
    if let Ok(url) = std::env::var("REDIS_URL") {
      config.redis.url = url;
    }
    if let Ok(raw) = std::env::var("LLMQ_MAX_QUEUE_SIZE") {
      config.queue.max_queue_size = raw
        .parse()
        .map_err(|_| Error::config(format!("invalid LLMQ_MAX_QUEUE_SIZE: {raw}")))?;
    }
    if let Ok(raw) = std::env::var("LLMQ_TASK_TIMEOUT_SECS") {
      let secs: u64 = raw
        .parse()
        .map_err(|_| Error::config(format!("invalid LLMQ_TASK_TIMEOUT_SECS: {raw}")))?;
      config.queue.task_timeout = Duration::from_secs(secs);
    }
    if let Ok(raw) = std::env::var("LLMQ_RETRY_DELAY_SECS") {
      let secs: u64 = raw
        .parse()
        .map_err(|_| Error::config(format!("invalid LLMQ_RETRY_DELAY_SECS: {raw}")))?;
      config.queue.retry_delay = Duration::from_secs(secs);
    }

    config.validate()?;
    Ok(config)
  }

  /// 设置数据库 URL
  /// Set the database URL
  pub fn database_url<S: Into<String>>(mut self, url: S) -> Self {
    self.database.url = url.into();
    self
  }

  /// 设置 Redis URL
  /// Set the Redis URL
  pub fn redis_url<S: Into<String>>(mut self, url: S) -> Self {
    self.redis.url = url.into();
    self
  }

  /// 设置在途租约时长
  /// Set the in-flight lease duration
  pub fn task_timeout(mut self, timeout: Duration) -> Self {
    self.queue.task_timeout = timeout;
    self
  }

  /// 设置重试延迟
  /// Set the retry delay
  pub fn retry_delay(mut self, delay: Duration) -> Self {
    self.queue.retry_delay = delay;
    self
  }

  /// 设置单通道容量上限
  /// Set the per-lane capacity cap
  pub fn max_queue_size(mut self, size: u64) -> Self {
    self.queue.max_queue_size = size;
    self
  }

  /// 校验配置
  /// Validate the configuration
  pub fn validate(&self) -> Result<()> {
    if self.database.url.trim().is_empty() {
      return Err(Error::config("database url must not be empty"));
    }
    if self.redis.url.trim().is_empty() {
      return Err(Error::config("redis url must not be empty"));
    }
    if self.database.max_connections == 0 {
      return Err(Error::config("database max_connections must be greater than 0"));
    }
    if self.queue.max_queue_size == 0 {
      return Err(Error::config("max_queue_size must be greater than 0"));
    }
    if self.queue.task_timeout < Duration::from_secs(1) {
      return Err(Error::config("task_timeout cannot be less than 1 second"));
    }

    let queue = &self.queue;
    let mut names = [
      queue.high_key.as_str(),
      queue.medium_key.as_str(),
      queue.low_key.as_str(),
      queue.processing_key.as_str(),
      queue.delayed_key.as_str(),
    ];
    if names.iter().any(|name| name.trim().is_empty()) {
      return Err(Error::config("queue key names must not be empty"));
    }
    names.sort_unstable();
    if names.windows(2).any(|pair| pair[0] == pair[1]) {
      return Err(Error::config("queue key names must be distinct"));
    }

    Ok(())
  }
}
