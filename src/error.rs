//! 错误处理模块
//! Error handling module
//!
//! 定义了 llmq 库中使用的各种错误类型
//! Defines the error types used throughout the llmq library

use thiserror::Error;

/// llmq 库的结果类型
/// Result type for the llmq library
pub type Result<T> = std::result::Result<T, Error>;

/// llmq 错误类型
/// llmq error type
#[derive(Error, Debug)]
pub enum Error {
  /// Redis 存储错误（瞬态，调用方应退避重试）
  /// Redis store error (transient, callers should back off)
  #[error("Redis store error: {0}")]
  Redis(#[from] redis::RedisError),

  /// 数据库错误
  /// Database error
  #[error("Database error: {0}")]
  Db(#[from] sea_orm::DbErr),

  /// 序列化错误
  /// Serialization error
  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// 输入校验错误
  /// Input validation error
  #[error("Validation error: {message}")]
  Validation { message: String },

  /// 任务未找到
  /// Task not found
  #[error("Task not found: {id}")]
  TaskNotFound { id: i64 },

  /// 模型未找到
  /// Model not found
  #[error("Model not found: {id}")]
  ModelNotFound { id: i64 },

  /// 非法的状态转换
  /// Invalid state transition
  #[error("State conflict: {message}")]
  StateConflict { message: String },

  /// 队列已满，入队被拒绝
  /// Queue is full, enqueue rejected
  #[error("Queue full: lane {lane} holds {size} entries")]
  QueueFull { lane: String, size: u64 },

  /// 模型调用错误
  /// Model invocation error
  #[error(transparent)]
  Adapter(#[from] AdapterError),

  /// 配置错误
  /// Configuration error
  #[error("Configuration error: {message}")]
  Config { message: String },

  /// 工作池已关闭
  /// Worker pool has been shut down
  #[error("Worker pool closed")]
  PoolClosed,
}

impl Error {
  /// 创建校验错误
  /// Create a validation error
  pub fn validation<S: Into<String>>(message: S) -> Self {
    Self::Validation {
      message: message.into(),
    }
  }

  /// 创建状态冲突错误
  /// Create a state conflict error
  pub fn state_conflict<S: Into<String>>(message: S) -> Self {
    Self::StateConflict {
      message: message.into(),
    }
  }

  /// 创建配置错误
  /// Create a configuration error
  pub fn config<S: Into<String>>(message: S) -> Self {
    Self::Config {
      message: message.into(),
    }
  }

  /// 检查是否为瞬态存储错误（可退避重试）
  /// Check whether the error is a transient store error (retriable after backoff)
  pub fn is_retriable(&self) -> bool {
    match self {
      Error::Redis(_) | Error::Db(_) => true,
      Error::Adapter(e) => e.retryable,
      _ => false,
    }
  }
}

/// 适配器错误 - 模型调用插件边界上的错误
/// Adapter error - error at the model invocation plug-in boundary
///
/// `retryable` 决定失败任务走重试分支还是直接进入 failed
/// `retryable` decides whether a failed task takes the retry branch or goes straight to failed
#[derive(Error, Debug, Clone)]
#[error("Adapter error: {message}")]
pub struct AdapterError {
  /// 是否可重试
  /// Whether the invocation may be retried
  pub retryable: bool,
  /// 错误描述
  /// Error description
  pub message: String,
}

impl AdapterError {
  /// 创建可重试的适配器错误
  /// Create a retryable adapter error
  pub fn retryable<S: Into<String>>(message: S) -> Self {
    Self {
      retryable: true,
      message: message.into(),
    }
  }

  /// 创建不可重试的适配器错误
  /// Create a non-retryable adapter error
  pub fn fatal<S: Into<String>>(message: S) -> Self {
    Self {
      retryable: false,
      message: message.into(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_error_creation() {
    let err = Error::validation("bad input");
    assert!(matches!(err, Error::Validation { .. }));

    let err = Error::state_conflict("cannot cancel a completed task");
    assert!(matches!(err, Error::StateConflict { .. }));

    let err = Error::config("missing database url");
    assert!(matches!(err, Error::Config { .. }));
  }

  #[test]
  fn test_error_retriable() {
    assert!(!Error::TaskNotFound { id: 1 }.is_retriable());
    assert!(!Error::state_conflict("terminal").is_retriable());
    assert!(Error::Adapter(AdapterError::retryable("upstream 503")).is_retriable());
    assert!(!Error::Adapter(AdapterError::fatal("api key missing")).is_retriable());
  }

  #[test]
  fn test_adapter_error_display() {
    let err = AdapterError::fatal("OpenAI API key not configured");
    assert!(err.to_string().contains("OpenAI API key not configured"));
    assert!(!err.retryable);
  }

  #[test]
  fn test_queue_full_display() {
    let err = Error::QueueFull {
      lane: "queue:medium".to_string(),
      size: 10_000,
    };
    assert!(err.to_string().contains("queue:medium"));
    assert!(!err.is_retriable());
  }
}
