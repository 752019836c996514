//! 队列经纪人抽象层
//! Queue broker abstraction layer
//!
//! 定义了调度核心与键值存储交互的接口：三条 FIFO 优先级通道、
//! 一个以租约到期时刻计分的在途集合、一个以可执行时刻计分的延迟集合。
//! Defines the interface between the scheduling core and the key-value store:
//! three FIFO priority lanes, an in-flight set scored by lease expiry,
//! and a delayed set scored by eligibility time.

use crate::entity::tasks::TaskPriority;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub mod constants;
pub mod keys;

/// 队列条目 - 队列侧的唯一标识；任务行才是事实来源
/// Queue entry - the only queue-side identity; the task row is the source of truth
///
/// 线上格式：`{task_id, model_id, priority:int, created_at:rfc3339}`
/// Wire format: `{task_id, model_id, priority:int, created_at:rfc3339}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
  pub task_id: i64,
  pub model_id: i64,
  pub priority: i32,
  pub created_at: DateTime<Utc>,
}

impl QueueEntry {
  /// 从任务字段构造队列条目
  /// Build a queue entry from task fields
  pub fn new(task_id: i64, model_id: i64, priority: TaskPriority, created_at: DateTime<Utc>) -> Self {
    Self {
      task_id,
      model_id,
      priority: priority.as_i32(),
      created_at,
    }
  }
}

/// 五个队列结构的基数快照
/// Cardinality snapshot of the five queue structures
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
  pub high: u64,
  pub medium: u64,
  pub low: u64,
  pub processing: u64,
  pub delayed: u64,
  pub total: u64,
}

/// 队列经纪人特性，定义了与队列存储后端交互的接口
/// Queue broker trait, defines the interface for interacting with the queue storage backend
///
/// 没有跨键事务；“先 requeue 后 ack” 的调用顺序补偿单操作原子性。
/// There is no multi-key transaction; the "requeue before ack" call order
/// compensates for single-operation atomicity.
#[async_trait]
pub trait QueueBroker: Send + Sync {
  /// 测试存储连接
  /// Ping the store connection
  async fn ping(&self) -> Result<()>;

  /// 关闭连接
  /// Close the connection
  async fn close(&self) -> Result<()>;

  /// 追加条目到与其优先级匹配的通道；超过容量上限返回 `QueueFull`
  /// Append the entry to the lane matching its priority; returns `QueueFull` above capacity
  async fn enqueue(&self, entry: &QueueEntry) -> Result<()>;

  /// 工作者的准入步骤：按 高 → 中 → 低 扫描，弹出属于 `model_id` 的最老条目
  /// 并移入在途集合（score = now + task_timeout）。不匹配的条目被推回通道头部。
  /// The worker admission step: scan high → medium → low, pop the oldest entry
  /// belonging to `model_id` and move it into the in-flight set
  /// (score = now + task_timeout). Non-matching entries are pushed back to the lane head.
  ///
  /// 单次调用的扫描工作量以进入时各通道的长度为界；无可认领条目时
  /// 最多等待 `wait` 后返回 `None`。
  /// Per-call scan work is bounded by lane lengths at entry; when nothing is
  /// claimable, waits at most `wait` before returning `None`.
  async fn dequeue(&self, model_id: i64, wait: Duration) -> Result<Option<QueueEntry>>;

  /// 从在途集合移除该任务的条目（通过二级索引定位）
  /// Remove the task's entry from the in-flight set (located via the secondary index)
  async fn ack(&self, task_id: i64) -> Result<()>;

  /// 重新入队：`delay > 0` 时进延迟集合（score = now + delay），否则直接回优先级通道
  /// Requeue: into the delayed set when `delay > 0` (score = now + delay),
  /// otherwise straight back to the priority lane
  async fn requeue(&self, entry: &QueueEntry, delay: Duration) -> Result<()>;

  /// 将延迟集合中 score ≤ now 的条目移回各自的优先级通道，返回移动数量
  /// Move delayed entries with score ≤ now back to their priority lanes; returns the count moved
  async fn promote_delayed(&self, now: DateTime<Utc>) -> Result<u64>;

  /// 将在途集合中 score ≤ now 的条目经延迟集合重新入队（使用配置的重试延迟），返回回收数量
  /// Requeue in-flight entries with score ≤ now via the delayed set
  /// (using the configured retry delay); returns the count reaped
  async fn reap_expired(&self, now: DateTime<Utc>) -> Result<u64>;

  /// 返回五个结构的基数
  /// Return the cardinalities of the five structures
  async fn status(&self) -> Result<QueueStatus>;
}
