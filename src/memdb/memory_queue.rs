//! 内存队列经纪人实现
//! In-memory queue broker implementation
//!
//! 使用内存数据结构实现与 Redis 后端相同的语义，不依赖任何外部服务。
//! Implements the same semantics as the Redis backend using in-memory data
//! structures, without any external service dependencies.
//! 用于测试和单进程部署。
//! Used by tests and single-process deployments.
//!
//! 成员与 Redis 后端一样是序列化后的 JSON 条目，通道头尾、集合 score
//! 的处理顺序也保持一致，使两个后端在不变量上可互换。
//! Members are serialized JSON entries just like the Redis backend, and
//! lane head/tail handling and set-score ordering match, so the two
//! backends are interchangeable with respect to the invariants.

use crate::base::{QueueBroker, QueueEntry, QueueStatus};
use crate::config::QueueConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// 内存存储
/// In-memory storage
#[derive(Default)]
struct MemoryState {
  /// 优先级通道 - 头部在前（索引 0 即 LPUSH 侧）
  /// Priority lanes - head first (index 0 is the LPUSH side)
  lanes: HashMap<String, VecDeque<String>>,
  /// 在途集合：成员 → 租约到期 unix 秒
  /// In-flight set: member → lease-expiry unix seconds
  processing: HashMap<String, i64>,
  /// 在途二级索引：task_id → 成员
  /// In-flight secondary index: task_id → member
  processing_index: HashMap<i64, String>,
  /// 延迟集合：成员 → 可执行 unix 秒
  /// Delayed set: member → eligibility unix seconds
  delayed: HashMap<String, i64>,
}

impl MemoryState {
  fn lane_mut(&mut self, key: &str) -> &mut VecDeque<String> {
    self.lanes.entry(key.to_string()).or_default()
  }

  fn lane_len(&self, key: &str) -> u64 {
    self.lanes.get(key).map(|lane| lane.len() as u64).unwrap_or(0)
  }

  /// 取出集合中 score ≤ cutoff 的成员，按 (score, 成员) 排序以模拟有序集合
  /// Collect members with score ≤ cutoff, sorted by (score, member) to
  /// mimic the sorted set ordering
  fn ripe_members(set: &HashMap<String, i64>, cutoff: i64) -> Vec<String> {
    let mut ripe: Vec<(&String, &i64)> =
      set.iter().filter(|(_, score)| **score <= cutoff).collect();
    ripe.sort_by(|a, b| a.1.cmp(b.1).then_with(|| a.0.cmp(b.0)));
    ripe.into_iter().map(|(member, _)| member.clone()).collect()
  }
}

/// 内存队列经纪人
/// In-memory queue broker
pub struct MemoryQueue {
  state: Arc<Mutex<MemoryState>>,
  config: QueueConfig,
}

impl MemoryQueue {
  /// 创建新的内存队列经纪人实例
  /// Create a new in-memory queue broker instance
  pub fn new(config: QueueConfig) -> Self {
    Self {
      state: Arc::new(Mutex::new(MemoryState::default())),
      config,
    }
  }
}

impl Default for MemoryQueue {
  fn default() -> Self {
    Self::new(QueueConfig::default())
  }
}

#[async_trait]
impl QueueBroker for MemoryQueue {
  async fn ping(&self) -> Result<()> {
    Ok(())
  }

  async fn close(&self) -> Result<()> {
    Ok(())
  }

  async fn enqueue(&self, entry: &QueueEntry) -> Result<()> {
    let mut state = self.state.lock().await;
    let lane = self.config.lane_key(entry.priority);

    let len = state.lane_len(lane);
    if len >= self.config.max_queue_size {
      return Err(Error::QueueFull {
        lane: lane.to_string(),
        size: len,
      });
    }

    let raw = serde_json::to_string(entry)?;
    state.lane_mut(lane).push_front(raw);

    tracing::info!(
      task_id = entry.task_id,
      model_id = entry.model_id,
      priority = entry.priority,
      queue = lane,
      "Task enqueued"
    );
    Ok(())
  }

  async fn dequeue(&self, model_id: i64, wait: Duration) -> Result<Option<QueueEntry>> {
    {
      let mut state = self.state.lock().await;

      for lane in self.config.lanes() {
        let len = state.lane_len(lane);
        for _ in 0..len {
          let Some(raw) = state.lane_mut(lane).pop_back() else {
            break;
          };

          let entry: QueueEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
              tracing::error!(queue = lane, error = %e, "Dropping malformed queue entry");
              continue;
            }
          };

          if entry.model_id == model_id {
            let deadline = (Utc::now() + self.config.task_timeout).timestamp();
            state.processing.insert(raw.clone(), deadline);
            state.processing_index.insert(entry.task_id, raw);
            tracing::debug!(
              task_id = entry.task_id,
              model_id = entry.model_id,
              queue = lane,
              "Task dequeued"
            );
            return Ok(Some(entry));
          }

          // 不属于本模型，推回同一通道的头部
          // Not this model's task; push it back to the head of the same lane
          state.lane_mut(lane).push_front(raw);
        }
      }
    }

    if !wait.is_zero() {
      tokio::time::sleep(wait).await;
    }
    Ok(None)
  }

  async fn ack(&self, task_id: i64) -> Result<()> {
    let mut state = self.state.lock().await;
    if let Some(raw) = state.processing_index.remove(&task_id) {
      state.processing.remove(&raw);
      tracing::debug!(task_id, "In-flight entry acked");
    }
    Ok(())
  }

  async fn requeue(&self, entry: &QueueEntry, delay: Duration) -> Result<()> {
    let mut state = self.state.lock().await;
    let raw = serde_json::to_string(entry)?;

    if !delay.is_zero() {
      let eligible_at = (Utc::now() + delay).timestamp();
      state.delayed.insert(raw, eligible_at);
      tracing::debug!(task_id = entry.task_id, delay_secs = delay.as_secs(), "Task delayed");
    } else {
      let lane = self.config.lane_key(entry.priority);
      state.lane_mut(lane).push_front(raw);
      tracing::debug!(task_id = entry.task_id, queue = lane, "Task requeued");
    }
    Ok(())
  }

  async fn promote_delayed(&self, now: DateTime<Utc>) -> Result<u64> {
    let mut state = self.state.lock().await;
    let ripe = MemoryState::ripe_members(&state.delayed, now.timestamp());

    let mut moved = 0;
    for raw in ripe {
      let entry: QueueEntry = match serde_json::from_str(&raw) {
        Ok(entry) => entry,
        Err(e) => {
          tracing::error!(error = %e, "Dropping malformed delayed entry");
          state.delayed.remove(&raw);
          continue;
        }
      };

      let lane = self.config.lane_key(entry.priority);
      state.lane_mut(lane).push_front(raw.clone());
      state.delayed.remove(&raw);

      tracing::info!(task_id = entry.task_id, queue = lane, "Delayed task promoted");
      moved += 1;
    }
    Ok(moved)
  }

  async fn reap_expired(&self, now: DateTime<Utc>) -> Result<u64> {
    let mut state = self.state.lock().await;
    let expired = MemoryState::ripe_members(&state.processing, now.timestamp());

    let mut reaped = 0;
    for raw in expired {
      let entry: QueueEntry = match serde_json::from_str(&raw) {
        Ok(entry) => entry,
        Err(e) => {
          tracing::error!(error = %e, "Dropping malformed in-flight entry");
          state.processing.remove(&raw);
          continue;
        }
      };

      tracing::warn!(task_id = entry.task_id, "Found expired in-flight entry, requeueing");

      let eligible_at = (now + self.config.retry_delay).timestamp();
      state.delayed.insert(raw.clone(), eligible_at);
      state.processing.remove(&raw);
      state.processing_index.remove(&entry.task_id);
      reaped += 1;
    }
    Ok(reaped)
  }

  async fn status(&self) -> Result<QueueStatus> {
    let state = self.state.lock().await;

    let high = state.lane_len(&self.config.high_key);
    let medium = state.lane_len(&self.config.medium_key);
    let low = state.lane_len(&self.config.low_key);
    let processing = state.processing.len() as u64;
    let delayed = state.delayed.len() as u64;

    Ok(QueueStatus {
      high,
      medium,
      low,
      processing,
      delayed,
      total: high + medium + low + processing + delayed,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::entity::tasks::TaskPriority;

  fn entry(task_id: i64, model_id: i64, priority: TaskPriority) -> QueueEntry {
    QueueEntry::new(task_id, model_id, priority, Utc::now())
  }

  #[tokio::test]
  async fn test_enqueue_dequeue_fifo() {
    let queue = MemoryQueue::default();
    for id in 1..=3 {
      queue.enqueue(&entry(id, 1, TaskPriority::Medium)).await.unwrap();
    }

    for expected in 1..=3 {
      let got = queue.dequeue(1, Duration::ZERO).await.unwrap().unwrap();
      assert_eq!(got.task_id, expected);
    }
    assert!(queue.dequeue(1, Duration::ZERO).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_dequeue_prefers_higher_lane() {
    let queue = MemoryQueue::default();
    queue.enqueue(&entry(1, 1, TaskPriority::Low)).await.unwrap();
    queue.enqueue(&entry(2, 1, TaskPriority::High)).await.unwrap();
    queue.enqueue(&entry(3, 1, TaskPriority::Medium)).await.unwrap();

    let order: Vec<i64> = [
      queue.dequeue(1, Duration::ZERO).await.unwrap().unwrap().task_id,
      queue.dequeue(1, Duration::ZERO).await.unwrap().unwrap().task_id,
      queue.dequeue(1, Duration::ZERO).await.unwrap().unwrap().task_id,
    ]
    .to_vec();
    assert_eq!(order, vec![2, 3, 1]);
  }

  #[tokio::test]
  async fn test_dequeue_skips_other_models() {
    let queue = MemoryQueue::default();
    queue.enqueue(&entry(1, 1, TaskPriority::Medium)).await.unwrap();
    queue.enqueue(&entry(2, 2, TaskPriority::Medium)).await.unwrap();

    // model 2 的工作者越过 model 1 的条目
    // A model-2 worker skips past the model-1 entry
    let got = queue.dequeue(2, Duration::ZERO).await.unwrap().unwrap();
    assert_eq!(got.task_id, 2);

    // model 1 的条目保留在通道中
    // The model-1 entry remains in its lane
    let status = queue.status().await.unwrap();
    assert_eq!(status.medium, 1);
    assert_eq!(status.processing, 1);

    let got = queue.dequeue(1, Duration::ZERO).await.unwrap().unwrap();
    assert_eq!(got.task_id, 1);
  }

  #[tokio::test]
  async fn test_ack_removes_in_flight_entry() {
    let queue = MemoryQueue::default();
    queue.enqueue(&entry(1, 1, TaskPriority::Medium)).await.unwrap();
    queue.dequeue(1, Duration::ZERO).await.unwrap().unwrap();

    assert_eq!(queue.status().await.unwrap().processing, 1);
    queue.ack(1).await.unwrap();
    assert_eq!(queue.status().await.unwrap().processing, 0);

    // ack 是幂等的
    // ack is idempotent
    queue.ack(1).await.unwrap();
    assert_eq!(queue.status().await.unwrap().total, 0);
  }

  #[tokio::test]
  async fn test_requeue_with_and_without_delay() {
    let queue = MemoryQueue::default();
    let e = entry(1, 1, TaskPriority::High);

    queue.requeue(&e, Duration::ZERO).await.unwrap();
    assert_eq!(queue.status().await.unwrap().high, 1);

    let e2 = entry(2, 1, TaskPriority::High);
    queue.requeue(&e2, Duration::from_secs(60)).await.unwrap();
    assert_eq!(queue.status().await.unwrap().delayed, 1);
  }

  #[tokio::test]
  async fn test_promote_delayed_noop_before_eligibility() {
    let queue = MemoryQueue::default();
    queue
      .requeue(&entry(1, 1, TaskPriority::Medium), Duration::from_secs(3600))
      .await
      .unwrap();

    // 在最早的 score 之前晋升是空操作
    // Promotion before the earliest score is a no-op
    let moved = queue.promote_delayed(Utc::now()).await.unwrap();
    assert_eq!(moved, 0);
    assert_eq!(queue.status().await.unwrap().delayed, 1);

    let moved = queue
      .promote_delayed(Utc::now() + Duration::from_secs(3601))
      .await
      .unwrap();
    assert_eq!(moved, 1);
    assert_eq!(queue.status().await.unwrap().medium, 1);
  }

  #[tokio::test]
  async fn test_reap_expired_twice_is_noop() {
    let config = QueueConfig {
      task_timeout: Duration::from_secs(5),
      retry_delay: Duration::from_secs(1),
      ..QueueConfig::default()
    };
    let queue = MemoryQueue::new(config);
    queue.enqueue(&entry(1, 1, TaskPriority::Medium)).await.unwrap();
    queue.dequeue(1, Duration::ZERO).await.unwrap().unwrap();

    let later = Utc::now() + Duration::from_secs(6);
    let reaped = queue.reap_expired(later).await.unwrap();
    assert_eq!(reaped, 1);
    assert_eq!(queue.status().await.unwrap().delayed, 1);

    // 无时间流逝时再次回收是空操作
    // Reaping again with no elapsed time is a no-op
    let reaped = queue.reap_expired(later).await.unwrap();
    assert_eq!(reaped, 0);
  }

  #[tokio::test]
  async fn test_enqueue_rejects_when_full() {
    let config = QueueConfig {
      max_queue_size: 2,
      ..QueueConfig::default()
    };
    let queue = MemoryQueue::new(config);

    queue.enqueue(&entry(1, 1, TaskPriority::Medium)).await.unwrap();
    queue.enqueue(&entry(2, 1, TaskPriority::Medium)).await.unwrap();
    let err = queue.enqueue(&entry(3, 1, TaskPriority::Medium)).await.unwrap_err();
    assert!(matches!(err, Error::QueueFull { .. }));

    // 其他通道不受影响
    // Other lanes are unaffected
    queue.enqueue(&entry(4, 1, TaskPriority::High)).await.unwrap();
  }
}
