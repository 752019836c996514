//! Redis 队列经纪人实现
//! Redis queue broker implementation
//!
//! 通道为 Redis 列表（LPUSH 入队、RPOP 出队保证 FIFO），在途与延迟集合为
//! 有序集合，score 分别是租约到期与可执行时刻的 unix 秒。
//! Lanes are Redis lists (LPUSH to enqueue, RPOP to dequeue for FIFO); the
//! in-flight and delayed sets are sorted sets scored by lease-expiry and
//! eligibility unix seconds respectively.
//!
//! 没有跨键事务：每个操作依赖 Redis 单命令原子性，调用顺序
//! （先 requeue 后 ack，先入延迟集合再移出在途集合）补偿中间状态。
//! There is no multi-key transaction: each operation relies on Redis
//! single-command atomicity, and call ordering (requeue before ack, delayed
//! insert before in-flight removal) compensates for intermediate states.

use crate::base::{QueueBroker, QueueEntry, QueueStatus};
use crate::config::{QueueConfig, RedisConfig};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::time::Duration;

/// Redis 队列经纪人
/// Redis queue broker
pub struct RedisQueue {
  client: redis::Client,
  config: QueueConfig,
}

impl RedisQueue {
  /// 创建新的 Redis 队列经纪人实例（惰性连接）
  /// Create a new Redis queue broker instance (connects lazily)
  pub fn new(redis: &RedisConfig, config: QueueConfig) -> Result<Self> {
    let client = redis::Client::open(redis.url.as_str())?;
    Ok(Self { client, config })
  }

  /// 获取异步连接
  /// Get an asynchronous connection
  async fn conn(&self) -> Result<MultiplexedConnection> {
    Ok(self.client.get_multiplexed_async_connection().await?)
  }

  /// 将条目移入在途集合并写二级索引
  /// Move an entry into the in-flight set and write the secondary index
  ///
  /// 先写索引、后写在途集合：失败路径上条目绝不会同时出现在通道与
  /// 在途集合两处。悬空的索引项对 ack 是无害的空操作。
  /// The index is written before the in-flight set: on the failure path the
  /// entry never sits in both a lane and the in-flight set at once. A
  /// dangling index field is a harmless no-op for ack.
  async fn move_to_processing(
    &self,
    conn: &mut MultiplexedConnection,
    raw: &str,
    entry: &QueueEntry,
  ) -> Result<()> {
    let index = self.config.processing_index_key();
    let _: () = conn.hset(&index, entry.task_id, raw).await?;

    let deadline = (Utc::now() + self.config.task_timeout).timestamp();
    if let Err(e) = conn
      .zadd::<_, _, _, ()>(&self.config.processing_key, raw, deadline)
      .await
    {
      // 条目未进入在途集合：收回索引项，调用方会把条目推回通道
      // The entry never entered the in-flight set: retract the index field,
      // the caller pushes the entry back to its lane
      if let Err(cleanup_err) = conn.hdel::<_, _, i64>(&index, entry.task_id).await {
        tracing::warn!(
          task_id = entry.task_id,
          error = %cleanup_err,
          "Failed to retract in-flight index entry"
        );
      }
      return Err(e.into());
    }
    Ok(())
  }
}

#[async_trait]
impl QueueBroker for RedisQueue {
  async fn ping(&self) -> Result<()> {
    let mut conn = self.conn().await?;
    let _: String = redis::cmd("PING").query_async(&mut conn).await?;
    Ok(())
  }

  async fn close(&self) -> Result<()> {
    // 连接按操作获取，客户端丢弃时关闭
    // Connections are obtained per operation; the client closes on drop
    Ok(())
  }

  async fn enqueue(&self, entry: &QueueEntry) -> Result<()> {
    let mut conn = self.conn().await?;
    let lane = self.config.lane_key(entry.priority);

    let len: u64 = conn.llen(lane).await?;
    if len >= self.config.max_queue_size {
      return Err(Error::QueueFull {
        lane: lane.to_string(),
        size: len,
      });
    }

    let raw = serde_json::to_string(entry)?;
    let _: () = conn.lpush(lane, raw).await?;

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
    let mut conn = self.conn().await?;

    for lane in self.config.lanes() {
      // 以进入时的通道长度为单次调用的扫描上界
      // Bound per-call scan work by the lane length at entry
      let len: u64 = conn.llen(lane).await?;
      for _ in 0..len {
        let raw: Option<String> = conn.rpop(lane, None).await?;
        let Some(raw) = raw else { break };

        let entry: QueueEntry = match serde_json::from_str(&raw) {
          Ok(entry) => entry,
          Err(e) => {
            // 无法解析的条目无法归属任何模型，丢弃并继续
            // An unparsable entry belongs to no model; drop it and move on
            tracing::error!(queue = lane, error = %e, "Dropping malformed queue entry");
            continue;
          }
        };

        if entry.model_id == model_id {
          if let Err(e) = self.move_to_processing(&mut conn, &raw, &entry).await {
            // 认领失败，放回通道留给下一次尝试
            // Claim failed; push back for the next attempt
            let _: () = conn.lpush(lane, &raw).await?;
            return Err(e);
          }
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
        let _: () = conn.lpush(lane, &raw).await?;
      }
    }

    // 无可认领条目；短暂等待以降低空转
    // Nothing claimable; wait briefly to reduce spinning
    if !wait.is_zero() {
      tokio::time::sleep(wait).await;
    }
    Ok(None)
  }

  async fn ack(&self, task_id: i64) -> Result<()> {
    let mut conn = self.conn().await?;
    let index = self.config.processing_index_key();

    let raw: Option<String> = conn.hget(&index, task_id).await?;
    if let Some(raw) = raw {
      let _: i64 = conn.zrem(&self.config.processing_key, &raw).await?;
      let _: i64 = conn.hdel(&index, task_id).await?;
      tracing::debug!(task_id, "In-flight entry acked");
    }
    Ok(())
  }

  async fn requeue(&self, entry: &QueueEntry, delay: Duration) -> Result<()> {
    let mut conn = self.conn().await?;
    let raw = serde_json::to_string(entry)?;

    if !delay.is_zero() {
      let eligible_at = (Utc::now() + delay).timestamp();
      let _: () = conn.zadd(&self.config.delayed_key, raw, eligible_at).await?;
      tracing::debug!(task_id = entry.task_id, delay_secs = delay.as_secs(), "Task delayed");
    } else {
      let lane = self.config.lane_key(entry.priority);
      let _: () = conn.lpush(lane, raw).await?;
      tracing::debug!(task_id = entry.task_id, queue = lane, "Task requeued");
    }
    Ok(())
  }

  async fn promote_delayed(&self, now: DateTime<Utc>) -> Result<u64> {
    let mut conn = self.conn().await?;
    let ripe: Vec<String> = conn
      .zrangebyscore(&self.config.delayed_key, "-inf", now.timestamp())
      .await?;

    let mut moved = 0;
    for raw in ripe {
      let entry: QueueEntry = match serde_json::from_str(&raw) {
        Ok(entry) => entry,
        Err(e) => {
          tracing::error!(error = %e, "Dropping malformed delayed entry");
          let _: i64 = conn.zrem(&self.config.delayed_key, &raw).await?;
          continue;
        }
      };

      // 先推回通道再移出延迟集合：宁可短暂重复，不可丢失
      // Push to the lane before removing from the delayed set:
      // momentary duplication over loss
      let lane = self.config.lane_key(entry.priority);
      let _: () = conn.lpush(lane, &raw).await?;
      let _: i64 = conn.zrem(&self.config.delayed_key, &raw).await?;

      tracing::info!(task_id = entry.task_id, queue = lane, "Delayed task promoted");
      moved += 1;
    }
    Ok(moved)
  }

  async fn reap_expired(&self, now: DateTime<Utc>) -> Result<u64> {
    let mut conn = self.conn().await?;
    let index = self.config.processing_index_key();
    let expired: Vec<String> = conn
      .zrangebyscore(&self.config.processing_key, "-inf", now.timestamp())
      .await?;

    let mut reaped = 0;
    for raw in expired {
      let entry: QueueEntry = match serde_json::from_str(&raw) {
        Ok(entry) => entry,
        Err(e) => {
          tracing::error!(error = %e, "Dropping malformed in-flight entry");
          let _: i64 = conn.zrem(&self.config.processing_key, &raw).await?;
          continue;
        }
      };

      tracing::warn!(task_id = entry.task_id, "Found expired in-flight entry, requeueing");

      // 先入延迟集合，再移出在途集合
      // Insert into the delayed set before removing from the in-flight set
      let eligible_at = (now + self.config.retry_delay).timestamp();
      let _: () = conn.zadd(&self.config.delayed_key, &raw, eligible_at).await?;
      let _: i64 = conn.zrem(&self.config.processing_key, &raw).await?;
      let _: i64 = conn.hdel(&index, entry.task_id).await?;
      reaped += 1;
    }
    Ok(reaped)
  }

  async fn status(&self) -> Result<QueueStatus> {
    let mut conn = self.conn().await?;

    let high: u64 = conn.llen(&self.config.high_key).await?;
    let medium: u64 = conn.llen(&self.config.medium_key).await?;
    let low: u64 = conn.llen(&self.config.low_key).await?;
    let processing: u64 = conn.zcard(&self.config.processing_key).await?;
    let delayed: u64 = conn.zcard(&self.config.delayed_key).await?;

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

  #[test]
  fn test_new_rejects_invalid_url() {
    let redis = RedisConfig {
      url: "not-a-redis-url".to_string(),
    };
    assert!(RedisQueue::new(&redis, QueueConfig::default()).is_err());
  }

  #[test]
  fn test_new_with_valid_url() {
    // 仅解析 URL，不建立连接
    // Only parses the URL, no connection is made
    let redis = RedisConfig::default();
    assert!(RedisQueue::new(&redis, QueueConfig::default()).is_ok());
  }
}
