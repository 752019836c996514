//! Worker 模块
//! Worker module
//!
//! 一个工作者绑定一个模型：从队列认领属于该模型的最高优先级条目，
//! 驱动任务行走完状态机，并调用适配器执行。
//! One worker is bound to one model: it claims the model's highest-priority
//! entry from the queue, drives the task row through the state machine, and
//! invokes the adapter for execution.
//!
//! 失败路径的调用顺序是硬性约束：先 requeue 再 ack，保证任务在任一时刻
//! 至少出现在一个队列结构中。
//! The call order on the failure path is a hard constraint: requeue before
//! ack, so the task appears in at least one queue structure at all times.
//!
//! 工作者只在任务之间观察取消信号，不会打断执行中的适配器调用。
//! Workers observe cancellation only between tasks and never interrupt a
//! running adapter invocation.

use crate::adapters::AdapterRegistry;
use crate::base::{QueueBroker, QueueEntry};
use crate::config::WorkerConfig;
use crate::error::{Error, Result};
use crate::services::{FailureOutcome, ModelService, TaskService};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 出队出错后的退避时长
/// Backoff after a dequeue error
const DEQUEUE_BACKOFF: Duration = Duration::from_secs(5);

/// 工作者的共享依赖
/// Shared dependencies of a worker
#[derive(Clone)]
pub struct WorkerContext {
  pub broker: Arc<dyn QueueBroker>,
  pub tasks: Arc<TaskService>,
  pub models: Arc<ModelService>,
  pub adapters: Arc<AdapterRegistry>,
  pub config: WorkerConfig,
  /// 可重试失败使用的重新入队延迟
  /// Requeue delay used for retryable failures
  pub retry_delay: Duration,
}

/// 工作者活动状态
/// Worker activity state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerActivity {
  Idle,
  Busy,
}

/// 工作者状态快照，供仪表盘读取
/// Worker status snapshot, read by the dashboard
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
  pub worker_id: String,
  pub model_id: i64,
  pub status: WorkerActivity,
  pub current_task_id: Option<i64>,
  pub start_time: DateTime<Utc>,
  pub last_heartbeat: DateTime<Utc>,
}

struct WorkerState {
  activity: WorkerActivity,
  current_task_id: Option<i64>,
  last_heartbeat: DateTime<Utc>,
}

/// 工作者 - 以 (worker_id, model_id) 为参数
/// Worker - parameterized by (worker_id, model_id)
pub struct Worker {
  id: String,
  model_id: i64,
  ctx: WorkerContext,
  state: Mutex<WorkerState>,
  start_time: DateTime<Utc>,
  cancel: CancellationToken,
}

impl Worker {
  /// 创建新的工作者
  /// Create a new worker
  pub fn new(id: String, model_id: i64, ctx: WorkerContext, cancel: CancellationToken) -> Self {
    let now = Utc::now();
    Self {
      id,
      model_id,
      ctx,
      state: Mutex::new(WorkerState {
        activity: WorkerActivity::Idle,
        current_task_id: None,
        last_heartbeat: now,
      }),
      start_time: now,
      cancel,
    }
  }

  /// 工作者 ID
  /// Worker ID
  pub fn id(&self) -> &str {
    &self.id
  }

  /// 绑定的模型 ID
  /// Bound model ID
  pub fn model_id(&self) -> i64 {
    self.model_id
  }

  /// 状态快照
  /// Status snapshot
  pub fn status(&self) -> WorkerStatus {
    let state = self.state.lock().unwrap();
    WorkerStatus {
      worker_id: self.id.clone(),
      model_id: self.model_id,
      status: state.activity,
      current_task_id: state.current_task_id,
      start_time: self.start_time,
      last_heartbeat: state.last_heartbeat,
    }
  }

  fn set_busy(&self, task_id: i64) {
    let mut state = self.state.lock().unwrap();
    state.activity = WorkerActivity::Busy;
    state.current_task_id = Some(task_id);
  }

  fn set_idle(&self) {
    let mut state = self.state.lock().unwrap();
    state.activity = WorkerActivity::Idle;
    state.current_task_id = None;
  }

  /// 主工作循环；取消信号只在任务之间被观察
  /// Main worker loop; cancellation is observed only between tasks
  pub async fn run(self: Arc<Self>) {
    tracing::info!(worker_id = %self.id, model_id = self.model_id, "Worker starting");

    let heartbeat = self.clone().spawn_heartbeat();

    loop {
      if self.cancel.is_cancelled() {
        break;
      }

      let dequeued = tokio::select! {
        _ = self.cancel.cancelled() => break,
        result = self
          .ctx
          .broker
          .dequeue(self.model_id, self.ctx.config.poll_interval) => result,
      };

      let entry = match dequeued {
        Ok(Some(entry)) => entry,
        Ok(None) => continue,
        Err(e) => {
          // 瞬态存储错误：退避后重试
          // Transient store error: back off and retry
          tracing::error!(worker_id = %self.id, error = %e, "Dequeue failed");
          tokio::select! {
            _ = self.cancel.cancelled() => break,
            _ = tokio::time::sleep(DEQUEUE_BACKOFF) => continue,
          }
        }
      };

      self.set_busy(entry.task_id);
      if let Err(e) = self.execute(&entry).await {
        // 存储错误：在途条目留给回收器
        // Store error: the in-flight entry is left for the reaper
        tracing::error!(
          worker_id = %self.id,
          task_id = entry.task_id,
          error = %e,
          "Error processing task"
        );
      }
      self.set_idle();
    }

    heartbeat.abort();
    tracing::info!(worker_id = %self.id, "Worker stopped");
  }

  /// 心跳循环：周期性刷新注册表中的 last_heartbeat
  /// Heartbeat loop: periodically refreshes last_heartbeat in the registry
  fn spawn_heartbeat(self: Arc<Self>) -> JoinHandle<()> {
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(self.ctx.config.heartbeat_interval);
      loop {
        tokio::select! {
          _ = self.cancel.cancelled() => break,
          _ = ticker.tick() => {
            self.state.lock().unwrap().last_heartbeat = Utc::now();
            tracing::debug!(worker_id = %self.id, "Worker heartbeat");
          }
        }
      }
    })
  }

  /// 执行一个已认领的队列条目
  /// Execute one claimed queue entry
  async fn execute(&self, entry: &QueueEntry) -> Result<()> {
    // 任务行是事实来源；条目只携带 id
    // The task row is the source of truth; the entry only carries ids
    let task = match self.ctx.tasks.get(entry.task_id).await {
      Ok(task) => task,
      Err(Error::TaskNotFound { .. }) => {
        // 行已被删除：丢弃条目
        // The row was deleted: discard the entry
        tracing::warn!(task_id = entry.task_id, "Task row missing, discarding entry");
        self.ctx.broker.ack(entry.task_id).await?;
        return Ok(());
      }
      Err(e) => return Err(e),
    };

    // 状态列 CAS：取消或终态的任务不可认领
    // Status-column CAS: cancelled and terminal tasks are not claimable
    if !self.ctx.tasks.start(task.id).await? {
      tracing::debug!(task_id = task.id, "Task no longer claimable, dropping entry");
      self.ctx.broker.ack(task.id).await?;
      return Ok(());
    }

    let model = match self.ctx.models.get(task.model_id).await {
      Ok(model) => model,
      Err(Error::ModelNotFound { .. }) => {
        // 模型在任务入队后被删除
        // The model was deleted after the task was enqueued
        self.ctx.tasks.fail(task.id, "model unavailable").await?;
        self.ctx.broker.ack(task.id).await?;
        return Ok(());
      }
      Err(e) => return Err(e),
    };

    tracing::info!(
      worker_id = %self.id,
      task_id = task.id,
      task_type = %task.task_type,
      "Executing task"
    );

    match self
      .ctx
      .adapters
      .invoke(&model, &task.task_type, &task.input)
      .await
    {
      Ok(output) => {
        if self.ctx.tasks.complete(task.id, &output).await? {
          self.ctx.models.increment_request_count(model.id, true).await?;
          tracing::info!(worker_id = %self.id, task_id = task.id, "Task completed");
        } else {
          // 执行期间被取消：丢弃输出，不计数
          // Cancelled during execution: discard the output, no counters
          tracing::info!(task_id = task.id, "Task no longer running, discarding output");
        }
        self.ctx.broker.ack(task.id).await?;
      }
      Err(adapter_err) if adapter_err.retryable => {
        match self
          .ctx
          .tasks
          .fail_with_retry(task.id, &adapter_err.message)
          .await?
        {
          FailureOutcome::Retrying => {
            // 先 requeue 后 ack：任一时刻条目都在某个队列结构中
            // Requeue before ack: the entry is in some queue structure at all times
            self.ctx.broker.requeue(entry, self.ctx.retry_delay).await?;
            self.ctx.broker.ack(task.id).await?;
          }
          FailureOutcome::Exhausted => {
            self.ctx.models.increment_request_count(model.id, false).await?;
            self.ctx.broker.ack(task.id).await?;
          }
          FailureOutcome::Discarded => {
            self.ctx.broker.ack(task.id).await?;
          }
        }
      }
      Err(adapter_err) => {
        // 不可重试的适配器错误直接进入 failed
        // A non-retryable adapter error goes straight to failed
        if self.ctx.tasks.fail(task.id, &adapter_err.message).await? {
          self.ctx.models.increment_request_count(model.id, false).await?;
        }
        self.ctx.broker.ack(task.id).await?;
      }
    }

    Ok(())
  }
}
