//! 任务生命周期服务
//! Task lifecycle service
//!
//! 任务行的唯一修改者。状态列上的 compare-and-set 是所有转换的串行化点：
//! 每次转换都以期望的前置状态为过滤条件，受影响行数为 0 即表示竞争失败。
//! The sole mutator of task rows. The compare-and-set on the status column is
//! the serialization point for every transition: each update filters on the
//! expected prior status, and zero affected rows means the race was lost.
//!
//! 状态机：
//! State machine:
//!
//! ```text
//! pending ──worker.start──► running ──ok──► completed [T]
//!    ▲                         │
//!    │                         ├──err, retries left──► pending（经延迟集合）
//!    │                         └──err, exhausted────► failed [T]
//!    │  user.cancel ─► cancelled [T]（允许从 pending 或 running）
//!    └──user.retry─── failed（retry_count < max_retries 时）
//! ```

use crate::base::constants::DEFAULT_MAX_RETRIES;
use crate::base::{QueueBroker, QueueEntry};
use crate::entity::task_logs::{self, LogLevel};
use crate::entity::tasks::{self, TaskPriority, TaskStatus};
use crate::entity::{TaskLogs, Tasks};
use crate::error::{Error, Result};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
  ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
  PaginatorTrait, QueryFilter, QueryOrder,
};
use std::sync::Arc;

/// 创建任务请求
/// Create-task request
#[derive(Debug, Clone)]
pub struct CreateTask {
  pub model_id: i64,
  pub task_type: String,
  pub input: String,
  /// 默认 medium
  /// Defaults to medium
  pub priority: Option<TaskPriority>,
  /// 默认 3
  /// Defaults to 3
  pub max_retries: Option<i32>,
}

/// 任务列表过滤条件
/// Task list filter
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
  pub model_id: Option<i64>,
  pub status: Option<TaskStatus>,
  pub task_type: Option<String>,
  pub priority: Option<TaskPriority>,
}

/// 分页的任务列表结果
/// Paginated task list result
#[derive(Debug, Clone)]
pub struct TaskPage {
  pub tasks: Vec<tasks::Model>,
  pub total: u64,
  pub page: u64,
  pub page_size: u64,
}

/// 失败处理的结果，决定工作者的后续动作
/// Outcome of failure handling, deciding the worker's follow-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
  /// 已转回 pending 并应重新入队
  /// Moved back to pending and should be requeued
  Retrying,
  /// 重试耗尽，已转入 failed
  /// Retries exhausted, moved to failed
  Exhausted,
  /// 行已被取消或删除，丢弃即可
  /// The row was cancelled or deleted; just discard
  Discarded,
}

/// 任务生命周期服务
/// Task lifecycle service
pub struct TaskService {
  db: DatabaseConnection,
  broker: Arc<dyn QueueBroker>,
}

impl TaskService {
  /// 创建任务生命周期服务
  /// Create the task lifecycle service
  pub fn new(db: DatabaseConnection, broker: Arc<dyn QueueBroker>) -> Self {
    Self { db, broker }
  }

  /// 创建任务：写入 pending 行并入队到匹配优先级的通道
  /// Create a task: write a pending row and enqueue into the matching priority lane
  ///
  /// 入队失败时行被标记为 failed（行已持久化但队列拒绝了它）
  /// On enqueue failure the row is marked failed (the row persisted but the queue rejected it)
  pub async fn create(&self, req: CreateTask) -> Result<tasks::Model> {
    if req.task_type.trim().is_empty() {
      return Err(Error::validation("task type must not be empty"));
    }
    if req.input.is_empty() {
      return Err(Error::validation("task input must not be empty"));
    }

    // 校验模型存在
    // Validate that the model exists
    crate::entity::Models::find_by_id(req.model_id)
      .one(&self.db)
      .await?
      .ok_or(Error::ModelNotFound { id: req.model_id })?;

    let now = Utc::now().into();
    let task = tasks::ActiveModel {
      model_id: Set(req.model_id),
      task_type: Set(req.task_type),
      input: Set(req.input),
      output: Set(None),
      status: Set(TaskStatus::Pending),
      priority: Set(req.priority.unwrap_or(TaskPriority::Medium)),
      retry_count: Set(0),
      max_retries: Set(req.max_retries.unwrap_or(DEFAULT_MAX_RETRIES).max(0)),
      error_message: Set(None),
      started_at: Set(None),
      completed_at: Set(None),
      created_at: Set(now),
      updated_at: Set(now),
      ..Default::default()
    }
    .insert(&self.db)
    .await?;

    let entry = QueueEntry::new(task.id, task.model_id, task.priority, task.created_at.into());
    if let Err(e) = self.broker.enqueue(&entry).await {
      tracing::error!(task_id = task.id, error = %e, "Failed to enqueue task");
      // 行已持久化但入队失败：标记为 failed 以免任务悬空
      // The row persisted but enqueue failed: mark it failed so it does not dangle
      Tasks::update_many()
        .set(tasks::ActiveModel {
          status: Set(TaskStatus::Failed),
          error_message: Set(Some("failed to enqueue task".to_string())),
          completed_at: Set(Some(db_now())),
          updated_at: Set(db_now()),
          ..Default::default()
        })
        .filter(tasks::Column::Id.eq(task.id))
        .exec(&self.db)
        .await?;
      return Err(e);
    }

    self
      .add_log(task.id, LogLevel::Info, "Task created and enqueued", None)
      .await;

    tracing::info!(
      task_id = task.id,
      model_id = task.model_id,
      task_type = %task.task_type,
      priority = %task.priority,
      "Task created"
    );
    Ok(task)
  }

  /// 获取任务详情
  /// Get task details
  pub async fn get(&self, id: i64) -> Result<tasks::Model> {
    Tasks::find_by_id(id)
      .one(&self.db)
      .await?
      .ok_or(Error::TaskNotFound { id })
  }

  /// 任务列表，按创建时间倒序分页
  /// List tasks, paginated in descending creation order
  pub async fn list(&self, filter: TaskFilter, page: u64, page_size: u64) -> Result<TaskPage> {
    let page = page.max(1);
    let page_size = page_size.clamp(1, 100);

    let mut query = Tasks::find();
    if let Some(model_id) = filter.model_id {
      query = query.filter(tasks::Column::ModelId.eq(model_id));
    }
    if let Some(status) = filter.status {
      query = query.filter(tasks::Column::Status.eq(status));
    }
    if let Some(task_type) = filter.task_type {
      query = query.filter(tasks::Column::TaskType.eq(task_type));
    }
    if let Some(priority) = filter.priority {
      query = query.filter(tasks::Column::Priority.eq(priority));
    }

    let paginator = query
      .order_by_desc(tasks::Column::CreatedAt)
      .paginate(&self.db, page_size);
    let total = paginator.num_items().await?;
    let tasks = paginator.fetch_page(page - 1).await?;

    Ok(TaskPage {
      tasks,
      total,
      page,
      page_size,
    })
  }

  /// 取消任务；仅允许从 pending 或 running
  /// Cancel a task; allowed only from pending or running
  ///
  /// 不打断正在进行的适配器调用：工作者在调用结束时会发现 cancelled 并丢弃输出
  /// Does not interrupt an in-progress adapter invocation: the worker discovers
  /// cancelled when the invocation finishes and discards the output
  pub async fn cancel(&self, id: i64) -> Result<()> {
    let task = self.get(id).await?;
    if task.status.is_terminal() {
      return Err(Error::state_conflict(format!(
        "task cannot be cancelled in status {}",
        task.status
      )));
    }

    let result = Tasks::update_many()
      .set(tasks::ActiveModel {
        status: Set(TaskStatus::Cancelled),
        completed_at: Set(Some(db_now())),
        updated_at: Set(db_now()),
        ..Default::default()
      })
      .filter(tasks::Column::Id.eq(id))
      .filter(
        Condition::any()
          .add(tasks::Column::Status.eq(TaskStatus::Pending))
          .add(tasks::Column::Status.eq(TaskStatus::Running)),
      )
      .exec(&self.db)
      .await?;
    if result.rows_affected == 0 {
      return Err(Error::state_conflict("task reached a terminal status concurrently"));
    }

    // 丢弃可能存在的在途条目（幂等；pending 任务的通道条目由工作者
    // 在出队后发现 cancelled 时清理）
    // Drop any in-flight entry (idempotent; a pending task's lane entry is
    // cleaned up by the worker when it dequeues it and sees cancelled)
    self.broker.ack(id).await?;

    self
      .add_log(id, LogLevel::Info, "Task cancelled by user", None)
      .await;
    tracing::info!(task_id = id, "Task cancelled");
    Ok(())
  }

  /// 用户发起的重试；仅允许从 failed 且还有重试额度
  /// User-initiated retry; allowed only from failed with retry budget remaining
  ///
  /// 并发调用下由状态列 CAS 保证只有一个生效
  /// Under concurrent callers the status-column CAS lets only one succeed
  pub async fn retry(&self, id: i64) -> Result<()> {
    let task = self.get(id).await?;
    if task.status != TaskStatus::Failed {
      return Err(Error::state_conflict(format!(
        "task cannot be retried in status {}",
        task.status
      )));
    }
    if task.retry_count >= task.max_retries {
      return Err(Error::state_conflict("task has exhausted its retry budget"));
    }

    let result = Tasks::update_many()
      .set(tasks::ActiveModel {
        status: Set(TaskStatus::Pending),
        error_message: Set(None),
        started_at: Set(None),
        completed_at: Set(None),
        updated_at: Set(db_now()),
        ..Default::default()
      })
      .col_expr(
        tasks::Column::RetryCount,
        Expr::col(tasks::Column::RetryCount).add(1),
      )
      .filter(tasks::Column::Id.eq(id))
      .filter(tasks::Column::Status.eq(TaskStatus::Failed))
      .exec(&self.db)
      .await?;
    if result.rows_affected == 0 {
      return Err(Error::state_conflict("task was already retried"));
    }

    let entry = QueueEntry::new(task.id, task.model_id, task.priority, task.created_at.into());
    self.broker.enqueue(&entry).await?;

    self
      .add_log(
        id,
        LogLevel::Info,
        &format!(
          "Task retried (attempt {}/{})",
          task.retry_count + 1,
          task.max_retries
        ),
        None,
      )
      .await;
    tracing::info!(task_id = id, retry_count = task.retry_count + 1, "Task retried");
    Ok(())
  }

  /// 工作者认领任务：转换到 running 并记录开始时间
  /// Worker claim: transition to running and record the start time
  ///
  /// 接受 pending 与 running 两种前置状态 —— running 只出现在回收器把崩溃
  /// 工作者的条目重新入队之后，此时行仍停留在 running。取消与终态不可认领。
  /// Accepts pending and running as prior statuses - running only occurs after
  /// the reaper requeued a crashed worker's entry while the row stayed in
  /// running. Cancelled and terminal rows are not claimable.
  pub async fn start(&self, id: i64) -> Result<bool> {
    let result = Tasks::update_many()
      .set(tasks::ActiveModel {
        status: Set(TaskStatus::Running),
        started_at: Set(Some(db_now())),
        updated_at: Set(db_now()),
        ..Default::default()
      })
      .filter(tasks::Column::Id.eq(id))
      .filter(
        Condition::any()
          .add(tasks::Column::Status.eq(TaskStatus::Pending))
          .add(tasks::Column::Status.eq(TaskStatus::Running)),
      )
      .exec(&self.db)
      .await?;

    let claimed = result.rows_affected > 0;
    if claimed {
      self
        .add_log(id, LogLevel::Info, "Task execution started", None)
        .await;
    }
    Ok(claimed)
  }

  /// 完成任务；仅从 running 生效，返回是否生效
  /// Complete a task; effective only from running, returns whether it applied
  ///
  /// 返回 false 意味着任务在执行期间被取消，输出应被丢弃
  /// false means the task was cancelled during execution and the output must be discarded
  pub async fn complete(&self, id: i64, output: &str) -> Result<bool> {
    let result = Tasks::update_many()
      .set(tasks::ActiveModel {
        status: Set(TaskStatus::Completed),
        output: Set(Some(output.to_string())),
        completed_at: Set(Some(db_now())),
        updated_at: Set(db_now()),
        ..Default::default()
      })
      .filter(tasks::Column::Id.eq(id))
      .filter(tasks::Column::Status.eq(TaskStatus::Running))
      .exec(&self.db)
      .await?;

    let applied = result.rows_affected > 0;
    if applied {
      self
        .add_log(id, LogLevel::Info, "Task completed successfully", None)
        .await;
    }
    Ok(applied)
  }

  /// 任务失败（不走重试分支）；仅从 running 生效
  /// Fail a task (bypassing the retry branch); effective only from running
  pub async fn fail(&self, id: i64, error: &str) -> Result<bool> {
    let result = Tasks::update_many()
      .set(tasks::ActiveModel {
        status: Set(TaskStatus::Failed),
        error_message: Set(Some(error.to_string())),
        completed_at: Set(Some(db_now())),
        updated_at: Set(db_now()),
        ..Default::default()
      })
      .filter(tasks::Column::Id.eq(id))
      .filter(tasks::Column::Status.eq(TaskStatus::Running))
      .exec(&self.db)
      .await?;

    let applied = result.rows_affected > 0;
    if applied {
      self
        .add_log(
          id,
          LogLevel::Error,
          "Task failed",
          Some(serde_json::json!({ "error": error })),
        )
        .await;
    }
    Ok(applied)
  }

  /// 可重试失败的处理：还有额度则递增 retry_count 并转回 pending，
  /// 耗尽则转入 failed。retry_count 在重新入队之前递增。
  /// Handle a retryable failure: with budget left, increment retry_count and
  /// move back to pending; otherwise move to failed. retry_count is
  /// incremented before the re-enqueue happens.
  pub async fn fail_with_retry(&self, id: i64, error: &str) -> Result<FailureOutcome> {
    let task = match self.get(id).await {
      Ok(task) => task,
      Err(Error::TaskNotFound { .. }) => return Ok(FailureOutcome::Discarded),
      Err(e) => return Err(e),
    };

    if task.retry_count < task.max_retries {
      let result = Tasks::update_many()
        .set(tasks::ActiveModel {
          status: Set(TaskStatus::Pending),
          error_message: Set(Some(error.to_string())),
          started_at: Set(None),
          updated_at: Set(db_now()),
          ..Default::default()
        })
        .col_expr(
          tasks::Column::RetryCount,
          Expr::col(tasks::Column::RetryCount).add(1),
        )
        .filter(tasks::Column::Id.eq(id))
        .filter(tasks::Column::Status.eq(TaskStatus::Running))
        .exec(&self.db)
        .await?;

      if result.rows_affected == 0 {
        return Ok(FailureOutcome::Discarded);
      }
      self
        .add_log(
          id,
          LogLevel::Error,
          &format!(
            "Task failed, scheduling retry (attempt {}/{})",
            task.retry_count + 1,
            task.max_retries
          ),
          Some(serde_json::json!({ "error": error })),
        )
        .await;
      return Ok(FailureOutcome::Retrying);
    }

    if self.fail(id, error).await? {
      Ok(FailureOutcome::Exhausted)
    } else {
      Ok(FailureOutcome::Discarded)
    }
  }

  /// 调整待执行任务的优先级；仅允许从 pending
  /// Adjust a pending task's priority; allowed only from pending
  pub async fn update_priority(&self, id: i64, priority: TaskPriority) -> Result<()> {
    self.get(id).await?;

    let result = Tasks::update_many()
      .set(tasks::ActiveModel {
        priority: Set(priority),
        updated_at: Set(db_now()),
        ..Default::default()
      })
      .filter(tasks::Column::Id.eq(id))
      .filter(tasks::Column::Status.eq(TaskStatus::Pending))
      .exec(&self.db)
      .await?;
    if result.rows_affected == 0 {
      return Err(Error::state_conflict("only pending tasks can change priority"));
    }

    self
      .add_log(
        id,
        LogLevel::Info,
        &format!("Priority updated to {priority}"),
        None,
      )
      .await;
    Ok(())
  }

  /// 删除任务；仅允许删除终态任务，日志随外键级联删除
  /// Delete a task; allowed only for terminal rows, logs cascade with the foreign key
  pub async fn delete(&self, id: i64) -> Result<()> {
    let task = self.get(id).await?;
    if !task.status.is_terminal() {
      return Err(Error::state_conflict(format!(
        "task cannot be deleted in status {}",
        task.status
      )));
    }

    Tasks::delete_by_id(id).exec(&self.db).await?;
    tracing::info!(task_id = id, "Task deleted");
    Ok(())
  }

  /// 任务的审计日志，按时间顺序
  /// The task's audit log, in chronological order
  pub async fn logs(&self, task_id: i64) -> Result<Vec<task_logs::Model>> {
    Ok(
      TaskLogs::find()
        .filter(task_logs::Column::TaskId.eq(task_id))
        .order_by_asc(task_logs::Column::CreatedAt)
        .order_by_asc(task_logs::Column::Id)
        .all(&self.db)
        .await?,
    )
  }

  /// 追加审计日志；日志失败只记录，不影响主流程
  /// Append an audit entry; log failures are recorded but never fail the main path
  async fn add_log(&self, task_id: i64, level: LogLevel, message: &str, data: Option<serde_json::Value>) {
    let log = task_logs::ActiveModel {
      task_id: Set(task_id),
      level: Set(level),
      message: Set(message.to_string()),
      data: Set(data),
      created_at: Set(db_now()),
      ..Default::default()
    };
    if let Err(e) = log.insert(&self.db).await {
      tracing::error!(task_id, error = %e, "Failed to create task log");
    }
  }
}

fn db_now() -> sea_orm::prelude::DateTimeWithTimeZone {
  Utc::now().into()
}
