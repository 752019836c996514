//! 任务实体
//! Task entity

use sea_orm::entity::prelude::*;

/// 任务状态枚举
/// Task status enum
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum TaskStatus {
  /// 任务等待执行（在优先级通道或延迟集合中）
  /// Task is waiting for execution (in a priority lane or the delayed set)
  #[sea_orm(string_value = "pending")]
  Pending,
  /// 任务正在被工作者执行（在在途集合中）
  /// Task is being executed by a worker (in the in-flight set)
  #[sea_orm(string_value = "running")]
  Running,
  /// 任务执行成功（终态）
  /// Task finished successfully (terminal)
  #[sea_orm(string_value = "completed")]
  Completed,
  /// 任务失败且重试已耗尽（终态）
  /// Task failed with retries exhausted (terminal)
  #[sea_orm(string_value = "failed")]
  Failed,
  /// 任务被用户取消（终态）
  /// Task was cancelled by the user (terminal)
  #[sea_orm(string_value = "cancelled")]
  Cancelled,
}

impl TaskStatus {
  /// 转换为字符串
  /// Convert to string
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Running => "running",
      Self::Completed => "completed",
      Self::Failed => "failed",
      Self::Cancelled => "cancelled",
    }
  }

  /// 是否为终态
  /// Whether the status is terminal
  pub fn is_terminal(&self) -> bool {
    matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
  }
}

impl std::fmt::Display for TaskStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// 任务优先级枚举 - 存储为 tinyint，1/2/3 对应 低/中/高
/// Task priority enum - stored as tinyint, 1/2/3 meaning low/medium/high
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "i32", db_type = "TinyInteger")]
pub enum TaskPriority {
  #[sea_orm(num_value = 1)]
  Low,
  #[sea_orm(num_value = 2)]
  Medium,
  #[sea_orm(num_value = 3)]
  High,
}

impl TaskPriority {
  /// 数值表示
  /// Numeric representation
  pub fn as_i32(&self) -> i32 {
    match self {
      Self::Low => 1,
      Self::Medium => 2,
      Self::High => 3,
    }
  }

  /// 从数值构造；未知数值回落到 Medium
  /// Build from a number; unknown values fall back to Medium
  pub fn from_i32(value: i32) -> Self {
    match value {
      1 => Self::Low,
      3 => Self::High,
      _ => Self::Medium,
    }
  }

  /// 转换为字符串
  /// Convert to string
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Low => "low",
      Self::Medium => "medium",
      Self::High => "high",
    }
  }
}

impl std::fmt::Display for TaskPriority {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// 任务实体模型
/// Task entity model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i64,
  pub model_id: i64,
  pub task_type: String,
  #[sea_orm(column_type = "Text")]
  pub input: String,
  #[sea_orm(column_type = "Text", nullable)]
  pub output: Option<String>,
  pub status: TaskStatus,
  pub priority: TaskPriority,
  pub retry_count: i32,
  pub max_retries: i32,
  #[sea_orm(column_type = "Text", nullable)]
  pub error_message: Option<String>,
  pub started_at: Option<DateTimeWithTimeZone>,
  pub completed_at: Option<DateTimeWithTimeZone>,
  pub created_at: DateTimeWithTimeZone,
  pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "super::models::Entity",
    from = "Column::ModelId",
    to = "super::models::Column::Id",
    on_update = "Cascade",
    on_delete = "Cascade"
  )]
  Models,
  #[sea_orm(has_many = "super::task_logs::Entity")]
  TaskLogs,
}

impl Related<super::models::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Models.def()
  }
}

impl Related<super::task_logs::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::TaskLogs.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
  /// 是否还有重试额度（仅失败任务可重试）
  /// Whether retry budget remains (only failed tasks may be retried)
  pub fn can_retry(&self) -> bool {
    self.status == TaskStatus::Failed && self.retry_count < self.max_retries
  }

  /// 处理耗时（毫秒）；未完成返回 0
  /// Processing time in milliseconds; 0 when not finished
  pub fn processing_time_ms(&self) -> i64 {
    match (self.started_at, self.completed_at) {
      (Some(started), Some(completed)) => (completed - started).num_milliseconds(),
      _ => 0,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_priority_numeric_mapping() {
    assert_eq!(TaskPriority::Low.as_i32(), 1);
    assert_eq!(TaskPriority::Medium.as_i32(), 2);
    assert_eq!(TaskPriority::High.as_i32(), 3);

    assert_eq!(TaskPriority::from_i32(1), TaskPriority::Low);
    assert_eq!(TaskPriority::from_i32(3), TaskPriority::High);
    // unknown values fall back to medium
    assert_eq!(TaskPriority::from_i32(0), TaskPriority::Medium);
    assert_eq!(TaskPriority::from_i32(99), TaskPriority::Medium);
  }

  #[test]
  fn test_priority_ordering() {
    assert!(TaskPriority::High > TaskPriority::Medium);
    assert!(TaskPriority::Medium > TaskPriority::Low);
  }

  #[test]
  fn test_status_terminal() {
    assert!(!TaskStatus::Pending.is_terminal());
    assert!(!TaskStatus::Running.is_terminal());
    assert!(TaskStatus::Completed.is_terminal());
    assert!(TaskStatus::Failed.is_terminal());
    assert!(TaskStatus::Cancelled.is_terminal());
  }
}
