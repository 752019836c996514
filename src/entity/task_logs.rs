//! 任务日志实体 - 每个任务的只追加审计记录
//! Task log entity - append-only audit trail per task

use sea_orm::entity::prelude::*;

/// 日志级别枚举
/// Log level enum
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
pub enum LogLevel {
  #[sea_orm(string_value = "debug")]
  Debug,
  #[sea_orm(string_value = "info")]
  Info,
  #[sea_orm(string_value = "warn")]
  Warn,
  #[sea_orm(string_value = "error")]
  Error,
}

impl LogLevel {
  /// 转换为字符串
  /// Convert to string
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Debug => "debug",
      Self::Info => "info",
      Self::Warn => "warn",
      Self::Error => "error",
    }
  }
}

impl std::fmt::Display for LogLevel {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// 任务日志实体模型
/// Task log entity model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "task_logs")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i64,
  pub task_id: i64,
  pub level: LogLevel,
  #[sea_orm(column_type = "Text")]
  pub message: String,
  /// 可选的结构化负载
  /// Optional structured payload
  #[sea_orm(nullable)]
  pub data: Option<Json>,
  pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(
    belongs_to = "super::tasks::Entity",
    from = "Column::TaskId",
    to = "super::tasks::Column::Id",
    on_update = "Cascade",
    on_delete = "Cascade"
  )]
  Tasks,
}

impl Related<super::tasks::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Tasks.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}
