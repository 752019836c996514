//! 模型实体
//! Model entity
//!
//! 模型是任务的执行后端：OpenAI 兼容 API、本地推理服务或自定义端点
//! A model is the execution backend for tasks: an OpenAI-compatible API,
//! a locally hosted inference server, or a custom endpoint

use sea_orm::entity::prelude::*;

/// 模型类型枚举
/// Model type enum
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum ModelType {
  #[sea_orm(string_value = "openai")]
  OpenAi,
  #[sea_orm(string_value = "local")]
  Local,
  #[sea_orm(string_value = "custom")]
  Custom,
}

impl ModelType {
  /// 转换为字符串
  /// Convert to string
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::OpenAi => "openai",
      Self::Local => "local",
      Self::Custom => "custom",
    }
  }
}

impl std::fmt::Display for ModelType {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// 模型状态枚举
/// Model status enum
///
/// 只有 `online` 的模型会被工作池分配工作者
/// Only `online` models are assigned workers by the pool
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum ModelStatus {
  #[sea_orm(string_value = "online")]
  Online,
  #[sea_orm(string_value = "offline")]
  Offline,
  #[sea_orm(string_value = "maintenance")]
  Maintenance,
}

impl ModelStatus {
  /// 转换为字符串
  /// Convert to string
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Online => "online",
      Self::Offline => "offline",
      Self::Maintenance => "maintenance",
    }
  }
}

impl std::fmt::Display for ModelStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.as_str())
  }
}

/// 模型实体模型
/// Model entity model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "models")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i64,
  #[sea_orm(unique)]
  pub name: String,
  pub model_type: ModelType,
  /// 不透明配置映射（api_key、host、port 等），按类型由适配器解释
  /// Opaque configuration mapping (api_key, host, port, ...), interpreted per type by adapters
  pub config: Json,
  pub status: ModelStatus,
  pub max_workers: i32,
  /// 工作池当前为该模型持有的存活工作者数量
  /// Number of live workers the pool currently owns for this model
  pub current_workers: i32,
  pub total_requests: i64,
  pub success_requests: i64,
  pub created_at: DateTimeWithTimeZone,
  pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
  #[sea_orm(has_many = "super::tasks::Entity")]
  Tasks,
}

impl Related<super::tasks::Entity> for Entity {
  fn to() -> RelationDef {
    Relation::Tasks.def()
  }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
  /// 成功率（百分比）
  /// Success rate (percentage)
  pub fn success_rate(&self) -> f64 {
    if self.total_requests == 0 {
      return 0.0;
    }
    self.success_requests as f64 / self.total_requests as f64 * 100.0
  }

  /// 模型是否在线且还有空闲工作者额度
  /// Whether the model is online with spare worker capacity
  pub fn is_available(&self) -> bool {
    self.status == ModelStatus::Online && self.current_workers < self.max_workers
  }

  /// 读取配置值
  /// Read a configuration value
  pub fn config_value(&self, key: &str) -> Option<&serde_json::Value> {
    self.config.as_object().and_then(|map| map.get(key))
  }

  /// 读取字符串配置值
  /// Read a string configuration value
  pub fn config_str(&self, key: &str) -> Option<&str> {
    self.config_value(key).and_then(|v| v.as_str())
  }
}
