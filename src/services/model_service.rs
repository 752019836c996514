//! 模型注册服务
//! Model registry service
//!
//! 模型行的 CRUD，以及工作者与请求两类热路径计数器。
//! CRUD over model rows, plus the two hot-path counters for workers and requests.
//! 计数器更新使用存储层的原子列运算。
//! Counter updates use atomic column arithmetic at the store layer.

use crate::entity::models::{self, ModelStatus, ModelType};
use crate::entity::tasks::{self, TaskStatus};
use crate::entity::{Models, Tasks};
use crate::error::{Error, Result};
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
  ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
  PaginatorTrait, QueryFilter,
};

/// 创建模型请求
/// Create-model request
#[derive(Debug, Clone)]
pub struct CreateModel {
  pub name: String,
  pub model_type: ModelType,
  pub config: serde_json::Value,
  /// 默认 offline
  /// Defaults to offline
  pub status: Option<ModelStatus>,
  /// 默认 1
  /// Defaults to 1
  pub max_workers: Option<i32>,
}

/// 更新模型请求 - None 字段保持不变
/// Update-model request - None fields are left unchanged
#[derive(Debug, Clone, Default)]
pub struct UpdateModel {
  pub name: Option<String>,
  pub model_type: Option<ModelType>,
  pub config: Option<serde_json::Value>,
  pub status: Option<ModelStatus>,
  pub max_workers: Option<i32>,
}

/// 模型注册服务
/// Model registry service
pub struct ModelService {
  db: DatabaseConnection,
}

impl ModelService {
  /// 创建模型注册服务
  /// Create the model registry service
  pub fn new(db: DatabaseConnection) -> Self {
    Self { db }
  }

  /// 创建模型；名称必须唯一
  /// Create a model; the name must be unique
  pub async fn create(&self, req: CreateModel) -> Result<models::Model> {
    if req.name.trim().is_empty() {
      return Err(Error::validation("model name must not be empty"));
    }

    let existing = Models::find()
      .filter(models::Column::Name.eq(&req.name))
      .one(&self.db)
      .await?;
    if existing.is_some() {
      return Err(Error::validation(format!(
        "model with name '{}' already exists",
        req.name
      )));
    }

    let max_workers = req.max_workers.unwrap_or(1).max(1);
    let now = Utc::now().into();
    let model = models::ActiveModel {
      name: Set(req.name),
      model_type: Set(req.model_type),
      config: Set(req.config),
      status: Set(req.status.unwrap_or(ModelStatus::Offline)),
      max_workers: Set(max_workers),
      current_workers: Set(0),
      total_requests: Set(0),
      success_requests: Set(0),
      created_at: Set(now),
      updated_at: Set(now),
      ..Default::default()
    }
    .insert(&self.db)
    .await?;

    tracing::info!(
      model_id = model.id,
      model_name = %model.name,
      model_type = %model.model_type,
      "Model created"
    );
    Ok(model)
  }

  /// 获取模型详情
  /// Get model details
  pub async fn get(&self, id: i64) -> Result<models::Model> {
    Models::find_by_id(id)
      .one(&self.db)
      .await?
      .ok_or(Error::ModelNotFound { id })
  }

  /// 根据名称获取模型
  /// Get a model by name
  pub async fn get_by_name(&self, name: &str) -> Result<models::Model> {
    Models::find()
      .filter(models::Column::Name.eq(name))
      .one(&self.db)
      .await?
      .ok_or_else(|| Error::validation(format!("model not found: {name}")))
  }

  /// 列出模型，可按类型与状态过滤
  /// List models, optionally filtered by type and status
  pub async fn list(
    &self,
    model_type: Option<ModelType>,
    status: Option<ModelStatus>,
  ) -> Result<Vec<models::Model>> {
    let mut query = Models::find();
    if let Some(model_type) = model_type {
      query = query.filter(models::Column::ModelType.eq(model_type));
    }
    if let Some(status) = status {
      query = query.filter(models::Column::Status.eq(status));
    }
    Ok(query.all(&self.db).await?)
  }

  /// 列出在线模型（工作池在启动与巡检时使用）
  /// List online models (used by the pool at startup and during sweeps)
  pub async fn list_online(&self) -> Result<Vec<models::Model>> {
    Ok(
      Models::find()
        .filter(models::Column::Status.eq(ModelStatus::Online))
        .all(&self.db)
        .await?,
    )
  }

  /// 更新模型
  /// Update a model
  pub async fn update(&self, id: i64, updates: UpdateModel) -> Result<models::Model> {
    let model = self.get(id).await?;

    if let Some(name) = &updates.name {
      if name != &model.name {
        let taken = Models::find()
          .filter(models::Column::Name.eq(name))
          .filter(models::Column::Id.ne(id))
          .one(&self.db)
          .await?;
        if taken.is_some() {
          return Err(Error::validation(format!(
            "model with name '{name}' already exists"
          )));
        }
      }
    }

    let mut active: models::ActiveModel = model.into();
    if let Some(name) = updates.name {
      active.name = Set(name);
    }
    if let Some(model_type) = updates.model_type {
      active.model_type = Set(model_type);
    }
    if let Some(config) = updates.config {
      active.config = Set(config);
    }
    if let Some(status) = updates.status {
      active.status = Set(status);
    }
    if let Some(max_workers) = updates.max_workers {
      active.max_workers = Set(max_workers.max(1));
    }
    active.updated_at = Set(Utc::now().into());

    let model = active.update(&self.db).await?;
    tracing::info!(model_id = id, model_name = %model.name, "Model updated");
    Ok(model)
  }

  /// 更新模型状态；不级联到正在运行的工作者，工作池在下一次巡检时跟进
  /// Update the model status; does not cascade to running workers, the pool
  /// catches up on its next sweep
  pub async fn update_status(&self, id: i64, status: ModelStatus) -> Result<()> {
    let result = Models::update_many()
      .set(models::ActiveModel {
        status: Set(status),
        updated_at: Set(Utc::now().into()),
        ..Default::default()
      })
      .filter(models::Column::Id.eq(id))
      .exec(&self.db)
      .await?;

    if result.rows_affected == 0 {
      return Err(Error::ModelNotFound { id });
    }
    tracing::info!(model_id = id, status = %status, "Model status updated");
    Ok(())
  }

  /// 删除模型；存在 pending/running 任务时拒绝，成功时级联删除其任务
  /// Delete a model; refused while pending/running tasks exist, cascades to
  /// its tasks on success
  pub async fn delete(&self, id: i64) -> Result<()> {
    self.get(id).await?;

    let active = Tasks::find()
      .filter(tasks::Column::ModelId.eq(id))
      .filter(
        Condition::any()
          .add(tasks::Column::Status.eq(TaskStatus::Pending))
          .add(tasks::Column::Status.eq(TaskStatus::Running)),
      )
      .count(&self.db)
      .await?;
    if active > 0 {
      return Err(Error::state_conflict(format!(
        "cannot delete model with {active} pending or running tasks"
      )));
    }

    Models::delete_by_id(id).exec(&self.db).await?;
    tracing::info!(model_id = id, "Model deleted");
    Ok(())
  }

  /// 增加工作者计数，以 max_workers 为上界；返回是否生效
  /// Increment the worker count, bounded by max_workers; returns whether it applied
  pub async fn increment_worker_count(&self, id: i64) -> Result<bool> {
    let result = Models::update_many()
      .col_expr(
        models::Column::CurrentWorkers,
        Expr::col(models::Column::CurrentWorkers).add(1),
      )
      .filter(models::Column::Id.eq(id))
      .filter(Expr::col(models::Column::CurrentWorkers).lt(Expr::col(models::Column::MaxWorkers)))
      .exec(&self.db)
      .await?;
    Ok(result.rows_affected > 0)
  }

  /// 减少工作者计数，拒绝降到 0 以下；返回是否生效
  /// Decrement the worker count, refusing to go below 0; returns whether it applied
  pub async fn decrement_worker_count(&self, id: i64) -> Result<bool> {
    let result = Models::update_many()
      .col_expr(
        models::Column::CurrentWorkers,
        Expr::col(models::Column::CurrentWorkers).sub(1),
      )
      .filter(models::Column::Id.eq(id))
      .filter(models::Column::CurrentWorkers.gt(0))
      .exec(&self.db)
      .await?;
    Ok(result.rows_affected > 0)
  }

  /// 原子递增请求计数；成功时同时递增成功计数
  /// Atomically increment the request counter; also the success counter on success
  pub async fn increment_request_count(&self, id: i64, success: bool) -> Result<()> {
    let mut update = Models::update_many().col_expr(
      models::Column::TotalRequests,
      Expr::col(models::Column::TotalRequests).add(1),
    );
    if success {
      update = update.col_expr(
        models::Column::SuccessRequests,
        Expr::col(models::Column::SuccessRequests).add(1),
      );
    }
    update.filter(models::Column::Id.eq(id)).exec(&self.db).await?;
    Ok(())
  }
}
