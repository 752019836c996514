//! 任务存储引导模块
//! Task store bootstrap module
//!
//! 建立数据库连接并初始化 schema：三张表由实体派生，索引用原生 SQL 创建
//! Establishes the database connection and initializes the schema: the three
//! tables are derived from entities, indices are created with raw SQL

use crate::config::DatabaseConfig;
use crate::entity::{Models, TaskLogs, Tasks};
use crate::error::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema, Statement};

/// 加速仪表盘与回收相关查询的索引
/// Indices accelerating dashboard and reaper-adjacent queries
const INDEX_STATEMENTS: &[&str] = &[
  "CREATE INDEX IF NOT EXISTS idx_tasks_status_priority ON tasks(status, priority DESC)",
  "CREATE INDEX IF NOT EXISTS idx_tasks_model_status ON tasks(model_id, status)",
  "CREATE INDEX IF NOT EXISTS idx_tasks_created_at ON tasks(created_at DESC)",
  "CREATE INDEX IF NOT EXISTS idx_models_type_status ON models(model_type, status)",
  "CREATE INDEX IF NOT EXISTS idx_task_logs_task_created ON task_logs(task_id, created_at DESC)",
];

/// 建立数据库连接
/// Establish the database connection
pub async fn connect(config: &DatabaseConfig) -> Result<DatabaseConnection> {
  let opt = ConnectOptions::new(&config.url)
    .max_connections(config.max_connections)
    .to_owned();
  let db = Database::connect(opt).await?;
  Ok(db)
}

/// 初始化数据库 schema（幂等）
/// Initialize the database schema (idempotent)
pub async fn init_schema(db: &DatabaseConnection) -> Result<()> {
  let backend = db.get_database_backend();
  let schema = Schema::new(backend);

  let mut stmt = schema.create_table_from_entity(Models);
  db.execute(backend.build(stmt.if_not_exists())).await?;

  let mut stmt = schema.create_table_from_entity(Tasks);
  db.execute(backend.build(stmt.if_not_exists())).await?;

  let mut stmt = schema.create_table_from_entity(TaskLogs);
  db.execute(backend.build(stmt.if_not_exists())).await?;

  for sql in INDEX_STATEMENTS {
    db.execute(Statement::from_string(backend, *sql)).await?;
  }

  Ok(())
}

/// 测试数据库连通性
/// Ping the database connection
pub async fn ping(db: &DatabaseConnection) -> Result<()> {
  db.ping().await?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::DatabaseConfig;

  async fn memory_db() -> DatabaseConnection {
    let config = DatabaseConfig {
      url: "sqlite::memory:".to_string(),
      max_connections: 1,
    };
    connect(&config).await.unwrap()
  }

  #[tokio::test]
  async fn test_init_schema_is_idempotent() {
    let db = memory_db().await;
    init_schema(&db).await.unwrap();
    init_schema(&db).await.unwrap();
    ping(&db).await.unwrap();
  }
}
