//! SeaORM 实体模块
//! SeaORM entity module
//!
//! 定义了任务存储中三张表对应的实体模型：models、tasks、task_logs
//! Defines entity models for the three task-store tables: models, tasks, task_logs

pub mod models;
pub mod prelude;
pub mod task_logs;
pub mod tasks;

pub use prelude::*;
