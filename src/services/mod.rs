//! 服务模块
//! Services module
//!
//! 任务生命周期服务是任务行的唯一修改者；模型注册服务承担模型 CRUD 与热路径计数
//! The task lifecycle service is the sole mutator of task rows; the model
//! registry service covers model CRUD and the hot-path counters

pub mod model_service;
pub mod task_service;

pub use model_service::{CreateModel, ModelService, UpdateModel};
pub use task_service::{CreateTask, FailureOutcome, TaskFilter, TaskPage, TaskService};
