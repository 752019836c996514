//! # llmq
//!
//! llmq 是一个面向大语言模型请求的任务调度引擎：把任务分发到异构模型后端
//! （OpenAI 兼容 API、本地推理服务、自定义端点），核心价值在调用之外的
//! 调度、生命周期管理与持久化。
//! llmq is a task-scheduling engine for large-language-model requests: it
//! dispatches tasks to heterogeneous model backends (OpenAI-compatible APIs,
//! locally hosted inference servers, custom endpoints); its value is the
//! scheduling, lifecycle management, and durability around the invocations.
//!
//! ## 特性
//! ## Features
//!
//! - 三条 FIFO 优先级通道，准入时严格 高 > 中 > 低
//!   - Three FIFO priority lanes with strict high > medium > low admission
//! - 每个模型独立的工作者并发上限
//!   - Bounded per-model worker concurrency
//! - 任务行状态机持久化在关系型存储，状态列 CAS 串行化所有转换
//!   - Task state machine persisted relationally, serialized by a status-column CAS
//! - 失败任务带延迟重试；重新入队先于 ack，保证队列视图连续
//!   - Delayed retry for failed tasks; requeue-before-ack keeps the queue views continuous
//! - 回收器在工作者崩溃后重新入队过期的在途条目
//!   - A reaper requeues expired in-flight entries after worker crashes
//! - 适配器按 (任务类型, 模型类型) 动态分发，注册表可插拔
//!   - Adapters dispatch on (task type, model type) through a pluggable registry
//! - Redis 与内存两种队列后端，语义一致
//!   - Redis and in-memory queue backends with identical semantics
//!
//! ## 快速开始
//! ## Quick Start
//!
//! ```rust,no_run
//! use llmq::adapters::AdapterRegistry;
//! use llmq::components::worker::WorkerContext;
//! use llmq::config::Config;
//! use llmq::pool::WorkerPool;
//! use llmq::rdb::RedisQueue;
//! use llmq::services::{ModelService, TaskService};
//! use llmq::store;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!   let config = Config::from_env()?;
//!
//!   let db = store::connect(&config.database).await?;
//!   store::init_schema(&db).await?;
//!
//!   let broker = Arc::new(RedisQueue::new(&config.redis, config.queue.clone())?);
//!   let tasks = Arc::new(TaskService::new(db.clone(), broker.clone()));
//!   let models = Arc::new(ModelService::new(db));
//!
//!   let pool = Arc::new(WorkerPool::new(WorkerContext {
//!     broker,
//!     tasks,
//!     models,
//!     adapters: Arc::new(AdapterRegistry::with_builtins()),
//!     config: config.worker.clone(),
//!     retry_delay: config.queue.retry_delay,
//!   }));
//!   pool.start().await?;
//!
//!   tokio::signal::ctrl_c().await?;
//!   pool.shutdown().await;
//!   Ok(())
//! }
//! ```

pub mod adapters;
pub mod base;
pub mod components;
pub mod config;
pub mod entity;
pub mod error;
pub mod memdb;
pub mod pool;
pub mod rdb;
pub mod services;
pub mod store;

pub use error::{AdapterError, Error, Result};
