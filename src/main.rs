//! llmq 服务入口
//! llmq server entry point
//!
//! 加载配置，连接两个存储（任一不可达即启动失败），启动工作池并等待退出信号
//! Loads configuration, connects both stores (either unreachable is fatal at
//! startup), starts the worker pool, and waits for the exit signal

use llmq::adapters::AdapterRegistry;
use llmq::base::QueueBroker;
use llmq::components::worker::WorkerContext;
use llmq::config::Config;
use llmq::pool::WorkerPool;
use llmq::rdb::RedisQueue;
use llmq::services::{ModelService, TaskService};
use llmq::store;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::registry()
    .with(fmt::layer())
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("llmq=info")))
    .init();

  let config = Config::from_env()?;
  info!(version = llmq::base::constants::VERSION, "Starting llmq scheduler");

  // 数据库或队列存储不可达属于启动致命错误
  // An unreachable database or queue store is fatal at startup
  let db = store::connect(&config.database).await?;
  store::init_schema(&db).await?;
  store::ping(&db).await?;

  let broker: Arc<dyn QueueBroker> =
    Arc::new(RedisQueue::new(&config.redis, config.queue.clone())?);
  broker.ping().await?;

  let tasks = Arc::new(TaskService::new(db.clone(), Arc::clone(&broker)));
  let models = Arc::new(ModelService::new(db));
  let adapters = Arc::new(AdapterRegistry::with_builtins());

  let pool = Arc::new(WorkerPool::new(WorkerContext {
    broker,
    tasks,
    models,
    adapters,
    config: config.worker.clone(),
    retry_delay: config.queue.retry_delay,
  }));
  pool.start().await?;

  tokio::signal::ctrl_c().await?;
  info!("Shutdown signal received");
  pool.shutdown().await;
  info!("Scheduler exited");

  Ok(())
}
