//! 集成测试共用构件
//! Shared fixtures for the integration suites

// 各测试二进制只使用一部分构件
// Each test binary uses only a subset of the fixtures
#![allow(dead_code)]

use llmq::adapters::AdapterRegistry;
use llmq::base::QueueBroker;
use llmq::components::worker::WorkerContext;
use llmq::config::{DatabaseConfig, QueueConfig, WorkerConfig};
use llmq::entity::models::{ModelStatus, ModelType};
use llmq::entity::tasks::{TaskPriority, TaskStatus};
use llmq::memdb::MemoryQueue;
use llmq::services::{CreateModel, CreateTask, ModelService, TaskService};
use llmq::store;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;

/// 引擎测试环境：内存队列 + 内存 SQLite 任务存储
/// Engine test environment: in-memory queue + in-memory SQLite task store
pub struct Harness {
  pub db: DatabaseConnection,
  pub broker: Arc<MemoryQueue>,
  pub tasks: Arc<TaskService>,
  pub models: Arc<ModelService>,
  pub queue_config: QueueConfig,
}

impl Harness {
  pub async fn new(queue_config: QueueConfig) -> Self {
    let db = store::connect(&DatabaseConfig {
      url: "sqlite::memory:".to_string(),
      max_connections: 1,
    })
    .await
    .unwrap();
    store::init_schema(&db).await.unwrap();

    let broker = Arc::new(MemoryQueue::new(queue_config.clone()));
    let tasks = Arc::new(TaskService::new(
      db.clone(),
      broker.clone() as Arc<dyn QueueBroker>,
    ));
    let models = Arc::new(ModelService::new(db.clone()));

    Self {
      db,
      broker,
      tasks,
      models,
      queue_config,
    }
  }

  pub async fn with_defaults() -> Self {
    Self::new(QueueConfig::default()).await
  }

  /// 测试用的快节奏工作者上下文
  /// Fast-paced worker context for tests
  pub fn worker_context(&self, adapters: Arc<AdapterRegistry>) -> WorkerContext {
    WorkerContext {
      broker: self.broker.clone() as Arc<dyn QueueBroker>,
      tasks: self.tasks.clone(),
      models: self.models.clone(),
      adapters,
      config: WorkerConfig {
        poll_interval: Duration::from_millis(10),
        heartbeat_interval: Duration::from_millis(50),
        promote_interval: Duration::from_millis(50),
        reap_interval: Duration::from_millis(50),
        health_check_interval: Duration::from_millis(50),
        shutdown_timeout: Duration::from_secs(5),
      },
      retry_delay: self.queue_config.retry_delay,
    }
  }

  pub async fn online_model(&self, name: &str, max_workers: i32) -> i64 {
    self
      .models
      .create(CreateModel {
        name: name.to_string(),
        model_type: ModelType::Custom,
        config: serde_json::json!({}),
        status: Some(ModelStatus::Online),
        max_workers: Some(max_workers),
      })
      .await
      .unwrap()
      .id
  }

  pub async fn create_task(&self, model_id: i64, task_type: &str, input: &str) -> i64 {
    self
      .create_task_with_priority(model_id, task_type, input, None)
      .await
  }

  pub async fn create_task_with_priority(
    &self,
    model_id: i64,
    task_type: &str,
    input: &str,
    priority: Option<TaskPriority>,
  ) -> i64 {
    self
      .tasks
      .create(CreateTask {
        model_id,
        task_type: task_type.to_string(),
        input: input.to_string(),
        priority,
        max_retries: None,
      })
      .await
      .unwrap()
      .id
  }

  /// 轮询直到任务达到期望状态；超时则 panic
  /// Poll until the task reaches the expected status; panics on timeout
  pub async fn wait_for_status(&self, task_id: i64, expected: TaskStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
      let task = self.tasks.get(task_id).await.unwrap();
      if task.status == expected {
        return;
      }
      if tokio::time::Instant::now() >= deadline {
        panic!(
          "task {task_id} stuck in {:?}, expected {:?}",
          task.status, expected
        );
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
    }
  }

}

/// 启动一个绑定模型的工作者，返回取消令牌与任务句柄
/// Start a worker bound to a model, returning the cancellation token and join handle
pub fn spawn_worker(
  ctx: WorkerContext,
  model_id: i64,
) -> (
  tokio_util::sync::CancellationToken,
  tokio::task::JoinHandle<()>,
) {
  let cancel = tokio_util::sync::CancellationToken::new();
  let worker = Arc::new(llmq::components::worker::Worker::new(
    format!("test-worker-{model_id}"),
    model_id,
    ctx,
    cancel.clone(),
  ));
  let handle = tokio::spawn(worker.run());
  (cancel, handle)
}
