//! 生命周期与跨存储不变量：取消先于执行、模型删除门禁、队列视图一致性
//! Lifecycle and cross-store invariants: cancel-before-execution, model
//! deletion gating, queue view consistency

mod common;

use async_trait::async_trait;
use common::{spawn_worker, Harness};
use llmq::adapters::{Adapter, AdapterRegistry, AdapterResult};
use llmq::base::QueueBroker;
use llmq::config::QueueConfig;
use llmq::entity::models;
use llmq::entity::tasks::TaskStatus;
use llmq::error::Error;
use llmq::services::CreateTask;
use std::sync::Arc;
use std::time::Duration;

struct EchoAdapter;

#[async_trait]
impl Adapter for EchoAdapter {
  async fn invoke(&self, _model: &models::Model, _task_type: &str, input: &str) -> AdapterResult {
    Ok(format!("echo: {input}"))
  }
}

fn echo_registry() -> Arc<AdapterRegistry> {
  let mut registry = AdapterRegistry::new();
  registry.register_fallback(Arc::new(EchoAdapter));
  Arc::new(registry)
}

#[tokio::test]
async fn test_create_then_cancel_wins_regardless_of_worker() {
  let harness = Harness::with_defaults().await;
  let model_id = harness.online_model("racer", 1).await;

  // 工作者启动前取消：行进入 cancelled，通道条目尚存
  // Cancelled before any worker starts: the row turns cancelled, the lane entry remains
  let task_id = harness.create_task(model_id, "any", "x").await;
  harness.tasks.cancel(task_id).await.unwrap();
  assert_eq!(
    harness.tasks.get(task_id).await.unwrap().status,
    TaskStatus::Cancelled
  );
  assert_eq!(harness.broker.status().await.unwrap().medium, 1);

  // 工作者出队后发现 cancelled，丢弃过期条目
  // The worker dequeues it, sees cancelled, and drops the stale entry
  let (cancel, handle) = spawn_worker(harness.worker_context(echo_registry()), model_id);
  let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
  loop {
    if harness.broker.status().await.unwrap().total == 0 {
      break;
    }
    if tokio::time::Instant::now() >= deadline {
      panic!("stale entry never drained");
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  cancel.cancel();
  handle.await.unwrap();

  let task = harness.tasks.get(task_id).await.unwrap();
  assert_eq!(task.status, TaskStatus::Cancelled);
  assert!(task.output.is_none());
}

#[tokio::test]
async fn test_model_deletion_blocked_then_cascades() {
  let harness = Harness::with_defaults().await;
  let model_id = harness.online_model("deletable", 1).await;
  let task_id = harness.create_task(model_id, "any", "pending work").await;

  // pending 任务阻止删除
  // A pending task blocks deletion
  let err = harness.models.delete(model_id).await.unwrap_err();
  assert!(matches!(err, Error::StateConflict { .. }));

  // 取消后删除成功，任务行随级联消失
  // After cancelling, deletion succeeds and the task row cascades away
  harness.tasks.cancel(task_id).await.unwrap();
  harness.models.delete(model_id).await.unwrap();

  assert!(matches!(
    harness.tasks.get(task_id).await.unwrap_err(),
    Error::TaskNotFound { .. }
  ));
  assert!(matches!(
    harness.models.get(model_id).await.unwrap_err(),
    Error::ModelNotFound { .. }
  ));
  // 级联也清空了审计日志
  // The cascade also cleared the audit log
  assert!(harness.tasks.logs(task_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_queue_full_marks_row_failed() {
  let harness = Harness::new(QueueConfig {
    max_queue_size: 1,
    ..QueueConfig::default()
  })
  .await;
  let model_id = harness.online_model("small-queue", 1).await;

  harness.create_task(model_id, "any", "first").await;

  // 第二个任务超出通道容量：行已持久化但被标记为 failed
  // The second task exceeds lane capacity: the row persisted but is marked failed
  let err = harness
    .tasks
    .create(CreateTask {
      model_id,
      task_type: "any".to_string(),
      input: "second".to_string(),
      priority: None,
      max_retries: None,
    })
    .await
    .unwrap_err();
  assert!(matches!(err, Error::QueueFull { .. }));

  let page = harness
    .tasks
    .list(Default::default(), 1, 10)
    .await
    .unwrap();
  assert_eq!(page.total, 2);
  let failed = page
    .tasks
    .iter()
    .find(|t| t.status == TaskStatus::Failed)
    .expect("rejected task should be failed");
  assert_eq!(failed.error_message.as_deref(), Some("failed to enqueue task"));
}

#[tokio::test]
async fn test_queue_views_track_task_states() {
  let harness = Harness::with_defaults().await;
  let model_id = harness.online_model("tracked", 1).await;

  // pending 行 ⇔ 通道中恰有一个条目
  // A pending row ⇔ exactly one lane entry
  let task_id = harness.create_task(model_id, "any", "tracked").await;
  let status = harness.broker.status().await.unwrap();
  assert_eq!(status.medium, 1);
  assert_eq!(status.total, 1);

  // running 行 ⇔ 在途集合中恰有一个条目
  // A running row ⇔ exactly one in-flight entry
  let entry = harness
    .broker
    .dequeue(model_id, Duration::ZERO)
    .await
    .unwrap()
    .unwrap();
  assert!(harness.tasks.start(task_id).await.unwrap());
  let status = harness.broker.status().await.unwrap();
  assert_eq!(status.processing, 1);
  assert_eq!(status.total, 1);

  // 终态行没有任何队列条目
  // A terminal row has no queue entries
  assert!(harness.tasks.complete(task_id, "done").await.unwrap());
  harness.broker.ack(entry.task_id).await.unwrap();
  assert_eq!(harness.broker.status().await.unwrap().total, 0);
}

#[tokio::test]
async fn test_user_retry_reenqueues_failed_task() {
  let harness = Harness::with_defaults().await;
  let model_id = harness.online_model("retryable", 1).await;
  let task_id = harness.create_task(model_id, "any", "will fail").await;

  // 走到 failed
  // Drive to failed
  harness
    .broker
    .dequeue(model_id, Duration::ZERO)
    .await
    .unwrap()
    .unwrap();
  assert!(harness.tasks.start(task_id).await.unwrap());
  assert!(harness.tasks.fail(task_id, "boom").await.unwrap());
  harness.broker.ack(task_id).await.unwrap();
  assert_eq!(harness.broker.status().await.unwrap().total, 0);

  // 用户重试：行回到 pending 并重新入队
  // User retry: the row returns to pending and is re-enqueued
  harness.tasks.retry(task_id).await.unwrap();
  let task = harness.tasks.get(task_id).await.unwrap();
  assert_eq!(task.status, TaskStatus::Pending);
  assert_eq!(task.retry_count, 1);
  assert_eq!(harness.broker.status().await.unwrap().medium, 1);

  // 工作者完成重试后的任务
  // A worker completes the retried task
  let (cancel, handle) = spawn_worker(harness.worker_context(echo_registry()), model_id);
  harness.wait_for_status(task_id, TaskStatus::Completed).await;
  cancel.cancel();
  handle.await.unwrap();
}
