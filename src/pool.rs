//! 工作池管理模块
//! Worker pool management module
//!
//! 持有存活工作者的注册表：启动时为每个在线模型拉起 `max_workers` 个工作者，
//! 周期性运行延迟晋升器与回收器，巡检时补齐缺口并收敛离线模型的工作者。
//! Owns the registry of live workers: spawns `max_workers` workers per online
//! model at startup, runs the delayed promoter and the reaper periodically,
//! and during sweeps refills gaps and winds down workers of offline models.
//!
//! 注册表由读写锁保护；写者只有 spawn 与工作者退出两处。
//! The registry is guarded by a read-write lock; the only writers are spawn
//! and worker exit.

use crate::components::promoter::{Promoter, PromoterConfig};
use crate::components::reaper::{Reaper, ReaperConfig};
use crate::components::worker::{Worker, WorkerContext, WorkerStatus};
use crate::entity::models::{self, ModelStatus};
use crate::error::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 注册表中的工作者条目
/// A worker entry in the registry
struct PoolWorker {
  worker: Arc<Worker>,
  cancel: CancellationToken,
}

struct PoolInner {
  ctx: WorkerContext,
  workers: RwLock<HashMap<String, PoolWorker>>,
  root_cancel: CancellationToken,
}

impl PoolInner {
  fn worker_count(&self) -> usize {
    self.workers.read().unwrap().len()
  }

  fn worker_count_for(&self, model_id: i64) -> usize {
    self
      .workers
      .read()
      .unwrap()
      .values()
      .filter(|entry| entry.worker.model_id() == model_id)
      .count()
  }
}

/// 为一个模型补齐到 `max_workers` 个工作者
/// Top a model up to `max_workers` workers
async fn spawn_workers_for(inner: &Arc<PoolInner>, model: &models::Model) {
  let target = model.max_workers.max(1) as usize;
  let live = inner.worker_count_for(model.id);
  for _ in live..target {
    if let Err(e) = spawn_worker(inner, model.id).await {
      tracing::error!(
        model_id = model.id,
        model_name = %model.name,
        error = %e,
        "Failed to start worker"
      );
    }
  }
}

/// 拉起单个工作者；计数器先行，额度不足时放弃
/// Spawn a single worker; the counter goes first, giving up when the quota is spent
async fn spawn_worker(inner: &Arc<PoolInner>, model_id: i64) -> Result<bool> {
  if !inner.ctx.models.increment_worker_count(model_id).await? {
    tracing::warn!(model_id, "Worker quota exhausted, not spawning");
    return Ok(false);
  }

  let worker_id = format!("worker-{}-{}", model_id, Uuid::new_v4());
  let cancel = inner.root_cancel.child_token();
  let worker = Arc::new(Worker::new(
    worker_id.clone(),
    model_id,
    inner.ctx.clone(),
    cancel.clone(),
  ));

  inner.workers.write().unwrap().insert(
    worker_id.clone(),
    PoolWorker {
      worker: Arc::clone(&worker),
      cancel,
    },
  );
  tracing::info!(worker_id = %worker_id, model_id, "Worker started");

  let pool = Arc::clone(inner);
  tokio::spawn(async move {
    worker.run().await;

    // 退出清理：先回退计数再移出注册表，注册表为空即意味着计数已收敛
    // Exit cleanup: roll the counter back before leaving the registry, so an
    // empty registry implies the counters have settled
    if let Err(e) = pool.ctx.models.decrement_worker_count(model_id).await {
      tracing::error!(model_id, error = %e, "Failed to decrement worker count");
    }
    pool.workers.write().unwrap().remove(&worker_id);
  });

  Ok(true)
}

/// 单轮巡检：对照模型表与注册表，补齐缺口、收敛离线模型的工作者
/// One sweep round: compare the model table against the registry, refill gaps
/// and wind down workers of models that left online
async fn sweep(inner: &Arc<PoolInner>) -> Result<()> {
  let all_models = inner.ctx.models.list(None, None).await?;

  let mut expected = 0usize;
  for model in &all_models {
    let live = inner.worker_count_for(model.id);

    if model.status == ModelStatus::Online {
      let target = model.max_workers.max(1) as usize;
      expected += target;
      if live < target {
        tracing::warn!(
          model_id = model.id,
          model_name = %model.name,
          live,
          expected = target,
          "Worker count below expected, restarting"
        );
        spawn_workers_for(inner, model).await;
      }
    } else if live > 0 {
      // 模型已不在线：取消其工作者，退出路径负责清理注册表
      // The model is no longer online: cancel its workers, the exit path cleans the registry
      tracing::info!(
        model_id = model.id,
        model_name = %model.name,
        live,
        "Model left online, winding down workers"
      );
      for entry in inner.workers.read().unwrap().values() {
        if entry.worker.model_id() == model.id {
          entry.cancel.cancel();
        }
      }
    }
  }

  let live_total = inner.worker_count();
  if live_total < expected {
    tracing::warn!(
      current_workers = live_total,
      expected_workers = expected,
      "Worker count is below expected"
    );
  }
  Ok(())
}

/// 工作池管理器
/// Worker pool manager
pub struct WorkerPool {
  inner: Arc<PoolInner>,
  promoter: Arc<Promoter>,
  reaper: Arc<Reaper>,
  handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
  /// 创建工作池管理器
  /// Create the worker pool manager
  pub fn new(ctx: WorkerContext) -> Self {
    let promoter = Arc::new(Promoter::new(
      Arc::clone(&ctx.broker),
      PromoterConfig {
        interval: ctx.config.promote_interval,
      },
    ));
    let reaper = Arc::new(Reaper::new(
      Arc::clone(&ctx.broker),
      ReaperConfig {
        interval: ctx.config.reap_interval,
      },
    ));

    Self {
      inner: Arc::new(PoolInner {
        ctx,
        workers: RwLock::new(HashMap::new()),
        root_cancel: CancellationToken::new(),
      }),
      promoter,
      reaper,
      handles: Mutex::new(Vec::new()),
    }
  }

  /// 启动工作池：为每个在线模型拉起工作者并启动周期性组件
  /// Start the pool: spawn workers for every online model and start the periodic components
  pub async fn start(&self) -> Result<()> {
    tracing::info!("Starting worker pool");

    let online = self.inner.ctx.models.list_online().await?;
    for model in &online {
      spawn_workers_for(&self.inner, model).await;
    }

    let sweep_handle = {
      let inner = Arc::clone(&self.inner);
      tokio::spawn(async move {
        let mut ticker = tokio::time::interval(inner.ctx.config.health_check_interval);
        loop {
          tokio::select! {
            _ = inner.root_cancel.cancelled() => break,
            _ = ticker.tick() => {
              if let Err(e) = sweep(&inner).await {
                tracing::error!(error = %e, "Health sweep failed");
              }
            }
          }
        }
      })
    };

    let mut handles = self.handles.lock().unwrap();
    handles.push(Arc::clone(&self.promoter).start());
    handles.push(Arc::clone(&self.reaper).start());
    handles.push(sweep_handle);

    tracing::info!(
      models = online.len(),
      workers = self.worker_count(),
      "Worker pool started"
    );
    Ok(())
  }

  /// 关闭工作池：取消所有工作者并在限定时间内等待退出
  /// Shut down the pool: cancel all workers and wait for them to exit within the bound
  pub async fn shutdown(&self) {
    tracing::info!("Stopping worker pool");
    self.inner.root_cancel.cancel();
    self.promoter.shutdown();
    self.reaper.shutdown();

    // 工作者只在任务之间观察取消；等待在途任务收尾
    // Workers observe cancellation between tasks; wait for in-flight work to wind down
    let deadline = tokio::time::Instant::now() + self.inner.ctx.config.shutdown_timeout;
    while self.worker_count() > 0 {
      if tokio::time::Instant::now() >= deadline {
        tracing::warn!(
          remaining = self.worker_count(),
          "Timeout waiting for workers to stop"
        );
        break;
      }
      tokio::time::sleep(Duration::from_millis(100)).await;
    }

    for handle in self.handles.lock().unwrap().drain(..) {
      handle.abort();
    }
    tracing::info!("Worker pool stopped");
  }

  /// 存活工作者数量
  /// Number of live workers
  pub fn worker_count(&self) -> usize {
    self.inner.worker_count()
  }

  /// 某一模型的存活工作者数量
  /// Number of live workers for one model
  pub fn worker_count_for(&self, model_id: i64) -> usize {
    self.inner.worker_count_for(model_id)
  }

  /// 所有工作者的状态快照
  /// Status snapshots of all workers
  pub fn worker_statuses(&self) -> Vec<WorkerStatus> {
    self
      .inner
      .workers
      .read()
      .unwrap()
      .values()
      .map(|entry| entry.worker.status())
      .collect()
  }
}
