//! 适配器模块 - 模型调用的插件点
//! Adapter module - the plug-in point for model invocation
//!
//! 适配器按任务类型注册；`text-generation` 进一步按模型类型分发。
//! Adapters are registered by task type; `text-generation` dispatches further
//! on the model type. 未注册的任务类型落入默认的 custom 适配器。
//! Unregistered task types fall through to the default custom adapter.
//!
//! 内置适配器只产生模拟输出；真实的 HTTP 调用由部署方注册自己的
//! 适配器提供。适配器自行约束调用超时，调度核心不打断执行中的调用。
//! Built-in adapters produce simulated output only; real HTTP invocation is
//! supplied by deployments registering their own adapters. Adapters enforce
//! their own invocation timeouts; the scheduling core never interrupts a
//! running invocation.

mod builtin;

pub use builtin::{
  CustomAdapter, EmbeddingAdapter, SummarizationAdapter, TextGenerationAdapter,
  TranslationAdapter,
};

use crate::entity::models;
use crate::error::AdapterError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// 适配器调用结果
/// Adapter invocation result
pub type AdapterResult = std::result::Result<String, AdapterError>;

/// 适配器特性 - 单一的 invoke 能力
/// Adapter trait - a single invoke capability
#[async_trait]
pub trait Adapter: Send + Sync {
  /// 以给定模型执行任务输入，返回输出文本
  /// Execute the task input against the given model, returning output text
  async fn invoke(&self, model: &models::Model, task_type: &str, input: &str) -> AdapterResult;
}

/// 适配器注册表 - 按任务类型路由到适配器
/// Adapter registry - routes by task type to an adapter
pub struct AdapterRegistry {
  handlers: HashMap<String, Arc<dyn Adapter>>,
  fallback: Arc<dyn Adapter>,
}

impl AdapterRegistry {
  /// 创建空注册表；未匹配的任务类型由 custom 适配器兜底
  /// Create an empty registry; unmatched task types fall back to the custom adapter
  pub fn new() -> Self {
    Self {
      handlers: HashMap::new(),
      fallback: Arc::new(CustomAdapter),
    }
  }

  /// 创建带内置适配器的注册表
  /// Create a registry with the built-in adapters
  pub fn with_builtins() -> Self {
    let mut registry = Self::new();
    registry.register("text-generation", Arc::new(TextGenerationAdapter));
    registry.register("translation", Arc::new(TranslationAdapter));
    registry.register("summarization", Arc::new(SummarizationAdapter));
    registry.register("embedding", Arc::new(EmbeddingAdapter));
    registry
  }

  /// 注册适配器；同类型的后注册者覆盖先注册者
  /// Register an adapter; later registrations for a type replace earlier ones
  pub fn register<S: Into<String>>(&mut self, task_type: S, adapter: Arc<dyn Adapter>) {
    self.handlers.insert(task_type.into(), adapter);
  }

  /// 替换兜底适配器
  /// Replace the fallback adapter
  pub fn register_fallback(&mut self, adapter: Arc<dyn Adapter>) {
    self.fallback = adapter;
  }

  /// 解析任务类型对应的适配器
  /// Resolve the adapter for a task type
  pub fn resolve(&self, task_type: &str) -> Arc<dyn Adapter> {
    self
      .handlers
      .get(task_type)
      .cloned()
      .unwrap_or_else(|| Arc::clone(&self.fallback))
  }

  /// 路由并调用
  /// Route and invoke
  pub async fn invoke(
    &self,
    model: &models::Model,
    task_type: &str,
    input: &str,
  ) -> AdapterResult {
    self.resolve(task_type).invoke(model, task_type, input).await
  }
}

impl Default for AdapterRegistry {
  fn default() -> Self {
    Self::with_builtins()
  }
}
