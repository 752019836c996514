//! 内置适配器
//! Built-in adapters
//!
//! 对应原始系统支持的任务类型，输出为模拟结果。
//! Cover the task types the original surface supports, with simulated output.
//! 缺失的必需配置以不可重试错误暴露 —— 重试不会让缺失的 api_key 出现。
//! Missing required configuration surfaces as non-retryable errors - a retry
//! will not make an absent api_key appear.

use super::{Adapter, AdapterResult};
use crate::entity::models::{self, ModelType};
use crate::error::AdapterError;
use async_trait::async_trait;
use std::time::Duration;

/// 文本生成适配器 - 按模型类型二次分发
/// Text generation adapter - dispatches further on the model type
pub struct TextGenerationAdapter;

#[async_trait]
impl Adapter for TextGenerationAdapter {
  async fn invoke(&self, model: &models::Model, _task_type: &str, input: &str) -> AdapterResult {
    match model.model_type {
      ModelType::OpenAi => invoke_openai(model, input).await,
      ModelType::Local => invoke_local(model, input).await,
      ModelType::Custom => Err(AdapterError::fatal(format!(
        "unsupported model type for text-generation: {}",
        model.model_type
      ))),
    }
  }
}

/// OpenAI 兼容端点的占位实现
/// Placeholder implementation for OpenAI-compatible endpoints
async fn invoke_openai(model: &models::Model, input: &str) -> AdapterResult {
  if model.config_str("api_key").map_or(true, str::is_empty) {
    return Err(AdapterError::fatal("OpenAI API key not configured"));
  }

  tokio::time::sleep(Duration::from_millis(200)).await;
  Ok(format!("openai response for input: {input}"))
}

/// 本地推理服务的占位实现
/// Placeholder implementation for locally hosted inference servers
async fn invoke_local(model: &models::Model, input: &str) -> AdapterResult {
  if model.config_value("host").is_none() || model.config_value("port").is_none() {
    return Err(AdapterError::fatal("local model host/port not configured"));
  }

  tokio::time::sleep(Duration::from_millis(200)).await;
  Ok(format!("local model response for input: {input}"))
}

/// 翻译适配器
/// Translation adapter
pub struct TranslationAdapter;

#[async_trait]
impl Adapter for TranslationAdapter {
  async fn invoke(&self, _model: &models::Model, _task_type: &str, input: &str) -> AdapterResult {
    tokio::time::sleep(Duration::from_millis(100)).await;
    Ok(format!("translation: {input}"))
  }
}

/// 摘要适配器
/// Summarization adapter
pub struct SummarizationAdapter;

#[async_trait]
impl Adapter for SummarizationAdapter {
  async fn invoke(&self, _model: &models::Model, _task_type: &str, input: &str) -> AdapterResult {
    tokio::time::sleep(Duration::from_millis(100)).await;
    let head: String = input.chars().take(50).collect();
    Ok(format!("summary: {head}"))
  }
}

/// 向量化适配器
/// Embedding adapter
pub struct EmbeddingAdapter;

#[async_trait]
impl Adapter for EmbeddingAdapter {
  async fn invoke(&self, _model: &models::Model, _task_type: &str, input: &str) -> AdapterResult {
    tokio::time::sleep(Duration::from_millis(100)).await;
    let _ = input;
    Ok("[0.1, 0.2, 0.3, ...]".to_string())
  }
}

/// 默认 custom 适配器 - 回显输入
/// Default custom adapter - echoes the input
pub struct CustomAdapter;

#[async_trait]
impl Adapter for CustomAdapter {
  async fn invoke(&self, _model: &models::Model, task_type: &str, input: &str) -> AdapterResult {
    tokio::time::sleep(Duration::from_millis(50)).await;
    Ok(format!("custom task '{task_type}' completed: {input}"))
  }
}

#[cfg(test)]
mod tests {
  use super::super::tests::sample_model;
  use super::*;

  #[tokio::test]
  async fn test_openai_requires_api_key() {
    let adapter = TextGenerationAdapter;

    let model = sample_model(ModelType::OpenAi, serde_json::json!({}));
    let err = adapter.invoke(&model, "text-generation", "hi").await.unwrap_err();
    assert!(!err.retryable);

    let model = sample_model(ModelType::OpenAi, serde_json::json!({"api_key": ""}));
    let err = adapter.invoke(&model, "text-generation", "hi").await.unwrap_err();
    assert!(!err.retryable);

    let model = sample_model(ModelType::OpenAi, serde_json::json!({"api_key": "sk-x"}));
    let output = adapter.invoke(&model, "text-generation", "hi").await.unwrap();
    assert!(output.contains("hi"));
  }

  #[tokio::test]
  async fn test_local_requires_endpoint() {
    let adapter = TextGenerationAdapter;

    let model = sample_model(ModelType::Local, serde_json::json!({"host": "127.0.0.1"}));
    let err = adapter.invoke(&model, "text-generation", "hi").await.unwrap_err();
    assert!(!err.retryable);

    let model = sample_model(
      ModelType::Local,
      serde_json::json!({"host": "127.0.0.1", "port": 8000}),
    );
    assert!(adapter.invoke(&model, "text-generation", "hi").await.is_ok());
  }

  #[tokio::test]
  async fn test_text_generation_rejects_custom_models() {
    let adapter = TextGenerationAdapter;
    let model = sample_model(ModelType::Custom, serde_json::json!({}));
    let err = adapter.invoke(&model, "text-generation", "hi").await.unwrap_err();
    assert!(!err.retryable);
  }

  #[tokio::test]
  async fn test_summarization_truncates_long_input() {
    let adapter = SummarizationAdapter;
    let model = sample_model(ModelType::Custom, serde_json::json!({}));

    let long_input = "x".repeat(200);
    let output = adapter
      .invoke(&model, "summarization", &long_input)
      .await
      .unwrap();
    assert_eq!(output, format!("summary: {}", "x".repeat(50)));

    // 多字节输入按字符截断
    // Multi-byte input truncates on character boundaries
    let cjk = "文".repeat(80);
    let output = adapter.invoke(&model, "summarization", &cjk).await.unwrap();
    assert_eq!(output, format!("summary: {}", "文".repeat(50)));
  }
}
