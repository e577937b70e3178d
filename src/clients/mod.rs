//! 模型提供方客户端
//!
//! 每次调用只负责把 prompt 发给一个指定模型，并把失败分类成 [`ProviderError`]。
//! 重试、超时和换模型都不在这一层处理。

pub mod gemini_client;
pub mod openai_client;

use futures::future::BoxFuture;
use std::sync::Arc;

use crate::config::{Config, ProviderKind};
use crate::error::ProviderError;

pub use gemini_client::GeminiProvider;
pub use openai_client::OpenAiProvider;

/// 固定采样参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

/// 生成式模型提供方
pub trait ModelProvider: Send + Sync {
    /// 向 `model` 发送一次生成请求，返回原始文本
    fn generate<'a>(
        &'a self,
        model: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, ProviderError>>;
}

/// 根据配置创建提供方
pub fn build_provider(config: &Config) -> Arc<dyn ModelProvider> {
    match config.provider {
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(config)),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::new(config)),
    }
}
