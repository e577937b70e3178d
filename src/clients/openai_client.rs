//! OpenAI 兼容客户端
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点，兼容 OpenAI API 的服务（如 Azure, Gemini, Doubao 等）
//!
//! Chat Completions 协议没有 `top_k`，该参数不会发送。

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use futures::future::BoxFuture;
use tracing::{debug, warn};

use super::{ModelProvider, SamplingParams};
use crate::config::Config;
use crate::error::{ProviderError, ProviderErrorKind};

/// OpenAI 兼容提供方
pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    sampling: SamplingParams,
}

impl OpenAiProvider {
    pub fn new(config: &Config) -> Self {
        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            sampling: config.sampling(),
        }
    }

    async fn send(&self, model: &str, prompt: &str) -> Result<String, ProviderError> {
        debug!("调用 LLM API，模型: {}", model);
        debug!("用户消息长度: {} 字符", prompt.len());

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| build_error(&e))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(vec![ChatCompletionRequestMessage::User(user_msg)])
            .temperature(self.sampling.temperature)
            .top_p(self.sampling.top_p)
            .max_tokens(self.sampling.max_output_tokens)
            .build()
            .map_err(|e| build_error(&e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            ProviderError::classify(e.to_string())
        })?;

        debug!("LLM API 调用成功");

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| ProviderError::new(ProviderErrorKind::Fatal, "LLM 返回内容为空"))
    }
}

impl ModelProvider for OpenAiProvider {
    fn generate<'a>(
        &'a self,
        model: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, ProviderError>> {
        Box::pin(self.send(model, prompt))
    }
}

fn build_error(err: &impl std::fmt::Display) -> ProviderError {
    ProviderError::new(ProviderErrorKind::Fatal, format!("构建请求失败: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 测试 OpenAI 兼容服务连通性
    ///
    /// 运行方式：
    /// ```bash
    /// LLM_API_KEY=... LLM_API_BASE_URL=... cargo test test_openai_live -- --ignored --nocapture
    /// ```
    #[tokio::test]
    #[ignore]
    async fn test_openai_live() {
        let _ = tracing_subscriber::fmt::try_init();

        let config = Config::from_env();
        let provider = OpenAiProvider::new(&config);
        let model = config.candidate_models[0].clone();

        let result = provider
            .generate(&model, "请只返回一个 JSON 数组: [1, 2, 3]")
            .await;

        match result {
            Ok(response) => {
                println!("LLM 响应: {}", response);
                assert!(!response.is_empty());
            }
            Err(e) => panic!("LLM 调用失败: {}", e),
        }
    }
}
