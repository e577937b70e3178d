//! Gemini REST 客户端
//!
//! 直接调用 `models/{model}:generateContent`，错误体中的
//! `status`（NOT_FOUND / RESOURCE_EXHAUSTED / ...）用于错误分类。

use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};

use super::{ModelProvider, SamplingParams};
use crate::config::Config;
use crate::error::{ProviderError, ProviderErrorKind};

/// Gemini 提供方
pub struct GeminiProvider {
    http: reqwest::Client,
    api_key: String,
    api_base_url: String,
    sampling: SamplingParams,
}

impl GeminiProvider {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.llm_api_key.clone(),
            api_base_url: config.llm_api_base_url.clone(),
            sampling: config.sampling(),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.api_base_url.trim_end_matches('/'),
            model
        )
    }

    fn build_body(&self, prompt: &str) -> JsonValue {
        json!({
            "contents": [
                { "role": "user", "parts": [ { "text": prompt } ] }
            ],
            "generationConfig": {
                "temperature": self.sampling.temperature,
                "topP": self.sampling.top_p,
                "topK": self.sampling.top_k,
                "maxOutputTokens": self.sampling.max_output_tokens,
            }
        })
    }

    async fn send(&self, model: &str, prompt: &str) -> Result<String, ProviderError> {
        debug!("调用 Gemini API，模型: {}", model);
        debug!("prompt 长度: {} 字符", prompt.len());

        let response = self
            .http
            .post(self.endpoint(model))
            .query(&[("key", self.api_key.as_str())])
            .json(&self.build_body(prompt))
            .send()
            .await
            .map_err(|e| {
                warn!("Gemini 请求发送失败: {}", e);
                transport_error(&e)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| transport_error(&e))?;

        if !status.is_success() {
            let err = error_from_body(status, &body);
            warn!("Gemini API 返回错误 ({}): {}", err.kind, err.message);
            return Err(err);
        }

        let payload: JsonValue = serde_json::from_str(&body).map_err(|e| {
            ProviderError::new(ProviderErrorKind::Fatal, format!("响应解析失败: {}", e))
        })?;

        debug!("Gemini API 调用成功");
        extract_text(&payload)
    }
}

impl ModelProvider for GeminiProvider {
    fn generate<'a>(
        &'a self,
        model: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, ProviderError>> {
        Box::pin(self.send(model, prompt))
    }
}

fn transport_error(err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::new(ProviderErrorKind::Recoverable, format!("deadline exceeded: {}", err))
    } else if err.is_connect() {
        ProviderError::new(ProviderErrorKind::Recoverable, format!("连接失败: {}", err))
    } else {
        ProviderError::classify(err.to_string())
    }
}

/// 把错误响应转换为已分类的错误
fn error_from_body(status: StatusCode, body: &str) -> ProviderError {
    let parsed: Option<JsonValue> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));

    let message = error
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .unwrap_or(body);
    let state = error
        .and_then(|e| e.get("status"))
        .and_then(|s| s.as_str())
        .unwrap_or("");

    ProviderError::classify(format!("[{} {}] {}", status.as_u16(), state, message.trim()))
}

/// 拼接第一个候选结果的所有文本片段
fn extract_text(payload: &JsonValue) -> Result<String, ProviderError> {
    if let Some(reason) = payload
        .get("promptFeedback")
        .and_then(|f| f.get("blockReason"))
        .and_then(|r| r.as_str())
    {
        return Err(ProviderError::new(
            ProviderErrorKind::Fatal,
            format!("prompt 被拦截: {}", reason),
        ));
    }

    let text: String = payload
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect()
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ProviderError::new(
            ProviderErrorKind::Fatal,
            "模型返回内容为空",
        ));
    }

    Ok(text)
}
