//! 单模型调用 - 业务能力层
//!
//! 对一个指定模型发起一次调用，并用硬超时约束它。
//! 计时器先触发时，进行中的 future 会被直接丢弃，底层请求随之取消。

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::clients::ModelProvider;
use crate::error::ProviderError;
use crate::services::sanitizer::sanitize;
use crate::utils::truncate_text;

/// 带超时的单模型客户端
#[derive(Clone)]
pub struct ModelClient {
    provider: Arc<dyn ModelProvider>,
    timeout: Duration,
}

impl ModelClient {
    pub fn new(provider: Arc<dyn ModelProvider>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// 调用一次模型，成功时返回清洗后的文本
    pub async fn call(&self, model: &str, prompt: &str) -> Result<String, ProviderError> {
        debug!("调用模型 {}，超时 {:?}", model, self.timeout);

        let raw = match tokio::time::timeout(self.timeout, self.provider.generate(model, prompt))
            .await
        {
            Ok(result) => result?,
            Err(_) => return Err(ProviderError::timeout(model, self.timeout)),
        };

        debug!("模型 {} 原始输出: {}", model, truncate_text(&raw, 200));
        Ok(sanitize(&raw))
    }
}
