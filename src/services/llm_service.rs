//! LLM 服务 - 业务能力层
//!
//! 在多个候选模型之间重试和切换，把提供方的瞬时故障和模型不可用对调用方屏蔽掉。
//!
//! ## 策略
//! - 按配置的优先级顺序尝试候选模型
//! - 每个模型最多尝试 `max_retries_per_model` 次，每次都有硬超时
//! - 不可用错误：立即换下一个模型，不消耗剩余次数
//! - 可恢复错误 / 超时：等待固定间隔后重试同一模型，次数用完再换模型
//! - 其他错误：立即终止，不再尝试后续模型
//!
//! 最近一次成功的模型会被记住，下次调用从它开始，排在它前面的模型接在末尾。
//! 缓存只改变起点，每次调用仍会尝试全部候选模型。

use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::clients::ModelProvider;
use crate::config::Config;
use crate::error::{ProviderError, ProviderErrorKind};
use crate::models::outcome::{GenerationFailure, GenerationOutcome};
use crate::services::model_client::ModelClient;

/// LLM 服务
///
/// 职责：
/// - 按优先级在候选模型间重试与回退
/// - 把所有提供方错误转换为带分类的 [`GenerationOutcome`]
/// - 持有"最近可用模型"缓存（实例级，不是全局变量）
pub struct LlmService {
    client: ModelClient,
    candidates: Vec<String>,
    retry_backoff: Duration,
    last_good: RwLock<Option<String>>,
}

impl LlmService {
    /// 根据配置创建 LLM 服务
    pub fn new(config: &Config, provider: Arc<dyn ModelProvider>) -> Self {
        Self::with_settings(
            provider,
            config.candidate_models.clone(),
            config.request_timeout(),
            config.retry_backoff(),
        )
    }

    pub fn with_settings(
        provider: Arc<dyn ModelProvider>,
        candidates: Vec<String>,
        timeout: Duration,
        retry_backoff: Duration,
    ) -> Self {
        Self {
            client: ModelClient::new(provider, timeout),
            candidates,
            retry_backoff,
            last_good: RwLock::new(None),
        }
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// 最近一次成功的模型
    pub fn cached_model(&self) -> Option<String> {
        self.last_good.read().ok().and_then(|guard| guard.clone())
    }

    fn remember(&self, model: &str) {
        if let Ok(mut guard) = self.last_good.write() {
            *guard = Some(model.to_string());
        }
    }

    fn forget(&self) {
        if let Ok(mut guard) = self.last_good.write() {
            *guard = None;
        }
    }

    fn start_index(&self) -> usize {
        self.cached_model()
            .and_then(|cached| self.candidates.iter().position(|m| *m == cached))
            .unwrap_or(0)
    }

    /// 生成内容
    ///
    /// # 参数
    /// - `prompt`: 完整提示词，不能为空
    /// - `max_retries_per_model`: 单个模型的最大尝试次数，小于 1 时按 1 处理
    ///
    /// # 返回
    /// 永远返回结构化结果，不会把提供方错误直接抛给调用方
    pub async fn generate(&self, prompt: &str, max_retries_per_model: u32) -> GenerationOutcome {
        let started = Instant::now();

        if prompt.trim().is_empty() {
            warn!("⚠️ prompt 为空，拒绝调用模型");
            return GenerationOutcome::failure(
                None,
                0,
                started.elapsed(),
                GenerationFailure::invalid_prompt(),
            );
        }

        let max_attempts = max_retries_per_model.max(1);
        let start = self.start_index();
        let mut attempts = 0u32;
        let mut last_model: Option<String> = None;
        let mut last_error: Option<ProviderError> = None;

        if start > 0 {
            debug!("从缓存模型 {} 开始尝试", self.candidates[start]);
        }

        let ordered = self.candidates[start..]
            .iter()
            .chain(&self.candidates[..start]);

        for model in ordered {
            last_model = Some(model.clone());

            for attempt in 1..=max_attempts {
                attempts += 1;
                debug!("🤖 调用模型 {} (尝试 {}/{})", model, attempt, max_attempts);

                let err = match self.client.call(model, prompt).await {
                    Ok(text) => {
                        self.remember(model);
                        info!(
                            "✓ 模型 {} 生成成功 (累计尝试 {} 次, 耗时 {:?})",
                            model,
                            attempts,
                            started.elapsed()
                        );
                        return GenerationOutcome::success(
                            model.clone(),
                            attempts,
                            started.elapsed(),
                            text,
                        );
                    }
                    Err(err) => err,
                };

                match err.kind {
                    ProviderErrorKind::Unavailable => {
                        warn!("⚠️ 模型 {} 不可用，切换下一个: {}", model, err.message);
                        last_error = Some(err);
                        break;
                    }
                    ProviderErrorKind::Recoverable | ProviderErrorKind::Timeout => {
                        warn!(
                            "⚠️ 模型 {} 调用失败 (尝试 {}/{}) [{}]: {}",
                            model, attempt, max_attempts, err.kind, err.message
                        );
                        last_error = Some(err);
                        if attempt < max_attempts {
                            sleep(self.retry_backoff).await;
                        }
                    }
                    ProviderErrorKind::Fatal => {
                        error!("❌ 模型 {} 返回致命错误，终止生成: {}", model, err.message);
                        return GenerationOutcome::failure(
                            Some(model.clone()),
                            attempts,
                            started.elapsed(),
                            GenerationFailure::fatal(err),
                        );
                    }
                }
            }
        }

        // 全部失败后清空缓存，下次从第一个模型重新开始
        self.forget();

        let failure = GenerationFailure::exhausted(last_error);
        error!("❌ {}", failure.message);
        GenerationOutcome::failure(last_model, attempts, started.elapsed(), failure)
    }
}
