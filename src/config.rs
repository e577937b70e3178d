use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::clients::SamplingParams;
use crate::error::ConfigError;

/// 模型提供方类型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google Gemini REST 接口
    Gemini,
    /// 兼容 OpenAI Chat Completions 的服务
    OpenAi,
}

impl ProviderKind {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "gemini" => Some(ProviderKind::Gemini),
            "openai" => Some(ProviderKind::OpenAi),
            _ => None,
        }
    }
}

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- LLM 配置 ---
    pub provider: ProviderKind,
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    /// 候选模型，按优先级排列
    pub candidate_models: Vec<String>,
    // --- 重试策略 ---
    /// 单次调用硬超时（秒）
    pub request_timeout_secs: u64,
    /// 可恢复错误的重试间隔（毫秒）
    pub retry_backoff_ms: u64,
    /// 单个模型的最大尝试次数
    pub max_retries_per_model: u32,
    /// 整个任务耗尽所有模型后允许重新提交的次数
    pub max_job_retries: u32,
    // --- 采样参数 ---
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    // --- 记录清理 ---
    /// 过期记录清理间隔（秒）
    pub expiry_sweep_interval_secs: u64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemini,
            llm_api_key: String::new(),
            llm_api_base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            candidate_models: vec![
                "gemini-2.5-flash".to_string(),
                "gemini-2.0-flash".to_string(),
                "gemini-1.5-flash".to_string(),
            ],
            request_timeout_secs: 90,
            retry_backoff_ms: 1000,
            max_retries_per_model: 1,
            max_job_retries: 1,
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            max_output_tokens: 8192,
            expiry_sweep_interval_secs: 3600,
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// 从 TOML 文件加载配置，环境变量仍然优先
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        let config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::TomlParseFailed {
                path: path.display().to_string(),
                source,
            })?;
        let config = config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(self) -> Self {
        let provider = match std::env::var("LLM_PROVIDER") {
            Ok(value) => ProviderKind::parse(&value).unwrap_or_else(|| {
                warn!("⚠️ 未知的 LLM_PROVIDER: {}，使用 {:?}", value, self.provider);
                self.provider
            }),
            Err(_) => self.provider,
        };

        let candidate_models = std::env::var("LLM_CANDIDATE_MODELS")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|models| !models.is_empty())
            .unwrap_or(self.candidate_models);

        Self {
            provider,
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(self.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(self.llm_api_base_url),
            candidate_models,
            request_timeout_secs: env_parse("LLM_REQUEST_TIMEOUT_SECS").unwrap_or(self.request_timeout_secs),
            retry_backoff_ms: env_parse("LLM_RETRY_BACKOFF_MS").unwrap_or(self.retry_backoff_ms),
            max_retries_per_model: env_parse("LLM_MAX_RETRIES_PER_MODEL").unwrap_or(self.max_retries_per_model),
            max_job_retries: env_parse("MAX_JOB_RETRIES").unwrap_or(self.max_job_retries),
            temperature: env_parse("LLM_TEMPERATURE").unwrap_or(self.temperature),
            top_p: env_parse("LLM_TOP_P").unwrap_or(self.top_p),
            top_k: env_parse("LLM_TOP_K").unwrap_or(self.top_k),
            max_output_tokens: env_parse("LLM_MAX_OUTPUT_TOKENS").unwrap_or(self.max_output_tokens),
            expiry_sweep_interval_secs: env_parse("EXPIRY_SWEEP_INTERVAL_SECS").unwrap_or(self.expiry_sweep_interval_secs),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(self.verbose_logging),
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.candidate_models.is_empty() {
            return Err(ConfigError::NoCandidateModels);
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "request_timeout_secs".to_string(),
                reason: "必须大于 0".to_string(),
            });
        }
        if self.max_retries_per_model == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_retries_per_model".to_string(),
                reason: "至少为 1".to_string(),
            });
        }
        if self.expiry_sweep_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "expiry_sweep_interval_secs".to_string(),
                reason: "必须大于 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_interval_secs)
    }

    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            max_output_tokens: self.max_output_tokens,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
