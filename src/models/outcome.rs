//! 一次编排调用的结果

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::error::{ProviderError, ProviderErrorKind};

/// 失败分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// prompt 为空，没有发起任何调用
    InvalidPrompt,
    /// 提供方返回致命错误，编排立即终止
    Fatal,
    /// 所有候选模型都已尝试完毕
    Exhausted,
}

/// 编排失败详情
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct GenerationFailure {
    pub kind: FailureKind,
    pub message: String,
    /// 最后一次观察到的提供方错误
    pub last_error: Option<ProviderError>,
}

impl GenerationFailure {
    pub fn invalid_prompt() -> Self {
        Self {
            kind: FailureKind::InvalidPrompt,
            message: "prompt 不能为空".to_string(),
            last_error: None,
        }
    }

    pub fn fatal(error: ProviderError) -> Self {
        Self {
            kind: FailureKind::Fatal,
            message: format!("模型调用失败: {}", error.message),
            last_error: Some(error),
        }
    }

    pub fn exhausted(last_error: Option<ProviderError>) -> Self {
        let message = match &last_error {
            Some(err) => format!("所有候选模型均调用失败，最后错误: {}", err.message),
            None => "没有可用的候选模型".to_string(),
        };
        Self {
            kind: FailureKind::Exhausted,
            message,
            last_error,
        }
    }

    /// 错误码，写入请求记录供前端区分
    pub fn code(&self) -> &'static str {
        match self.kind {
            FailureKind::InvalidPrompt => "INVALID_PROMPT",
            FailureKind::Fatal => "AI_PROVIDER_ERROR",
            FailureKind::Exhausted => match self.last_error.as_ref().map(|e| e.kind) {
                Some(ProviderErrorKind::Timeout) => "AI_TIMEOUT",
                Some(ProviderErrorKind::Recoverable) => "AI_RATE_LIMITED",
                _ => "AI_ALL_MODELS_EXHAUSTED",
            },
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.kind == FailureKind::Exhausted
    }

    /// 最终失败是否由超时引起
    pub fn is_timeout(&self) -> bool {
        self.last_error.as_ref().is_some_and(ProviderError::is_timeout)
    }
}

/// 编排结果
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    /// 成功时为产出结果的模型，失败时为最后尝试的模型
    pub model: Option<String>,
    /// 所有模型累计的尝试次数
    pub attempts: u32,
    pub duration: Duration,
    /// 成功时为清洗后的文本
    pub result: Result<String, GenerationFailure>,
}

impl GenerationOutcome {
    pub fn success(model: impl Into<String>, attempts: u32, duration: Duration, text: String) -> Self {
        Self {
            model: Some(model.into()),
            attempts,
            duration,
            result: Ok(text),
        }
    }

    pub fn failure(
        model: Option<String>,
        attempts: u32,
        duration: Duration,
        failure: GenerationFailure,
    ) -> Self {
        Self {
            model,
            attempts,
            duration,
            result: Err(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn text(&self) -> Option<&str> {
        self.result.as_deref().ok()
    }

    pub fn failure_detail(&self) -> Option<&GenerationFailure> {
        self.result.as_ref().err()
    }
}
