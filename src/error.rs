use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::models::generation_request::RequestStatus;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 模型提供方错误
    #[error("模型调用错误: {0}")]
    Provider(#[from] ProviderError),
    /// 生成队列错误
    #[error("队列错误: {0}")]
    Queue(#[from] QueueError),
    /// 请求记录错误
    #[error("请求记录错误: {0}")]
    Record(#[from] RecordError),
    /// 模型返回内容错误
    #[error("响应内容错误: {0}")]
    Content(#[from] ContentError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 其他错误
    #[error("错误: {0}")]
    Other(String),
}

// ========== 模型提供方错误 ==========

/// 提供方错误分类
///
/// 决定重试编排器遇到错误后的走向：换模型、原地重试，或者直接终止。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    /// 模型不存在 / 不支持该请求 / 参数无效，换下一个模型
    Unavailable,
    /// 限流 / 配额耗尽 / 服务端超时，等待后重试同一模型
    Recoverable,
    /// 本地超时计时器先于响应触发
    Timeout,
    /// 其他错误，终止整个编排
    Fatal,
}

impl ProviderErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderErrorKind::Unavailable => "unavailable",
            ProviderErrorKind::Recoverable => "recoverable",
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::Fatal => "fatal",
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const UNAVAILABLE_MARKERS: &[&str] = &[
    "not found",
    "not_found",
    "404",
    "not supported",
    "unsupported",
    "invalid argument",
    "invalid_argument",
    "does not exist",
    "model_not_found",
];

const RECOVERABLE_MARKERS: &[&str] = &[
    "429",
    "rate limit",
    "rate_limit",
    "too many requests",
    "resource exhausted",
    "resource_exhausted",
    "quota",
    "deadline exceeded",
    "deadline_exceeded",
    "503",
    "overloaded",
];

/// 单次模型调用失败
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("[{kind}] {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 根据提供方返回的错误文本进行分类
    ///
    /// 不可用标记优先于可恢复标记；都不匹配时视为致命错误。
    pub fn classify(message: impl Into<String>) -> Self {
        let message = message.into();
        let lowered = message.to_lowercase();

        let kind = if UNAVAILABLE_MARKERS.iter().any(|m| lowered.contains(m)) {
            ProviderErrorKind::Unavailable
        } else if RECOVERABLE_MARKERS.iter().any(|m| lowered.contains(m)) {
            ProviderErrorKind::Recoverable
        } else {
            ProviderErrorKind::Fatal
        };

        Self { kind, message }
    }

    /// 创建超时错误
    pub fn timeout(model: &str, after: Duration) -> Self {
        Self::new(
            ProviderErrorKind::Timeout,
            format!("模型 {} 在 {:?} 内未返回结果", model, after),
        )
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == ProviderErrorKind::Timeout
    }
}

// ========== 队列错误 ==========

/// 生成队列错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    /// 队列已关闭，任务未进入队列
    #[error("生成队列已关闭，拒绝新任务")]
    Closed,
    /// 任务执行时 panic
    #[error("任务 #{task_id} 执行时发生 panic")]
    TaskPanicked { task_id: u64 },
    /// 任务在结算前被丢弃（运行时关闭等）
    #[error("任务 #{task_id} 未完成即被丢弃")]
    Dropped { task_id: u64 },
}

// ========== 请求记录错误 ==========

/// 生成请求记录错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// 非法状态迁移
    #[error("非法状态迁移: {from} -> {to}")]
    InvalidTransition {
        from: RequestStatus,
        to: RequestStatus,
    },
    /// 重试次数已达上限
    #[error("重试次数已达上限 ({max_retries})")]
    RetryLimit { max_retries: u32 },
    /// 记录已处于终态
    #[error("请求记录已处于终态 {status}，不可修改")]
    Finalized { status: RequestStatus },
    /// 记录不存在
    #[error("请求记录不存在: {request_id}")]
    NotFound { request_id: String },
    /// 记录重复
    #[error("请求记录已存在: {request_id}")]
    Duplicate { request_id: String },
}

// ========== 响应内容错误 ==========

/// 模型返回内容无法转换为题目列表
#[derive(Debug, Error)]
pub enum ContentError {
    /// 清洗后内容为空
    #[error("模型返回内容为空")]
    Empty,
    /// JSON 解析失败
    #[error("JSON解析失败: {0}")]
    InvalidJson(#[from] serde_json::Error),
    /// 顶层不是数组
    #[error("模型返回的不是 JSON 数组")]
    NotAnArray,
    /// 数组中没有可用的题目
    #[error("模型返回的数组中没有有效题目")]
    NoQuestions,
}

// ========== 配置错误 ==========

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 读取配置文件失败
    #[error("读取配置文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 候选模型列表为空
    #[error("候选模型列表不能为空")]
    NoCandidateModels,
    /// 数值配置无效
    #[error("配置项 {field} 无效: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl AppError {
    /// 创建其他错误
    pub fn other(message: impl Into<String>) -> Self {
        AppError::Other(message.into())
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
