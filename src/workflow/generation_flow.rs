//! 出题流程 - 流程层
//!
//! 核心职责：定义"一次出题请求"的完整处理流程
//!
//! 流程顺序：
//! 1. 校验参数，创建 `pending` 记录
//! 2. 提交到生成队列，排到后标记 `processing`
//! 3. LLM 服务在候选模型间生成内容
//! 4. 解析题目 → `success`，或写入错误码 → `failed`
//!
//! 所有候选模型都失败时，在记录的重试上限内整体重跑一次编排。

use anyhow::{anyhow, ensure, Result};
use futures::FutureExt;
use serde::Serialize;
use serde_json::json;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::RecordError;
use crate::models::generation_request::{
    GenerationRequestRecord, GenerationResult, RequestError, RequestStatus,
};
use crate::models::outcome::{GenerationFailure, GenerationOutcome};
use crate::models::question::{Difficulty, GenerationParams};
use crate::orchestrator::{GenerationQueue, Submission};
use crate::services::{parse_questions, LlmService, RequestStore};
use crate::workflow::generation_ctx::GenerationCtx;

/// 模型返回内容无法解析为题目
pub const INVALID_RESPONSE_CODE: &str = "AI_INVALID_RESPONSE";

/// 生成队列已关闭
pub const QUEUE_CLOSED_CODE: &str = "QUEUE_CLOSED";

/// 执行过程中出错或 panic
pub const INTERNAL_ERROR_CODE: &str = "INTERNAL_ERROR";

/// 属于"所有模型都已耗尽"的错误码
const EXHAUSTED_CODES: &[&str] = &["AI_ALL_MODELS_EXHAUSTED", "AI_TIMEOUT", "AI_RATE_LIMITED"];

/// 一次出题请求
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub request_id: String,
    pub user_id: String,
    pub classroom_id: Option<String>,
    pub params: GenerationParams,
}

impl GenerationRequest {
    pub fn new(
        request_id: impl Into<String>,
        user_id: impl Into<String>,
        params: GenerationParams,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            user_id: user_id.into(),
            classroom_id: None,
            params,
        }
    }

    pub fn with_classroom(mut self, classroom_id: impl Into<String>) -> Self {
        self.classroom_id = Some(classroom_id.into());
        self
    }
}

/// 轮询接口看到的请求状态
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StatusView {
    /// 排队中或生成中
    Working {
        request_id: String,
        status: RequestStatus,
        retries: u32,
    },
    Succeeded {
        request_id: String,
        result: GenerationResult,
    },
    /// 所有候选模型都失败，前端可以提示稍后再试
    AllModelsExhausted {
        request_id: String,
        error: RequestError,
        retries: u32,
    },
    Failed {
        request_id: String,
        error: RequestError,
    },
}

impl StatusView {
    pub fn from_record(record: &GenerationRequestRecord) -> Self {
        let request_id = record.request_id.clone();

        match record.status() {
            RequestStatus::Pending | RequestStatus::Processing => StatusView::Working {
                request_id,
                status: record.status(),
                retries: record.retries(),
            },
            RequestStatus::Success => match record.result() {
                Some(result) => StatusView::Succeeded {
                    request_id,
                    result: result.clone(),
                },
                None => StatusView::Failed {
                    request_id,
                    error: RequestError::new("MISSING_RESULT", "记录缺少生成结果"),
                },
            },
            RequestStatus::Failed => {
                let error = record
                    .error()
                    .cloned()
                    .unwrap_or_else(|| RequestError::new("UNKNOWN", "未知错误"));
                if EXHAUSTED_CODES.contains(&error.code.as_str()) {
                    StatusView::AllModelsExhausted {
                        request_id,
                        error,
                        retries: record.retries(),
                    }
                } else {
                    StatusView::Failed { request_id, error }
                }
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self, StatusView::Working { .. })
    }
}

/// 出题流程
///
/// - 把请求和生成队列、LLM 服务、记录存储串起来
/// - 根据编排结果驱动记录的状态迁移
/// - 本身不持有可变状态，可以在多个调用方之间共享
pub struct GenerationFlow {
    llm: Arc<LlmService>,
    queue: GenerationQueue,
    store: RequestStore,
    max_retries_per_model: u32,
    max_job_retries: u32,
    retry_backoff: Duration,
}

impl GenerationFlow {
    pub fn new(
        config: &Config,
        llm: Arc<LlmService>,
        queue: GenerationQueue,
        store: RequestStore,
    ) -> Self {
        Self {
            llm,
            queue,
            store,
            max_retries_per_model: config.max_retries_per_model,
            max_job_retries: config.max_job_retries,
            retry_backoff: config.retry_backoff(),
        }
    }

    pub fn store(&self) -> &RequestStore {
        &self.store
    }

    pub fn queue(&self) -> &GenerationQueue {
        &self.queue
    }

    /// 提交请求，立即返回请求ID
    ///
    /// 生成在队列中异步进行，结果通过 [`status`](Self::status) 轮询。
    pub async fn submit(&self, request: GenerationRequest) -> Result<String> {
        let request_id = request.request_id.clone();
        // 提交者不等待结果，任务照常执行
        let _submission = self.enqueue(request).await?;
        Ok(request_id)
    }

    /// 提交请求并等待它结束，返回最终记录
    pub async fn run(&self, request: GenerationRequest) -> Result<GenerationRequestRecord> {
        let request_id = request.request_id.clone();
        let status = self.enqueue(request).await?.await??;

        let record = self
            .store
            .get(&request_id)
            .await
            .ok_or_else(|| anyhow!("请求记录 {} 已不存在", request_id))?;
        debug_assert_eq!(record.status(), status);
        Ok(record)
    }

    pub async fn status(&self, request_id: &str) -> Option<StatusView> {
        self.store
            .get(request_id)
            .await
            .map(|record| StatusView::from_record(&record))
    }

    async fn enqueue(
        &self,
        request: GenerationRequest,
    ) -> Result<Submission<Result<RequestStatus>>> {
        let params = &request.params;
        ensure!(!params.topic.trim().is_empty(), "出题主题不能为空");
        ensure!(params.question_count > 0, "题目数量必须大于 0");

        let ctx = GenerationCtx::new(
            request.request_id.clone(),
            request.user_id.clone(),
            request.classroom_id.clone(),
        );

        let mut record =
            GenerationRequestRecord::new(&request.request_id, &request.user_id, params.clone())
                .with_max_retries(self.max_job_retries);
        if let Some(classroom) = &request.classroom_id {
            record = record.with_classroom(classroom);
        }
        self.store.insert(record).await?;

        let execution = Execution {
            prompt: build_prompt(&request.params),
            params: request.params,
            ctx,
            llm: self.llm.clone(),
            store: self.store.clone(),
            max_retries_per_model: self.max_retries_per_model,
            retry_backoff: self.retry_backoff,
        };

        match self.queue.submit(move || execution.execute_guarded()) {
            Ok(submission) => {
                info!(
                    "📥 请求 {} 已进入生成队列 (任务 #{})",
                    request.request_id,
                    submission.task_id()
                );
                Ok(submission)
            }
            Err(e) => {
                // 记录已经创建，直接标记失败，避免永远停在 pending
                let request_error = RequestError::new(QUEUE_CLOSED_CODE, e.to_string());
                if let Err(update_err) =
                    force_fail(&self.store, &request.request_id, request_error).await
                {
                    warn!("请求 {} 无法标记为失败: {}", request.request_id, update_err);
                }
                Err(e.into())
            }
        }
    }
}

/// 队列中执行的单个请求
struct Execution {
    ctx: GenerationCtx,
    prompt: String,
    params: GenerationParams,
    llm: Arc<LlmService>,
    store: RequestStore,
    max_retries_per_model: u32,
    retry_backoff: Duration,
}

impl Execution {
    /// 执行请求；出错或 panic 时把记录标记为失败，不让它停在 `processing`
    async fn execute_guarded(self) -> Result<RequestStatus> {
        let store = self.store.clone();
        let ctx = self.ctx.clone();

        match AssertUnwindSafe(self.execute()).catch_unwind().await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(e)) => {
                let message = format!("处理请求时出错: {:#}", e);
                mark_internal_error(&store, &ctx, message).await;
                Err(e)
            }
            Err(payload) => {
                let message = format!("处理请求时发生 panic: {}", panic_message(&*payload));
                mark_internal_error(&store, &ctx, message).await;
                panic::resume_unwind(payload)
            }
        }
    }

    async fn execute(self) -> Result<RequestStatus> {
        let ctx = &self.ctx;
        self.store
            .update(&ctx.request_id, |r| r.start_processing())
            .await?;

        info!(
            "{} ▶️ 开始出题：主题「{}」，{} 道，难度 {}",
            ctx, self.params.topic, self.params.question_count, self.params.difficulty
        );

        loop {
            let GenerationOutcome {
                model,
                attempts,
                duration,
                result,
            } = self
                .llm
                .generate(&self.prompt, self.max_retries_per_model)
                .await;

            let failure = match result {
                Ok(text) => {
                    let model = model.unwrap_or_default();
                    return self.finish_success(&text, model, attempts, duration).await;
                }
                Err(failure) => failure,
            };

            if failure.is_exhausted() {
                match self
                    .store
                    .update(&ctx.request_id, |r| r.record_retry())
                    .await
                {
                    Ok(retry) => {
                        warn!(
                            "{} 🔁 所有模型均失败，{:?} 后整体重试 (第 {} 次)",
                            ctx, self.retry_backoff, retry
                        );
                        sleep(self.retry_backoff).await;
                        continue;
                    }
                    Err(RecordError::RetryLimit { max_retries }) => {
                        warn!("{} 已达到重试上限 {}，放弃", ctx, max_retries);
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            let request_error = failure_to_request_error(&failure, model.as_deref(), attempts);
            return self.finish_failure(request_error).await;
        }
    }

    async fn finish_success(
        &self,
        text: &str,
        model: String,
        attempts: u32,
        duration: Duration,
    ) -> Result<RequestStatus> {
        let ctx = &self.ctx;

        let questions = match parse_questions(text) {
            Ok(questions) => questions,
            Err(e) => {
                let request_error =
                    RequestError::new(INVALID_RESPONSE_CODE, format!("模型返回内容无法解析: {}", e))
                        .with_details(json!({ "model": model, "attempts": attempts }));
                return self.finish_failure(request_error).await;
            }
        };

        if questions.len() != self.params.question_count as usize {
            warn!(
                "{} 要求 {} 道题，模型返回 {} 道",
                ctx,
                self.params.question_count,
                questions.len()
            );
        }

        let question_ids = (1..=questions.len())
            .map(|n| format!("{}-q{}", ctx.request_id, n))
            .collect();
        let result = GenerationResult {
            total_questions: questions.len(),
            questions,
            question_ids,
            test_id: format!("test-{}", ctx.request_id),
            model_used: model,
            difficulty: self.params.difficulty,
            duration_ms: duration.as_millis() as u64,
        };

        info!(
            "{} ✅ 出题完成：{} 道题，模型 {}，耗时 {}ms",
            ctx, result.total_questions, result.model_used, result.duration_ms
        );

        self.store
            .update(&ctx.request_id, move |r| r.complete(result))
            .await?;
        Ok(RequestStatus::Success)
    }

    async fn finish_failure(&self, request_error: RequestError) -> Result<RequestStatus> {
        error!(
            "{} ❌ 出题失败 [{}]: {}",
            self.ctx, request_error.code, request_error.message
        );
        self.store
            .update(&self.ctx.request_id, move |r| r.fail(request_error))
            .await?;
        Ok(RequestStatus::Failed)
    }
}

/// 把尚未结束的记录直接置为 `failed`
async fn force_fail(
    store: &RequestStore,
    request_id: &str,
    request_error: RequestError,
) -> Result<(), RecordError> {
    store
        .update(request_id, |r| {
            if r.status() == RequestStatus::Pending {
                r.start_processing()?;
            }
            r.fail(request_error)
        })
        .await
}

async fn mark_internal_error(store: &RequestStore, ctx: &GenerationCtx, message: String) {
    error!("{} ❌ {}", ctx, message);
    let request_error = RequestError::new(INTERNAL_ERROR_CODE, message);
    if let Err(e) = force_fail(store, &ctx.request_id, request_error).await {
        warn!("{} 无法标记为失败: {}", ctx, e);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("未知 panic")
}

fn failure_to_request_error(
    failure: &GenerationFailure,
    model: Option<&str>,
    attempts: u32,
) -> RequestError {
    RequestError::new(failure.code(), failure.message.clone()).with_details(json!({
        "failureKind": failure.kind,
        "model": model,
        "attempts": attempts,
        "lastError": failure.last_error,
    }))
}

fn difficulty_label(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => "简单",
        Difficulty::Medium => "中等",
        Difficulty::Hard => "困难",
    }
}

/// 构建出题 prompt
pub fn build_prompt(params: &GenerationParams) -> String {
    format!(
        r#"你是一名经验丰富的出题老师。请围绕主题「{topic}」出 {count} 道{difficulty}难度的单项选择题。

要求：
1. 每道题给出 4 个选项
2. correctAnswer 必须与其中一个选项的文本完全一致
3. explanation 简要说明答案依据
4. 只输出 JSON 数组，不要输出任何其他文字

输出格式：
[
  {{"question": "题干", "options": ["选项A", "选项B", "选项C", "选项D"], "correctAnswer": "选项A", "explanation": "解析"}}
]"#,
        topic = params.topic.trim(),
        count = params.question_count,
        difficulty = difficulty_label(params.difficulty),
    )
}
