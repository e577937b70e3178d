//! 生成请求记录
//!
//! 追踪一次 AI 出题任务的完整生命周期，供轮询接口查询。
//!
//! 状态只能单向前进：
//!
//! ```text
//! pending → processing → success
//!                      ↘ failed
//! ```
//!
//! 进入终态后记录不再变化。队列和编排器不知道这条记录的存在，
//! 由提交任务的调用方根据返回值驱动状态迁移。

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

use crate::error::RecordError;
use crate::models::question::{Difficulty, GeneratedQuestion, GenerationParams};

/// 记录保留天数，按创建时间计算
pub const RECORD_RETENTION_DAYS: i64 = 7;

pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// 任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobType {
    Ai,
    Manual,
}

/// 请求状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Processing => "processing",
            RequestStatus::Success => "success",
            RequestStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Success | RequestStatus::Failed)
    }

    /// 是否允许迁移到 `next`
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (RequestStatus::Pending, RequestStatus::Processing)
                | (RequestStatus::Processing, RequestStatus::Success)
                | (RequestStatus::Processing, RequestStatus::Failed)
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 成功时写入的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    pub questions: Vec<GeneratedQuestion>,
    pub total_questions: usize,
    pub question_ids: Vec<String>,
    pub test_id: String,
    pub model_used: String,
    pub difficulty: Difficulty,
    pub duration_ms: u64,
}

/// 失败时写入的错误信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestError {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl RequestError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }
}

/// 生成请求记录
///
/// 生命周期字段只能通过状态迁移方法修改，终态之后记录不再变化。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequestRecord {
    pub request_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classroom_id: Option<String>,
    pub job_type: JobType,
    pub params: GenerationParams,
    status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<GenerationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<RequestError>,
    retries: u32,
    max_retries: u32,
    created_at: DateTime<Utc>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    duration_ms: Option<u64>,
}

impl GenerationRequestRecord {
    /// 创建处于 `pending` 状态的新记录
    pub fn new(
        request_id: impl Into<String>,
        user_id: impl Into<String>,
        params: GenerationParams,
    ) -> Self {
        Self::new_at(request_id, user_id, params, Utc::now())
    }

    pub fn new_at(
        request_id: impl Into<String>,
        user_id: impl Into<String>,
        params: GenerationParams,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            user_id: user_id.into(),
            classroom_id: None,
            job_type: JobType::Ai,
            params,
            status: RequestStatus::Pending,
            result: None,
            error: None,
            retries: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            created_at: now,
            started_at: None,
            completed_at: None,
            duration_ms: None,
        }
    }

    pub fn with_classroom(mut self, classroom_id: impl Into<String>) -> Self {
        self.classroom_id = Some(classroom_id.into());
        self
    }

    pub fn with_job_type(mut self, job_type: JobType) -> Self {
        self.job_type = job_type;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn result(&self) -> Option<&GenerationResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&RequestError> {
        self.error.as_ref()
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.duration_ms
    }

    fn transition(&mut self, next: RequestStatus) -> Result<(), RecordError> {
        if !self.status.can_transition_to(next) {
            return Err(RecordError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// pending → processing
    pub fn start_processing(&mut self) -> Result<(), RecordError> {
        self.start_processing_at(Utc::now())
    }

    pub fn start_processing_at(&mut self, now: DateTime<Utc>) -> Result<(), RecordError> {
        self.transition(RequestStatus::Processing)?;
        self.started_at = Some(now);
        Ok(())
    }

    /// processing → success
    pub fn complete(&mut self, result: GenerationResult) -> Result<(), RecordError> {
        self.complete_at(result, Utc::now())
    }

    pub fn complete_at(
        &mut self,
        result: GenerationResult,
        now: DateTime<Utc>,
    ) -> Result<(), RecordError> {
        self.transition(RequestStatus::Success)?;
        self.result = Some(result);
        self.finish(now);
        Ok(())
    }

    /// processing → failed
    pub fn fail(&mut self, error: RequestError) -> Result<(), RecordError> {
        self.fail_at(error, Utc::now())
    }

    pub fn fail_at(&mut self, error: RequestError, now: DateTime<Utc>) -> Result<(), RecordError> {
        self.transition(RequestStatus::Failed)?;
        self.error = Some(error);
        self.finish(now);
        Ok(())
    }

    fn finish(&mut self, now: DateTime<Utc>) {
        self.completed_at = Some(now);
        let started = self.started_at.unwrap_or(self.created_at);
        self.duration_ms = Some((now - started).num_milliseconds().max(0) as u64);
    }

    /// 调用方重新提交同一任务时记一次重试，返回当前重试次数
    pub fn record_retry(&mut self) -> Result<u32, RecordError> {
        if self.status.is_terminal() {
            return Err(RecordError::Finalized {
                status: self.status,
            });
        }
        if self.retries >= self.max_retries {
            return Err(RecordError::RetryLimit {
                max_retries: self.max_retries,
            });
        }
        self.retries += 1;
        Ok(self.retries)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + ChronoDuration::days(RECORD_RETENTION_DAYS)
    }

    /// 是否超过保留期（与状态无关）
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> GenerationParams {
        GenerationParams::new("光合作用", 5, Difficulty::Medium)
    }

    fn result() -> GenerationResult {
        GenerationResult {
            questions: vec![],
            total_questions: 0,
            question_ids: vec![],
            test_id: "test-r1".to_string(),
            model_used: "m1".to_string(),
            difficulty: Difficulty::Medium,
            duration_ms: 10,
        }
    }

    #[test]
    fn test_new_record_is_pending() {
        let record = GenerationRequestRecord::new("r1", "u1", params()).with_classroom("c1");
        assert_eq!(record.status, RequestStatus::Pending);
        assert_eq!(record.job_type, JobType::Ai);
        assert_eq!(record.classroom_id.as_deref(), Some("c1"));
        assert_eq!(record.retries, 0);
        assert_eq!(record.max_retries, DEFAULT_MAX_RETRIES);
        assert!(record.started_at.is_none());
    }

    #[test]
    fn test_success_path_sets_duration() {
        let t0 = Utc::now();
        let mut record = GenerationRequestRecord::new_at("r1", "u1", params(), t0);
        record.start_processing_at(t0 + ChronoDuration::seconds(1)).unwrap();
        assert_eq!(record.status, RequestStatus::Processing);

        record
            .complete_at(result(), t0 + ChronoDuration::milliseconds(3500))
            .unwrap();
        assert_eq!(record.status, RequestStatus::Success);
        assert_eq!(record.duration_ms, Some(2500));
        assert!(record.result.is_some());
        assert!(record.error.is_none());
    }

    #[test]
    fn test_failed_path_stores_error() {
        let mut record = GenerationRequestRecord::new("r1", "u1", params());
        record.start_processing().unwrap();
        record
            .fail(RequestError::new("AI_TIMEOUT", "超时").with_details(serde_json::json!({"model": "m1"})))
            .unwrap();
        assert_eq!(record.status, RequestStatus::Failed);
        let error = record.error.as_ref().unwrap();
        assert_eq!(error.code, "AI_TIMEOUT");
        assert_eq!(error.details.as_ref().unwrap()["model"], "m1");
        assert!(record.completed_at.is_some());
    }

    #[test]
    fn test_cannot_skip_processing() {
        let mut record = GenerationRequestRecord::new("r1", "u1", params());
        let err = record.complete(result()).unwrap_err();
        assert_eq!(
            err,
            RecordError::InvalidTransition {
                from: RequestStatus::Pending,
                to: RequestStatus::Success
            }
        );
        assert_eq!(record.status, RequestStatus::Pending);
        assert!(record.result.is_none());
    }

    #[test]
    fn test_terminal_record_is_immutable() {
        let mut record = GenerationRequestRecord::new("r1", "u1", params());
        record.start_processing().unwrap();
        record.complete(result()).unwrap();
        let snapshot = record.clone();

        assert!(record.start_processing().is_err());
        assert!(record.fail(RequestError::new("X", "x")).is_err());
        assert!(record.complete(result()).is_err());
        assert!(matches!(
            record.record_retry(),
            Err(RecordError::Finalized { .. })
        ));
        assert_eq!(record, snapshot);
    }

    #[test]
    fn test_transition_table() {
        use RequestStatus::*;
        let all = [Pending, Processing, Success, Failed];
        for from in all {
            for to in all {
                let allowed = from.can_transition_to(to);
                let expected = matches!(
                    (from, to),
                    (Pending, Processing) | (Processing, Success) | (Processing, Failed)
                );
                assert_eq!(allowed, expected, "{} -> {}", from, to);
            }
        }
        assert!(Success.is_terminal() && Failed.is_terminal());
        assert!(!Pending.is_terminal() && !Processing.is_terminal());
    }

    #[test]
    fn test_retry_ceiling() {
        let mut record = GenerationRequestRecord::new("r1", "u1", params()).with_max_retries(2);
        assert_eq!(record.record_retry().unwrap(), 1);
        assert_eq!(record.record_retry().unwrap(), 2);
        assert_eq!(
            record.record_retry().unwrap_err(),
            RecordError::RetryLimit { max_retries: 2 }
        );
        assert_eq!(record.retries, 2);
    }

    #[test]
    fn test_expiry_after_seven_days() {
        let t0 = Utc::now();
        let record = GenerationRequestRecord::new_at("r1", "u1", params(), t0);
        assert!(!record.is_expired(t0 + ChronoDuration::days(6)));
        assert!(record.is_expired(t0 + ChronoDuration::days(7)));
        assert_eq!(record.expires_at(), t0 + ChronoDuration::days(7));
    }

    #[test]
    fn test_serialize_shape() {
        let record = GenerationRequestRecord::new("r1", "u1", params());
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["requestId"], "r1");
        assert_eq!(value["status"], "pending");
        assert_eq!(value["jobType"], "ai");
        assert_eq!(value["params"]["questionCount"], 5);
        assert!(value.get("result").is_none());

        let back: GenerationRequestRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }
}
