//! 生成请求上下文
//!
//! 封装"我正在处理谁的哪个请求"这一信息，只用于日志前缀

use std::fmt::Display;

/// 生成请求上下文
#[derive(Debug, Clone)]
pub struct GenerationCtx {
    pub request_id: String,
    pub user_id: String,
    pub classroom_id: Option<String>,
}

impl GenerationCtx {
    pub fn new(
        request_id: impl Into<String>,
        user_id: impl Into<String>,
        classroom_id: Option<String>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            user_id: user_id.into(),
            classroom_id,
        }
    }
}

impl Display for GenerationCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.classroom_id {
            Some(classroom) => write!(
                f,
                "[请求 #{} 用户 #{} 班级 #{}]",
                self.request_id, self.user_id, classroom
            ),
            None => write!(f, "[请求 #{} 用户 #{}]", self.request_id, self.user_id),
        }
    }
}
