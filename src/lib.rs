//! # AI Test Generation
//!
//! 调用大模型批量生成选择题的后台服务核心
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 提供方客户端（Clients）
//! - `clients/` - 每次只向一个指定模型发一次请求，并把失败分类
//! - `GeminiProvider` - Gemini REST 接口
//! - `OpenAiProvider` - OpenAI 兼容接口
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `ModelClient` - 带硬超时的单模型调用
//! - `LlmService` - 候选模型间的重试与回退
//! - `sanitizer` - 清洗模型输出并解析题目
//! - `RequestStore` - 请求记录存储与过期清理
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一次出题请求"的完整处理流程
//! - `GenerationCtx` - 日志上下文
//! - `GenerationFlow` - 记录状态迁移（pending → processing → success / failed）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/generation_queue` - 单并发 FIFO 生成队列
//! - `orchestrator/app` - 创建并持有进程级资源
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{build_provider, ModelProvider};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{GenerationOutcome, GenerationParams, GenerationRequestRecord};
pub use orchestrator::{App, GenerationQueue};
pub use services::LlmService;
pub use workflow::{GenerationFlow, GenerationRequest, StatusView};
