//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责进程级资源和任务调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `generation_queue` - 生成队列
//! - 同一时刻只放行一个生成任务
//! - 严格按提交顺序执行
//! - 把任务结果原样交还给提交者
//!
//! ### `app` - 应用组装
//! - 校验配置，创建提供方、LLM 服务、队列、记录存储
//! - 启动过期记录清理任务
//! - 对外提供单个请求的入口
//!
//! ## 层次关系
//!
//! ```text
//! app (持有进程级资源)
//!     ↓
//! workflow::GenerationFlow (处理单个请求)
//!     ↓
//! generation_queue (串行放行)
//!     ↓
//! services (能力层：llm / sanitizer / store)
//!     ↓
//! clients (提供方：gemini / openai)
//! ```

pub mod app;
pub mod generation_queue;

pub use app::App;
pub use generation_queue::{GenerationQueue, QueueStats, Submission};
