//! 应用组装 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责创建并持有进程级的共享资源。
//!
//! ## 核心功能
//!
//! 1. **配置校验**：启动前拒绝无效配置
//! 2. **资源创建**：提供方客户端、LLM 服务、生成队列、记录存储
//! 3. **后台任务**：启动过期记录清理
//! 4. **向下委托**：单个请求交给 [`GenerationFlow`] 处理

use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use crate::clients::{build_provider, ModelProvider};
use crate::config::Config;
use crate::orchestrator::generation_queue::GenerationQueue;
use crate::services::{LlmService, RequestStore};
use crate::utils::logging::log_startup;
use crate::workflow::{GenerationFlow, GenerationRequest, StatusView};

/// 应用主结构
pub struct App {
    config: Config,
    flow: GenerationFlow,
    sweeper: JoinHandle<()>,
}

impl App {
    /// 初始化应用，提供方按配置创建
    pub async fn initialize(config: Config) -> Result<Self> {
        let provider = build_provider(&config);
        Self::with_provider(config, provider).await
    }

    /// 使用指定提供方初始化应用
    pub async fn with_provider(config: Config, provider: Arc<dyn ModelProvider>) -> Result<Self> {
        config.validate()?;
        log_startup(&config);

        let llm = Arc::new(LlmService::new(&config, provider));
        let queue = GenerationQueue::new();
        let store = RequestStore::new();
        let sweeper = store.spawn_expiry_sweeper(config.expiry_sweep_interval());

        let flow = GenerationFlow::new(&config, llm, queue, store);

        Ok(Self {
            config,
            flow,
            sweeper,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn flow(&self) -> &GenerationFlow {
        &self.flow
    }

    /// 处理一个请求并返回最终状态
    pub async fn run(&self, request: GenerationRequest) -> Result<StatusView> {
        let record = self.flow.run(request).await?;
        let view = StatusView::from_record(&record);

        let stats = self.flow.queue().stats();
        info!(
            "📊 请求 {} 结束：{}，队列已完成 {} 个任务",
            record.request_id,
            record.status(),
            stats.completed
        );

        Ok(view)
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.flow.queue().close();
        self.sweeper.abort();
    }
}
