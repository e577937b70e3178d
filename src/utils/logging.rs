/// 日志工具模块
///
/// 提供日志初始化和输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// 初始化全局日志
///
/// 默认级别为 info，`RUST_LOG` 环境变量优先。重复调用不会报错。
pub fn init() {
    init_with_verbose(false);
}

/// 初始化全局日志
///
/// # 参数
/// - `verbose`: 为 true 时默认级别为 debug
pub fn init_with_verbose(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - AI 出题服务");
    info!("🤖 提供方: {:?}", config.provider);
    info!("📋 候选模型: {}", config.candidate_models.join(" → "));
    info!(
        "⏱️ 单次超时: {}s | 重试间隔: {}ms | 单模型尝试次数: {}",
        config.request_timeout_secs, config.retry_backoff_ms, config.max_retries_per_model
    );
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度（按字符计）
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
