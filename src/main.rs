use ai_test_generation::config::Config;
use ai_test_generation::models::{Difficulty, GenerationParams};
use ai_test_generation::utils::logging;
use ai_test_generation::{App, GenerationRequest};
use anyhow::{Context, Result};

/// 用法: ai_test_generation <主题> [题目数量] [难度]
#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置：指定了配置文件时以文件为准，环境变量仍然优先
    let config = match std::env::var("GENERATION_CONFIG") {
        Ok(path) => Config::from_toml_file(&path)?,
        Err(_) => Config::from_env(),
    };

    // 初始化日志
    logging::init_with_verbose(config.verbose_logging);

    let params = parse_args(std::env::args().skip(1).collect())?;
    let request_id = format!("req-{}", chrono::Utc::now().format("%Y%m%d%H%M%S%3f"));
    let request = GenerationRequest::new(request_id, "cli", params);

    // 初始化并运行应用
    let app = App::initialize(config).await?;
    let view = app.run(request).await?;

    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

fn parse_args(args: Vec<String>) -> Result<GenerationParams> {
    let mut args = args.into_iter();
    let topic = args
        .next()
        .context("缺少出题主题，用法: ai_test_generation <主题> [题目数量] [难度]")?;
    let count = match args.next() {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("题目数量无效: {}", raw))?,
        None => 5,
    };
    let difficulty = match args.next() {
        Some(raw) => raw.parse::<Difficulty>()?,
        None => Difficulty::Medium,
    };
    Ok(GenerationParams::new(topic, count, difficulty))
}
