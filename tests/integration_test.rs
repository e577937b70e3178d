use ai_test_generation::clients::{GeminiProvider, ModelProvider};
use ai_test_generation::config::Config;
use ai_test_generation::error::{ProviderError, ProviderErrorKind};
use ai_test_generation::models::{Difficulty, GenerationParams, RequestStatus};
use ai_test_generation::services::{parse_questions, LlmService};
use ai_test_generation::utils::logging;
use ai_test_generation::{App, GenerationQueue, GenerationRequest, StatusView};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{json, Value as JsonValue};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 按顺序返回预设回复，记录每次调用的模型
struct ScriptedProvider {
    replies: Mutex<VecDeque<Result<String, ProviderError>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new(replies: Vec<Result<String, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl ModelProvider for ScriptedProvider {
    fn generate<'a>(
        &'a self,
        model: &'a str,
        _prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, ProviderError>> {
        self.calls.lock().unwrap().push(model.to_string());
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::new(ProviderErrorKind::Fatal, "脚本已用完")));
        futures::future::ready(reply).boxed()
    }
}

fn config(models: &[&str]) -> Config {
    Config {
        candidate_models: models.iter().map(|m| m.to_string()).collect(),
        retry_backoff_ms: 5,
        request_timeout_secs: 5,
        max_retries_per_model: 2,
        max_job_retries: 1,
        ..Config::default()
    }
}

#[tokio::test]
async fn test_queue_and_llm_service_end_to_end() {
    let provider = ScriptedProvider::new(vec![Ok(
        "```json\n[{\"q\":\"2+2?\",\"a\":\"4\"}]\n```".to_string()
    )]);
    let llm = Arc::new(LlmService::new(&config(&["m1"]), provider.clone()));
    let queue = GenerationQueue::new();

    let submission = queue
        .submit({
            let llm = llm.clone();
            move || async move { llm.generate("出两道加法题", 1).await }
        })
        .unwrap();
    let outcome = submission.await.unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.model.as_deref(), Some("m1"));
    let parsed: JsonValue = serde_json::from_str(outcome.text().unwrap()).unwrap();
    assert_eq!(parsed, json!([{"q": "2+2?", "a": "4"}]));

    let questions = parse_questions(outcome.text().unwrap()).unwrap();
    assert_eq!(questions[0].question, "2+2?");
    assert_eq!(questions[0].correct_answer, "4");
    assert_eq!(provider.calls(), vec!["m1"]);
}

#[tokio::test]
async fn test_app_falls_back_to_next_model() {
    let provider = ScriptedProvider::new(vec![
        Err(ProviderError::classify("404 model not found")),
        Ok(r#"[{"question": "水的化学式?", "options": ["H2O", "CO2"], "answer": 0}]"#.to_string()),
    ]);
    let app = App::with_provider(config(&["m1", "m2"]), provider.clone())
        .await
        .unwrap();

    let request = GenerationRequest::new(
        "r1",
        "u1",
        GenerationParams::new("化学", 1, Difficulty::Easy),
    );
    let view = app.run(request).await.unwrap();

    match view {
        StatusView::Succeeded { result, .. } => {
            assert_eq!(result.model_used, "m2");
            assert_eq!(result.questions[0].correct_answer, "H2O");
        }
        other => panic!("unexpected status: {:?}", other),
    }
    assert_eq!(provider.calls(), vec!["m1", "m2"]);
}

#[tokio::test]
async fn test_app_reports_all_models_exhausted() {
    let overloaded = || -> Result<String, ProviderError> {
        Err(ProviderError::classify("503 overloaded"))
    };
    let provider = ScriptedProvider::new((0..8).map(|_| overloaded()).collect());
    let app = App::with_provider(config(&["m1", "m2"]), provider.clone())
        .await
        .unwrap();

    let request = GenerationRequest::new(
        "r1",
        "u1",
        GenerationParams::new("历史", 3, Difficulty::Hard),
    );
    let view = app.run(request).await.unwrap();

    match view {
        StatusView::AllModelsExhausted { error, retries, .. } => {
            assert_eq!(error.code, "AI_RATE_LIMITED");
            assert_eq!(retries, 1);
        }
        other => panic!("unexpected status: {:?}", other),
    }
    // 两个模型 × 每个 2 次 × (首次 + 1 次整体重试)
    assert_eq!(provider.calls().len(), 8);

    let record = app.flow().store().get("r1").await.unwrap();
    assert_eq!(record.status(), RequestStatus::Failed);
}

#[tokio::test]
async fn test_concurrent_requests_are_serialized() {
    let reply = || -> Result<String, ProviderError> {
        Ok(r#"[{"question": "q", "options": ["a"], "correctAnswer": "a"}]"#.to_string())
    };
    let provider = ScriptedProvider::new((0..3).map(|_| reply()).collect());
    let app = App::with_provider(config(&["m1"]), provider).await.unwrap();

    let requests = (1..=3).map(|i| {
        GenerationRequest::new(
            format!("r{}", i),
            "u1",
            GenerationParams::new("语文", 1, Difficulty::Medium),
        )
    });
    let mut ids = Vec::new();
    for request in requests {
        ids.push(app.flow().submit(request).await.unwrap());
    }

    for id in &ids {
        let mut view = app.flow().status(id).await.unwrap();
        for _ in 0..100 {
            if view.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            view = app.flow().status(id).await.unwrap();
        }
        assert!(matches!(view, StatusView::Succeeded { .. }));
    }
    assert_eq!(app.flow().queue().stats().pending, 0);
}

#[tokio::test]
#[ignore] // 默认忽略，需要 LLM_API_KEY：cargo test -- --ignored
async fn test_live_gemini_generation() {
    logging::init();

    let config = Config::from_env();
    let provider: Arc<dyn ModelProvider> = Arc::new(GeminiProvider::new(&config));
    let app = App::with_provider(config, provider)
        .await
        .expect("初始化应用失败");

    let request = GenerationRequest::new(
        "live-1",
        "tester",
        GenerationParams::new("勾股定理", 2, Difficulty::Easy),
    );
    let view = app.run(request).await.expect("生成失败");

    assert!(matches!(view, StatusView::Succeeded { .. }), "{:?}", view);
}
