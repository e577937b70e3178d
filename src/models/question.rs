use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 题目难度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("未知难度: {0}")]
pub struct UnknownDifficulty(pub String);

impl FromStr for Difficulty {
    type Err = UnknownDifficulty;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "easy" | "简单" => Ok(Difficulty::Easy),
            "medium" | "中等" => Ok(Difficulty::Medium),
            "hard" | "困难" => Ok(Difficulty::Hard),
            _ => Err(UnknownDifficulty(s.to_string())),
        }
    }
}

/// 生成参数（只用于构建 prompt）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationParams {
    pub topic: String,
    pub question_count: u32,
    pub difficulty: Difficulty,
}

impl GenerationParams {
    pub fn new(topic: impl Into<String>, question_count: u32, difficulty: Difficulty) -> Self {
        Self {
            topic: topic.into(),
            question_count,
            difficulty,
        }
    }
}

/// 归一化之后的题目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedQuestion {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub correct_answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

const QUESTION_KEYS: &[&str] = &["question", "q", "questionText", "text"];
const OPTION_KEYS: &[&str] = &["options", "choices"];
const ANSWER_KEYS: &[&str] = &["correctAnswer", "correct_answer", "answer", "a"];

impl GeneratedQuestion {
    /// 从模型返回的单个 JSON 对象归一化出题目
    ///
    /// 模型输出的字段名并不稳定，这里兼容常见的几种写法。
    /// 答案为数字时按选项下标解析。没有题干的条目返回 `None`。
    pub fn from_value(value: &JsonValue) -> Option<Self> {
        let obj = value.as_object()?;

        let question = QUESTION_KEYS
            .iter()
            .filter_map(|k| obj.get(*k).and_then(|v| v.as_str()))
            .map(str::trim)
            .find(|s| !s.is_empty())?
            .to_string();

        let options: Vec<String> = OPTION_KEYS
            .iter()
            .find_map(|k| obj.get(*k).and_then(|v| v.as_array()))
            .map(|items| items.iter().map(value_to_text).collect())
            .unwrap_or_default();

        let correct_answer = ANSWER_KEYS
            .iter()
            .find_map(|k| obj.get(*k))
            .map(|answer| match answer {
                JsonValue::Number(n) => n
                    .as_u64()
                    .and_then(|idx| options.get(idx as usize).cloned())
                    .unwrap_or_else(|| n.to_string()),
                other => value_to_text(other),
            })
            .unwrap_or_default();

        let explanation = obj
            .get("explanation")
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Some(Self {
            question,
            options,
            correct_answer,
            explanation,
        })
    }
}

fn value_to_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.trim().to_string(),
        other => other.to_string(),
    }
}
