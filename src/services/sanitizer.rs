//! 模型输出清洗 - 业务能力层
//!
//! 模型经常把 JSON 包在 markdown 代码块里，前后夹杂说明文字，
//! 偶尔还带控制字符。这里尽量把原始文本修复成 JSON 解析器能接受的数组文本。
//!
//! 清洗步骤：
//! 1. 代码块：若某个代码块的内容包含 `[`，取第一个这样的代码块内容；
//!    否则删除所有代码块
//! 2. 截取第一个 `[` 到最后一个 `]` 之间的内容
//! 3. 删除制表符、换行、回车以外的控制字符
//! 4. 把字面量 `\n`、`\r`、`\t` 两字符序列替换为空格
//! 5. 去掉首尾空白
//!
//! 清洗本身永远不会失败，解析失败由调用方作为内容错误处理。

use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::OnceLock;

use crate::error::ContentError;
use crate::models::question::GeneratedQuestion;

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    // 开头的 ``` 后面可以跟语言标记（json 等）
    FENCE.get_or_init(|| {
        Regex::new(r"```[A-Za-z0-9_+\-]*[ \t]*\n?([\s\S]*?)```").expect("代码块正则无效")
    })
}

fn escaped_whitespace_regex() -> &'static Regex {
    static ESCAPED: OnceLock<Regex> = OnceLock::new();
    ESCAPED.get_or_init(|| Regex::new(r"\\[nrt]").expect("转义序列正则无效"))
}

/// 清洗模型原始输出
pub fn sanitize(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let text = unfence(raw);
    let text = bracket_span(&text);
    let text: String = text
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect();
    let text = escaped_whitespace_regex().replace_all(&text, " ");

    text.trim().to_string()
}

/// 处理 markdown 代码块
fn unfence(text: &str) -> String {
    let re = fence_regex();

    let payload = re
        .captures_iter(text)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str())
        .find(|content| content.contains('['));

    match payload {
        Some(content) => content.to_string(),
        None => re.replace_all(text, "").into_owned(),
    }
}

/// 截取最可能的 JSON 数组范围
fn bracket_span(text: &str) -> &str {
    match (text.find('['), text.rfind(']')) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    }
}

/// 把清洗后的文本解析为题目列表
///
/// 无法归一化的条目（没有题干等）会被丢弃。
pub fn parse_questions(sanitized: &str) -> Result<Vec<GeneratedQuestion>, ContentError> {
    if sanitized.trim().is_empty() {
        return Err(ContentError::Empty);
    }

    let value: JsonValue = serde_json::from_str(sanitized)?;
    let JsonValue::Array(items) = value else {
        return Err(ContentError::NotAnArray);
    };

    let questions: Vec<GeneratedQuestion> =
        items.iter().filter_map(GeneratedQuestion::from_value).collect();

    if questions.is_empty() {
        return Err(ContentError::NoQuestions);
    }

    Ok(questions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_input() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("   "), "");
    }

    #[test]
    fn test_fenced_payload_survives() {
        let raw = "```json\n[{\"q\":\"2+2?\",\"a\":\"4\"}]\n```";
        let cleaned = sanitize(raw);
        let value: JsonValue = serde_json::from_str(&cleaned).unwrap();
        assert_eq!(value, json!([{"q": "2+2?", "a": "4"}]));
    }

    #[test]
    fn test_prose_and_fence_around_payload() {
        let raw = "好的，下面是题目：\n```json\n[\n  {\"question\": \"1+1?\", \"answer\": \"2\"}\n]\n```\n希望对你有帮助！";
        let value: JsonValue = serde_json::from_str(&sanitize(raw)).unwrap();
        assert_eq!(value, json!([{"question": "1+1?", "answer": "2"}]));
    }

    #[test]
    fn test_unrelated_fence_is_removed() {
        let raw = "示例代码 ```print(1)``` 之后是数据 [1, 2, 3] 结束";
        assert_eq!(sanitize(raw), "[1, 2, 3]");
    }

    #[test]
    fn test_first_fence_with_array_wins() {
        let raw = "```text\nnote\n```\n```json\n[1]\n```\n```json\n[2]\n```";
        assert_eq!(sanitize(raw), "[1]");
    }

    #[test]
    fn test_inline_fence_with_payload() {
        assert_eq!(sanitize("结果：```[1,2]```"), "[1,2]");
    }

    #[test]
    fn test_unclosed_fence() {
        let raw = "```json\n[{\"q\":\"x\"}]";
        assert_eq!(sanitize(raw), "[{\"q\":\"x\"}]");
    }

    #[test]
    fn test_bracket_trimming() {
        assert_eq!(sanitize("Here you go: [1,2] thanks"), "[1,2]");
        assert_eq!(sanitize("no array here"), "no array here");
        assert_eq!(sanitize("] reversed ["), "] reversed [");
    }

    #[test]
    fn test_control_characters_removed() {
        let raw = "[\u{0}\"a\u{7}\",\t\"b\"\u{1b}]";
        assert_eq!(sanitize(raw), "[\"a\",\t\"b\"]");
    }

    #[test]
    fn test_literal_escape_sequences_replaced() {
        let raw = r#"[{"q":"line1\nline2\tend\r"}]"#;
        assert_eq!(sanitize(raw), r#"[{"q":"line1 line2 end "}]"#);
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "",
            "plain text",
            "```json\n[{\"q\":\"2+2?\",\"a\":\"4\"}]\n```",
            "intro ```code``` [1, \"a\\nb\"] outro",
            "  [\u{1}1]  ",
            "```\n[x```y]```",
            "] [",
            "[1] ``` [2]",
            "text\\n [ \\t ] \\r",
        ];
        for input in inputs {
            let once = sanitize(input);
            let twice = sanitize(&once);
            assert_eq!(once, twice, "input: {:?}", input);
        }
    }

    #[test]
    fn test_parse_questions() {
        let text = sanitize(
            "```json\n[{\"question\":\"2+2?\",\"options\":[\"3\",\"4\"],\"correctAnswer\":1},{\"foo\":1}]\n```",
        );
        let questions = parse_questions(&text).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].correct_answer, "4");
    }

    #[test]
    fn test_parse_questions_errors() {
        assert!(matches!(parse_questions(""), Err(ContentError::Empty)));
        assert!(matches!(
            parse_questions("not json"),
            Err(ContentError::InvalidJson(_))
        ));
        assert!(matches!(
            parse_questions("{\"q\":1}"),
            Err(ContentError::NotAnArray)
        ));
        assert!(matches!(
            parse_questions("[1, 2]"),
            Err(ContentError::NoQuestions)
        ));
    }
}
