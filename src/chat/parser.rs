//! 重分配意图解析：自由文本 -> 「把参与者 X 调到班级 Y」
//!
//! 先走正则快速匹配（不调用 LLM），未命中再交给 LLM 做结构化抽取。

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;

use crate::config::LlmSection;
use crate::llm::{LlmClient, Message, OpenAiClient};
use crate::model::{ClassId, EntityId};

/// 解析出的重分配请求
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReallocationRequest {
    #[serde(rename = "target_id")]
    pub target: EntityId,
    #[serde(rename = "class_id")]
    pub class: ClassId,
    /// 给用户看的建议（markdown）
    #[serde(default)]
    pub suggestion: String,
}

#[async_trait]
pub trait ReallocationParser: Send + Sync {
    /// 不是重分配请求时返回 None，调用方改走通用聊天
    async fn parse(&self, message: &str) -> Option<ReallocationRequest>;
}

const MOVE_PATTERN: &str = r"(?i)\b(?:move|swap|reallocate|transfer)\s+(?:student\s+|participant\s+)?#?(\d+)\s+(?:to|into)\s+(?:class\s+)?#?(\d+)";

/// 正则快速匹配："move student 32394 to class 2"、"swap 12 into 3"
pub struct RuleBasedParser {
    pattern: Regex,
}

impl RuleBasedParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(MOVE_PATTERN)?,
        })
    }

    pub fn fast_match(&self, message: &str) -> Option<ReallocationRequest> {
        let caps = self.pattern.captures(message)?;
        let target = caps.get(1)?.as_str().parse().ok()?;
        let class = caps.get(2)?.as_str().parse().ok()?;
        Some(ReallocationRequest {
            target: EntityId(target),
            class: ClassId(class),
            suggestion: format!("Moving participant **{}** to class **{}**.", target, class),
        })
    }
}

#[async_trait]
impl ReallocationParser for RuleBasedParser {
    async fn parse(&self, message: &str) -> Option<ReallocationRequest> {
        self.fast_match(message)
    }
}

const EXTRACTION_PROMPT: &str = r#"You are a helpful assistant that extracts reallocation requests from a message.

Return ONLY this JSON object (no explanation):
{"target_id": number, "class_id": number, "suggestion": string}

target_id is the id of the student to reallocate.
class_id is the id of the class to move the student to.
suggestion is advice for the student in markdown format.
If you cannot find the information, return null."#;

/// 用 LLM 做结构化抽取
pub struct LlmReallocationParser {
    llm: Arc<dyn LlmClient>,
}

impl LlmReallocationParser {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ReallocationParser for LlmReallocationParser {
    async fn parse(&self, message: &str) -> Option<ReallocationRequest> {
        let messages = vec![Message::system(EXTRACTION_PROMPT), Message::user(message)];
        let response = match self.llm.complete(&messages).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("LLM reallocation extraction failed: {}", e);
                return None;
            }
        };
        parse_extraction(&response)
    }
}

/// 解析 LLM 输出：容忍 ```json 围栏与前后噪声；`null` 与畸形输出都视为 None
fn parse_extraction(raw: &str) -> Option<ReallocationRequest> {
    let trimmed = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    if trimmed.eq_ignore_ascii_case("null") || trimmed.is_empty() {
        return None;
    }
    let body = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => {
            tracing::warn!("LLM extraction is not a JSON object: {}", trimmed);
            return None;
        }
    };
    match serde_json::from_str::<ReallocationRequest>(body) {
        Ok(request) => Some(request),
        Err(e) => {
            tracing::warn!("Malformed LLM extraction ({}): {}", e, body);
            None
        }
    }
}

/// 规则优先，未命中且配置了 LLM 时再兜底
pub struct HybridParser {
    rules: RuleBasedParser,
    llm: Option<LlmReallocationParser>,
}

impl HybridParser {
    pub fn new(rules: RuleBasedParser, llm: Option<LlmReallocationParser>) -> Self {
        Self { rules, llm }
    }

    /// 按 [llm] 段构建：enabled 时以 OpenAI 兼容客户端兜底，否则只用规则
    pub fn from_settings(settings: &LlmSection) -> Result<Self, regex::Error> {
        let llm = if settings.enabled {
            tracing::info!("LLM reallocation fallback enabled (model {})", settings.model);
            let client: Arc<dyn LlmClient> = Arc::new(OpenAiClient::from_settings(settings));
            Some(LlmReallocationParser::new(client))
        } else {
            None
        };
        Ok(Self::new(RuleBasedParser::new()?, llm))
    }

    pub fn has_llm_fallback(&self) -> bool {
        self.llm.is_some()
    }
}

#[async_trait]
impl ReallocationParser for HybridParser {
    async fn parse(&self, message: &str) -> Option<ReallocationRequest> {
        if let Some(request) = self.rules.fast_match(message) {
            tracing::debug!("Reallocation matched by rules: {:?}", request);
            return Some(request);
        }
        match &self.llm {
            Some(llm) => llm.parse(message).await,
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[test]
    fn test_fast_match_variants() {
        let rules = RuleBasedParser::new().unwrap();
        let r = rules.fast_match("Please move student 32394 to class 2").unwrap();
        assert_eq!((r.target, r.class), (EntityId(32394), ClassId(2)));

        let r = rules.fast_match("swap #12 into 3").unwrap();
        assert_eq!((r.target, r.class), (EntityId(12), ClassId(3)));

        assert!(rules.fast_match("Why is class 2 so large?").is_none());
        assert!(rules.fast_match("give suggestion to student 32394").is_none());
    }

    #[test]
    fn test_parse_extraction() {
        let r = parse_extraction(
            "```json\n{\"target_id\": 5, \"class_id\": 1, \"suggestion\": \"Try *group work*\"}\n```",
        )
        .unwrap();
        assert_eq!(r.target, EntityId(5));
        assert_eq!(r.suggestion, "Try *group work*");

        assert!(parse_extraction("null").is_none());
        assert!(parse_extraction("I cannot help with that").is_none());
        assert!(parse_extraction("{\"target_id\": \"abc\"}").is_none());
    }

    #[tokio::test]
    async fn test_hybrid_prefers_rules() {
        let llm = Arc::new(MockLlmClient::new().with_reply(
            r#"{"target_id": 7, "class_id": 4, "suggestion": "ok"}"#,
        ));
        let parser = HybridParser::new(
            RuleBasedParser::new().unwrap(),
            Some(LlmReallocationParser::new(llm.clone())),
        );

        let r = parser.parse("transfer 1 to class 2").await.unwrap();
        assert_eq!(r.target, EntityId(1));
        assert!(llm.prompts().is_empty());

        let r = parser.parse("Could Bob (id 7) sit with class four?").await.unwrap();
        assert_eq!((r.target, r.class), (EntityId(7), ClassId(4)));
        assert_eq!(llm.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_from_settings_follows_llm_switch() {
        let mut settings = LlmSection::default();
        let parser = HybridParser::from_settings(&settings).unwrap();
        assert!(!parser.has_llm_fallback());
        assert!(parser.parse("Could Bob sit with class four?").await.is_none());
        assert_eq!(
            parser.parse("move 3 to class 1").await.map(|r| r.class),
            Some(ClassId(1))
        );

        settings.enabled = true;
        settings.base_url = Some("http://127.0.0.1:1/v1".to_string());
        assert!(HybridParser::from_settings(&settings).unwrap().has_llm_fallback());
    }

    #[tokio::test]
    async fn test_llm_error_is_not_a_request() {
        let llm = Arc::new(MockLlmClient::new().with_error("timeout"));
        let parser = LlmReallocationParser::new(llm);
        assert!(parser.parse("move Bob somewhere").await.is_none());
    }
}
