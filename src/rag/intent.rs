//! 检索意图分解
//!
//! 用低温度 LLM 从复合查询中抽取全部具体目标（地标名、数字编号、颜色+形状组合），
//! 失败时降级为空目标列表（调用方退回原句检索）。

use serde::{Deserialize, Serialize};

use crate::llm::{generate_json, LlmClient};

const INTENT_TEMPERATURE: f32 = 0.1;

const INTENT_SYSTEM: &str = r#"You decompose a drone-flight request into retrieval targets.
Extract EVERY concrete target mentioned: named landmarks, numeric ids (like "7号" / "point 3"),
color+shape pairs (like "蓝色圆形" / "red square"). Keep each target as the user wrote it.
Respond with strict JSON only:
{"targets": ["...", "..."], "reasoning": "one short sentence"}
If the request needs no location lookup, return {"targets": [], "reasoning": "..."}."#;

/// 意图分解结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalIntent {
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub original_query: String,
}

impl RetrievalIntent {
    /// 空意图（分解失败时的降级值）
    pub fn empty(query: &str) -> Self {
        Self {
            targets: Vec::new(),
            reasoning: String::new(),
            original_query: query.to_string(),
        }
    }
}

/// 分解查询意图；任何模型错误都降级为空目标列表
pub async fn decompose_intent(llm: &dyn LlmClient, query: &str) -> RetrievalIntent {
    let user = format!("User request: {}", query);
    match generate_json(llm, INTENT_SYSTEM, &user, INTENT_TEMPERATURE).await {
        Ok(value) => {
            let mut intent: RetrievalIntent =
                serde_json::from_value(value).unwrap_or_else(|_| RetrievalIntent::empty(query));
            intent.original_query = query.to_string();
            intent.targets.retain(|t| !t.trim().is_empty());
            intent
        }
        Err(e) => {
            tracing::warn!("intent decomposition failed, falling back to plain query: {}", e);
            RetrievalIntent::empty(query)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlm;

    #[tokio::test]
    async fn test_decompose_intent() {
        let llm = MockLlm::with_responses([
            r#"{"targets": ["2号", "3号", "6号"], "reasoning": "three numbered points"}"#,
        ]);
        let intent = decompose_intent(&llm, "依次飞过2、3、6号点").await;
        assert_eq!(intent.targets, vec!["2号", "3号", "6号"]);
        assert_eq!(intent.original_query, "依次飞过2、3、6号点");
    }

    #[tokio::test]
    async fn test_decompose_intent_model_garbage() {
        let llm = MockLlm::with_responses(["not json at all"]);
        let intent = decompose_intent(&llm, "take off").await;
        assert!(intent.targets.is_empty());
        assert_eq!(intent.original_query, "take off");
    }

    #[tokio::test]
    async fn test_decompose_intent_drops_blank_targets() {
        let llm = MockLlm::with_responses([r#"{"targets": ["7号", "  ", ""], "reasoning": "x"}"#]);
        let intent = decompose_intent(&llm, "fly to 7").await;
        assert_eq!(intent.targets, vec!["7号"]);
    }
}
