//! Agent Card：智能体能力描述
//!
//! 静态描述符，供 /.well-known/agent.json 返回；
//! skills 的 JSON Schema 仅用于文档与启动期校验，不做逐字段运行时验证。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 单个 skill 的描述：id、人类可读说明、输入/输出 JSON Schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillCard {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub input_schema: Value,
    #[serde(default)]
    pub output_schema: Value,
}

impl SkillCard {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            input_schema: Value::Null,
            output_schema: Value::Null,
        }
    }

    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = schema;
        self
    }
}

/// Agent Card：名称、基地址、版本与 skill 列表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCard {
    pub name: String,
    pub url: String,
    pub version: String,
    pub skills: Vec<SkillCard>,
}

impl AgentCard {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            skills: Vec::new(),
        }
    }

    pub fn with_skill(mut self, skill: SkillCard) -> Self {
        self.skills.push(skill);
        self
    }

    /// 卡片是否声明了该 skill
    pub fn has_skill(&self, id: &str) -> bool {
        self.skills.iter().any(|s| s.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_card_roundtrip() {
        let card = AgentCard::new("rag", "http://127.0.0.1:9002").with_skill(
            SkillCard::new("retrieve", "direct vector retrieval")
                .with_input_schema(json!({"type": "object"})),
        );
        let s = serde_json::to_string(&card).unwrap();
        let back: AgentCard = serde_json::from_str(&s).unwrap();
        assert_eq!(back.name, "rag");
        assert!(back.has_skill("retrieve"));
        assert!(!back.has_skill("plan"));
    }
}
