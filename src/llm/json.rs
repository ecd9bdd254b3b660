//! 严格 JSON 解析
//!
//! 模型输出可能包裹 ```json 代码块或夹带说明文字；
//! 提取首个 JSON 对象、要求顶层为 object、容忍未知字段。

use serde_json::Value;

use crate::core::AgentError;
use crate::llm::LlmClient;

/// 从模型原始输出中提取 JSON 对象
///
/// 依次尝试：```json 代码块 → 首个 '{' 到末个 '}' 的切片；
/// 解析结果必须是 object，否则报 Model 错误。
pub fn extract_json_object(raw: &str) -> Result<Value, AgentError> {
    let trimmed = raw.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or_else(|| rest.trim())
    } else if let Some(start) = trimmed.find('{') {
        match trimmed.rfind('}') {
            Some(end) if end >= start => &trimmed[start..=end],
            _ => trimmed,
        }
    } else {
        return Err(AgentError::Model(format!(
            "no JSON object in model output: {}",
            preview(trimmed)
        )));
    };

    let value: Value = serde_json::from_str(json_str)
        .map_err(|e| AgentError::Model(format!("{}: {}", e, preview(json_str))))?;

    if !value.is_object() {
        return Err(AgentError::Model(format!(
            "model output is not a JSON object: {}",
            preview(json_str)
        )));
    }
    Ok(value)
}

/// 调用 LLM 并要求严格 JSON 输出
pub async fn generate_json(
    llm: &dyn LlmClient,
    system: &str,
    user: &str,
    temperature: f32,
) -> Result<Value, AgentError> {
    let raw = llm
        .generate(system, user, temperature)
        .await
        .map_err(AgentError::Model)?;
    extract_json_object(&raw)
}

fn preview(s: &str) -> String {
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s.to_string()
    }
}
