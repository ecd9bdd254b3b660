//! plan / reflect 提示词拼装
//!
//! 系统约束：只许用目录内工具、参数符合各自 schema、坐标系约定、
//! 默认高度 1.0、默认边长 2.0、移动前必须起飞。

use crate::executor::{DroneState, ToolDescriptor};
use crate::planner::{PlanInput, ReflectInput};
use crate::rag::RetrievalHit;

/// plan 的系统提示
pub fn plan_system() -> String {
    r#"You are the flight planner of a drone control system.

Constraints (violating any of them makes the plan invalid):
- You may ONLY use tool names from the AVAILABLE TOOLS list below. Never invent a tool.
- Tool arguments must match each tool's JSON input schema.
- Coordinate frame: +X is right, +Z is down(forward on the map), +Y is up.
- Default flight altitude is 1.0 meters when the user does not specify one.
- Default side length is 2.0 meters when the user asks for a shape without a size.
- Safety rule: the drone must take off before any move command.
- If the request mentions named locations you cannot ground in the provided
  context chunks, do NOT guess coordinates: set needs_clarification to true and
  list those names in missing_locations exactly as the user referred to them.

Respond with strict JSON only, in this shape:
{
  "reasoning": "short chain of thought for the plan",
  "needs_clarification": false,
  "clarification_question": "",
  "missing_locations": [],
  "steps": [{"tool": "...", "args": {...}, "description": "..."}]
}"#
        .to_string()
}

/// reflect 的系统提示
pub fn reflect_system() -> String {
    r#"You are reviewing the execution of a drone flight plan.
Compare the original request, the executed plan, the per-step results and the
current drone state. Decide whether the user's goal is achieved.

Rules:
- If the goal is achieved, next_steps MUST be an empty list.
- If not achieved and recovery is possible, propose next_steps using ONLY tool
  names from the AVAILABLE TOOLS list.
- confidence is a number between 0 and 1.

Respond with strict JSON only:
{
  "observation": "what actually happened",
  "reasoning": "why the goal is or is not achieved",
  "goal_achieved": false,
  "confidence": 0.0,
  "next_steps": [{"tool": "...", "args": {...}, "description": "..."}],
  "summary": "one sentence for the user"
}"#
        .to_string()
}

/// plan 的用户消息
pub fn build_plan_user(input: &PlanInput) -> String {
    format!(
        "AVAILABLE TOOLS:\n{}\n\nUSER REQUEST:\n{}\n\nCONTEXT CHUNKS:\n{}\n\nDRONE STATE:\n{}",
        format_tools(&input.available_tools),
        input.user_request,
        format_hits(&input.rag_hits),
        format_state(&input.drone_state),
    )
}

/// reflect 的用户消息
pub fn build_reflect_user(input: &ReflectInput) -> String {
    format!(
        "AVAILABLE TOOLS:\n{}\n\nORIGINAL REQUEST:\n{}\n\nEXECUTED PLAN:\n{}\n\nEXECUTION RESULT:\n{}\n\nCURRENT DRONE STATE:\n{}\n\nCONTEXT CHUNKS:\n{}",
        format_tools(&input.available_tools),
        input.original_request,
        serde_json::to_string_pretty(&input.previous_plan).unwrap_or_default(),
        serde_json::to_string_pretty(&input.execution_result).unwrap_or_default(),
        format_state(&input.current_drone_state),
        format_hits(&input.rag_hits),
    )
}

fn format_tools(tools: &[ToolDescriptor]) -> String {
    if tools.is_empty() {
        return "(none)".to_string();
    }
    tools
        .iter()
        .map(|t| {
            format!(
                "- {}: {}\n  schema: {}",
                t.name,
                t.description,
                serde_json::to_string(&t.input_schema).unwrap_or_default()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_hits(hits: &[RetrievalHit]) -> String {
    if hits.is_empty() {
        return "(no retrieval hits)".to_string();
    }
    hits.iter()
        .map(|h| {
            format!(
                "- [{:.0}%] {}",
                h.similarity_score * 100.0,
                h.chunk_text
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_state(state: &Option<DroneState>) -> String {
    match state {
        Some(s) => format!(
            "position=({:.2}, {:.2}, {:.2}) active={} queue_length={}",
            s.position.x, s.position.y, s.position.z, s.is_active, s.queue_length
        ),
        None => "(unknown)".to_string(),
    }
}
