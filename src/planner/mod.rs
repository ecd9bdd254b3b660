//! 规划智能体
//!
//! 两个 skill，均为低温度（≤0.3）严格 JSON 的 LLM 调用：
//! - `plan` — (用户请求, 检索命中, 无人机状态, 工具目录) → 计划 / 澄清请求
//! - `reflect` — 执行后复盘：目标是否达成、置信度、补救步骤
//!
//! 产出的每个工具名都必须出现在传入的工具目录里；不合规步骤丢弃并告警。

pub mod prompts;
pub mod validate;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::a2a::{A2aServer, AgentCard, SkillCard, SkillHandler, Task};
use crate::core::AgentError;
use crate::executor::{DroneState, ToolDescriptor};
use crate::llm::{generate_json, LlmClient};
use crate::rag::RetrievalHit;

/// plan / reflect 的生成温度
const PLAN_TEMPERATURE: f32 = 0.2;

/// 计划中的一步工具调用
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub description: String,
}

/// 规划结果：要么给出步骤，要么请求澄清（附缺失地标名）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Plan {
    pub reasoning: String,
    pub needs_clarification: bool,
    pub clarification_question: String,
    pub missing_locations: Vec<String>,
    pub steps: Vec<PlanStep>,
}

/// 复盘结果；goal_achieved 为真时 next_steps 必为空
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Reflection {
    pub observation: String,
    pub reasoning: String,
    pub goal_achieved: bool,
    pub confidence: f64,
    pub next_steps: Vec<PlanStep>,
    pub summary: String,
}

/// plan skill 输入
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanInput {
    pub user_request: String,
    pub rag_hits: Vec<RetrievalHit>,
    pub drone_state: Option<DroneState>,
    pub available_tools: Vec<ToolDescriptor>,
}

/// reflect skill 输入
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectInput {
    pub original_request: String,
    pub previous_plan: Plan,
    /// 执行智能体返回的执行报告（原样透传）
    pub execution_result: Value,
    pub current_drone_state: Option<DroneState>,
    pub rag_hits: Vec<RetrievalHit>,
    pub available_tools: Vec<ToolDescriptor>,
}

/// 规划智能体：持有 LLM，产出经白名单校验的 Plan / Reflection
pub struct PlannerAgent {
    llm: Arc<dyn LlmClient>,
}

impl PlannerAgent {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }

    /// 生成计划；工具目录为空直接拒绝
    pub async fn plan(&self, input: &PlanInput) -> Result<Plan, AgentError> {
        if input.available_tools.is_empty() {
            return Err(AgentError::NoToolsAvailable);
        }

        let system = prompts::plan_system();
        let user = prompts::build_plan_user(input);
        let raw = generate_json(self.llm.as_ref(), &system, &user, PLAN_TEMPERATURE).await?;

        let mut plan: Plan = serde_json::from_value(raw)
            .map_err(|e| AgentError::Validation(format!("plan shape: {}", e)))?;

        let allowed = validate::allowed_tool_set(&input.available_tools);
        plan.steps = validate::filter_steps(plan.steps, &allowed);
        plan.missing_locations = validate::normalize_locations(plan.missing_locations);
        Ok(plan)
    }

    /// 执行后复盘
    pub async fn reflect(&self, input: &ReflectInput) -> Result<Reflection, AgentError> {
        let system = prompts::reflect_system();
        let user = prompts::build_reflect_user(input);
        let raw = generate_json(self.llm.as_ref(), &system, &user, PLAN_TEMPERATURE).await?;

        let mut reflection: Reflection = serde_json::from_value(raw)
            .map_err(|e| AgentError::Validation(format!("reflection shape: {}", e)))?;

        reflection.confidence = validate::clamp_confidence(reflection.confidence);
        let allowed = validate::allowed_tool_set(&input.available_tools);
        reflection.next_steps = validate::filter_steps(reflection.next_steps, &allowed);
        if reflection.goal_achieved {
            // 目标已达成时不允许残留补救步骤
            reflection.next_steps.clear();
        }
        Ok(reflection)
    }

    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }
}

// ---- A2A skill 接线 ----

struct PlanSkill(Arc<PlannerAgent>);

#[async_trait]
impl SkillHandler for PlanSkill {
    async fn handle(&self, input: Value, _task: &Task) -> Result<Value, AgentError> {
        let input: PlanInput = serde_json::from_value(input)
            .map_err(|e| AgentError::Validation(format!("plan input: {}", e)))?;
        let plan = self.0.plan(&input).await?;
        serde_json::to_value(plan).map_err(|e| AgentError::Validation(e.to_string()))
    }
}

struct ReflectSkill(Arc<PlannerAgent>);

#[async_trait]
impl SkillHandler for ReflectSkill {
    async fn handle(&self, input: Value, _task: &Task) -> Result<Value, AgentError> {
        let input: ReflectInput = serde_json::from_value(input)
            .map_err(|e| AgentError::Validation(format!("reflect input: {}", e)))?;
        let reflection = self.0.reflect(&input).await?;
        serde_json::to_value(reflection).map_err(|e| AgentError::Validation(e.to_string()))
    }
}

/// 组装规划智能体的 A2A 服务端
pub fn build_planner_server(agent: Arc<PlannerAgent>, url: impl Into<String>) -> A2aServer {
    let card = AgentCard::new("planner", url)
        .with_skill(
            SkillCard::new("plan", "将用户请求规划为工具调用序列或澄清请求")
                .with_input_schema(json!({
                    "type": "object",
                    "required": ["user_request", "available_tools"],
                    "properties": {
                        "user_request": {"type": "string"},
                        "rag_hits": {"type": "array"},
                        "drone_state": {"type": ["object", "null"]},
                        "available_tools": {"type": "array"}
                    }
                }))
                .with_output_schema(json!({
                    "type": "object",
                    "properties": {
                        "reasoning": {"type": "string"},
                        "needs_clarification": {"type": "boolean"},
                        "missing_locations": {"type": "array"},
                        "steps": {"type": "array"}
                    }
                })),
        )
        .with_skill(
            SkillCard::new("reflect", "对执行结果复盘：目标达成与否、置信度与补救步骤")
                .with_input_schema(json!({
                    "type": "object",
                    "required": ["original_request"],
                    "properties": {
                        "original_request": {"type": "string"},
                        "previous_plan": {"type": "object"},
                        "execution_result": {"type": "object"},
                        "current_drone_state": {"type": ["object", "null"]},
                        "rag_hits": {"type": "array"},
                        "available_tools": {"type": "array"}
                    }
                }))
                .with_output_schema(json!({
                    "type": "object",
                    "properties": {
                        "goal_achieved": {"type": "boolean"},
                        "confidence": {"type": "number"},
                        "next_steps": {"type": "array"},
                        "summary": {"type": "string"}
                    }
                })),
        );

    let mut server = A2aServer::new(card);
    server.register("plan", Arc::new(PlanSkill(Arc::clone(&agent))));
    server.register("reflect", Arc::new(ReflectSkill(agent)));
    server
}
