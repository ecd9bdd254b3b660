//! 执行智能体
//!
//! 持有对外部工具端点的唯一长连接（MCP 子进程），缓存工具目录；
//! 三个 skill：list_tools / get_drone_state / execute。
//! 目录未命中时自动刷新一次；逐步执行，stop_on_error 时失败即止。

pub mod mcp;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::a2a::{A2aServer, AgentCard, SkillCard, SkillHandler, Task};
use crate::core::AgentError;
use crate::planner::PlanStep;

pub use mcp::McpConnection;

/// 任务类长时工具：使用任务超时上限，并允许进度通知重置期限
pub const MISSION_TOOL: &str = "drone.run_mission";
/// 读取无人机状态的具名工具
pub const STATE_TOOL: &str = "drone.get_state";

/// 工具描述：发现自工具端点，Executor 生命周期内缓存
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: Value,
}

/// 三维坐标
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// 无人机状态快照（只读，来自外部端点）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DroneState {
    pub position: Position,
    pub is_active: bool,
    pub queue_length: i64,
}

/// 工具端点抽象：MCP 连接实现之，测试用内存实现替身
#[async_trait]
pub trait ToolEndpoint: Send + Sync {
    /// 列出全部工具
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, String>;

    /// 调用工具；reset_on_progress 为真时进度通知会重置超时期限
    async fn call_tool(
        &self,
        name: &str,
        args: &Value,
        timeout: Duration,
        reset_on_progress: bool,
    ) -> Result<Value, String>;
}

/// 按工具名决定超时与进度重置策略
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    /// 普通工具超时
    pub default: Duration,
    /// 任务类工具超时上限
    pub mission: Duration,
}

impl TimeoutPolicy {
    pub fn new(default_secs: u64, mission_ms: u64) -> Self {
        Self {
            default: Duration::from_secs(default_secs),
            mission: Duration::from_millis(mission_ms),
        }
    }

    /// 返回 (超时, 是否允许进度重置)
    pub fn for_tool(&self, name: &str) -> (Duration, bool) {
        if name == MISSION_TOOL {
            (self.mission, true)
        } else {
            (self.default, false)
        }
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::new(30, 1_800_000)
    }
}

/// 单步执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub index: usize,
    pub tool: String,
    pub args: Value,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// 整个计划的执行报告
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionReport {
    pub results: Vec<StepResult>,
    pub all_success: bool,
    pub completed_steps: usize,
    pub total_steps: usize,
    pub total_duration_ms: u64,
}

/// 执行智能体：端点连接 + 目录缓存 + 超时策略
pub struct ExecutorAgent {
    endpoint: Arc<dyn ToolEndpoint>,
    catalog: tokio::sync::RwLock<Vec<ToolDescriptor>>,
    policy: TimeoutPolicy,
}

impl ExecutorAgent {
    pub fn new(endpoint: Arc<dyn ToolEndpoint>, policy: TimeoutPolicy) -> Self {
        Self {
            endpoint,
            catalog: tokio::sync::RwLock::new(Vec::new()),
            policy,
        }
    }

    /// 刷新目录缓存并返回（list_tools skill）
    pub async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, AgentError> {
        let tools = self
            .endpoint
            .list_tools()
            .await
            .map_err(AgentError::Transport)?;
        *self.catalog.write().await = tools.clone();
        Ok(tools)
    }

    /// 当前缓存快照
    pub async fn cached_tools(&self) -> Vec<ToolDescriptor> {
        self.catalog.read().await.clone()
    }

    /// 目录中是否有该工具；未命中时刷新一次再查
    async fn ensure_tool(&self, name: &str) -> bool {
        if self.catalog.read().await.iter().any(|t| t.name == name) {
            return true;
        }
        if self.list_tools().await.is_err() {
            return false;
        }
        self.catalog.read().await.iter().any(|t| t.name == name)
    }

    /// 读取无人机状态（get_drone_state skill）
    pub async fn get_drone_state(&self) -> Result<DroneState, AgentError> {
        if !self.ensure_tool(STATE_TOOL).await {
            return Err(AgentError::MissingTool(STATE_TOOL.to_string()));
        }
        let (timeout, reset) = self.policy.for_tool(STATE_TOOL);
        let value = self
            .endpoint
            .call_tool(STATE_TOOL, &json!({}), timeout, reset)
            .await
            .map_err(AgentError::ToolInvocation)?;
        serde_json::from_value(value)
            .map_err(|e| AgentError::Validation(format!("drone state shape: {}", e)))
    }

    /// 逐步执行计划（execute skill）
    pub async fn execute(&self, steps: &[PlanStep], stop_on_error: bool) -> ExecutionReport {
        let start = Instant::now();
        let total_steps = steps.len();
        let mut results = Vec::with_capacity(total_steps);
        let mut all_success = true;

        for (index, step) in steps.iter().enumerate() {
            let step_start = Instant::now();
            let outcome = self.run_step(step).await;
            let duration_ms = step_start.elapsed().as_millis() as u64;

            let (success, result, error) = match outcome {
                Ok(value) => (true, Some(value), None),
                Err(e) => (false, None, Some(e.to_string())),
            };
            // 结构化审计日志：每次工具调用一行
            let audit = json!({
                "event": "tool_audit",
                "tool": step.tool,
                "index": index,
                "ok": success,
                "duration_ms": duration_ms,
            });
            tracing::info!(audit = %audit, "tool");

            all_success &= success;
            results.push(StepResult {
                index,
                tool: step.tool.clone(),
                args: step.args.clone(),
                success,
                result,
                error,
                duration_ms,
            });

            if !success && stop_on_error {
                break;
            }
        }

        let completed_steps = results.iter().filter(|r| r.success).count();
        ExecutionReport {
            all_success: all_success && results.len() == total_steps,
            completed_steps,
            total_steps,
            results,
            total_duration_ms: start.elapsed().as_millis() as u64,
        }
    }

    async fn run_step(&self, step: &PlanStep) -> Result<Value, AgentError> {
        if !self.ensure_tool(&step.tool).await {
            return Err(AgentError::UnknownTool(step.tool.clone()));
        }
        let (timeout, reset) = self.policy.for_tool(&step.tool);
        self.endpoint
            .call_tool(&step.tool, &step.args, timeout, reset)
            .await
            .map_err(AgentError::ToolInvocation)
    }
}

// ---- A2A skill 接线 ----

struct ListToolsSkill(Arc<ExecutorAgent>);

#[async_trait]
impl SkillHandler for ListToolsSkill {
    async fn handle(&self, _input: Value, _task: &Task) -> Result<Value, AgentError> {
        let tools = self.0.list_tools().await?;
        Ok(json!({"tools": tools}))
    }
}

struct GetDroneStateSkill(Arc<ExecutorAgent>);

#[async_trait]
impl SkillHandler for GetDroneStateSkill {
    async fn handle(&self, _input: Value, _task: &Task) -> Result<Value, AgentError> {
        let state = self.0.get_drone_state().await?;
        serde_json::to_value(state).map_err(|e| AgentError::Validation(e.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ExecuteInput {
    steps: Vec<PlanStep>,
    #[serde(default = "default_stop_on_error")]
    stop_on_error: bool,
}

fn default_stop_on_error() -> bool {
    true
}

struct ExecuteSkill(Arc<ExecutorAgent>);

#[async_trait]
impl SkillHandler for ExecuteSkill {
    async fn handle(&self, input: Value, _task: &Task) -> Result<Value, AgentError> {
        let input: ExecuteInput = serde_json::from_value(input)
            .map_err(|e| AgentError::Validation(format!("execute input: {}", e)))?;
        let report = self.0.execute(&input.steps, input.stop_on_error).await;
        serde_json::to_value(report).map_err(|e| AgentError::Validation(e.to_string()))
    }
}

/// 组装执行智能体的 A2A 服务端
pub fn build_executor_server(agent: Arc<ExecutorAgent>, url: impl Into<String>) -> A2aServer {
    let card = AgentCard::new("executor", url)
        .with_skill(
            SkillCard::new("list_tools", "刷新并返回工具目录")
                .with_output_schema(json!({
                    "type": "object",
                    "properties": {"tools": {"type": "array"}}
                })),
        )
        .with_skill(
            SkillCard::new("get_drone_state", "读取无人机状态快照")
                .with_output_schema(json!({
                    "type": "object",
                    "properties": {
                        "position": {"type": "object"},
                        "is_active": {"type": "boolean"},
                        "queue_length": {"type": "integer"}
                    }
                })),
        )
        .with_skill(
            SkillCard::new("execute", "按序执行计划步骤，stop_on_error 时失败即止")
                .with_input_schema(json!({
                    "type": "object",
                    "required": ["steps"],
                    "properties": {
                        "steps": {"type": "array"},
                        "stop_on_error": {"type": "boolean"}
                    }
                }))
                .with_output_schema(json!({
                    "type": "object",
                    "properties": {
                        "results": {"type": "array"},
                        "all_success": {"type": "boolean"},
                        "completed_steps": {"type": "integer"},
                        "total_steps": {"type": "integer"},
                        "total_duration_ms": {"type": "integer"}
                    }
                })),
        );

    let mut server = A2aServer::new(card);
    server.register("list_tools", Arc::new(ListToolsSkill(Arc::clone(&agent))));
    server.register(
        "get_drone_state",
        Arc::new(GetDroneStateSkill(Arc::clone(&agent))),
    );
    server.register("execute", Arc::new(ExecuteSkill(agent)));
    server
}
