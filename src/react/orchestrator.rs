//! 编排智能体：chat 入口与响应聚合
//!
//! 拥有会话存储与事件发布器；通过 A2A 客户端扇出到检索 / 规划 / 执行三个智能体。
//! chat 永不返回 Err：任何失败都落为 success=false 且带自然语言 answer 的完整响应。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::a2a::{A2aClient, A2aServer, AgentCard, SkillCard, SkillHandler, Task};
use crate::core::AgentError;
use crate::executor::StepResult;
use crate::planner::{Plan, Reflection};
use crate::rag::RetrievalHit;
use crate::react::events::{AgentEvent, EventBus};
use crate::react::loop_::{run_react, RequestContext};
use crate::react::session::{Role, SessionStore};

/// ReAct 循环参数
#[derive(Debug, Clone)]
pub struct ReactConfig {
    /// 循环最大迭代数
    pub max_iterations: usize,
    /// 单请求补检重试上限
    pub max_rag_retries: usize,
    /// 复盘判定退出所需的最低置信度
    pub confidence_threshold: f64,
    /// 普通 A2A 调用的截止时间
    pub step_timeout: Duration,
    /// execute 调用的截止时间（须覆盖任务类工具上限）
    pub execute_timeout: Duration,
}

impl Default for ReactConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            max_rag_retries: 2,
            confidence_threshold: 0.8,
            step_timeout: Duration::from_secs(60),
            execute_timeout: Duration::from_millis(1_800_000 + 60_000),
        }
    }
}

impl ReactConfig {
    pub fn from_app_config(cfg: &crate::config::AppConfig) -> Self {
        Self {
            max_iterations: cfg.max_react_iterations,
            max_rag_retries: cfg.max_rag_retries,
            step_timeout: Duration::from_secs(cfg.a2a_timeout_secs),
            execute_timeout: Duration::from_millis(cfg.mcp_mission_timeout_ms + 60_000),
            ..Default::default()
        }
    }
}

/// chat 请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<String>,
    pub map_id: Option<String>,
    pub filters: Option<Value>,
}

/// chat 响应：失败请求同样返回完整结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatResponse {
    pub session_id: String,
    pub request_id: String,
    pub success: bool,
    pub answer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub needs_clarification: bool,
    pub plan: Option<Plan>,
    pub reasoning: String,
    pub tool_calls: Vec<StepResult>,
    pub rag_hits: Vec<RetrievalHit>,
    pub execution_success: bool,
    pub goal_achieved: bool,
    pub react_iterations: usize,
    pub rag_retries: usize,
    pub reflections: Vec<Reflection>,
    pub duration_ms: u64,
}

/// 编排智能体
pub struct OrchestratorAgent {
    pub(crate) client: Arc<A2aClient>,
    sessions: Arc<SessionStore>,
    events: Arc<EventBus>,
    pub(crate) config: ReactConfig,
}

impl OrchestratorAgent {
    pub fn new(client: Arc<A2aClient>, max_history_length: usize, config: ReactConfig) -> Self {
        Self {
            client,
            sessions: Arc::new(SessionStore::new(max_history_length)),
            events: Arc::new(EventBus::new()),
            config,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub(crate) fn emit(&self, event: AgentEvent) {
        self.events.emit(event);
    }

    /// 处理一次用户请求
    pub async fn chat(&self, request: ChatRequest) -> ChatResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.chat_with_request_id(request, request_id).await
    }

    /// 处理一次用户请求（request_id 由调用方供给，SSE 端点据此过滤事件）
    pub async fn chat_with_request_id(
        &self,
        request: ChatRequest,
        request_id: String,
    ) -> ChatResponse {
        let start = Instant::now();
        let session_id = self
            .sessions
            .get_or_create(request.session_id.as_deref())
            .await;
        self.sessions
            .append(&session_id, Role::User, request.message.clone())
            .await;

        self.emit(
            AgentEvent::new("request_start", &request_id, "orchestrator", "init")
                .with("session_id", json!(session_id))
                .with("message", json!(preview(&request.message))),
        );

        let ctx = RequestContext {
            request_id: request_id.clone(),
            session_id: session_id.clone(),
            message: request.message.clone(),
            filters: build_filters(&request),
        };
        let outcome = run_react(self, &ctx).await;

        self.sessions
            .append(&session_id, Role::Assistant, outcome.answer.clone())
            .await;

        let duration_ms = start.elapsed().as_millis() as u64;
        self.emit(
            AgentEvent::new("request_end", &request_id, "orchestrator", "done")
                .with("goal_achieved", json!(outcome.goal_achieved))
                .with("iterations", json!(outcome.iterations))
                .with("duration_ms", json!(duration_ms)),
        );

        ChatResponse {
            session_id,
            request_id,
            success: outcome.error.is_none(),
            answer: outcome.answer,
            error: outcome.error,
            needs_clarification: outcome.needs_clarification,
            reasoning: outcome
                .plan
                .as_ref()
                .map(|p| p.reasoning.clone())
                .unwrap_or_default(),
            plan: outcome.plan,
            tool_calls: outcome.tool_calls,
            rag_hits: outcome.rag_hits,
            execution_success: outcome.execution_success,
            goal_achieved: outcome.goal_achieved,
            react_iterations: outcome.iterations,
            rag_retries: outcome.rag_retries,
            reflections: outcome.reflections,
            duration_ms,
        }
    }

    /// 下游智能体存活状况（HTTP /api/health 与 REPL /status 共用）
    pub async fn agent_health(&self) -> HashMap<String, bool> {
        let (rag, planner, executor) = tokio::join!(
            self.client.ping("rag"),
            self.client.ping("planner"),
            self.client.ping("executor"),
        );
        HashMap::from([
            ("rag".to_string(), rag),
            ("planner".to_string(), planner),
            ("executor".to_string(), executor),
        ])
    }
}

/// 把 map_id 合入检索过滤条件
fn build_filters(request: &ChatRequest) -> Value {
    let mut filters = match &request.filters {
        Some(Value::Object(m)) => m.clone(),
        _ => serde_json::Map::new(),
    };
    if let Some(map_id) = &request.map_id {
        filters.insert("map_id".to_string(), json!(map_id));
    }
    Value::Object(filters)
}

fn preview(s: &str) -> String {
    if s.chars().count() > 120 {
        format!("{}...", s.chars().take(120).collect::<String>())
    } else {
        s.to_string()
    }
}

// ---- A2A skill 接线 ----

struct ChatSkill(Arc<OrchestratorAgent>);

#[async_trait]
impl SkillHandler for ChatSkill {
    async fn handle(&self, input: Value, _task: &Task) -> Result<Value, AgentError> {
        let request: ChatRequest = serde_json::from_value(input)
            .map_err(|e| AgentError::Validation(format!("chat input: {}", e)))?;
        let response = self.0.chat(request).await;
        serde_json::to_value(response).map_err(|e| AgentError::Validation(e.to_string()))
    }
}

/// 组装编排智能体的 A2A 服务端
pub fn build_orchestrator_server(
    agent: Arc<OrchestratorAgent>,
    url: impl Into<String>,
) -> A2aServer {
    let card = AgentCard::new("orchestrator", url).with_skill(
        SkillCard::new("chat", "将自然语言请求编排为经校验的工具调用序列并执行")
            .with_input_schema(json!({
                "type": "object",
                "required": ["message"],
                "properties": {
                    "message": {"type": "string"},
                    "session_id": {"type": ["string", "null"]},
                    "map_id": {"type": ["string", "null"]},
                    "filters": {"type": ["object", "null"]}
                }
            }))
            .with_output_schema(json!({
                "type": "object",
                "properties": {
                    "answer": {"type": "string"},
                    "goal_achieved": {"type": "boolean"},
                    "react_iterations": {"type": "integer"}
                }
            })),
    );

    let mut server = A2aServer::new(card);
    server.register("chat", Arc::new(ChatSkill(agent)));
    server
}
