//! A2A 服务端
//!
//! axum 路由：/.well-known/agent.json、/ping、/tasks。
//! 任务按 skill id 分发到注册的 SkillHandler；未注册 skill 返回 UnknownSkill 失败结果；
//! 处理器内部错误同样落为 success=false，HTTP 层始终 200。

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::a2a::{AgentCard, Task, TaskResult};
use crate::core::AgentError;

/// skill 处理器：按 skill id 注册，handle 收到任务输入并返回 JSON 输出
#[async_trait]
pub trait SkillHandler: Send + Sync {
    async fn handle(&self, input: Value, task: &Task) -> Result<Value, AgentError>;
}

/// A2A 服务端：Agent Card + skill 处理器表
pub struct A2aServer {
    card: AgentCard,
    handlers: HashMap<String, Arc<dyn SkillHandler>>,
}

impl A2aServer {
    pub fn new(card: AgentCard) -> Self {
        Self {
            card,
            handlers: HashMap::new(),
        }
    }

    pub fn card(&self) -> &AgentCard {
        &self.card
    }

    /// 注册 skill 处理器
    pub fn register(&mut self, skill_id: impl Into<String>, handler: Arc<dyn SkillHandler>) {
        self.handlers.insert(skill_id.into(), handler);
    }

    /// 启动期校验：卡片声明的每个 skill 都必须有处理器，反之亦然
    pub fn validate(&self) -> Result<(), AgentError> {
        for skill in &self.card.skills {
            if !self.handlers.contains_key(&skill.id) {
                return Err(AgentError::Config(format!(
                    "agent card declares skill '{}' with no registered handler",
                    skill.id
                )));
            }
        }
        for id in self.handlers.keys() {
            if !self.card.has_skill(id) {
                return Err(AgentError::Config(format!(
                    "handler '{}' is not declared in the agent card",
                    id
                )));
            }
        }
        Ok(())
    }

    /// 在本地分发一个任务（服务端核心路径，也供进程内调用）
    pub async fn dispatch(&self, task: Task) -> TaskResult {
        let start = Instant::now();
        let handler = match self.handlers.get(&task.skill) {
            Some(h) => Arc::clone(h),
            None => {
                return TaskResult::fail(
                    &task.id,
                    AgentError::UnknownSkill(task.skill.clone()).to_string(),
                    start.elapsed().as_millis() as u64,
                );
            }
        };

        let result = handler.handle(task.input.clone(), &task).await;
        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(
            agent = %self.card.name,
            skill = %task.skill,
            task_id = %task.id,
            success = result.is_ok(),
            duration_ms,
            "task dispatched"
        );
        match result {
            Ok(output) => TaskResult::ok(&task.id, output, duration_ms),
            Err(e) => TaskResult::fail(&task.id, e.to_string(), duration_ms),
        }
    }

    fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/.well-known/agent.json", get(get_card))
            .route("/ping", get(ping))
            .route("/tasks", post(post_task))
            .with_state(self)
    }

    /// 绑定并后台启动；返回实际监听地址（端口 0 时由系统分配，便于测试）
    pub async fn serve(
        self: Arc<Self>,
        addr: SocketAddr,
        shutdown: CancellationToken,
    ) -> Result<SocketAddr, AgentError> {
        self.validate()?;
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| AgentError::Transport(format!("bind {}: {}", addr, e)))?;
        let local = listener
            .local_addr()
            .map_err(|e| AgentError::Transport(e.to_string()))?;

        let name = self.card.name.clone();
        let app = self.router();
        tokio::spawn(async move {
            tracing::info!("A2A agent '{}' listening on http://{}", name, local);
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned());
            if let Err(e) = serve.await {
                tracing::error!("A2A server '{}' exited: {}", name, e);
            }
        });
        Ok(local)
    }
}

async fn get_card(State(server): State<Arc<A2aServer>>) -> Json<AgentCard> {
    Json(server.card.clone())
}

async fn ping(State(server): State<Arc<A2aServer>>) -> Json<Value> {
    Json(json!({"status": "ok", "agent": server.card.name}))
}

async fn post_task(State(server): State<Arc<A2aServer>>, Json(task): Json<Task>) -> Json<TaskResult> {
    Json(server.dispatch(task).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::a2a::SkillCard;

    struct EchoSkill;

    #[async_trait]
    impl SkillHandler for EchoSkill {
        async fn handle(&self, input: Value, _task: &Task) -> Result<Value, AgentError> {
            Ok(json!({"echo": input}))
        }
    }

    struct FailSkill;

    #[async_trait]
    impl SkillHandler for FailSkill {
        async fn handle(&self, _input: Value, _task: &Task) -> Result<Value, AgentError> {
            Err(AgentError::ToolInvocation("deliberate".into()))
        }
    }

    fn test_server() -> A2aServer {
        let card = AgentCard::new("test", "http://127.0.0.1:0")
            .with_skill(SkillCard::new("echo", "echo input"))
            .with_skill(SkillCard::new("fail", "always fails"));
        let mut server = A2aServer::new(card);
        server.register("echo", Arc::new(EchoSkill));
        server.register("fail", Arc::new(FailSkill));
        server
    }

    #[tokio::test]
    async fn test_dispatch_ok() {
        let server = test_server();
        let result = server.dispatch(Task::new("echo", json!({"x": 1}))).await;
        assert!(result.success);
        assert_eq!(result.output.unwrap()["echo"]["x"], 1);
    }

    #[tokio::test]
    async fn test_dispatch_handler_error() {
        let server = test_server();
        let result = server.dispatch(Task::new("fail", json!({}))).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("ToolInvocationError"));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_skill() {
        let server = test_server();
        let result = server.dispatch(Task::new("nope", json!({}))).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("UnknownSkill"));
    }

    #[test]
    fn test_validate_missing_handler() {
        let card =
            AgentCard::new("test", "http://127.0.0.1:0").with_skill(SkillCard::new("echo", ""));
        let server = A2aServer::new(card);
        assert!(server.validate().is_err());
    }

    #[test]
    fn test_validate_undeclared_handler() {
        let card = AgentCard::new("test", "http://127.0.0.1:0");
        let mut server = A2aServer::new(card);
        server.register("echo", Arc::new(EchoSkill));
        assert!(server.validate().is_err());
    }
}
