//! A2A 客户端
//!
//! name→URL 注册表在启动时填充；submit 对单次调用施加截止时间，
//! 超时会取消在途请求并落为失败结果，绝不悬挂调用方。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::a2a::{AgentCard, Task, TaskResult};
use crate::core::AgentError;

/// A2A 客户端：长生命周期 reqwest::Client + 注册表
pub struct A2aClient {
    http: reqwest::Client,
    registry: HashMap<String, String>,
    default_timeout: Duration,
}

impl A2aClient {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            registry: HashMap::new(),
            default_timeout,
        }
    }

    /// 注册智能体基地址（末尾斜杠会被剥掉）
    pub fn register(&mut self, name: impl Into<String>, base_url: impl Into<String>) {
        let url = base_url.into();
        self.registry
            .insert(name.into(), url.trim_end_matches('/').to_string());
    }

    pub fn registered_agents(&self) -> Vec<String> {
        self.registry.keys().cloned().collect()
    }

    fn base_url(&self, agent: &str) -> Result<&str, AgentError> {
        self.registry
            .get(agent)
            .map(|s| s.as_str())
            .ok_or_else(|| AgentError::Transport(format!("agent '{}' not registered", agent)))
    }

    /// 提交任务；网络失败 / 非 2xx / 超时统一落为 success=false 的 TaskResult
    pub async fn submit(
        &self,
        agent: &str,
        skill: &str,
        input: Value,
        session_id: Option<&str>,
        timeout: Option<Duration>,
    ) -> TaskResult {
        let mut task = Task::new(skill, input);
        if let Some(sid) = session_id {
            task = task.with_session(sid);
        }
        let task_id = task.id.clone();
        let start = Instant::now();

        let base = match self.base_url(agent) {
            Ok(b) => b.to_string(),
            Err(e) => return TaskResult::fail(&task_id, e.to_string(), 0),
        };
        let deadline = timeout.unwrap_or(self.default_timeout);

        let request = self.http.post(format!("{}/tasks", base)).json(&task).send();
        let response = match tokio::time::timeout(deadline, request).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(e)) => {
                return TaskResult::fail(
                    &task_id,
                    AgentError::Transport(format!("{} /tasks: {}", agent, e)).to_string(),
                    start.elapsed().as_millis() as u64,
                );
            }
            Err(_) => {
                return TaskResult::fail(
                    &task_id,
                    AgentError::Transport(format!(
                        "{} '{}' timed out after {:?}",
                        agent, skill, deadline
                    ))
                    .to_string(),
                    start.elapsed().as_millis() as u64,
                );
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return TaskResult::fail(
                &task_id,
                AgentError::Transport(format!("{} HTTP {}: {}", agent, status, text)).to_string(),
                start.elapsed().as_millis() as u64,
            );
        }

        match tokio::time::timeout(deadline, response.json::<TaskResult>()).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => TaskResult::fail(
                &task_id,
                AgentError::Transport(format!("{} bad task result: {}", agent, e)).to_string(),
                start.elapsed().as_millis() as u64,
            ),
            Err(_) => TaskResult::fail(
                &task_id,
                AgentError::Transport(format!("{} '{}' response read timed out", agent, skill))
                    .to_string(),
                start.elapsed().as_millis() as u64,
            ),
        }
    }

    /// 存活探测
    pub async fn ping(&self, agent: &str) -> bool {
        let base = match self.base_url(agent) {
            Ok(b) => b.to_string(),
            Err(_) => return false,
        };
        let request = self.http.get(format!("{}/ping", base)).send();
        matches!(
            tokio::time::timeout(Duration::from_secs(3), request).await,
            Ok(Ok(resp)) if resp.status().is_success()
        )
    }

    /// 拉取 Agent Card
    pub async fn card(&self, agent: &str) -> Result<AgentCard, AgentError> {
        let base = self.base_url(agent)?.to_string();
        let resp = self
            .http
            .get(format!("{}/.well-known/agent.json", base))
            .send()
            .await
            .map_err(|e| AgentError::Transport(format!("{} agent card: {}", agent, e)))?;
        if !resp.status().is_success() {
            return Err(AgentError::Transport(format!(
                "{} agent card HTTP {}",
                agent,
                resp.status()
            )));
        }
        resp.json::<AgentCard>()
            .await
            .map_err(|e| AgentError::Transport(format!("{} bad agent card: {}", agent, e)))
    }
}
