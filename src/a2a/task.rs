//! A2A 任务与结果
//!
//! Task 在派发时生成、被接收方消费一次、从不修改；
//! Task Result 携带 duration_ms 与完成时间，失败时 error 为结构化字符串。

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 一次 skill 调用的任务单元
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// 任务唯一 id（uuid v4）
    pub id: String,
    /// 目标 skill id
    pub skill: String,
    /// skill 输入（JSON object）
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// 自由上下文（如 request_id）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    /// 创建时间（unix 毫秒）
    pub created_at: i64,
}

impl Task {
    pub fn new(skill: impl Into<String>, input: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            skill: skill.into(),
            input,
            session_id: None,
            context: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}

/// 任务结果：成功携带 output，失败携带 error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
    /// 完成时间（unix 毫秒）
    pub completed_at: i64,
}

impl TaskResult {
    pub fn ok(task_id: impl Into<String>, output: Value, duration_ms: u64) -> Self {
        Self {
            task_id: task_id.into(),
            success: true,
            output: Some(output),
            error: None,
            duration_ms,
            completed_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn fail(task_id: impl Into<String>, error: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            task_id: task_id.into(),
            success: false,
            output: None,
            error: Some(error.into()),
            duration_ms,
            completed_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// 取出 output 并反序列化；失败结果或形状不符时返回错误字符串
    pub fn parse_output<T: serde::de::DeserializeOwned>(&self) -> Result<T, String> {
        if !self.success {
            return Err(self
                .error
                .clone()
                .unwrap_or_else(|| "task failed without error".to_string()));
        }
        let output = self.output.clone().unwrap_or(Value::Null);
        serde_json::from_value(output).map_err(|e| format!("bad task output shape: {}", e))
    }
}
