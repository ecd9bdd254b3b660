//! 会话：请求域 UUID + 有界对话历史
//!
//! 历史条数上限为 2 × max_history_length（每侧各一半），超出淘汰最旧；
//! 会话仅存内存，从首次 chat 活到显式清除。
//! 同一 session_id 的并发 chat 采取 last-writer-wins：写入只发生在
//! 短暂的写锁区间内，交错不损坏存储。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// 消息角色（对话历史只有两种）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// 单条历史消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
    /// unix 毫秒
    pub timestamp: i64,
}

/// 单个会话
#[derive(Clone, Debug)]
struct Session {
    history: Vec<ChatTurn>,
    max_history_length: usize,
}

impl Session {
    fn new(max_history_length: usize) -> Self {
        Self {
            history: Vec::new(),
            max_history_length,
        }
    }

    fn push(&mut self, role: Role, content: String) {
        self.history.push(ChatTurn {
            role,
            content,
            timestamp: chrono::Utc::now().timestamp_millis(),
        });
        // 上限 2 * max_history_length，淘汰最旧
        let cap = self.max_history_length * 2;
        if self.history.len() > cap {
            let drop = self.history.len() - cap;
            self.history.drain(..drop);
        }
    }
}

/// 会话存储：编排智能体独占持有
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    max_history_length: usize,
}

impl SessionStore {
    pub fn new(max_history_length: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_history_length,
        }
    }

    /// 新建会话，返回 session_id
    pub async fn create(&self) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.sessions
            .write()
            .await
            .insert(id.clone(), Session::new(self.max_history_length));
        id
    }

    /// 取或建：提供的 id 不存在时按该 id 建新会话；未提供时生成新 id
    pub async fn get_or_create(&self, session_id: Option<&str>) -> String {
        match session_id {
            Some(id) if !id.is_empty() => {
                let mut sessions = self.sessions.write().await;
                sessions
                    .entry(id.to_string())
                    .or_insert_with(|| Session::new(self.max_history_length));
                id.to_string()
            }
            _ => self.create().await,
        }
    }

    /// 追加一条历史
    pub async fn append(&self, session_id: &str, role: Role, content: impl Into<String>) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(session_id) {
            session.push(role, content.into());
        }
    }

    /// 会话历史；不存在时返回空
    pub async fn history(&self, session_id: &str) -> Vec<ChatTurn> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|s| s.history.clone())
            .unwrap_or_default()
    }

    /// 删除会话；返回是否存在
    pub async fn clear(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
