//! 可观测事件流
//!
//! 每个阶段发出成对的 *_start / *_end 事件；同一 request_id 的事件由
//! 单个请求任务顺序发出，经 FIFO 通道送达，因果序成立；不同请求可交错。
//! 订阅按事件类型或 "*" 通配。

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

/// 单条事件：类型 + 时间戳 + 请求关联 + 阶段 + 领域载荷（平铺）
#[derive(Debug, Clone, Serialize)]
pub struct AgentEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    /// unix 毫秒
    pub timestamp: i64,
    pub request_id: String,
    /// 发出事件的智能体名
    pub agent: String,
    /// 所处阶段（retrieval / plan / execute / ...）
    pub phase: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl AgentEvent {
    pub fn new(
        event_type: impl Into<String>,
        request_id: impl Into<String>,
        agent: impl Into<String>,
        phase: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            request_id: request_id.into(),
            agent: agent.into(),
            phase: phase.into(),
            payload: Map::new(),
        }
    }

    /// 附加一个载荷字段
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }
}

/// 进程内事件发布器：类型订阅 + 通配订阅，不阻塞发布方
#[derive(Default)]
pub struct EventBus {
    subscribers: std::sync::Mutex<Vec<(String, mpsc::UnboundedSender<AgentEvent>)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅指定类型的事件；"*" 订阅全部
    pub fn subscribe(&self, pattern: impl Into<String>) -> mpsc::UnboundedReceiver<AgentEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push((pattern.into(), tx));
        rx
    }

    /// 发布事件；已关闭的订阅者顺带清理
    pub fn emit(&self, event: AgentEvent) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|(pattern, tx)| {
            if pattern == "*" || pattern == &event.event_type {
                tx.send(event.clone()).is_ok()
            } else {
                !tx.is_closed()
            }
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_wildcard_receives_all_in_order() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe("*");
        bus.emit(AgentEvent::new("plan_start", "r1", "planner", "plan"));
        bus.emit(
            AgentEvent::new("plan_end", "r1", "planner", "plan").with("steps", json!(2)),
        );

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.event_type, "plan_start");
        assert_eq!(second.event_type, "plan_end");
        assert_eq!(second.payload["steps"], 2);
    }

    #[tokio::test]
    async fn test_typed_subscription_filters() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe("execute_end");
        bus.emit(AgentEvent::new("plan_start", "r1", "planner", "plan"));
        bus.emit(AgentEvent::new("execute_end", "r1", "executor", "execute"));
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.event_type, "execute_end");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_subscribers_are_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe("*");
        drop(rx);
        bus.emit(AgentEvent::new("plan_start", "r1", "planner", "plan"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_serialization_flattens_payload() {
        let ev = AgentEvent::new("retrieval_end", "r1", "rag", "retrieval")
            .with("hits", json!(5))
            .with("duration_ms", json!(12));
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "retrieval_end");
        assert_eq!(v["hits"], 5);
        assert_eq!(v["duration_ms"], 12);
        assert_eq!(v["request_id"], "r1");
    }
}
