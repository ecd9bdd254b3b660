//! 编排智能体：会话、ReAct 主循环、可观测事件流
//!
//! chat 入口驱动一次请求：准备（检索 / 状态 / 工具目录，均尽力而为）→
//! 有界循环（plan → 澄清处理 → act → observe → reflect）→ 聚合回答。
//! 「规划器要求补检」的反馈以 missing_locations 数据流经编排层，
//! 绝不构成智能体间的直接调用边。

pub mod events;
pub mod loop_;
pub mod orchestrator;
pub mod session;

pub use events::{AgentEvent, EventBus};
pub use orchestrator::{
    build_orchestrator_server, ChatRequest, ChatResponse, OrchestratorAgent, ReactConfig,
};
pub use session::{ChatTurn, Role, SessionStore};
