//! 检索智能体（RAG）
//!
//! 三个 skill：
//! - `retrieve` — 直接向量检索（嵌入 → RPC → 过滤 → 排序 → 截断）
//! - `smart_retrieve` — 意图分解检索（LLM 抽取目标 → 逐目标检索 → 原句兜底 → 合并去重）
//! - `retrieve_missing` — 缺失目标补检（查询变体族 + 降低阈值），供编排层响应
//!   Planner 的 missing_locations 反馈

pub mod intent;
pub mod retriever;
pub mod store;
pub mod variations;

pub use intent::RetrievalIntent;
pub use retriever::{build_rag_server, RetrievalFilters, RetrievalPayload, RetrieverAgent};
pub use store::{MemoryStore, RetrievalHit, SupabaseStore, VectorStore};
