//! LLM 层：客户端抽象、Gemini 实现、严格 JSON 解析、Mock
//!
//! 对外只暴露两种能力：generate（文本生成，温度可控）与 embed（768 维向量）。
//! 所有后端实现 LlmClient / Embedder trait，调用方经 Arc<dyn ...> 持有。

pub mod gemini;
pub mod json;
pub mod mock;
pub mod traits;

pub use gemini::{GeminiClient, TokenUsage};
pub use json::{extract_json_object, generate_json};
pub use mock::{MockEmbedder, MockLlm};
pub use traits::{Embedder, LlmClient};

/// 嵌入维度：生产端（嵌入请求）与消费端（数据库列、RPC）必须一致
pub const EMBEDDING_DIM: usize = 768;
