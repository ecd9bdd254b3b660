//! LLM 客户端抽象
//!
//! 所有后端（Gemini / Mock）实现 LlmClient（文本生成）与 Embedder（文本向量化）。

use async_trait::async_trait;

/// LLM 客户端 trait：单轮生成（system + user + 温度）
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 生成文本；失败时返回错误字符串
    async fn generate(&self, system: &str, user: &str, temperature: f32) -> Result<String, String>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 嵌入提供方 trait：将文本编码为固定维度向量
#[async_trait]
pub trait Embedder: Send + Sync {
    /// 将文本编码为向量；失败时返回错误字符串
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String>;

    /// 向量维度
    fn dimension(&self) -> usize {
        crate::llm::EMBEDDING_DIM
    }
}
