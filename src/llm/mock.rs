//! Mock LLM 与 Mock 嵌入（用于测试与离线运行，无需 API Key）
//!
//! MockLlm 按脚本顺序吐出预置回复，脚本耗尽后返回空对象；
//! MockEmbedder 从文本字节确定性地生成向量，同文同向量。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{Embedder, LlmClient, EMBEDDING_DIM};

/// 脚本化 Mock 客户端：依序返回预置回复
#[derive(Debug, Default)]
pub struct MockLlm {
    responses: Mutex<VecDeque<String>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一批回复（按调用顺序消费）
    pub fn with_responses<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
        }
    }

    /// 追加一条回复
    pub fn push_response(&self, response: impl Into<String>) {
        self.responses.lock().unwrap().push_back(response.into());
    }

    /// 剩余脚本条数
    pub fn remaining(&self) -> usize {
        self.responses.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn generate(
        &self,
        _system: &str,
        _user: &str,
        _temperature: f32,
    ) -> Result<String, String> {
        let next = self.responses.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| "{}".to_string()))
    }
}

/// 确定性 Mock 嵌入：由文本字节播种的线性同余序列
#[derive(Debug, Default)]
pub struct MockEmbedder;

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(vec![]);
        }
        let mut seed: u64 = 0xcbf2_9ce4_8422_2325;
        for b in text.bytes() {
            seed ^= b as u64;
            seed = seed.wrapping_mul(0x100_0000_01b3);
        }
        let mut v = Vec::with_capacity(EMBEDDING_DIM);
        let mut state = seed;
        for _ in 0..EMBEDDING_DIM {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            v.push(((state >> 33) as f32 / (1u64 << 31) as f32) - 1.0);
        }
        // 归一化，便于余弦相似度比较
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_in_order() {
        let llm = MockLlm::with_responses(["first", "second"]);
        assert_eq!(llm.generate("", "x", 0.0).await.unwrap(), "first");
        assert_eq!(llm.generate("", "x", 0.0).await.unwrap(), "second");
        // 脚本耗尽后返回空对象
        assert_eq!(llm.generate("", "x", 0.0).await.unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_mock_embedder_deterministic() {
        let e = MockEmbedder;
        let a = e.embed("7号蓝色圆形").await.unwrap();
        let b = e.embed("7号蓝色圆形").await.unwrap();
        let c = e.embed("完全不同的文本").await.unwrap();
        assert_eq!(a.len(), EMBEDDING_DIM);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
