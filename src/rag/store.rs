//! 向量库客户端
//!
//! VectorStore trait 之下两种实现：
//! - SupabaseStore：调用 match_documents 存储过程（similarity = 1 - cosine_distance）
//!   与 documents 表行插入
//! - MemoryStore：进程内余弦检索，离线运行与测试用

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// 检索命中：文本块、相似度 [0,1]、所属地图
/// 去重身份是 chunk_text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub chunk_text: String,
    pub similarity_score: f64,
    #[serde(default)]
    pub map_id: Option<String>,
}

/// 向量库抽象：相似检索 + 行插入
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 相似检索：按阈值过滤、按距离升序（即相似度降序）返回至多 match_count 条
    async fn match_documents(
        &self,
        query_embedding: &[f32],
        match_count: usize,
        filter_map_id: Option<&str>,
        match_threshold: f64,
    ) -> Result<Vec<RetrievalHit>, String>;

    /// 插入一行（数据预加载脚本使用，此处仅保留写入口径）
    async fn insert_chunk(
        &self,
        chunk_text: &str,
        map_id: Option<&str>,
        embedding: &[f32],
    ) -> Result<(), String>;
}

/// Supabase 客户端：service role key 走 apikey + Bearer 双头
pub struct SupabaseStore {
    http: reqwest::Client,
    url: String,
    service_key: String,
}

/// match_documents 返回行
#[derive(Debug, Deserialize)]
struct MatchRow {
    chunk_text: String,
    similarity: f64,
    #[serde(default)]
    map_id: Option<String>,
}

impl SupabaseStore {
    pub fn new(url: impl Into<String>, service_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into().trim_end_matches('/').to_string(),
            service_key: service_key.into(),
        }
    }
}

#[async_trait]
impl VectorStore for SupabaseStore {
    async fn match_documents(
        &self,
        query_embedding: &[f32],
        match_count: usize,
        filter_map_id: Option<&str>,
        match_threshold: f64,
    ) -> Result<Vec<RetrievalHit>, String> {
        let body = json!({
            "query_embedding": query_embedding,
            "match_count": match_count,
            "filter_map_id": filter_map_id,
            "filter_tags": serde_json::Value::Null,
            "match_threshold": match_threshold,
        });

        let resp = self
            .http
            .post(format!("{}/rest/v1/rpc/match_documents", self.url))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("match_documents: {}", e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("match_documents HTTP {}: {}", status, text));
        }

        let rows: Vec<MatchRow> = resp
            .json()
            .await
            .map_err(|e| format!("match_documents decode: {}", e))?;
        Ok(rows
            .into_iter()
            .map(|r| RetrievalHit {
                chunk_text: r.chunk_text,
                similarity_score: r.similarity,
                map_id: r.map_id,
            })
            .collect())
    }

    async fn insert_chunk(
        &self,
        chunk_text: &str,
        map_id: Option<&str>,
        embedding: &[f32],
    ) -> Result<(), String> {
        let body = json!({
            "chunk_text": chunk_text,
            "map_id": map_id,
            "embedding": embedding,
        });
        let resp = self
            .http
            .post(format!("{}/rest/v1/documents", self.url))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("insert_chunk: {}", e))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(format!("insert_chunk HTTP {}: {}", status, text));
        }
        Ok(())
    }
}

/// 进程内向量库：插入顺序即同分时的返回顺序
#[derive(Default)]
pub struct MemoryStore {
    entries: std::sync::RwLock<Vec<(String, Option<String>, Vec<f32>)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().unwrap().is_empty()
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn match_documents(
        &self,
        query_embedding: &[f32],
        match_count: usize,
        filter_map_id: Option<&str>,
        match_threshold: f64,
    ) -> Result<Vec<RetrievalHit>, String> {
        let entries = self.entries.read().unwrap();
        let mut scored: Vec<RetrievalHit> = entries
            .iter()
            .filter(|(_, map_id, _)| match filter_map_id {
                Some(want) => map_id.as_deref() == Some(want),
                None => true,
            })
            .map(|(text, map_id, emb)| RetrievalHit {
                chunk_text: text.clone(),
                similarity_score: cosine_similarity(query_embedding, emb) as f64,
                map_id: map_id.clone(),
            })
            .filter(|hit| hit.similarity_score >= match_threshold)
            .collect();

        // sort_by 是稳定排序：同分保持插入顺序
        scored.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(match_count);
        Ok(scored)
    }

    async fn insert_chunk(
        &self,
        chunk_text: &str,
        map_id: Option<&str>,
        embedding: &[f32],
    ) -> Result<(), String> {
        self.entries.write().unwrap().push((
            chunk_text.to_string(),
            map_id.map(String::from),
            embedding.to_vec(),
        ));
        Ok(())
    }
}

/// 余弦相似度
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
