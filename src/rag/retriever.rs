//! 检索智能体：retrieve / smart_retrieve / retrieve_missing
//!
//! 统一管线：嵌入 → match_documents(top_k + 3) → 阈值过滤 → 分数降序（稳定）→ 截断 top_k。
//! smart_retrieve 在管线前加意图分解与逐目标检索；retrieve_missing 用变体族 + 0.4 低阈值。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::a2a::{A2aServer, AgentCard, SkillCard, SkillHandler, Task};
use crate::core::AgentError;
use crate::llm::{Embedder, LlmClient};
use crate::rag::intent::{decompose_intent, RetrievalIntent};
use crate::rag::store::{RetrievalHit, VectorStore};
use crate::rag::variations::expand_variations;

/// 默认相似度阈值
pub const DEFAULT_THRESHOLD: f64 = 0.5;
/// 补检时放宽的阈值
pub const MISSING_THRESHOLD: f64 = 0.4;
/// 默认返回条数
pub const DEFAULT_TOP_K: usize = 5;
/// 逐目标检索的小 top_k
const PER_TARGET_TOP_K: usize = 3;
/// RPC 多取的余量，给阈值过滤留空间
const OVERFETCH: usize = 3;

/// 检索过滤条件（skill 输入的 filters 字段）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalFilters {
    pub map_id: Option<String>,
    pub top_k: usize,
    pub threshold: f64,
}

impl Default for RetrievalFilters {
    fn default() -> Self {
        Self {
            map_id: None,
            top_k: DEFAULT_TOP_K,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// 检索结果载荷（所有三个 skill 共用）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalPayload {
    pub hits: Vec<RetrievalHit>,
    pub total_found: usize,
    pub duration_ms: u64,
    /// smart_retrieve：每个目标命中的条数，供编排层发现零命中目标
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_target: Option<HashMap<String, usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<RetrievalIntent>,
}

/// 检索智能体：持有嵌入、向量库与（意图分解用的）LLM
pub struct RetrieverAgent {
    llm: Arc<dyn LlmClient>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
}

impl RetrieverAgent {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            llm,
            embedder,
            store,
        }
    }

    /// 直接向量检索
    pub async fn retrieve(
        &self,
        query: &str,
        filters: &RetrievalFilters,
    ) -> Result<RetrievalPayload, AgentError> {
        let start = Instant::now();
        let raw = self.search_once(query, filters.top_k + OVERFETCH, filters).await?;
        let total_found = raw
            .iter()
            .filter(|h| h.similarity_score >= filters.threshold)
            .count();
        let hits = post_process(raw, filters.top_k, filters.threshold);
        Ok(RetrievalPayload {
            hits,
            total_found,
            duration_ms: start.elapsed().as_millis() as u64,
            per_target: None,
            intent: None,
        })
    }

    /// 意图分解检索
    pub async fn smart_retrieve(
        &self,
        query: &str,
        filters: &RetrievalFilters,
    ) -> Result<RetrievalPayload, AgentError> {
        let start = Instant::now();
        let intent = decompose_intent(self.llm.as_ref(), query).await;

        let mut merged: Vec<RetrievalHit> = Vec::new();
        let mut per_target: HashMap<String, usize> = HashMap::new();

        for target in &intent.targets {
            let hits = match self.search_once(target, PER_TARGET_TOP_K, filters).await {
                Ok(h) => h,
                Err(e) => {
                    tracing::warn!("per-target search '{}' failed: {}", target, e);
                    Vec::new()
                }
            };
            per_target.insert(target.clone(), hits.len());
            merge_hits(&mut merged, hits);
        }

        // 原句兜底检索：目标抽取失败或遗漏时仍有机会命中
        match self.search_once(query, filters.top_k + OVERFETCH, filters).await {
            Ok(h) => merge_hits(&mut merged, h),
            Err(e) => tracing::warn!("fallback search failed: {}", e),
        }

        let total_found = merged.len();
        let hits = post_process(merged, filters.top_k, filters.threshold);

        for (target, count) in &per_target {
            if *count == 0 {
                tracing::warn!("target '{}' produced zero hits", target);
            }
        }

        Ok(RetrievalPayload {
            hits,
            total_found,
            duration_ms: start.elapsed().as_millis() as u64,
            per_target: Some(per_target),
            intent: Some(intent),
        })
    }

    /// 缺失目标补检：逐目标试变体，保留最佳变体的命中，整体合并
    pub async fn retrieve_missing(
        &self,
        missing_targets: &[String],
        filters: &RetrievalFilters,
    ) -> Result<RetrievalPayload, AgentError> {
        let start = Instant::now();
        let relaxed = RetrievalFilters {
            threshold: filters.threshold.min(MISSING_THRESHOLD),
            ..filters.clone()
        };

        let mut merged: Vec<RetrievalHit> = Vec::new();
        let mut per_target: HashMap<String, usize> = HashMap::new();

        for target in missing_targets {
            let mut best: Vec<RetrievalHit> = Vec::new();
            let mut best_score = f64::MIN;
            for variation in expand_variations(target) {
                let hits = match self
                    .search_once(&variation, PER_TARGET_TOP_K, &relaxed)
                    .await
                {
                    Ok(h) => h,
                    Err(e) => {
                        tracing::warn!("variation search '{}' failed: {}", variation, e);
                        continue;
                    }
                };
                let top = hits.first().map(|h| h.similarity_score).unwrap_or(f64::MIN);
                if top > best_score {
                    best_score = top;
                    best = hits;
                }
            }
            per_target.insert(target.clone(), best.len());
            merge_hits(&mut merged, best);
        }

        let total_found = merged.len();
        let hits = post_process(merged, relaxed.top_k, relaxed.threshold);
        Ok(RetrievalPayload {
            hits,
            total_found,
            duration_ms: start.elapsed().as_millis() as u64,
            per_target: Some(per_target),
            intent: None,
        })
    }

    async fn search_once(
        &self,
        query: &str,
        match_count: usize,
        filters: &RetrievalFilters,
    ) -> Result<Vec<RetrievalHit>, AgentError> {
        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(AgentError::Model)?;
        if embedding.is_empty() {
            return Ok(Vec::new());
        }
        self.store
            .match_documents(
                &embedding,
                match_count,
                filters.map_id.as_deref(),
                filters.threshold,
            )
            .await
            .map_err(AgentError::Transport)
    }
}

/// 阈值过滤 → 分数降序（稳定排序，同分保持先到顺序）→ 截断
fn post_process(mut hits: Vec<RetrievalHit>, top_k: usize, threshold: f64) -> Vec<RetrievalHit> {
    hits.retain(|h| h.similarity_score >= threshold);
    hits.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(top_k);
    hits
}

/// 按 chunk_text 去重合并，保留更高分
fn merge_hits(merged: &mut Vec<RetrievalHit>, incoming: Vec<RetrievalHit>) {
    for hit in incoming {
        match merged.iter_mut().find(|h| h.chunk_text == hit.chunk_text) {
            Some(existing) => {
                if hit.similarity_score > existing.similarity_score {
                    existing.similarity_score = hit.similarity_score;
                }
            }
            None => merged.push(hit),
        }
    }
}

// ---- A2A skill 接线 ----

#[derive(Debug, Deserialize)]
struct QueryInput {
    query: String,
    #[serde(default)]
    filters: Option<RetrievalFilters>,
}

#[derive(Debug, Deserialize)]
struct MissingInput {
    missing_targets: Vec<String>,
    #[serde(default)]
    filters: Option<RetrievalFilters>,
}

struct RetrieveSkill(Arc<RetrieverAgent>);

#[async_trait]
impl SkillHandler for RetrieveSkill {
    async fn handle(&self, input: Value, _task: &Task) -> Result<Value, AgentError> {
        let input: QueryInput = serde_json::from_value(input)
            .map_err(|e| AgentError::Validation(format!("retrieve input: {}", e)))?;
        let filters = input.filters.unwrap_or_default();
        let payload = self.0.retrieve(&input.query, &filters).await?;
        serde_json::to_value(payload).map_err(|e| AgentError::Validation(e.to_string()))
    }
}

struct SmartRetrieveSkill(Arc<RetrieverAgent>);

#[async_trait]
impl SkillHandler for SmartRetrieveSkill {
    async fn handle(&self, input: Value, _task: &Task) -> Result<Value, AgentError> {
        let input: QueryInput = serde_json::from_value(input)
            .map_err(|e| AgentError::Validation(format!("smart_retrieve input: {}", e)))?;
        let filters = input.filters.unwrap_or_default();
        let payload = self.0.smart_retrieve(&input.query, &filters).await?;
        serde_json::to_value(payload).map_err(|e| AgentError::Validation(e.to_string()))
    }
}

struct RetrieveMissingSkill(Arc<RetrieverAgent>);

#[async_trait]
impl SkillHandler for RetrieveMissingSkill {
    async fn handle(&self, input: Value, _task: &Task) -> Result<Value, AgentError> {
        let input: MissingInput = serde_json::from_value(input)
            .map_err(|e| AgentError::Validation(format!("retrieve_missing input: {}", e)))?;
        let filters = input.filters.unwrap_or_default();
        let payload = self
            .0
            .retrieve_missing(&input.missing_targets, &filters)
            .await?;
        serde_json::to_value(payload).map_err(|e| AgentError::Validation(e.to_string()))
    }
}

/// 组装检索智能体的 A2A 服务端（卡片 + 三个 skill）
pub fn build_rag_server(agent: Arc<RetrieverAgent>, url: impl Into<String>) -> A2aServer {
    let filters_schema = json!({
        "type": "object",
        "properties": {
            "map_id": {"type": ["string", "null"]},
            "top_k": {"type": "integer"},
            "threshold": {"type": "number"}
        }
    });
    let payload_schema = json!({
        "type": "object",
        "properties": {
            "hits": {"type": "array"},
            "total_found": {"type": "integer"},
            "duration_ms": {"type": "integer"}
        }
    });

    let card = AgentCard::new("rag", url)
        .with_skill(
            SkillCard::new("retrieve", "直接向量检索：嵌入查询并按相似度返回文本块")
                .with_input_schema(json!({
                    "type": "object",
                    "required": ["query"],
                    "properties": {"query": {"type": "string"}, "filters": filters_schema}
                }))
                .with_output_schema(payload_schema.clone()),
        )
        .with_skill(
            SkillCard::new(
                "smart_retrieve",
                "意图分解检索：抽取目标逐个检索并合并去重",
            )
            .with_input_schema(json!({
                "type": "object",
                "required": ["query"],
                "properties": {"query": {"type": "string"}, "filters": filters_schema}
            }))
            .with_output_schema(payload_schema.clone()),
        )
        .with_skill(
            SkillCard::new(
                "retrieve_missing",
                "缺失目标补检：查询变体族 + 放宽阈值",
            )
            .with_input_schema(json!({
                "type": "object",
                "required": ["missing_targets"],
                "properties": {
                    "missing_targets": {"type": "array", "items": {"type": "string"}},
                    "filters": filters_schema
                }
            }))
            .with_output_schema(payload_schema),
        );

    let mut server = A2aServer::new(card);
    server.register("retrieve", Arc::new(RetrieveSkill(Arc::clone(&agent))));
    server.register(
        "smart_retrieve",
        Arc::new(SmartRetrieveSkill(Arc::clone(&agent))),
    );
    server.register("retrieve_missing", Arc::new(RetrieveMissingSkill(agent)));
    server
}
