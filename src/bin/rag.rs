//! 检索智能体进程
//!
//! 启动: cargo run --bin dragonfly-rag
//! 无 GEMINI_API_KEY / SUPABASE_URL 时降级为 Mock LLM 与内存向量库（离线模式）。

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dragonfly::config::load_config;
use dragonfly::core::ShutdownManager;
use dragonfly::llm::{Embedder, GeminiClient, LlmClient, MockEmbedder, MockLlm};
use dragonfly::rag::{build_rag_server, MemoryStore, RetrieverAgent, SupabaseStore, VectorStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = load_config().context("Failed to load config")?;
    let level = if cfg.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(level.parse().unwrap()))
        .with(fmt::layer())
        .init();

    let (llm, embedder): (Arc<dyn LlmClient>, Arc<dyn Embedder>) = if cfg.gemini_api_key.is_empty()
    {
        tracing::warn!("GEMINI_API_KEY not set, using Mock LLM and embedder");
        (Arc::new(MockLlm::new()), Arc::new(MockEmbedder))
    } else {
        let gemini = Arc::new(
            GeminiClient::from_app_config(&cfg)
                .map_err(anyhow::Error::msg)
                .context("Failed to build Gemini client")?,
        );
        (Arc::clone(&gemini) as Arc<dyn LlmClient>, gemini)
    };

    let store: Arc<dyn VectorStore> = if cfg.supabase_url.is_empty() {
        tracing::warn!("SUPABASE_URL not set, using in-memory vector store");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(SupabaseStore::new(
            &cfg.supabase_url,
            &cfg.supabase_service_role_key,
        ))
    };

    let agent = Arc::new(RetrieverAgent::new(llm, embedder, store));
    let server = build_rag_server(agent, cfg.agent_url("rag").unwrap_or_default());

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let addr = format!("0.0.0.0:{}", cfg.a2a_rag_port).parse()?;
    Arc::new(server)
        .serve(addr, shutdown.token())
        .await
        .context("Failed to start RAG A2A server")?;

    shutdown.wait().await;
    Ok(())
}
