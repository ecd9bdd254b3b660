//! 规划智能体进程
//!
//! 启动: cargo run --bin dragonfly-planner

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dragonfly::config::load_config;
use dragonfly::core::ShutdownManager;
use dragonfly::llm::{GeminiClient, LlmClient, MockLlm};
use dragonfly::planner::{build_planner_server, PlannerAgent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = load_config().context("Failed to load config")?;
    let level = if cfg.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(level.parse().unwrap()))
        .with(fmt::layer())
        .init();

    let llm: Arc<dyn LlmClient> = if cfg.gemini_api_key.is_empty() {
        tracing::warn!("GEMINI_API_KEY not set, using Mock LLM");
        Arc::new(MockLlm::new())
    } else {
        Arc::new(
            GeminiClient::from_app_config(&cfg)
                .map_err(anyhow::Error::msg)
                .context("Failed to build Gemini client")?,
        )
    };

    let agent = Arc::new(PlannerAgent::new(llm));
    let usage_handle = Arc::clone(&agent);
    let server = build_planner_server(agent, cfg.agent_url("planner").unwrap_or_default());

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let addr = format!("0.0.0.0:{}", cfg.a2a_planner_port).parse()?;
    Arc::new(server)
        .serve(addr, shutdown.token())
        .await
        .context("Failed to start planner A2A server")?;

    shutdown.wait().await;

    let (prompt, completion, total) = usage_handle.token_usage();
    tracing::info!(prompt, completion, total, "cumulative token usage");
    Ok(())
}
