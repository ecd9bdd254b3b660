//! 编排智能体 + HTTP API 进程
//!
//! 启动: cargo run --bin dragonfly-web
//! 同进程托管编排智能体（A2A 端口 9000）与 HTTP API（端口 3000）：
//! SSE 流式端点需要直通进程内事件总线。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dragonfly::a2a::A2aClient;
use dragonfly::config::load_config;
use dragonfly::core::ShutdownManager;
use dragonfly::react::{build_orchestrator_server, OrchestratorAgent, ReactConfig};
use dragonfly::web::{serve, WebState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = load_config().context("Failed to load config")?;
    let level = if cfg.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(level.parse().unwrap()))
        .with(fmt::layer())
        .init();

    let mut client = A2aClient::new(Duration::from_secs(cfg.a2a_timeout_secs));
    for name in ["rag", "planner", "executor"] {
        if let Some(url) = cfg.agent_url(name) {
            client.register(name, url);
        }
    }

    let orchestrator = Arc::new(OrchestratorAgent::new(
        Arc::new(client),
        cfg.max_history_length,
        ReactConfig::from_app_config(&cfg),
    ));

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let a2a_addr = format!("0.0.0.0:{}", cfg.a2a_orchestrator_port).parse()?;
    Arc::new(build_orchestrator_server(
        Arc::clone(&orchestrator),
        cfg.agent_url("orchestrator").unwrap_or_default(),
    ))
    .serve(a2a_addr, shutdown.token())
    .await
    .context("Failed to start orchestrator A2A server")?;

    let web_addr = format!("0.0.0.0:{}", cfg.web_api_port).parse()?;
    serve(WebState { orchestrator }, web_addr, shutdown.token())
        .await
        .context("Failed to start web API")?;

    shutdown.wait().await;
    Ok(())
}
