//! Dragonfly - 多智能体无人机控制系统
//!
//! 终端入口：在本进程内托管编排智能体（A2A 端口照常监听），
//! 经 A2A 客户端连接 rag / planner / executor 三个独立进程，运行行式 REPL。

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dragonfly::a2a::A2aClient;
use dragonfly::config::load_config;
use dragonfly::core::ShutdownManager;
use dragonfly::react::{build_orchestrator_server, OrchestratorAgent, ReactConfig};
use dragonfly::ui::run_repl;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = load_config().context("Failed to load config")?;

    // 日志：默认 info，DEBUG=true 降为 debug，可用 RUST_LOG 覆盖
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

    let addr = format!("0.0.0.0:{}", cfg.a2a_orchestrator_port)
        .parse()
        .context("bad orchestrator addr")?;
    Arc::new(build_orchestrator_server(
        Arc::clone(&orchestrator),
        cfg.agent_url("orchestrator").unwrap_or_default(),
    ))
    .serve(addr, shutdown.token())
    .await
    .context("Failed to start orchestrator A2A server")?;

    run_repl(orchestrator).await.context("REPL failed")?;

    shutdown.shutdown();
    Ok(())
}
