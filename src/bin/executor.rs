//! 执行智能体进程
//!
//! 启动: cargo run --bin dragonfly-executor
//! MCP_SERVER_PATH 指定工具端点命令行（如 "node dist/server.js"）；
//! 连接惰性建立：首次 list_tools / 工具调用时 spawn 子进程。

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dragonfly::config::load_config;
use dragonfly::core::ShutdownManager;
use dragonfly::executor::{build_executor_server, ExecutorAgent, McpConnection, TimeoutPolicy};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = load_config().context("Failed to load config")?;
    let level = if cfg.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(level.parse().unwrap()))
        .with(fmt::layer())
        .init();

    if cfg.mcp_server_path.is_empty() {
        tracing::warn!("MCP_SERVER_PATH not set, tool calls will fail until it is configured");
    }

    let endpoint = Arc::new(McpConnection::new(&cfg.mcp_server_path));
    let policy = TimeoutPolicy::new(cfg.tool_timeout_secs, cfg.mcp_mission_timeout_ms);
    let agent = Arc::new(ExecutorAgent::new(endpoint, policy));
    let server = build_executor_server(agent, cfg.agent_url("executor").unwrap_or_default());

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let addr = format!("0.0.0.0:{}", cfg.a2a_executor_port).parse()?;
    Arc::new(server)
        .serve(addr, shutdown.token())
        .await
        .context("Failed to start executor A2A server")?;

    shutdown.wait().await;
    Ok(())
}
