//! 行式终端 REPL
//!
//! 命令：/help /status /clear /history /stream /quit，其余输入作为用户消息
//! 经编排智能体的 chat 契约处理。/stream 切换事件渲染：开启时订阅事件总线，
//! 每条可观测事件打印一行。

use std::io::Write as _;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::react::{AgentEvent, ChatRequest, OrchestratorAgent};

const BANNER: &str = "dragonfly 无人机控制台 — 输入 /help 查看命令";

const HELP: &str = "\
/help     显示本帮助
/status   各智能体存活状况与当前会话
/clear    清空当前会话历史
/history  打印当前会话历史
/stream   切换事件流渲染
/quit     退出
其余任意输入将作为指令发送（如：起飞到1.5米 / fly to point 7）";

/// 运行 REPL 直到 /quit 或输入流结束
pub async fn run_repl(orchestrator: Arc<OrchestratorAgent>) -> anyhow::Result<()> {
    println!("{}", BANNER);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut session_id: Option<String> = None;
    let mut printer: Option<tokio::task::JoinHandle<()>> = None;

    prompt();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => {}
            "/help" => println!("{}", HELP),
            "/quit" => break,
            "/status" => {
                let health = orchestrator.agent_health().await;
                let mut names: Vec<_> = health.keys().collect();
                names.sort();
                for name in names {
                    let mark = if health[name] { "✓" } else { "✗" };
                    println!("  {} {}", mark, name);
                }
                match &session_id {
                    Some(id) => println!("  session: {}", id),
                    None => println!("  session: (尚未建立)"),
                }
            }
            "/clear" => {
                if let Some(id) = &session_id {
                    orchestrator.sessions().clear(id).await;
                    session_id = None;
                    println!("会话已清空");
                } else {
                    println!("当前没有会话");
                }
            }
            "/history" => match &session_id {
                Some(id) => {
                    let history = orchestrator.sessions().history(id).await;
                    if history.is_empty() {
                        println!("(历史为空)");
                    }
                    for turn in history {
                        let role = match turn.role {
                            crate::react::Role::User => "user",
                            crate::react::Role::Assistant => "assistant",
                        };
                        println!("[{}] {}", role, turn.content);
                    }
                }
                None => println!("当前没有会话"),
            },
            "/stream" => {
                if let Some(handle) = printer.take() {
                    handle.abort();
                    println!("事件渲染：关");
                } else {
                    let mut rx = orchestrator.events().subscribe("*");
                    printer = Some(tokio::spawn(async move {
                        while let Some(ev) = rx.recv().await {
                            println!("{}", render_event(&ev));
                        }
                    }));
                    println!("事件渲染：开");
                }
            }
            message => {
                let response = orchestrator
                    .chat(ChatRequest {
                        message: message.to_string(),
                        session_id: session_id.clone(),
                        ..Default::default()
                    })
                    .await;
                session_id = Some(response.session_id.clone());
                println!("{}", response.answer);
                if let Some(error) = &response.error {
                    println!("  (error: {})", error);
                }
            }
        }
        prompt();
    }

    if let Some(handle) = printer {
        handle.abort();
    }
    println!("bye");
    Ok(())
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

fn render_event(ev: &AgentEvent) -> String {
    let payload = serde_json::to_string(&ev.payload).unwrap_or_default();
    format!("  [{}] {}/{} {}", ev.event_type, ev.agent, ev.phase, payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_event() {
        let ev = AgentEvent::new("plan_end", "r1", "planner", "plan").with("steps", json!(2));
        let line = render_event(&ev);
        assert!(line.contains("[plan_end]"));
        assert!(line.contains("planner/plan"));
        assert!(line.contains("\"steps\":2"));
    }
}
