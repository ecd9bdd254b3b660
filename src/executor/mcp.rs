//! MCP 工具端点连接
//!
//! 子进程 + 标准输入输出上的行分隔 JSON-RPC 2.0：
//! initialize → notifications/initialized → tools/list / tools/call。
//! 首次使用时惰性建连并保持打开；后台读取任务按 id 路由响应，
//! progress 通知刷新活动时间戳供任务类工具重置期限。

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};

use crate::executor::{ToolDescriptor, ToolEndpoint};

/// MCP 协议版本
const PROTOCOL_VERSION: &str = "2024-11-05";
/// 进度重置模式下检查期限的步长
const PROGRESS_POLL: Duration = Duration::from_secs(1);

type Pending = Arc<std::sync::Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

struct Channel {
    stdin: ChildStdin,
    // 持有 Child 保证 kill_on_drop 生效
    _child: Child,
}

/// MCP 连接：一个子进程、一个写入端、一个后台读取任务
pub struct McpConnection {
    /// 启动命令行（空格分隔，首个 token 为程序）
    command_line: String,
    channel: Mutex<Option<Channel>>,
    pending: Pending,
    next_id: AtomicU64,
    /// 最近一次收到任何消息（含 progress 通知）的 unix 毫秒
    last_activity: Arc<AtomicU64>,
}

impl McpConnection {
    pub fn new(command_line: impl Into<String>) -> Self {
        Self {
            command_line: command_line.into(),
            channel: Mutex::new(None),
            pending: Arc::new(std::sync::Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            last_activity: Arc::new(AtomicU64::new(0)),
        }
    }

    fn now_millis() -> u64 {
        chrono::Utc::now().timestamp_millis() as u64
    }

    /// 惰性建连：spawn 子进程、起后台读取、完成 MCP 握手
    async fn ensure_connected(&self) -> Result<(), String> {
        let mut guard = self.channel.lock().await;
        if guard.is_some() {
            return Ok(());
        }

        let mut parts = self.command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| "MCP_SERVER_PATH is empty".to_string())?;
        let args: Vec<&str> = parts.collect();

        let mut cmd = Command::new(program);
        cmd.args(&args);
        cmd.kill_on_drop(true);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child = cmd
            .spawn()
            .map_err(|e| format!("spawn MCP endpoint '{}': {}", self.command_line, e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| "MCP endpoint stdin unavailable".to_string())?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| "MCP endpoint stdout unavailable".to_string())?;

        let pending = Arc::clone(&self.pending);
        let last_activity = Arc::clone(&self.last_activity);
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let value: Value = match serde_json::from_str(&line) {
                    Ok(v) => v,
                    Err(_) => continue, // 非 JSON 行（如端点自身的日志）忽略
                };
                last_activity.store(Self::now_millis(), Ordering::Relaxed);
                if let Some(id) = value.get("id").and_then(Value::as_u64) {
                    if let Some(tx) = pending.lock().unwrap().remove(&id) {
                        let _ = tx.send(value);
                    }
                } else if value.get("method").and_then(Value::as_str)
                    == Some("notifications/progress")
                {
                    tracing::debug!("MCP progress notification");
                }
            }
            tracing::warn!("MCP endpoint stdout closed");
        });

        *guard = Some(Channel {
            stdin,
            _child: child,
        });
        drop(guard);

        // 握手
        self.request(
            "initialize",
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {"name": "dragonfly", "version": env!("CARGO_PKG_VERSION")}
            }),
            Duration::from_secs(15),
            false,
        )
        .await?;
        self.notify("notifications/initialized", json!({})).await?;
        tracing::info!("MCP endpoint connected: {}", self.command_line);
        Ok(())
    }

    async fn write_line(&self, payload: &Value) -> Result<(), String> {
        let mut guard = self.channel.lock().await;
        let channel = guard.as_mut().ok_or_else(|| "MCP not connected".to_string())?;
        let mut line = payload.to_string();
        line.push('\n');
        if let Err(e) = channel.stdin.write_all(line.as_bytes()).await {
            // 写失败视为连接损坏，下次调用重建
            *guard = None;
            return Err(format!("MCP write failed: {}", e));
        }
        channel
            .stdin
            .flush()
            .await
            .map_err(|e| format!("MCP flush failed: {}", e))
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), String> {
        self.write_line(&json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        }))
        .await
    }

    /// 发送请求并等待响应；reset_on_progress 时期限从最近活动时刻起算
    async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
        reset_on_progress: bool,
    ) -> Result<Value, String> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, mut rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        if let Err(e) = self.write_line(&payload).await {
            self.pending.lock().unwrap().remove(&id);
            return Err(e);
        }

        let response = if reset_on_progress {
            let started = Self::now_millis();
            loop {
                match tokio::time::timeout(PROGRESS_POLL, &mut rx).await {
                    Ok(res) => break res.map_err(|_| "MCP reader dropped".to_string())?,
                    Err(_) => {
                        let last = self.last_activity.load(Ordering::Relaxed).max(started);
                        let idle = Self::now_millis().saturating_sub(last);
                        if idle as u128 > timeout.as_millis() {
                            self.pending.lock().unwrap().remove(&id);
                            return Err(format!(
                                "MCP '{}' timed out ({}ms since last progress)",
                                method, idle
                            ));
                        }
                    }
                }
            }
        } else {
            match tokio::time::timeout(timeout, rx).await {
                Ok(res) => res.map_err(|_| "MCP reader dropped".to_string())?,
                Err(_) => {
                    self.pending.lock().unwrap().remove(&id);
                    return Err(format!("MCP '{}' timed out after {:?}", method, timeout));
                }
            }
        };

        if let Some(error) = response.get("error") {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown MCP error");
            return Err(message.to_string());
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }
}

/// 解析 tools/call 的内容块：首个 text 块尽量按 JSON 解析，否则包成 {text: ...}
fn parse_tool_content(result: &Value) -> Result<Value, String> {
    if result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        let message = collect_text(result).unwrap_or_else(|| "tool returned an error".to_string());
        return Err(message);
    }
    match collect_text(result) {
        Some(text) => Ok(serde_json::from_str(&text).unwrap_or_else(|_| json!({"text": text}))),
        None => Ok(result.clone()),
    }
}

fn collect_text(result: &Value) -> Option<String> {
    result
        .get("content")
        .and_then(Value::as_array)?
        .iter()
        .find(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .and_then(|block| block.get("text").and_then(Value::as_str))
        .map(String::from)
}

#[async_trait]
impl ToolEndpoint for McpConnection {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, String> {
        self.ensure_connected().await?;
        let result = self
            .request("tools/list", json!({}), Duration::from_secs(15), false)
            .await?;
        let tools = result
            .get("tools")
            .and_then(Value::as_array)
            .ok_or_else(|| "tools/list returned no tools array".to_string())?;
        Ok(tools
            .iter()
            .map(|t| ToolDescriptor {
                name: t
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                description: t
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                input_schema: t.get("inputSchema").cloned().unwrap_or(Value::Null),
            })
            .filter(|t| !t.name.is_empty())
            .collect())
    }

    async fn call_tool(
        &self,
        name: &str,
        args: &Value,
        timeout: Duration,
        reset_on_progress: bool,
    ) -> Result<Value, String> {
        self.ensure_connected().await?;
        let result = self
            .request(
                "tools/call",
                json!({"name": name, "arguments": args}),
                timeout,
                reset_on_progress,
            )
            .await?;
        parse_tool_content(&result)
    }
}
