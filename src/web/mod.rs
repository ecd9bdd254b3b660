//! HTTP API：编排智能体之上的薄适配层
//!
//! 端点：/api/health、/api/chat、/api/chat/stream（SSE）、/api/sessions*。
//! 流式端点先订阅事件总线、再以固定 request_id 发起 chat，按 request_id
//! 过滤事件逐条下发，最后补发 result；响应头禁用中间层缓冲。
//! 400 仅用于缺少必填输入；其余失败以 200 + success=false 返回。

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::react::{ChatRequest, OrchestratorAgent};

/// Web 层状态
#[derive(Clone)]
pub struct WebState {
    pub orchestrator: Arc<OrchestratorAgent>,
}

/// 组装路由
pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/api/health", get(api_health))
        .route("/api/chat", post(api_chat))
        .route("/api/chat/stream", post(api_chat_stream))
        .route("/api/sessions", post(api_create_session))
        .route("/api/sessions/:id/history", get(api_history))
        .route("/api/sessions/:id", axum::routing::delete(api_delete_session))
        .with_state(state)
}

/// 绑定并后台启动 HTTP API；返回实际监听地址
pub async fn serve(
    state: WebState,
    addr: SocketAddr,
    shutdown: CancellationToken,
) -> Result<SocketAddr, AgentError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| AgentError::Transport(format!("bind {}: {}", addr, e)))?;
    let local = listener
        .local_addr()
        .map_err(|e| AgentError::Transport(e.to_string()))?;
    let app = router(state);
    tokio::spawn(async move {
        tracing::info!("Web API listening on http://{}", local);
        let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown.cancelled_owned());
        if let Err(e) = serve.await {
            tracing::error!("Web API exited: {}", e);
        }
    });
    Ok(local)
}

async fn api_health(State(state): State<WebState>) -> Json<Value> {
    let agents = state.orchestrator.agent_health().await;
    let up = agents.values().filter(|v| **v).count();
    let status = if up == agents.len() {
        "healthy"
    } else if up > 0 {
        "degraded"
    } else {
        "unhealthy"
    };
    Json(json!({
        "status": status,
        "agents": agents,
        "timestamp": chrono::Utc::now().timestamp_millis(),
    }))
}

async fn api_chat(
    State(state): State<WebState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Value>, (StatusCode, String)> {
    if request.message.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message is required".to_string()));
    }
    let response = state.orchestrator.chat(request).await;
    Ok(Json(serde_json::to_value(response).unwrap_or_default()))
}

/// SSE 流：agent_event（每条可观测事件）→ result（最终响应）
async fn api_chat_stream(
    State(state): State<WebState>,
    Json(request): Json<ChatRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if request.message.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message is required".to_string()));
    }

    let request_id = uuid::Uuid::new_v4().to_string();
    // 先订阅再发起，避免漏掉最早的事件
    let mut events = state.orchestrator.events().subscribe("*");
    let (tx, rx) = mpsc::unbounded_channel::<Event>();

    let orchestrator = Arc::clone(&state.orchestrator);
    let rid = request_id.clone();
    tokio::spawn(async move {
        let chat_rid = rid.clone();
        let mut chat = tokio::spawn(async move {
            orchestrator.chat_with_request_id(request, chat_rid).await
        });

        loop {
            tokio::select! {
                maybe = events.recv() => {
                    match maybe {
                        Some(ev) if ev.request_id == rid => {
                            if forward_event(&tx, &ev).is_err() {
                                return; // 客户端断开
                            }
                        }
                        Some(_) => {}
                        None => break,
                    }
                }
                finished = &mut chat => {
                    // 排空已入队的事件再发 result
                    while let Ok(ev) = events.try_recv() {
                        if ev.request_id == rid && forward_event(&tx, &ev).is_err() {
                            return;
                        }
                    }
                    match finished {
                        Ok(response) => {
                            if let Ok(event) = Event::default().event("result").json_data(&response) {
                                let _ = tx.send(event);
                            }
                        }
                        Err(e) => {
                            let _ = tx.send(Event::default().event("error").data(e.to_string()));
                        }
                    }
                    break;
                }
            }
        }
    });

    let stream = stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|ev| (Ok::<_, Infallible>(ev), rx))
    });
    let sse = Sse::new(stream).keep_alive(KeepAlive::default());

    Ok((
        [
            (
                HeaderName::from_static("x-accel-buffering"),
                HeaderValue::from_static("no"),
            ),
            (
                HeaderName::from_static("cache-control"),
                HeaderValue::from_static("no-cache"),
            ),
        ],
        sse,
    ))
}

fn forward_event(
    tx: &mpsc::UnboundedSender<Event>,
    ev: &crate::react::AgentEvent,
) -> Result<(), ()> {
    match Event::default().event("agent_event").json_data(ev) {
        Ok(event) => tx.send(event).map_err(|_| ()),
        Err(_) => Ok(()),
    }
}

async fn api_create_session(State(state): State<WebState>) -> Json<Value> {
    let session_id = state.orchestrator.sessions().create().await;
    Json(json!({"session_id": session_id}))
}

async fn api_history(
    State(state): State<WebState>,
    Path(session_id): Path<String>,
) -> Json<Value> {
    let history = state.orchestrator.sessions().history(&session_id).await;
    Json(json!({"session_id": session_id, "history": history}))
}

async fn api_delete_session(
    State(state): State<WebState>,
    Path(session_id): Path<String>,
) -> Json<Value> {
    state.orchestrator.sessions().clear(&session_id).await;
    Json(json!({"success": true}))
}
