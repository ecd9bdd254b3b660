//! Dragonfly - 多智能体无人机控制系统
//!
//! 模块划分：
//! - **a2a**: Agent-to-Agent 传输层（Agent Card、Task、axum 服务端、reqwest 客户端）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类与优雅关闭
//! - **llm**: Gemini 客户端（生成 + 嵌入）、严格 JSON 解析、Mock
//! - **rag**: 检索智能体（直接检索 / 意图分解检索 / 缺失目标补检）与向量库客户端
//! - **planner**: 规划智能体（plan / reflect，工具白名单校验）
//! - **executor**: 执行智能体（MCP 子进程连接、工具目录缓存、逐步执行）
//! - **react**: 编排智能体（会话、ReAct 主循环、可观测事件流）
//! - **web**: HTTP API（含 SSE 流式端点）
//! - **ui**: 行式终端 REPL

pub mod a2a;
pub mod config;
pub mod core;
pub mod executor;
pub mod llm;
pub mod planner;
pub mod rag;
pub mod react;
pub mod ui;
pub mod web;
