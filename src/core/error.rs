//! Agent 错误类型
//!
//! 统一的错误分类，在 Task Result 与事件流中以结构化字符串呈现。
//! 尽力而为阶段（检索、取状态、列工具）记录后继续；plan 失败对当前请求致命。

use thiserror::Error;

/// Agent 运行过程中可能出现的错误（传输、模型、校验、工具等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 调用其他智能体时的网络 / 超时 / HTTP 错误
    #[error("TransportError: {0}")]
    Transport(String),

    /// LLM 调用失败或产出无法解析的 JSON
    #[error("ModelError: {0}")]
    Model(String),

    /// plan / reflection JSON 未通过白名单或结构校验
    #[error("ValidationError: {0}")]
    Validation(String),

    /// 计划引用了工具目录中不存在的工具（刷新一次后仍未命中）
    #[error("UnknownTool: {0}")]
    UnknownTool(String),

    /// 按名引用的工具缺失（如 drone.get_state）
    #[error("MissingTool: {0}")]
    MissingTool(String),

    /// 工具端点返回错误载荷
    #[error("ToolInvocationError: {0}")]
    ToolInvocation(String),

    /// 执行智能体报告工具目录为空
    #[error("NoToolsAvailable")]
    NoToolsAvailable,

    /// A2A 服务端未注册该 skill
    #[error("UnknownSkill: {0}")]
    UnknownSkill(String),

    #[error("ConfigError: {0}")]
    Config(String),

    /// 请求被取消（关闭信号或调用方放弃）
    #[error("Cancelled")]
    Cancelled,
}
