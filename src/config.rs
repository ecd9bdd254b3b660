//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 所有键均为平铺命名，环境变量直接覆盖同名小写键（如 `GEMINI_API_KEY` → `gemini_api_key`）。

use serde::Deserialize;

/// 应用配置根：模型与向量库、各 Agent 端口、MCP 工具端点、循环预算
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Gemini API Key（为空时各二进制降级为 Mock LLM）
    pub gemini_api_key: String,
    /// 生成模型名
    pub gemini_model: String,
    /// 嵌入模型名（输出维度固定 768，与向量库列类型一致）
    pub gemini_embedding_model: String,
    /// Supabase 项目 URL（为空时降级为内存向量库）
    pub supabase_url: String,
    /// Supabase service role key
    pub supabase_service_role_key: String,

    /// 编排智能体 A2A 端口
    pub a2a_orchestrator_port: u16,
    /// 规划智能体 A2A 端口
    pub a2a_planner_port: u16,
    /// 检索智能体 A2A 端口
    pub a2a_rag_port: u16,
    /// 执行智能体 A2A 端口
    pub a2a_executor_port: u16,
    /// HTTP API 端口
    pub web_api_port: u16,
    /// 各 Agent 所在主机（单机部署时为 127.0.0.1）
    pub a2a_host: String,
    /// A2A 单次任务提交的默认超时（秒）
    pub a2a_timeout_secs: u64,

    /// MCP 工具端点启动命令（可含参数，空格分隔；如 "node dist/server.js"）
    pub mcp_server_path: String,
    /// 任务类工具（drone.run_mission）的超时上限（毫秒）
    pub mcp_mission_timeout_ms: u64,
    /// 普通工具的单次调用超时（秒）
    pub tool_timeout_secs: u64,

    /// ReAct 循环最大迭代数
    pub max_react_iterations: usize,
    /// 单请求内补检重试上限
    pub max_rag_retries: usize,
    /// 会话历史保留轮数（每侧；实际消息数上限为其 2 倍）
    pub max_history_length: usize,

    /// DEBUG=true 时日志级别降为 debug
    pub debug: bool,
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_gemini_embedding_model() -> String {
    "gemini-embedding-001".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: String::new(),
            gemini_model: default_gemini_model(),
            gemini_embedding_model: default_gemini_embedding_model(),
            supabase_url: String::new(),
            supabase_service_role_key: String::new(),
            a2a_orchestrator_port: 9000,
            a2a_planner_port: 9001,
            a2a_rag_port: 9002,
            a2a_executor_port: 9003,
            web_api_port: 3000,
            a2a_host: "127.0.0.1".to_string(),
            a2a_timeout_secs: 60,
            mcp_server_path: String::new(),
            mcp_mission_timeout_ms: 1_800_000,
            tool_timeout_secs: 30,
            max_react_iterations: 3,
            max_rag_retries: 2,
            max_history_length: 10,
            debug: false,
        }
    }
}

impl AppConfig {
    /// 按智能体名拼 A2A 基地址；未知名字返回 None
    pub fn agent_url(&self, name: &str) -> Option<String> {
        let port = match name {
            "orchestrator" => self.a2a_orchestrator_port,
            "planner" => self.a2a_planner_port,
            "rag" => self.a2a_rag_port,
            "executor" => self.a2a_executor_port,
            _ => return None,
        };
        Some(format!("http://{}:{}", self.a2a_host, port))
    }
}

/// 从 config 目录加载配置，环境变量可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml，找到则作为第一源
/// 2. 叠加环境变量（`try_parsing` 使端口等数值键生效）
pub fn load_config() -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default"] {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    builder = builder.add_source(config::Environment::default().try_parsing(true));

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_app_config() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.gemini_model, "gemini-2.5-flash");
        assert_eq!(cfg.a2a_orchestrator_port, 9000);
        assert_eq!(cfg.web_api_port, 3000);
        assert_eq!(cfg.mcp_mission_timeout_ms, 1_800_000);
        assert_eq!(cfg.max_react_iterations, 3);
        assert_eq!(cfg.max_rag_retries, 2);
        assert!(!cfg.debug);
    }

    #[test]
    fn test_agent_url() {
        let cfg = AppConfig::default();
        assert_eq!(
            cfg.agent_url("rag").as_deref(),
            Some("http://127.0.0.1:9002")
        );
        assert_eq!(cfg.agent_url("unknown"), None);
    }
}
