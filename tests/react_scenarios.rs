//! ReAct 端到端场景测试
//!
//! 三个下游智能体以真实 A2A 服务端起在临时端口上，LLM / 向量库 / 工具端点
//! 均为脚本化替身；逐场景校验编排循环的行为与响应不变量。

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use dragonfly::a2a::{A2aClient, A2aServer, AgentCard, SkillCard, SkillHandler, Task};
use dragonfly::core::AgentError;
use dragonfly::executor::{
    build_executor_server, DroneState, ExecutorAgent, TimeoutPolicy, ToolDescriptor, ToolEndpoint,
};
use dragonfly::llm::{Embedder, MockEmbedder, MockLlm};
use dragonfly::planner::{build_planner_server, PlannerAgent};
use dragonfly::rag::{
    build_rag_server, MemoryStore, RetrievalHit, RetrieverAgent, VectorStore,
};
use dragonfly::react::{ChatRequest, OrchestratorAgent, ReactConfig};

/// 脚本化工具端点：记录调用，可标记「失败一次」的工具
struct TestEndpoint {
    tools: Vec<ToolDescriptor>,
    fail_once: Mutex<HashSet<String>>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl TestEndpoint {
    fn with_drone_tools() -> Self {
        let names = [
            ("drone.take_off", "起飞到指定高度"),
            ("drone.move_to", "移动到世界坐标"),
            ("drone.move_relative", "相对当前位置移动"),
            ("drone.get_state", "读取无人机状态"),
            ("drone.run_mission", "执行长时任务"),
        ];
        Self {
            tools: names
                .iter()
                .map(|(n, d)| ToolDescriptor {
                    name: n.to_string(),
                    description: d.to_string(),
                    input_schema: json!({"type": "object"}),
                })
                .collect(),
            fail_once: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn empty() -> Self {
        Self {
            tools: Vec::new(),
            fail_once: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn fail_once(&self, tool: &str) {
        self.fail_once.lock().unwrap().insert(tool.to_string());
    }

    fn calls_of(&self, tool: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == tool)
            .count()
    }
}

#[async_trait]
impl ToolEndpoint for TestEndpoint {
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>, String> {
        Ok(self.tools.clone())
    }

    async fn call_tool(
        &self,
        name: &str,
        args: &Value,
        _timeout: Duration,
        _reset: bool,
    ) -> Result<Value, String> {
        self.calls
            .lock()
            .unwrap()
            .push((name.to_string(), args.clone()));
        if self.fail_once.lock().unwrap().remove(name) {
            return Err("simulated tool failure".to_string());
        }
        if name == "drone.get_state" {
            return Ok(json!({
                "position": {"x": 0.0, "y": 1.0, "z": 0.0},
                "is_active": true,
                "queue_length": 0
            }));
        }
        Ok(json!({"status": "ok"}))
    }
}

struct Harness {
    orchestrator: Arc<OrchestratorAgent>,
    rag_llm: Arc<MockLlm>,
    planner_llm: Arc<MockLlm>,
    endpoint: Arc<TestEndpoint>,
    token: CancellationToken,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// 标准编排环境：真实三智能体 + 指定种子文本块
async fn harness_with(seed_chunks: &[&str], endpoint: TestEndpoint) -> Harness {
    let token = CancellationToken::new();
    let any_addr: std::net::SocketAddr = "127.0.0.1:0".parse().unwrap();

    // RAG
    let rag_llm = Arc::new(MockLlm::new());
    let embedder = Arc::new(MockEmbedder);
    let store = Arc::new(MemoryStore::new());
    for chunk in seed_chunks {
        let emb = embedder.embed(chunk).await.unwrap();
        store.insert_chunk(chunk, Some("m1"), &emb).await.unwrap();
    }
    let rag = Arc::new(RetrieverAgent::new(
        Arc::clone(&rag_llm) as Arc<dyn dragonfly::llm::LlmClient>,
        embedder,
        store,
    ));
    let rag_addr = Arc::new(build_rag_server(rag, "http://127.0.0.1:0"))
        .serve(any_addr, token.clone())
        .await
        .unwrap();

    // Planner
    let planner_llm = Arc::new(MockLlm::new());
    let planner = Arc::new(PlannerAgent::new(
        Arc::clone(&planner_llm) as Arc<dyn dragonfly::llm::LlmClient>
    ));
    let planner_addr = Arc::new(build_planner_server(planner, "http://127.0.0.1:0"))
        .serve(any_addr, token.clone())
        .await
        .unwrap();

    // Executor
    let endpoint = Arc::new(endpoint);
    let executor = Arc::new(ExecutorAgent::new(
        Arc::clone(&endpoint) as Arc<dyn ToolEndpoint>,
        TimeoutPolicy::new(5, 10_000),
    ));
    let executor_addr = Arc::new(build_executor_server(executor, "http://127.0.0.1:0"))
        .serve(any_addr, token.clone())
        .await
        .unwrap();

    let mut client = A2aClient::new(Duration::from_secs(5));
    client.register("rag", format!("http://{}", rag_addr));
    client.register("planner", format!("http://{}", planner_addr));
    client.register("executor", format!("http://{}", executor_addr));

    let config = ReactConfig {
        step_timeout: Duration::from_secs(5),
        execute_timeout: Duration::from_secs(10),
        ..Default::default()
    };
    let orchestrator = Arc::new(OrchestratorAgent::new(Arc::new(client), 10, config));

    Harness {
        orchestrator,
        rag_llm,
        planner_llm,
        endpoint,
        token,
    }
}

fn no_targets() -> &'static str {
    r#"{"targets": [], "reasoning": "no location lookup needed"}"#
}

fn reflect_done() -> &'static str {
    r#"{"observation": "all steps succeeded", "reasoning": "state matches the goal",
        "goal_achieved": true, "confidence": 0.9, "next_steps": [], "summary": "任务完成"}"#
}

// ---- 种子场景 ----

/// 场景 1：最简起飞
#[tokio::test]
async fn test_trivial_take_off() {
    let h = harness_with(&[], TestEndpoint::with_drone_tools()).await;
    h.rag_llm.push_response(no_targets());
    h.planner_llm.push_response(
        r#"{"reasoning": "single take-off step", "needs_clarification": false,
            "steps": [{"tool": "drone.take_off", "args": {"altitude": 1.5}, "description": "起飞到1.5米"}]}"#,
    );
    h.planner_llm.push_response(reflect_done());

    let resp = h
        .orchestrator
        .chat(ChatRequest {
            message: "take off to 1.5m".into(),
            ..Default::default()
        })
        .await;

    assert!(resp.success, "{:?}", resp.error);
    assert!(resp.rag_hits.is_empty());
    assert_eq!(resp.react_iterations, 1);
    assert!(resp.goal_achieved);
    assert!(resp.execution_success);
    let plan = resp.plan.as_ref().unwrap();
    assert_eq!(plan.steps.len(), 1);
    assert_eq!(plan.steps[0].tool, "drone.take_off");
    assert_eq!(plan.steps[0].args["altitude"], 1.5);
    assert_eq!(h.endpoint.calls_of("drone.take_off"), 1);
}

/// 场景 2：具名地标
#[tokio::test]
async fn test_named_landmark() {
    let chunk = "7号蓝色圆形，坐标：x=-0.48, z=0.78";
    let h = harness_with(&[chunk], TestEndpoint::with_drone_tools()).await;
    h.rag_llm.push_response(format!(
        r#"{{"targets": ["{}"], "reasoning": "point 7"}}"#,
        chunk
    ));
    h.planner_llm.push_response(
        r#"{"reasoning": "take off, then fly to point 7 at x=-0.48 z=0.78",
            "needs_clarification": false,
            "steps": [
                {"tool": "drone.take_off", "args": {"altitude": 1.0}, "description": "先起飞"},
                {"tool": "drone.move_to", "args": {"x": -0.48, "y": 1.0, "z": 0.78}, "description": "飞到7号点"}
            ]}"#,
    );
    h.planner_llm.push_response(reflect_done());

    let resp = h
        .orchestrator
        .chat(ChatRequest {
            message: "fly to point 7".into(),
            map_id: Some("m1".into()),
            ..Default::default()
        })
        .await;

    assert!(resp.goal_achieved);
    assert!(!resp.rag_hits.is_empty());
    assert_eq!(resp.rag_hits[0].chunk_text, chunk);
    let plan = resp.plan.as_ref().unwrap();
    assert_eq!(plan.steps[0].tool, "drone.take_off");
    assert_eq!(plan.steps[1].tool, "drone.move_to");
    assert!((plan.steps[1].args["x"].as_f64().unwrap() - (-0.48)).abs() < 1e-9);
    assert!((plan.steps[1].args["z"].as_f64().unwrap() - 0.78).abs() < 1e-9);
}

/// 场景 3：缺失目标恢复（脚本化 RAG：补检第一次返回低相关命中，第二次无新增）
#[tokio::test]
async fn test_missing_target_recovery() {
    let token = CancellationToken::new();
    let any_addr: std::net::SocketAddr = "127.0.0.1:0".parse().unwrap();

    // 脚本化 RAG 服务端
    struct ScriptedRag {
        smart: Value,
        missing: Mutex<std::collections::VecDeque<Value>>,
    }
    struct SmartSkill(Arc<ScriptedRag>);
    #[async_trait]
    impl SkillHandler for SmartSkill {
        async fn handle(&self, _input: Value, _task: &Task) -> Result<Value, AgentError> {
            Ok(self.0.smart.clone())
        }
    }
    struct MissingSkill(Arc<ScriptedRag>);
    #[async_trait]
    impl SkillHandler for MissingSkill {
        async fn handle(&self, _input: Value, _task: &Task) -> Result<Value, AgentError> {
            Ok(self
                .0
                .missing
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| json!({"hits": [], "total_found": 0, "duration_ms": 1})))
        }
    }

    let point2 = RetrievalHit {
        chunk_text: "2号红色方形，坐标：x=0.1, z=0.3".into(),
        similarity_score: 0.9,
        map_id: Some("m1".into()),
    };
    let corridor = RetrievalHit {
        chunk_text: "航线走廊限高2米".into(),
        similarity_score: 0.45,
        map_id: Some("m1".into()),
    };
    let scripted = Arc::new(ScriptedRag {
        smart: json!({"hits": [point2], "total_found": 1, "duration_ms": 2}),
        missing: Mutex::new(
            [
                // 补检 #1：合入一条新命中
                json!({"hits": [corridor.clone()], "total_found": 1, "duration_ms": 2}),
                // 补检 #2：同一条命中，去重后零新增
                json!({"hits": [corridor], "total_found": 1, "duration_ms": 2}),
            ]
            .into_iter()
            .collect(),
        ),
    });
    let card = AgentCard::new("rag", "http://127.0.0.1:0")
        .with_skill(SkillCard::new("smart_retrieve", "scripted"))
        .with_skill(SkillCard::new("retrieve_missing", "scripted"));
    let mut rag_server = A2aServer::new(card);
    rag_server.register("smart_retrieve", Arc::new(SmartSkill(Arc::clone(&scripted))));
    rag_server.register("retrieve_missing", Arc::new(MissingSkill(scripted)));
    let rag_addr = Arc::new(rag_server)
        .serve(any_addr, token.clone())
        .await
        .unwrap();

    // 真实 planner：每次都要求澄清
    let planner_llm = Arc::new(MockLlm::new());
    let clarify = r#"{"reasoning": "points 3 and 6 are unknown", "needs_clarification": true,
        "clarification_question": "请提供3号和6号的位置信息",
        "missing_locations": ["3号", "6号"], "steps": []}"#;
    for _ in 0..3 {
        planner_llm.push_response(clarify);
    }
    let planner = Arc::new(PlannerAgent::new(
        Arc::clone(&planner_llm) as Arc<dyn dragonfly::llm::LlmClient>
    ));
    let planner_addr = Arc::new(build_planner_server(planner, "http://127.0.0.1:0"))
        .serve(any_addr, token.clone())
        .await
        .unwrap();

    // 真实 executor
    let endpoint = Arc::new(TestEndpoint::with_drone_tools());
    let executor = Arc::new(ExecutorAgent::new(
        Arc::clone(&endpoint) as Arc<dyn ToolEndpoint>,
        TimeoutPolicy::new(5, 10_000),
    ));
    let executor_addr = Arc::new(build_executor_server(executor, "http://127.0.0.1:0"))
        .serve(any_addr, token.clone())
        .await
        .unwrap();

    let mut client = A2aClient::new(Duration::from_secs(5));
    client.register("rag", format!("http://{}", rag_addr));
    client.register("planner", format!("http://{}", planner_addr));
    client.register("executor", format!("http://{}", executor_addr));
    let orchestrator = OrchestratorAgent::new(
        Arc::new(client),
        10,
        ReactConfig {
            step_timeout: Duration::from_secs(5),
            execute_timeout: Duration::from_secs(10),
            ..Default::default()
        },
    );

    let resp = orchestrator
        .chat(ChatRequest {
            message: "fly through points 2, 3, 6".into(),
            ..Default::default()
        })
        .await;
    token.cancel();

    assert!(resp.needs_clarification);
    assert_eq!(resp.rag_retries, 2);
    assert!(resp.react_iterations >= 2);
    assert!(resp.answer.contains("3号"));
    let plan = resp.plan.as_ref().unwrap();
    assert_eq!(plan.missing_locations, vec!["3号", "6号"]);
    assert!(plan.steps.is_empty());
    // 补检合入的命中保留在响应里
    assert!(resp
        .rag_hits
        .iter()
        .any(|h| h.chunk_text.contains("航线走廊")));
}

/// 场景 4：执行失败 + 补救
#[tokio::test]
async fn test_execution_failure_then_remediation() {
    let endpoint = TestEndpoint::with_drone_tools();
    endpoint.fail_once("drone.move_to");
    let h = harness_with(&[], endpoint).await;

    h.rag_llm.push_response(no_targets());
    // 第 1 轮：两步计划，第二步会失败
    h.planner_llm.push_response(
        r#"{"reasoning": "take off then move", "needs_clarification": false,
            "steps": [
                {"tool": "drone.take_off", "args": {"altitude": 1.0}, "description": ""},
                {"tool": "drone.move_to", "args": {"x": 1.0, "y": 1.0, "z": 0.0}, "description": ""}
            ]}"#,
    );
    h.planner_llm.push_response(
        r#"{"observation": "step 2 failed", "reasoning": "move was not executed",
            "goal_achieved": false, "confidence": 0.3,
            "next_steps": [{"tool": "drone.move_to", "args": {"x": 1.0, "y": 1.0, "z": 0.0}, "description": "重试"}],
            "summary": "第二步失败，准备重试"}"#,
    );
    // 第 2 轮：重试成功
    h.planner_llm.push_response(
        r#"{"reasoning": "retry the failed move", "needs_clarification": false,
            "steps": [{"tool": "drone.move_to", "args": {"x": 1.0, "y": 1.0, "z": 0.0}, "description": "重试"}]}"#,
    );
    h.planner_llm.push_response(reflect_done());

    let resp = h
        .orchestrator
        .chat(ChatRequest {
            message: "fly to (1, 0)".into(),
            ..Default::default()
        })
        .await;

    assert_eq!(resp.react_iterations, 2);
    assert!(!resp.reflections.is_empty());
    assert!(!resp.reflections[0].goal_achieved);
    assert!(resp.goal_achieved);
    // take_off 1 次 + move_to 失败 1 次 + 重试 1 次
    assert_eq!(h.endpoint.calls_of("drone.move_to"), 2);
    assert_eq!(resp.tool_calls.len(), 3);
    assert!(resp.tool_calls.iter().any(|c| !c.success));
}

/// 场景 5：相对运动默认边长
#[tokio::test]
async fn test_relative_motion_default_side() {
    let h = harness_with(&[], TestEndpoint::with_drone_tools()).await;
    h.rag_llm.push_response(no_targets());
    h.planner_llm.push_response(
        r#"{"reasoning": "equilateral triangle with default side 2.0 in world frame",
            "needs_clarification": false,
            "steps": [
                {"tool": "drone.take_off", "args": {"altitude": 1.0}, "description": ""},
                {"tool": "drone.move_relative", "args": {"dx": 2.0, "dz": 0.0, "frame": "world"}, "description": "边1"},
                {"tool": "drone.move_relative", "args": {"dx": -1.0, "dz": 1.732, "frame": "world"}, "description": "边2"},
                {"tool": "drone.move_relative", "args": {"dx": -1.0, "dz": -1.732, "frame": "world"}, "description": "边3"}
            ]}"#,
    );
    h.planner_llm.push_response(reflect_done());

    let resp = h
        .orchestrator
        .chat(ChatRequest {
            message: "draw a triangle".into(),
            ..Default::default()
        })
        .await;

    assert!(!resp.needs_clarification);
    assert!(resp.goal_achieved);
    let plan = resp.plan.as_ref().unwrap();
    assert_eq!(plan.steps[1].tool, "drone.move_relative");
    assert_eq!(plan.steps[1].args["dx"], 2.0);
    assert_eq!(plan.steps[1].args["frame"], "world");
    assert_eq!(h.endpoint.calls_of("drone.move_relative"), 3);
}

/// 场景 6：预算耗尽
#[tokio::test]
async fn test_budget_exhaustion() {
    let h = harness_with(&[], TestEndpoint::with_drone_tools()).await;
    h.rag_llm.push_response(no_targets());
    let plan = r#"{"reasoning": "hover adjustment", "needs_clarification": false,
        "steps": [{"tool": "drone.move_relative", "args": {"dx": 0.1}, "description": ""}]}"#;
    let reflect = r#"{"observation": "still drifting", "reasoning": "not settled",
        "goal_achieved": false, "confidence": 0.2,
        "next_steps": [{"tool": "drone.move_relative", "args": {"dx": 0.1}, "description": ""}],
        "summary": "还未稳定"}"#;
    for _ in 0..3 {
        h.planner_llm.push_response(plan);
        h.planner_llm.push_response(reflect);
    }

    let resp = h
        .orchestrator
        .chat(ChatRequest {
            message: "hold position precisely".into(),
            ..Default::default()
        })
        .await;

    assert_eq!(resp.react_iterations, 3);
    assert!(!resp.goal_achieved);
    assert!(resp.answer.contains("validation rounds"));
    assert_eq!(resp.reflections.len(), 3);
    // 不变量 2 / 5
    assert!(resp.react_iterations <= 3);
    for r in &resp.reflections {
        assert!((0.0..=1.0).contains(&r.confidence));
    }
}

// ---- 边界用例 ----

/// 空工具目录：规划被拒绝，响应转为澄清且无步骤
#[tokio::test]
async fn test_empty_tool_catalog() {
    let h = harness_with(&[], TestEndpoint::empty()).await;
    h.rag_llm.push_response(no_targets());

    let resp = h
        .orchestrator
        .chat(ChatRequest {
            message: "take off".into(),
            ..Default::default()
        })
        .await;

    assert!(!resp.success);
    assert!(resp.needs_clarification);
    assert!(resp.error.as_deref().unwrap().contains("NoToolsAvailable"));
    assert!(resp.tool_calls.is_empty());
}

/// 零步骤计划：按「无可执行」完成
#[tokio::test]
async fn test_zero_step_plan() {
    let h = harness_with(&[], TestEndpoint::with_drone_tools()).await;
    h.rag_llm.push_response(no_targets());
    h.planner_llm.push_response(
        r#"{"reasoning": "the drone is already landed, nothing to do",
            "needs_clarification": false, "steps": []}"#,
    );

    let resp = h
        .orchestrator
        .chat(ChatRequest {
            message: "land".into(),
            ..Default::default()
        })
        .await;

    assert!(resp.goal_achieved);
    assert!(resp.tool_calls.is_empty());
    assert!(resp.answer.contains("Nothing to execute"));
    assert_eq!(resp.react_iterations, 1);
}

/// reflect 失败：按执行结果视作完成退出
#[tokio::test]
async fn test_reflection_failure_assumes_completion() {
    let h = harness_with(&[], TestEndpoint::with_drone_tools()).await;
    h.rag_llm.push_response(no_targets());
    h.planner_llm.push_response(
        r#"{"reasoning": "take off", "needs_clarification": false,
            "steps": [{"tool": "drone.take_off", "args": {"altitude": 1.0}, "description": ""}]}"#,
    );
    h.planner_llm.push_response("utter model garbage");

    let resp = h
        .orchestrator
        .chat(ChatRequest {
            message: "take off".into(),
            ..Default::default()
        })
        .await;

    assert!(resp.goal_achieved);
    assert!(resp.execution_success);
    assert_eq!(resp.react_iterations, 1);
    assert!(resp.reflections.is_empty());
}

// ---- 响应级不变量 ----

/// 事件流：request_start 居首、request_end 居尾、*_end 时长合计不超过响应时长
#[tokio::test]
async fn test_event_stream_invariants() {
    let h = harness_with(&[], TestEndpoint::with_drone_tools()).await;
    h.rag_llm.push_response(no_targets());
    h.planner_llm.push_response(
        r#"{"reasoning": "take off", "needs_clarification": false,
            "steps": [{"tool": "drone.take_off", "args": {"altitude": 1.0}, "description": ""}]}"#,
    );
    h.planner_llm.push_response(reflect_done());

    let mut rx = h.orchestrator.events().subscribe("*");
    let resp = h
        .orchestrator
        .chat(ChatRequest {
            message: "take off".into(),
            ..Default::default()
        })
        .await;

    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    assert!(!events.is_empty());
    assert_eq!(events.first().unwrap().event_type, "request_start");
    assert_eq!(events.last().unwrap().event_type, "request_end");
    assert!(events.iter().all(|e| e.request_id == resp.request_id));

    let stage_total: u64 = events
        .iter()
        .filter(|e| e.event_type.ends_with("_end") && e.event_type != "request_end")
        .filter_map(|e| e.payload.get("duration_ms").and_then(Value::as_u64))
        .sum();
    assert!(stage_total <= resp.duration_ms);

    // 成对事件
    for kind in ["retrieval", "tools", "plan", "execute", "reflect"] {
        let starts = events
            .iter()
            .filter(|e| e.event_type == format!("{}_start", kind))
            .count();
        let ends = events
            .iter()
            .filter(|e| e.event_type == format!("{}_end", kind))
            .count();
        assert_eq!(starts, ends, "{} start/end mismatch", kind);
    }
}

/// 会话历史上界：多轮之后不超过 2 × max_history_length
#[tokio::test]
async fn test_session_history_bound() {
    let h = harness_with(&[], TestEndpoint::with_drone_tools()).await;
    let mut session_id = None;
    for _ in 0..12 {
        h.rag_llm.push_response(no_targets());
        h.planner_llm.push_response(
            r#"{"reasoning": "noop", "needs_clarification": false, "steps": []}"#,
        );
        let resp = h
            .orchestrator
            .chat(ChatRequest {
                message: "status?".into(),
                session_id: session_id.clone(),
                ..Default::default()
            })
            .await;
        session_id = Some(resp.session_id);
    }
    let history = h
        .orchestrator
        .sessions()
        .history(session_id.as_deref().unwrap())
        .await;
    assert!(history.len() <= 20);
}

/// 计划中的工具名全部来自目录快照（不变量 1）
#[tokio::test]
async fn test_plan_tools_within_catalog() {
    let h = harness_with(&[], TestEndpoint::with_drone_tools()).await;
    h.rag_llm.push_response(no_targets());
    // 计划夹带一个目录外工具，应被丢弃
    h.planner_llm.push_response(
        r#"{"reasoning": "mixed", "needs_clarification": false,
            "steps": [
                {"tool": "drone.take_off", "args": {"altitude": 1.0}, "description": ""},
                {"tool": "drone.self_destruct", "args": {}, "description": ""}
            ]}"#,
    );
    h.planner_llm.push_response(reflect_done());

    let resp = h
        .orchestrator
        .chat(ChatRequest {
            message: "take off".into(),
            ..Default::default()
        })
        .await;

    let catalog: HashSet<String> = h
        .endpoint
        .tools
        .iter()
        .map(|t| t.name.clone())
        .collect();
    for step in &resp.plan.as_ref().unwrap().steps {
        assert!(catalog.contains(&step.tool));
    }
    for reflection in &resp.reflections {
        for step in &reflection.next_steps {
            assert!(catalog.contains(&step.tool));
        }
    }
}
