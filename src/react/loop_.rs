//! ReAct 主循环
//!
//! 一次请求的固定推进序：RAG → STATE → TOOLS → PLAN → [补检 → PLAN]* →
//! EXEC → OBSERVE → REFLECT → {PLAN | DONE}。
//! 准备阶段全部尽力而为；plan 失败对请求致命；reflect 失败按「视作完成」退出。
//! 每个阶段发出成对 *_start / *_end 事件。

use serde_json::{json, Value};

use crate::executor::{DroneState, ExecutionReport, StepResult, ToolDescriptor};
use crate::planner::{Plan, PlanInput, Reflection, ReflectInput};
use crate::rag::{RetrievalHit, RetrievalPayload};
use crate::react::events::AgentEvent;
use crate::react::orchestrator::OrchestratorAgent;

/// 一次请求的不变输入
pub(crate) struct RequestContext {
    pub request_id: String,
    pub session_id: String,
    pub message: String,
    /// 已合入 map_id 的检索过滤条件
    pub filters: Value,
}

/// 循环产出，由编排层聚合为 ChatResponse
#[derive(Default)]
pub(crate) struct ReactOutcome {
    pub answer: String,
    pub error: Option<String>,
    pub needs_clarification: bool,
    pub plan: Option<Plan>,
    pub tool_calls: Vec<StepResult>,
    pub rag_hits: Vec<RetrievalHit>,
    pub execution_success: bool,
    pub goal_achieved: bool,
    pub iterations: usize,
    pub rag_retries: usize,
    pub reflections: Vec<Reflection>,
}

/// 执行有界 ReAct 循环
pub(crate) async fn run_react(orch: &OrchestratorAgent, ctx: &RequestContext) -> ReactOutcome {
    let mut outcome = ReactOutcome {
        execution_success: true,
        ..Default::default()
    };

    // ---- 准备阶段（每请求一次，全部尽力而为） ----

    let mut hits = prepare_retrieval(orch, ctx).await;
    let mut drone_state = fetch_drone_state(orch, ctx, "prep_state").await;
    let tools = prepare_tools(orch, ctx).await;

    // ---- 循环 ----

    let mut last_execution: Option<ExecutionReport> = None;

    while outcome.iterations < orch.config.max_iterations && !outcome.goal_achieved {
        outcome.iterations += 1;

        // a. Plan（失败对请求致命）
        let plan = match submit_plan(orch, ctx, &hits, &drone_state, &tools, outcome.iterations).await
        {
            Ok(plan) => plan,
            Err(error) => {
                outcome.rag_hits = hits;
                return fatal_plan_failure(outcome, error);
            }
        };

        // b. 澄清处理
        if plan.needs_clarification {
            if !plan.missing_locations.is_empty()
                && outcome.rag_retries < orch.config.max_rag_retries
            {
                outcome.rag_retries += 1;
                let added =
                    retry_missing(orch, ctx, &plan.missing_locations, &mut hits, outcome.rag_retries)
                        .await;
                if added > 0 {
                    // 带上更丰富的上下文重新规划
                    outcome.plan = Some(plan);
                    continue;
                }
                // 零新增命中：不再空转，落到澄清返回
            }
            let question = if plan.clarification_question.is_empty() {
                "I need more information to locate the places you mentioned. Could you clarify?"
                    .to_string()
            } else {
                plan.clarification_question.clone()
            };
            outcome.answer = question;
            outcome.needs_clarification = true;
            outcome.plan = Some(plan);
            outcome.rag_hits = hits;
            return outcome;
        }

        // c. Act：无步骤即视为目标达成
        if plan.steps.is_empty() {
            outcome.goal_achieved = true;
            outcome.plan = Some(plan);
            break;
        }

        let report = execute_plan(orch, ctx, &plan).await;
        outcome.execution_success = report.all_success;
        outcome.tool_calls.extend(report.results.iter().cloned());

        // d. Observe
        drone_state = fetch_drone_state(orch, ctx, "observe").await;

        // e./f. Reflect（失败 → 视作完成退出）
        match submit_reflect(orch, ctx, &plan, &report, &drone_state, &hits, &tools).await {
            Ok(reflection) => {
                let accept = reflection.goal_achieved
                    && reflection.confidence >= orch.config.confidence_threshold;
                let has_next = !reflection.next_steps.is_empty();
                outcome.reflections.push(reflection);
                outcome.plan = Some(plan);
                last_execution = Some(report);
                if accept {
                    outcome.goal_achieved = true;
                    break;
                }
                if has_next {
                    continue;
                }
                // 无补救步骤：结束循环，目标未正式确认
                break;
            }
            Err(e) => {
                tracing::warn!("reflection failed, assuming completion: {}", e);
                outcome.plan = Some(plan);
                outcome.goal_achieved = report.all_success;
                last_execution = Some(report);
                break;
            }
        }
    }

    outcome.rag_hits = hits;
    outcome.answer = aggregate_answer(&outcome, &last_execution, orch.config.max_iterations);
    outcome
}

// ---- 各阶段 ----

async fn prepare_retrieval(orch: &OrchestratorAgent, ctx: &RequestContext) -> Vec<RetrievalHit> {
    orch.emit(AgentEvent::new(
        "retrieval_start",
        &ctx.request_id,
        "rag",
        "retrieval",
    ));
    let start = std::time::Instant::now();
    let result = orch
        .client
        .submit(
            "rag",
            "smart_retrieve",
            json!({"query": ctx.message, "filters": ctx.filters}),
            Some(&ctx.session_id),
            Some(orch.config.step_timeout),
        )
        .await;

    let hits = match result.parse_output::<RetrievalPayload>() {
        Ok(payload) => {
            if let Some(per_target) = &payload.per_target {
                for (target, count) in per_target {
                    if *count == 0 {
                        tracing::warn!("retrieval target '{}' had zero hits", target);
                    }
                }
            }
            payload.hits
        }
        Err(e) => {
            tracing::warn!("smart_retrieve failed (continuing without hits): {}", e);
            Vec::new()
        }
    };
    orch.emit(
        AgentEvent::new("retrieval_end", &ctx.request_id, "rag", "retrieval")
            .with("hits", json!(hits.len()))
            .with("duration_ms", json!(start.elapsed().as_millis() as u64)),
    );
    hits
}

async fn fetch_drone_state(
    orch: &OrchestratorAgent,
    ctx: &RequestContext,
    phase: &str,
) -> Option<DroneState> {
    orch.emit(AgentEvent::new(
        "state_start",
        &ctx.request_id,
        "executor",
        phase,
    ));
    let start = std::time::Instant::now();
    let result = orch
        .client
        .submit(
            "executor",
            "get_drone_state",
            json!({}),
            Some(&ctx.session_id),
            Some(orch.config.step_timeout),
        )
        .await;
    let state = match result.parse_output::<DroneState>() {
        Ok(state) => Some(state),
        Err(e) => {
            tracing::warn!("get_drone_state failed (continuing without state): {}", e);
            None
        }
    };
    orch.emit(
        AgentEvent::new("state_end", &ctx.request_id, "executor", phase)
            .with("known", json!(state.is_some()))
            .with("duration_ms", json!(start.elapsed().as_millis() as u64)),
    );
    state
}

async fn prepare_tools(orch: &OrchestratorAgent, ctx: &RequestContext) -> Vec<ToolDescriptor> {
    orch.emit(AgentEvent::new(
        "tools_start",
        &ctx.request_id,
        "executor",
        "prep_tools",
    ));
    let start = std::time::Instant::now();
    let result = orch
        .client
        .submit(
            "executor",
            "list_tools",
            json!({}),
            Some(&ctx.session_id),
            Some(orch.config.step_timeout),
        )
        .await;

    #[derive(serde::Deserialize)]
    struct ToolsOut {
        tools: Vec<ToolDescriptor>,
    }
    let tools = match result.parse_output::<ToolsOut>() {
        Ok(out) => out.tools,
        Err(e) => {
            tracing::warn!("list_tools failed (planner will ask for clarification): {}", e);
            Vec::new()
        }
    };
    orch.emit(
        AgentEvent::new("tools_end", &ctx.request_id, "executor", "prep_tools")
            .with("count", json!(tools.len()))
            .with("duration_ms", json!(start.elapsed().as_millis() as u64)),
    );
    tools
}

async fn submit_plan(
    orch: &OrchestratorAgent,
    ctx: &RequestContext,
    hits: &[RetrievalHit],
    drone_state: &Option<DroneState>,
    tools: &[ToolDescriptor],
    iteration: usize,
) -> Result<Plan, String> {
    orch.emit(
        AgentEvent::new("plan_start", &ctx.request_id, "planner", "plan")
            .with("iteration", json!(iteration)),
    );
    let start = std::time::Instant::now();
    let input = PlanInput {
        user_request: ctx.message.clone(),
        rag_hits: hits.to_vec(),
        drone_state: drone_state.clone(),
        available_tools: tools.to_vec(),
    };
    let result = orch
        .client
        .submit(
            "planner",
            "plan",
            serde_json::to_value(&input).unwrap_or_default(),
            Some(&ctx.session_id),
            Some(orch.config.step_timeout),
        )
        .await;
    let plan = result.parse_output::<Plan>();
    orch.emit(
        AgentEvent::new("plan_end", &ctx.request_id, "planner", "plan")
            .with("iteration", json!(iteration))
            .with(
                "steps",
                json!(plan.as_ref().map(|p| p.steps.len()).unwrap_or(0)),
            )
            .with(
                "needs_clarification",
                json!(plan
                    .as_ref()
                    .map(|p| p.needs_clarification)
                    .unwrap_or(false)),
            )
            .with("duration_ms", json!(start.elapsed().as_millis() as u64)),
    );
    plan
}

/// 补检缺失目标并合并命中；返回新增条数
async fn retry_missing(
    orch: &OrchestratorAgent,
    ctx: &RequestContext,
    missing: &[String],
    hits: &mut Vec<RetrievalHit>,
    retry: usize,
) -> usize {
    orch.emit(
        AgentEvent::new("rag_retry_start", &ctx.request_id, "rag", "clarify_retry")
            .with("retry", json!(retry))
            .with("targets", json!(missing)),
    );
    let start = std::time::Instant::now();
    let result = orch
        .client
        .submit(
            "rag",
            "retrieve_missing",
            json!({"missing_targets": missing, "filters": ctx.filters}),
            Some(&ctx.session_id),
            Some(orch.config.step_timeout),
        )
        .await;

    let added = match result.parse_output::<RetrievalPayload>() {
        Ok(payload) => merge_hits(hits, payload.hits),
        Err(e) => {
            tracing::warn!("retrieve_missing failed: {}", e);
            0
        }
    };
    orch.emit(
        AgentEvent::new("rag_retry_end", &ctx.request_id, "rag", "clarify_retry")
            .with("retry", json!(retry))
            .with("new_hits", json!(added))
            .with("duration_ms", json!(start.elapsed().as_millis() as u64)),
    );
    added
}

async fn execute_plan(
    orch: &OrchestratorAgent,
    ctx: &RequestContext,
    plan: &Plan,
) -> ExecutionReport {
    orch.emit(
        AgentEvent::new("execute_start", &ctx.request_id, "executor", "act")
            .with("steps", json!(plan.steps.len())),
    );
    let start = std::time::Instant::now();
    let result = orch
        .client
        .submit(
            "executor",
            "execute",
            json!({"steps": plan.steps, "stop_on_error": true}),
            Some(&ctx.session_id),
            Some(orch.config.execute_timeout),
        )
        .await;

    let report = match result.parse_output::<ExecutionReport>() {
        Ok(report) => report,
        Err(e) => {
            tracing::warn!("execute failed at transport level: {}", e);
            ExecutionReport {
                results: vec![],
                all_success: false,
                completed_steps: 0,
                total_steps: plan.steps.len(),
                total_duration_ms: start.elapsed().as_millis() as u64,
            }
        }
    };
    orch.emit(
        AgentEvent::new("execute_end", &ctx.request_id, "executor", "act")
            .with("completed", json!(report.completed_steps))
            .with("total", json!(report.total_steps))
            .with("all_success", json!(report.all_success))
            .with("duration_ms", json!(start.elapsed().as_millis() as u64)),
    );
    report
}

async fn submit_reflect(
    orch: &OrchestratorAgent,
    ctx: &RequestContext,
    plan: &Plan,
    report: &ExecutionReport,
    drone_state: &Option<DroneState>,
    hits: &[RetrievalHit],
    tools: &[ToolDescriptor],
) -> Result<Reflection, String> {
    orch.emit(AgentEvent::new(
        "reflect_start",
        &ctx.request_id,
        "planner",
        "reflect",
    ));
    let start = std::time::Instant::now();
    let input = ReflectInput {
        original_request: ctx.message.clone(),
        previous_plan: plan.clone(),
        execution_result: serde_json::to_value(report).unwrap_or_default(),
        current_drone_state: drone_state.clone(),
        rag_hits: hits.to_vec(),
        available_tools: tools.to_vec(),
    };
    let result = orch
        .client
        .submit(
            "planner",
            "reflect",
            serde_json::to_value(&input).unwrap_or_default(),
            Some(&ctx.session_id),
            Some(orch.config.step_timeout),
        )
        .await;
    let reflection = result.parse_output::<Reflection>();
    orch.emit(
        AgentEvent::new("reflect_end", &ctx.request_id, "planner", "reflect")
            .with(
                "goal_achieved",
                json!(reflection
                    .as_ref()
                    .map(|r| r.goal_achieved)
                    .unwrap_or(false)),
            )
            .with(
                "confidence",
                json!(reflection.as_ref().map(|r| r.confidence).unwrap_or(0.0)),
            )
            .with("duration_ms", json!(start.elapsed().as_millis() as u64)),
    );
    reflection
}

// ---- 聚合与失败整形 ----

/// plan 失败：NoToolsAvailable 单独致歉，其余原样描述
fn fatal_plan_failure(mut outcome: ReactOutcome, error: String) -> ReactOutcome {
    if error.contains("NoToolsAvailable") {
        outcome.answer =
            "I'm sorry, I can't control the drone right now: the executor reports no available tools."
                .to_string();
        outcome.needs_clarification = true;
    } else {
        outcome.answer = format!("I couldn't plan this request: {}", error);
    }
    outcome.error = Some(error);
    outcome.execution_success = false;
    outcome
}

/// 拼接回答：计划 reasoning + 执行摘要 + 复盘摘要 + 轮数注记
fn aggregate_answer(
    outcome: &ReactOutcome,
    last_execution: &Option<ExecutionReport>,
    max_iterations: usize,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(plan) = &outcome.plan {
        if !plan.reasoning.is_empty() {
            parts.push(plan.reasoning.clone());
        }
    }

    match last_execution {
        Some(report) => parts.push(format!(
            "Executed {}/{} steps successfully.",
            report.completed_steps, report.total_steps
        )),
        None => parts.push("Nothing to execute.".to_string()),
    }

    if let Some(reflection) = outcome.reflections.last() {
        if !reflection.summary.is_empty() {
            parts.push(reflection.summary.clone());
        }
    }

    if !outcome.goal_achieved && outcome.iterations >= max_iterations {
        parts.push(format!(
            "Stopped after {} validation rounds without confirming the goal.",
            outcome.iterations
        ));
    } else if outcome.iterations > 1 {
        parts.push(format!(
            "(completed after {} validation rounds)",
            outcome.iterations
        ));
    }

    parts.join("\n\n")
}

/// 按 chunk_text 去重合并，保留更高分；返回新增条数
fn merge_hits(hits: &mut Vec<RetrievalHit>, incoming: Vec<RetrievalHit>) -> usize {
    let mut added = 0;
    for hit in incoming {
        match hits.iter_mut().find(|h| h.chunk_text == hit.chunk_text) {
            Some(existing) => {
                if hit.similarity_score > existing.similarity_score {
                    existing.similarity_score = hit.similarity_score;
                }
            }
            None => {
                hits.push(hit);
                added += 1;
            }
        }
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(text: &str, score: f64) -> RetrievalHit {
        RetrievalHit {
            chunk_text: text.into(),
            similarity_score: score,
            map_id: None,
        }
    }

    #[test]
    fn test_merge_hits_counts_only_new_chunks() {
        let mut hits = vec![hit("a", 0.6)];
        let added = merge_hits(&mut hits, vec![hit("a", 0.9), hit("b", 0.5)]);
        assert_eq!(added, 1);
        assert_eq!(hits.len(), 2);
        // 去重保留更高分
        assert!((hits[0].similarity_score - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_aggregate_answer_budget_exhausted() {
        let outcome = ReactOutcome {
            iterations: 3,
            goal_achieved: false,
            plan: Some(Plan {
                reasoning: "take off then move".into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let report = ExecutionReport {
            completed_steps: 2,
            total_steps: 2,
            all_success: true,
            ..Default::default()
        };
        let answer = aggregate_answer(&outcome, &Some(report), 3);
        assert!(answer.contains("take off then move"));
        assert!(answer.contains("2/2"));
        assert!(answer.contains("validation rounds without confirming"));
    }

    #[test]
    fn test_aggregate_answer_single_round() {
        let outcome = ReactOutcome {
            iterations: 1,
            goal_achieved: true,
            ..Default::default()
        };
        let answer = aggregate_answer(&outcome, &None, 3);
        assert!(answer.contains("Nothing to execute."));
        assert!(!answer.contains("validation rounds"));
    }

    #[test]
    fn test_fatal_plan_failure_no_tools() {
        let outcome = fatal_plan_failure(ReactOutcome::default(), "NoToolsAvailable".into());
        assert!(outcome.needs_clarification);
        assert!(outcome.answer.contains("no available tools"));
        assert_eq!(outcome.error.as_deref(), Some("NoToolsAvailable"));
    }
}
