//! 规划输出校验
//!
//! 工具白名单过滤、missing_locations 规范化、置信度截断。
//! 不合规步骤丢弃并告警，整体为空时由上层按「无步骤」语义处理。

use std::collections::HashSet;

use crate::executor::ToolDescriptor;
use crate::planner::PlanStep;

/// 由工具目录构造白名单
pub fn allowed_tool_set(tools: &[ToolDescriptor]) -> HashSet<String> {
    tools.iter().map(|t| t.name.clone()).collect()
}

/// 仅保留工具在白名单内且 args 为 object 的步骤
pub fn filter_steps(steps: Vec<PlanStep>, allowed: &HashSet<String>) -> Vec<PlanStep> {
    steps
        .into_iter()
        .filter(|step| {
            if !allowed.contains(&step.tool) {
                tracing::warn!("dropping step with unknown tool '{}'", step.tool);
                return false;
            }
            if !step.args.is_object() {
                tracing::warn!("dropping step '{}' with non-object args", step.tool);
                return false;
            }
            true
        })
        .collect()
}

/// 去空白、去空串
pub fn normalize_locations(locations: Vec<String>) -> Vec<String> {
    locations
        .into_iter()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

/// 置信度截断到 [0, 1]
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        return 0.0;
    }
    confidence.clamp(0.0, 1.0)
}
