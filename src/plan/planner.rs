//! Planner：规划提示词组装与决策解析
//!
//! 每轮向推理引擎给出：用户问题、文件元数据、能力清单、任务图摘要、黑板
//! 有界摘要与失败记录，要求只输出一个 JSON 决策。解析容忍 ```json 围栏、
//! 正文夹杂与 reasoner 模型的 <think> 块；解析失败统一报 ParseError，
//! 由恢复引擎注入纠错提示重试。

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::Value;

use crate::core::AgentError;
use crate::graph::NodeId;
use crate::llm::{LlmClient, Message};
use crate::plan::state::SessionState;

/// 一次工具调用请求（引用尚未解析）
#[derive(Debug, Clone)]
pub struct ToolCallReq {
    pub tool: String,
    pub args: Value,
    /// 规划器指定的顺序约束（控制依赖边的来源节点）
    pub after: Vec<NodeId>,
}

/// 规划决策
#[derive(Debug, Clone)]
pub enum PlannerDecision {
    /// 调用一个或多个能力；多于一个即显式并行分支
    Invoke { calls: Vec<ToolCallReq> },
    /// 结束会话，携带结论草稿
    Terminate { answer: String },
    /// 放弃
    Abort { reason: String },
}

#[derive(Debug, Deserialize)]
struct ToolCallWire {
    tool: String,
    #[serde(default)]
    args: Value,
    #[serde(default)]
    after: Vec<NodeId>,
}

#[derive(Debug, Deserialize)]
struct DecisionWire {
    decision: String,
    tool: Option<String>,
    args: Option<Value>,
    #[serde(default)]
    after: Vec<NodeId>,
    calls: Option<Vec<ToolCallWire>>,
    answer: Option<String>,
    reason: Option<String>,
}

/// 决策格式（仅用于生成注入提示词的 JSON Schema）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct DecisionFormat {
    /// "invoke" | "finish" | "abort"
    pub decision: String,
    /// invoke 单调用时的工具名
    pub tool: Option<String>,
    /// invoke 单调用时的参数
    pub args: Option<HashMap<String, Value>>,
    /// invoke 多调用（并行分支）时的调用列表
    pub calls: Option<Vec<HashMap<String, Value>>>,
    /// finish 时的结论草稿
    pub answer: Option<String>,
    /// abort 时的原因
    pub reason: Option<String>,
}

/// 决策 JSON Schema 字符串，拼入 system prompt
fn decision_schema_json() -> String {
    let schema = schema_for!(DecisionFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| String::new())
}

fn think_block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<think>.*?</think>").expect("valid regex"))
}

/// 从引擎原始输出中抽出 JSON 文本：剥 <think> 块，认 ```json 围栏，
/// 否则取最外层花括号
fn extract_json(raw: &str) -> Option<String> {
    let cleaned = think_block_re().replace_all(raw, "");
    let trimmed = cleaned.trim();

    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let inner = rest
            .find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or_else(|| rest.trim());
        return Some(inner.to_string());
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end < start {
        return None;
    }
    Some(trimmed[start..=end].to_string())
}

/// 解析推理引擎输出为恰好一个决策
pub fn parse_decision(raw: &str) -> Result<PlannerDecision, AgentError> {
    let json_str = extract_json(raw)
        .ok_or_else(|| AgentError::ParseError(format!("输出中没有 JSON 对象: {}", preview(raw))))?;

    let wire: DecisionWire = serde_json::from_str(&json_str)
        .map_err(|e| AgentError::ParseError(format!("{}: {}", e, preview(&json_str))))?;

    match wire.decision.as_str() {
        "invoke" => {
            let mut calls = Vec::new();
            if let Some(list) = wire.calls {
                for c in list {
                    calls.push(ToolCallReq {
                        tool: c.tool,
                        args: normalize_args(c.args),
                        after: c.after,
                    });
                }
            }
            if let Some(tool) = wire.tool {
                calls.push(ToolCallReq {
                    tool,
                    args: normalize_args(wire.args.unwrap_or(Value::Null)),
                    after: wire.after,
                });
            }
            if calls.is_empty() {
                return Err(AgentError::ParseError(
                    "invoke 决策缺少 tool 或 calls".to_string(),
                ));
            }
            if calls.iter().any(|c| c.tool.is_empty()) {
                return Err(AgentError::ParseError("invoke 决策中 tool 为空".to_string()));
            }
            Ok(PlannerDecision::Invoke { calls })
        }
        "finish" | "terminate" => Ok(PlannerDecision::Terminate {
            answer: wire.answer.unwrap_or_default(),
        }),
        "abort" => Ok(PlannerDecision::Abort {
            reason: wire.reason.unwrap_or_else(|| "unspecified".to_string()),
        }),
        other => Err(AgentError::ParseError(format!(
            "未知的 decision 值: {}",
            other
        ))),
    }
}

/// args 缺省（null）按空对象处理
fn normalize_args(args: Value) -> Value {
    if args.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        args
    }
}

fn preview(s: &str) -> String {
    const MAX: usize = 160;
    let p: String = s.chars().take(MAX).collect();
    if s.chars().count() > MAX {
        format!("{}...", p)
    } else {
        p
    }
}

/// Planner：持有推理引擎与按能力清单组装好的 system prompt
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, capability_catalog: &str) -> Self {
        let system_prompt = format!(
            "你是分析流程规划器。给定一个输入文件与用户问题，你每轮只输出一个 JSON 决策：\
             从能力清单中选择下一步调用的工具，或在信息足够时结束。\n\n\
             决策格式（只输出 JSON，不要输出其它文字）：\n\
             - 调用工具: {{\"decision\": \"invoke\", \"tool\": \"<名称>\", \"args\": {{...}}}}\n\
             - 并行分支: {{\"decision\": \"invoke\", \"calls\": [{{\"tool\": \"...\", \"args\": {{...}}}}, ...]}}\n\
             - 结束并给出结论: {{\"decision\": \"finish\", \"answer\": \"<结论草稿>\"}}\n\
             - 放弃: {{\"decision\": \"abort\", \"reason\": \"<原因>\"}}\n\n\
             参数取值规则：\n\
             - \"$input\" 表示输入文件路径；\"$query\" 表示用户问题\n\
             - \"$node:<id>\" 引用某个已成功节点的完整输出；\"$node:<id>.<字段>\" 引用其中一个字段\n\
             - 需要显式顺序约束时可加 \"after\": [<节点id>, ...]\n\n\
             规则：\n\
             - 同一能力可以换参数再次调用（会产生新节点），但不要重复完全相同的调用\n\
             - 只能引用已成功节点的输出；失败记录里列出的调用方式不要原样重试\n\
             - 注意节点预算，超出会被强制中止；信息足够就尽早 finish\n\n\
             能力清单：\n{}\n\n\
             决策 JSON Schema：\n{}",
            capability_catalog,
            decision_schema_json()
        );
        Self { llm, system_prompt }
    }

    pub fn base_system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// 获取推理引擎累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 发起一轮规划，返回引擎原始输出（解析由调用方做，便于纠错重试计数）
    pub async fn decide(
        &self,
        state: &SessionState,
        step: usize,
        max_steps: usize,
        preview_chars: usize,
    ) -> Result<String, AgentError> {
        let mut messages = vec![
            Message::system(self.system_prompt.clone()),
            Message::user(self.render_context(state, step, max_steps, preview_chars)),
        ];
        messages.extend(state.correctives.iter().cloned());
        self.llm
            .complete(&messages)
            .await
            .map_err(AgentError::LlmError)
    }

    /// 组装本轮用户消息：问题 + 文件元数据 + 图摘要 + 黑板摘要 + 失败记录 + 预算
    fn render_context(
        &self,
        state: &SessionState,
        step: usize,
        max_steps: usize,
        preview_chars: usize,
    ) -> String {
        let mut out = String::new();
        out.push_str(&format!("用户问题：{}\n\n", state.query));
        out.push_str(&format!(
            "输入文件：{}（模态 {}，{} 字节）\n\n",
            state.file.name,
            state.file.modality.as_str(),
            state.file.size_bytes
        ));
        out.push_str(&format!("任务图：\n{}\n\n", state.graph.summary()));
        if state.blackboard.is_empty() {
            out.push_str("黑板：（空）\n\n");
        } else {
            out.push_str(&format!(
                "黑板（截断摘要，完整内容用 $node 引用）：\n{}\n\n",
                state.blackboard.excerpt(preview_chars)
            ));
        }
        if !state.failures.is_empty() {
            out.push_str(&format!("失败记录：\n{}\n\n", state.failures.join("\n")));
        }
        out.push_str(&format!(
            "已用节点 {} / 预算 {}，当前第 {} 轮。请输出本轮决策 JSON。",
            state.graph.tool_node_count(),
            max_steps,
            step + 1
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_single_invoke() {
        let d = parse_decision(
            r#"{"decision": "invoke", "tool": "stat_summary", "args": {"path": "$input"}}"#,
        )
        .unwrap();
        match d {
            PlannerDecision::Invoke { calls } => {
                assert_eq!(calls.len(), 1);
                assert_eq!(calls[0].tool, "stat_summary");
                assert_eq!(calls[0].args, json!({"path": "$input"}));
            }
            _ => panic!("Expected Invoke"),
        }
    }

    #[test]
    fn test_parse_parallel_calls() {
        let d = parse_decision(
            r#"{"decision": "invoke", "calls": [
                {"tool": "time_plot", "args": {"path": "$input"}},
                {"tool": "freq_plot", "args": {"path": "$input"}, "after": [1]}
            ]}"#,
        )
        .unwrap();
        match d {
            PlannerDecision::Invoke { calls } => {
                assert_eq!(calls.len(), 2);
                assert_eq!(calls[1].after, vec![1]);
            }
            _ => panic!("Expected Invoke"),
        }
    }

    #[test]
    fn test_parse_fenced_json_with_prose() {
        let raw = "好的，下一步做统计。\n```json\n{\"decision\": \"finish\", \"answer\": \"完成\"}\n```";
        let d = parse_decision(raw).unwrap();
        assert!(matches!(d, PlannerDecision::Terminate { answer } if answer == "完成"));
    }

    #[test]
    fn test_parse_strips_think_block() {
        let raw = "<think>我该先看统计，{不是决策}</think>{\"decision\": \"abort\", \"reason\": \"x\"}";
        let d = parse_decision(raw).unwrap();
        assert!(matches!(d, PlannerDecision::Abort { reason } if reason == "x"));
    }

    #[test]
    fn test_parse_missing_args_defaults_to_object() {
        let d = parse_decision(r#"{"decision": "invoke", "tool": "time_plot"}"#).unwrap();
        match d {
            PlannerDecision::Invoke { calls } => assert!(calls[0].args.is_object()),
            _ => panic!("Expected Invoke"),
        }
    }

    #[test]
    fn test_parse_garbage_is_parse_error() {
        assert!(matches!(
            parse_decision("我觉得应该先统计一下"),
            Err(AgentError::ParseError(_))
        ));
        assert!(matches!(
            parse_decision(r#"{"decision": "dance"}"#),
            Err(AgentError::ParseError(_))
        ));
        assert!(matches!(
            parse_decision(r#"{"decision": "invoke"}"#),
            Err(AgentError::ParseError(_))
        ));
    }
}
