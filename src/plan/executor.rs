//! Executor：决策的唯一落地者
//!
//! 图与黑板只在这里被改写。invoke 决策先解析参数引用、过注册表契约闸门，
//! 再为每个合法调用建节点接边；多调用并行派发（tokio::spawn + 许可池 +
//! 单工具超时），全部汇合后才交还控制权。失败不自动重试同参调用，只记入
//! 失败节点让下一轮规划可见。每步结束做一次图不变量自检。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::timeout;

use crate::core::{AgentError, ToolScheduler};
use crate::graph::{EdgeKind, NodeId, TaskGraph};
use crate::plan::events::{emit, SessionEvent};
use crate::plan::planner::{PlannerDecision, ToolCallReq};
use crate::plan::state::SessionState;
use crate::tools::{Tool, ToolRegistry};

/// 一步执行的结果
#[derive(Debug)]
pub enum StepOutcome {
    /// 图已扩展（含失败节点的情况），回到规划
    Advanced,
    /// 规划器宣布结束，携带结论草稿
    Finished { draft: String },
    /// 规划器（或预算/截止强制）放弃
    Aborted { reason: String },
}

/// 待派发的合法调用
struct Launch {
    node: NodeId,
    tool_name: String,
    tool: Arc<dyn Tool>,
    args: Value,
}

pub struct Executor {
    registry: Arc<ToolRegistry>,
    scheduler: Arc<ToolScheduler>,
    tool_timeout: Duration,
}

impl Executor {
    pub fn new(registry: Arc<ToolRegistry>, scheduler: Arc<ToolScheduler>, tool_timeout_secs: u64) -> Self {
        Self {
            registry,
            scheduler,
            tool_timeout: Duration::from_secs(tool_timeout_secs),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 执行一个决策；只有内部不变量被破坏时才返回 Err
    pub async fn step(
        &self,
        decision: PlannerDecision,
        state: &mut SessionState,
        events: &Option<UnboundedSender<SessionEvent>>,
    ) -> Result<StepOutcome, AgentError> {
        match decision {
            PlannerDecision::Invoke { calls } => {
                let launches = self.admit_calls(calls, state, events)?;
                self.dispatch(launches, state, events).await?;
                state.graph.check_invariants()?;
                Ok(StepOutcome::Advanced)
            }
            PlannerDecision::Terminate { answer } => {
                self.freeze_with_terminal(&mut state.graph)?;
                state.graph.check_invariants()?;
                Ok(StepOutcome::Finished { draft: answer })
            }
            PlannerDecision::Abort { reason } => {
                state.graph.freeze();
                Ok(StepOutcome::Aborted { reason })
            }
        }
    }

    /// 逐个调用做引用解析 + 契约校验；不合法的调用立刻落为 failed 节点
    fn admit_calls(
        &self,
        calls: Vec<ToolCallReq>,
        state: &mut SessionState,
        events: &Option<UnboundedSender<SessionEvent>>,
    ) -> Result<Vec<Launch>, AgentError> {
        let mut launches = Vec::with_capacity(calls.len());
        for call in calls {
            let node = state.graph.add_tool_node(&call.tool, call.args.clone());

            let admitted = self.admit_one(node, &call, state);
            match admitted {
                Ok((tool, resolved)) => {
                    state.graph.mark_running(node)?;
                    launches.push(Launch {
                        node,
                        tool_name: call.tool,
                        tool,
                        args: resolved,
                    });
                }
                Err(reason) => {
                    // 失败节点也要挂到图上（入边不变量），原因进失败记录
                    if !has_incoming(&state.graph, node) {
                        state.graph.add_edge(TaskGraph::ROOT, node, EdgeKind::Control)?;
                    }
                    state.graph.mark_failed(node, &reason)?;
                    state.record_failure(node, &call.tool, &reason);
                    emit(
                        events,
                        SessionEvent::NodeFailed {
                            node,
                            tool: call.tool.clone(),
                            reason: reason.clone(),
                        },
                    );
                    tracing::warn!(node, tool = %call.tool, %reason, "call rejected");
                }
            }
        }
        Ok(launches)
    }

    /// 单个调用的准入：解析引用、接边、契约校验。返回可执行的工具与实参
    fn admit_one(
        &self,
        node: NodeId,
        call: &ToolCallReq,
        state: &mut SessionState,
    ) -> Result<(Arc<dyn Tool>, Value), String> {
        let mut deps: Vec<NodeId> = Vec::new();
        let resolved = resolve_value(&call.args, state, &mut deps)?;

        deps.sort_unstable();
        deps.dedup();
        for dep in &deps {
            state
                .graph
                .add_edge(*dep, node, EdgeKind::Data)
                .map_err(|e| e.to_string())?;
        }
        for after in &call.after {
            if state.graph.node(*after).is_none() {
                return Err(format!("after 引用的节点 {} 不存在", after));
            }
            state
                .graph
                .add_edge(*after, node, EdgeKind::Control)
                .map_err(|e| e.to_string())?;
        }
        if !has_incoming(&state.graph, node) {
            state
                .graph
                .add_edge(TaskGraph::ROOT, node, EdgeKind::Control)
                .map_err(|e| e.to_string())?;
        }

        self.registry
            .validate(&call.tool, &resolved)
            .map_err(|e| e.to_string())?;
        let tool = self.registry.resolve(&call.tool).map_err(|e| e.to_string())?;
        Ok((tool, resolved))
    }

    /// 并行派发并汇合；结果串行写回图与黑板
    async fn dispatch(
        &self,
        launches: Vec<Launch>,
        state: &mut SessionState,
        events: &Option<UnboundedSender<SessionEvent>>,
    ) -> Result<(), AgentError> {
        if launches.is_empty() {
            return Ok(());
        }

        let mut handles = Vec::with_capacity(launches.len());
        for launch in &launches {
            emit(
                events,
                SessionEvent::ToolCall {
                    node: launch.node,
                    tool: launch.tool_name.clone(),
                    args: launch.args.clone(),
                },
            );
            let tool = launch.tool.clone();
            let args = launch.args.clone();
            let scheduler = self.scheduler.clone();
            let tool_timeout = self.tool_timeout;
            handles.push(tokio::spawn(async move {
                let _permit = scheduler.acquire().await;
                let started = Instant::now();
                let result = timeout(tool_timeout, tool.execute(args)).await;
                (started.elapsed().as_millis() as u64, result)
            }));
        }

        let joined = futures_util::future::join_all(handles).await;
        for (launch, joined) in launches.iter().zip(joined) {
            // JoinError（工具 panic）与超时、工具 Err 一样落为失败节点
            let (duration_ms, outcome): (u64, Result<Value, String>) = match joined {
                Ok((ms, Ok(Ok(value)))) => (ms, Ok(value)),
                Ok((ms, Ok(Err(e)))) => (ms, Err(e)),
                Ok((ms, Err(_elapsed))) => (
                    ms,
                    Err(format!(
                        "TIMEOUT: 工具执行超过 {}s",
                        self.tool_timeout.as_secs()
                    )),
                ),
                Err(join_err) => (0, Err(format!("TASK_PANIC: {}", join_err))),
            };

            let audit = serde_json::json!({
                "event": "tool_audit",
                "node": launch.node,
                "tool": launch.tool_name,
                "ok": outcome.is_ok(),
                "duration_ms": duration_ms,
            });
            tracing::info!(audit = %audit.to_string(), "tool");

            match outcome {
                Ok(value) => {
                    state
                        .blackboard
                        .write(launch.node, &launch.tool_name, value.clone())?;
                    state.graph.mark_succeeded(launch.node)?;
                    emit(
                        events,
                        SessionEvent::Observation {
                            node: launch.node,
                            tool: launch.tool_name.clone(),
                            preview: preview(&value.to_string()),
                        },
                    );
                }
                Err(reason) => {
                    state.graph.mark_failed(launch.node, &reason)?;
                    state.record_failure(launch.node, &launch.tool_name, &reason);
                    emit(
                        events,
                        SessionEvent::NodeFailed {
                            node: launch.node,
                            tool: launch.tool_name.clone(),
                            reason,
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// 终止：在当前所有叶节点后接一个终止节点，冻结图形态
    fn freeze_with_terminal(&self, graph: &mut TaskGraph) -> Result<(), AgentError> {
        let leaves = graph.leaves();
        let terminal = graph.add_terminal_node();
        for leaf in leaves {
            graph.add_edge(leaf, terminal, EdgeKind::Control)?;
        }
        graph.mark_running(terminal)?;
        graph.mark_succeeded(terminal)?;
        graph.freeze();
        Ok(())
    }
}

fn has_incoming(graph: &TaskGraph, node: NodeId) -> bool {
    graph.edges().iter().any(|e| e.to == node)
}

/// 递归解析参数中的引用：
/// "$input" -> 文件路径，"$query" -> 用户问题，
/// "$node:<id>[.<字段>]" -> 黑板取值（并记为数据依赖）
fn resolve_value(
    v: &Value,
    state: &SessionState,
    deps: &mut Vec<NodeId>,
) -> Result<Value, String> {
    match v {
        Value::String(s) => resolve_str(s, state, deps),
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(resolve_value(item, state, deps)?);
            }
            Ok(Value::Array(out))
        }
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (k, val) in map {
                out.insert(k.clone(), resolve_value(val, state, deps)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn resolve_str(s: &str, state: &SessionState, deps: &mut Vec<NodeId>) -> Result<Value, String> {
    if s == "$input" {
        return Ok(Value::String(state.file.path.display().to_string()));
    }
    if s == "$query" {
        return Ok(Value::String(state.query.clone()));
    }
    if let Some(rest) = s.strip_prefix("$node:") {
        let (id_str, field) = match rest.split_once('.') {
            Some((id, field)) => (id, Some(field)),
            None => (rest, None),
        };
        let id: NodeId = id_str
            .parse()
            .map_err(|_| format!("非法的节点引用: {}", s))?;
        let entry = state
            .blackboard
            .get(id)
            .ok_or_else(|| format!("引用的节点 {} 不存在或未成功", id))?;
        deps.push(id);
        return match field {
            None => Ok(entry.value.clone()),
            Some(name) => entry
                .value
                .get(name)
                .cloned()
                .ok_or_else(|| format!("节点 {} 的输出中没有字段 {}", id, name)),
        };
    }
    Ok(Value::String(s.to_string()))
}

fn preview(s: &str) -> String {
    const MAX: usize = 200;
    let p: String = s.chars().take(MAX).collect();
    if s.chars().count() > MAX {
        format!("{}...", p)
    } else {
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{FileMeta, Modality};
    use serde_json::json;

    fn state_with_file() -> SessionState {
        SessionState::new(
            "这段信号有什么问题？",
            FileMeta {
                path: "/data/sig.csv".into(),
                name: "sig.csv".to_string(),
                modality: Modality::Signal,
                size_bytes: 42,
            },
        )
    }

    #[test]
    fn test_resolve_input_and_query() {
        let state = state_with_file();
        let mut deps = Vec::new();
        let v = resolve_value(
            &json!({"path": "$input", "q": "$query", "n": 3}),
            &state,
            &mut deps,
        )
        .unwrap();
        assert_eq!(v["path"], json!("/data/sig.csv"));
        assert_eq!(v["q"], json!("这段信号有什么问题？"));
        assert_eq!(v["n"], json!(3));
        assert!(deps.is_empty());
    }

    #[test]
    fn test_resolve_node_reference_records_dep() {
        let mut state = state_with_file();
        let node = state.graph.add_tool_node("stat_summary", json!({}));
        state
            .graph
            .add_edge(TaskGraph::ROOT, node, EdgeKind::Control)
            .unwrap();
        state
            .blackboard
            .write(node, "stat_summary", json!({"mean": {"c0": 1.5}}))
            .unwrap();

        let mut deps = Vec::new();
        let v = resolve_value(&json!({"stats": "$node:1.mean"}), &state, &mut deps).unwrap();
        assert_eq!(v["stats"], json!({"c0": 1.5}));
        assert_eq!(deps, vec![node]);
    }

    #[test]
    fn test_resolve_unknown_node_fails() {
        let state = state_with_file();
        let mut deps = Vec::new();
        let err = resolve_value(&json!("$node:9"), &state, &mut deps).unwrap_err();
        assert!(err.contains("不存在或未成功"));
    }

    #[test]
    fn test_resolve_missing_field_fails() {
        let mut state = state_with_file();
        let node = state.graph.add_tool_node("stat_summary", json!({}));
        state
            .graph
            .add_edge(TaskGraph::ROOT, node, EdgeKind::Control)
            .unwrap();
        state
            .blackboard
            .write(node, "stat_summary", json!({"mean": {}}))
            .unwrap();
        let mut deps = Vec::new();
        let err = resolve_value(&json!("$node:1.std"), &state, &mut deps).unwrap_err();
        assert!(err.contains("没有字段 std"));
    }
}
