//! 会话控制循环（状态机）
//!
//! Planning -> Validating -> Executing -> Planning，直到 Terminating 或
//! Aborted。挂起点只有两个：推理引擎调用与工具调用，两处都受会话截止时间
//! 约束；解析失败走纠错重试（上限可配），节点预算与截止时间强制中止。
//! 调用方总能拿到确定的终态（terminated / aborted:<reason>），内部不变量被
//! 破坏时才返回 Err。

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, RecoveryAction, RecoveryEngine};
use crate::graph::{NodeId, NodeStatus, TaskGraph};
use crate::llm::Message;
use crate::plan::events::{emit, SessionEvent};
use crate::plan::executor::{Executor, StepOutcome};
use crate::plan::planner::{parse_decision, Planner};
use crate::plan::state::SessionState;
use crate::plan::synthesizer::synthesize;

/// 状态机相位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planning,
    Validating,
    Executing,
    Terminating,
    Aborted,
}

/// 会话终态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionStatus {
    /// 正常结束，已产出回答
    Terminated,
    /// 中止，无回答
    Aborted { reason: String },
}

/// 面向调用方的轨迹条目（每个节点一条）
#[derive(Debug, Clone, Serialize)]
pub struct TraceEntry {
    pub node: NodeId,
    pub kind: String,
    pub status: NodeStatus,
    pub duration_ms: Option<i64>,
    pub failure: Option<String>,
}

/// 会话结果：终态 + 回答 + 轨迹摘要
#[derive(Debug, Serialize)]
pub struct SessionReport {
    #[serde(flatten)]
    pub status: SessionStatus,
    pub final_answer: Option<String>,
    pub trace: Vec<TraceEntry>,
    /// 实际用掉的规划轮数
    pub steps: usize,
}

/// 控制循环配置
#[derive(Debug, Clone)]
pub struct LoopConfig {
    /// 节点预算（工具节点数上限）
    pub max_steps: usize,
    /// 解析/推理失败的纠错重试上限
    pub parse_retries: usize,
    /// 会话墙钟截止
    pub deadline: std::time::Duration,
    /// 黑板摘要的单条截断长度
    pub preview_chars: usize,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_steps: 12,
            parse_retries: 3,
            deadline: std::time::Duration::from_secs(300),
            preview_chars: 200,
        }
    }
}

fn build_trace(graph: &TaskGraph) -> Vec<TraceEntry> {
    graph
        .nodes()
        .iter()
        .map(|n| TraceEntry {
            node: n.id,
            kind: match n.tool_name() {
                Some(name) => name.to_string(),
                None if n.id == TaskGraph::ROOT => "source".to_string(),
                None => "terminal".to_string(),
            },
            status: n.status,
            duration_ms: n.duration_ms(),
            failure: n.failure.clone(),
        })
        .collect()
}

fn aborted_report(
    state: &mut SessionState,
    reason: &str,
    steps: usize,
    events: &Option<UnboundedSender<SessionEvent>>,
) -> SessionReport {
    state.graph.freeze();
    emit(events, SessionEvent::PhaseChange { phase: Phase::Aborted });
    emit(
        events,
        SessionEvent::Done {
            status: format!("aborted:{}", reason),
        },
    );
    SessionReport {
        status: SessionStatus::Aborted {
            reason: reason.to_string(),
        },
        final_answer: None,
        trace: build_trace(&state.graph),
        steps,
    }
}

/// 运行一次会话直到终态
pub async fn run_session(
    planner: &Planner,
    executor: &Executor,
    recovery: &RecoveryEngine,
    state: &mut SessionState,
    cfg: &LoopConfig,
    cancel: CancellationToken,
    events: Option<UnboundedSender<SessionEvent>>,
) -> Result<SessionReport, AgentError> {
    let deadline = tokio::time::Instant::now() + cfg.deadline;
    let mut retries = 0usize;
    let mut steps = 0usize;

    loop {
        if cancel.is_cancelled() {
            return Ok(aborted_report(state, "cancelled", steps, &events));
        }

        // 预算：节点数达到上限时强制 Abort（带部分任务图上报）
        if state.graph.tool_node_count() >= cfg.max_steps {
            let err = AgentError::BudgetExhausted { limit: cfg.max_steps };
            tracing::warn!(limit = cfg.max_steps, "step budget exhausted");
            if let RecoveryAction::Abort(reason) = recovery.handle(&err) {
                return Ok(aborted_report(state, &reason, steps, &events));
            }
            return Ok(aborted_report(state, "budget_exhausted", steps, &events));
        }

        // ---- Planning（挂起点 1：推理引擎）----
        emit(&events, SessionEvent::PhaseChange { phase: Phase::Planning });
        emit(
            &events,
            SessionEvent::StepUpdate {
                step: steps,
                max_steps: cfg.max_steps,
            },
        );
        emit(&events, SessionEvent::Thinking);

        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Ok(aborted_report(state, "timeout", steps, &events));
        }
        let raw = match tokio::time::timeout(
            remaining,
            planner.decide(state, steps, cfg.max_steps, cfg.preview_chars),
        )
        .await
        {
            Err(_elapsed) => {
                return Ok(aborted_report(state, "timeout", steps, &events));
            }
            Ok(Err(e)) => {
                // 推理传输失败：与解析失败共用有界重试
                match recovery.handle(&e) {
                    RecoveryAction::RetryWithPrompt(prompt) => {
                        retries += 1;
                        if retries > cfg.parse_retries {
                            return Ok(aborted_report(state, "llm_error", steps, &events));
                        }
                        emit(
                            &events,
                            SessionEvent::Recovery {
                                action: "RetryWithPrompt".to_string(),
                                detail: prompt.clone(),
                            },
                        );
                        state.correctives.push(Message::user(prompt));
                        continue;
                    }
                    RecoveryAction::Abort(reason) => {
                        return Ok(aborted_report(state, &reason, steps, &events));
                    }
                    RecoveryAction::Replan(detail) => {
                        state.failures.push(detail);
                        continue;
                    }
                }
            }
            Ok(Ok(raw)) => raw,
        };
        emit(
            &events,
            SessionEvent::Decision {
                preview: raw.chars().take(200).collect(),
            },
        );

        // ---- Validating ----
        emit(&events, SessionEvent::PhaseChange { phase: Phase::Validating });
        let decision = match parse_decision(&raw) {
            Ok(d) => {
                retries = 0;
                state.correctives.clear();
                d
            }
            Err(e) => match recovery.handle(&e) {
                RecoveryAction::RetryWithPrompt(prompt) => {
                    retries += 1;
                    if retries > cfg.parse_retries {
                        return Ok(aborted_report(state, "parse_error", steps, &events));
                    }
                    emit(
                        &events,
                        SessionEvent::Recovery {
                            action: "RetryWithPrompt".to_string(),
                            detail: prompt.clone(),
                        },
                    );
                    state.correctives.push(Message::user(prompt));
                    continue;
                }
                _ => {
                    return Ok(aborted_report(state, "parse_error", steps, &events));
                }
            },
        };

        // ---- Executing（挂起点 2：工具调用）----
        emit(&events, SessionEvent::PhaseChange { phase: Phase::Executing });
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            return Ok(aborted_report(state, "timeout", steps, &events));
        }
        let outcome = match tokio::time::timeout(
            remaining,
            executor.step(decision, state, &events),
        )
        .await
        {
            Err(_elapsed) => {
                // 截止触发：在跑的节点按 timeout 记失败，会话中止
                state.graph.fail_running("TIMEOUT: 会话截止时间已到");
                return Ok(aborted_report(state, "timeout", steps, &events));
            }
            Ok(result) => result?,
        };

        steps += 1;
        match outcome {
            StepOutcome::Advanced => continue,
            StepOutcome::Finished { draft } => {
                // ---- Terminating：只读合成，不再调用任何工具 ----
                emit(&events, SessionEvent::PhaseChange { phase: Phase::Terminating });
                emit(&events, SessionEvent::Synthesizing);
                let answer = synthesize(&state.graph, &state.blackboard, &draft);
                emit(
                    &events,
                    SessionEvent::Done {
                        status: "terminated".to_string(),
                    },
                );
                return Ok(SessionReport {
                    status: SessionStatus::Terminated,
                    final_answer: Some(answer),
                    trace: build_trace(&state.graph),
                    steps,
                });
            }
            StepOutcome::Aborted { reason } => {
                return Ok(aborted_report(state, &reason, steps, &events));
            }
        }
    }
}
