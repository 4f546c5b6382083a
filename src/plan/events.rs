//! 会话过程事件：供 CLI / SSE 前端展示规划、调用、观察与终态

use serde::Serialize;

use crate::graph::NodeId;
use crate::plan::loop_::Phase;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// 状态机相位变化
    PhaseChange { phase: Phase },
    /// 规划轮次（当前第几轮 / 节点预算）
    StepUpdate { step: usize, max_steps: usize },
    /// 正在调用推理引擎
    Thinking,
    /// 本轮决策（原始输出预览）
    Decision { preview: String },
    /// 某个节点开始执行工具
    ToolCall {
        node: NodeId,
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation {
        node: NodeId,
        tool: String,
        preview: String,
    },
    /// 节点失败（契约违例、工具错误或超时）
    NodeFailed {
        node: NodeId,
        tool: String,
        reason: String,
    },
    /// 恢复动作（纠错重试 / 重新规划 / 终止）
    Recovery { action: String, detail: String },
    /// 正在合成最终回答
    Synthesizing,
    /// 会话结束（terminated / aborted:<reason>）
    Done { status: String },
    /// 错误
    Error { text: String },
}

/// 向可选通道发事件；无人订阅时静默丢弃
pub fn emit(
    tx: &Option<tokio::sync::mpsc::UnboundedSender<SessionEvent>>,
    ev: SessionEvent,
) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}
