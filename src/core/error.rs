//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：解析类错误走 RetryWithPrompt，工具/契约类失败以
//! 失败节点的形式回到下一轮规划上下文（Replan），预算与超时直接终止会话。

use thiserror::Error;

use crate::graph::{BlackboardError, GraphError};

/// 会话运行过程中可能出现的错误（注册表、契约、工具、解析、预算等）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Duplicate capability: {0}")]
    DuplicateCapability(String),

    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    /// 规划器给出的参数违反工具契约（可恢复：记失败节点后重新规划）
    #[error("Schema error for {tool}: {detail}")]
    SchemaError { tool: String, detail: String },

    /// 工具执行内部失败，如不支持的文件编码（可恢复：重新规划或在报告中说明）
    #[error("Tool execution failed ({tool}): {detail}")]
    ToolExecutionFailed { tool: String, detail: String },

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    /// 推理引擎输出无法解析为决策
    #[error("Decision parse error: {0}")]
    ParseError(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    /// 节点数达到步数预算上限（终止，附带部分任务图）
    #[error("Step budget exhausted (limit {limit})")]
    BudgetExhausted { limit: usize },

    /// 会话墙钟截止时间已过（终止）
    #[error("Session deadline exceeded")]
    SessionTimeout,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Blackboard(#[from] BlackboardError),

    #[error("Cancelled")]
    Cancelled,
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone)]
pub enum RecoveryAction {
    /// 将纠错提示注入下一轮，让推理引擎重试（如决策 JSON 格式错误）
    RetryWithPrompt(String),
    /// 失败已写入任务图，下一轮规划时可见，由规划器另选工具或放弃
    Replan(String),
    /// 终止会话并上报原因
    Abort(String),
}
