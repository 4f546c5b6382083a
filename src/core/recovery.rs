//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供控制循环决定是注入纠错提示重试、
//! 带着失败记录重新规划，还是终止会话。重试次数由控制循环计数，这里只给动作。

use crate::core::{AgentError, RecoveryAction};

/// 语义化错误恢复：将错误映射为可执行动作（纠错重试 / 重新规划 / 终止）
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    /// 根据错误类型返回建议的恢复动作
    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::ParseError(raw) => RecoveryAction::RetryWithPrompt(format!(
                "上一轮输出无法解析为决策: {raw}。\
                你必须只输出一个合法的 JSON 对象，不能输出代码、Markdown 或其它文字。\
                格式为: {{\"decision\": \"invoke\", \"tool\": \"工具名\", \"args\": {{...}}}}，\
                或 {{\"decision\": \"finish\", \"answer\": \"...\"}}，\
                或 {{\"decision\": \"abort\", \"reason\": \"...\"}}。请只输出这一个 JSON。"
            )),
            AgentError::LlmError(msg) => RecoveryAction::RetryWithPrompt(format!(
                "上一次推理请求失败（{msg}），请重新输出本轮决策 JSON。"
            )),
            AgentError::SchemaError { tool, detail } => {
                RecoveryAction::Replan(format!("{tool}: {detail}"))
            }
            AgentError::ToolExecutionFailed { tool, detail } => {
                RecoveryAction::Replan(format!("{tool}: {detail}"))
            }
            AgentError::ToolTimeout(tool) => {
                RecoveryAction::Replan(format!("{tool}: 执行超时"))
            }
            AgentError::BudgetExhausted { .. } => {
                RecoveryAction::Abort("budget_exhausted".to_string())
            }
            AgentError::SessionTimeout => RecoveryAction::Abort("timeout".to_string()),
            AgentError::Cancelled => RecoveryAction::Abort("cancelled".to_string()),
            other => RecoveryAction::Abort(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_retries_with_prompt() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&AgentError::ParseError("not json".to_string()));
        match action {
            RecoveryAction::RetryWithPrompt(msg) => assert!(msg.contains("JSON")),
            _ => panic!("Expected RetryWithPrompt"),
        }
    }

    #[test]
    fn test_schema_error_replans() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&AgentError::SchemaError {
            tool: "stat_summary".to_string(),
            detail: "missing required arg: path".to_string(),
        });
        match action {
            RecoveryAction::Replan(msg) => assert!(msg.contains("stat_summary")),
            _ => panic!("Expected Replan"),
        }
    }

    #[test]
    fn test_budget_exhausted_aborts() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&AgentError::BudgetExhausted { limit: 8 });
        match action {
            RecoveryAction::Abort(reason) => assert_eq!(reason, "budget_exhausted"),
            _ => panic!("Expected Abort"),
        }
    }

    #[test]
    fn test_timeout_aborts() {
        let engine = RecoveryEngine::new();
        let action = engine.handle(&AgentError::SessionTimeout);
        assert!(matches!(action, RecoveryAction::Abort(r) if r == "timeout"));
    }
}
