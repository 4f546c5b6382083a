//! Mock 推理客户端（测试与离线兜底，无需 API）
//!
//! MockLlmClient 始终给出一个可解析的 finish 决策，保证无 Key 环境下会话也能
//! 干净终止；ScriptedLlmClient 按脚本顺序逐条吐出预置回复，供集成测试驱动
//! 规划循环走到任意分支。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{LlmClient, Message};

/// 离线兜底客户端：恒定输出 finish 决策
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
        Ok(r#"{"decision": "finish", "answer": "(离线模式) 未配置推理后端，无法规划分析流程。"}"#
            .to_string())
    }
}

/// 脚本客户端：依次返回预置回复；脚本耗尽后输出 finish 决策
pub struct ScriptedLlmClient {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
        }
    }

    /// 剩余脚本条数
    pub fn remaining(&self) -> usize {
        self.responses.lock().expect("script lock").len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String, String> {
        let next = self.responses.lock().expect("script lock").pop_front();
        Ok(next.unwrap_or_else(|| {
            r#"{"decision": "finish", "answer": "脚本已耗尽。"}"#.to_string()
        }))
    }
}
