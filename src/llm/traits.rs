//! 推理引擎抽象
//!
//! 契约：输入一组消息，返回一段文本，期望可解析为恰好一个规划决策；
//! 不保证多次调用之间的确定性。

use async_trait::async_trait;

use crate::llm::Message;

/// 推理引擎客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成；错误以字符串上报，由上层映射为 AgentError::LlmError
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
