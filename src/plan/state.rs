//! 会话状态
//!
//! 一次 (文件, 问题) 请求的全部可变状态：任务图、黑板、对规划器可见的失败
//! 记录、解析纠错提示。显式对象，逐调用传入 Planner/Executor，不存在进程级
//! 单例；会话结束即丢弃。

use crate::graph::{Blackboard, TaskGraph};
use crate::llm::Message;
use crate::tools::FileMeta;

/// 单会话执行状态
pub struct SessionState {
    pub query: String,
    pub file: FileMeta,
    pub graph: TaskGraph,
    pub blackboard: Blackboard,
    /// 已发生的失败（"#id tool: 原因"），每轮注入规划上下文
    pub failures: Vec<String>,
    /// 解析纠错提示（RetryWithPrompt 注入，成功解析后清空）
    pub correctives: Vec<Message>,
}

impl SessionState {
    pub fn new(query: impl Into<String>, file: FileMeta) -> Self {
        Self {
            query: query.into(),
            file,
            graph: TaskGraph::new(),
            blackboard: Blackboard::new(),
            failures: Vec::new(),
            correctives: Vec::new(),
        }
    }

    pub fn record_failure(&mut self, node: u64, tool: &str, reason: &str) {
        self.failures.push(format!("#{} {}: {}", node, tool, reason));
    }
}
