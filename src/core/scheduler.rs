//! 工具并发调度
//!
//! 控制循环本身是串行的，但一次 invoke 决策里的并行分支、以及诊断/转写这类
//! 长耗时工具需要一个有界的执行池：用 Semaphore 限制同时在跑的工具数。

use std::sync::Arc;

use tokio::sync::Semaphore;

/// 工具执行许可池（默认并发 3）
pub struct ToolScheduler {
    permits: Arc<Semaphore>,
}

impl ToolScheduler {
    pub fn new(max_parallel_tools: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_parallel_tools.max(1))),
        }
    }

    /// 获取一个工具执行许可；许可在 drop 时归还
    pub async fn acquire(&self) -> tokio::sync::OwnedSemaphorePermit {
        self.permits
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore closed")
    }
}

impl Default for ToolScheduler {
    fn default() -> Self {
        Self::new(3)
    }
}
