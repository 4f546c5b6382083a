//! Prism - Rust 动态分析智能体
//!
//! 输入是 (文件, 问题)，输出是一份结构化回答。没有预先声明的固定流水线：
//! 规划器在每一步根据已有中间结果决定下一步调用哪个能力，执行器把决策落到
//! 任务图与黑板上，直到规划器宣布结束或预算耗尽。
//!
//! 模块划分：
//! - **agent**: 组件装配与一次性会话入口（供 CLI / HTTP 调用）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、恢复策略、工具并发调度
//! - **graph**: 任务图（节点/边/不变量）与黑板（追加式中间结果）
//! - **llm**: 推理引擎客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **plan**: Planner、Executor、控制循环、Synthesizer、过程事件
//! - **tools**: 能力契约、注册表与内置工具（统计/绘图/诊断/转换）
//! - **observability**: 日志初始化

pub mod agent;
pub mod config;
pub mod core;
pub mod graph;
pub mod llm;
pub mod observability;
pub mod plan;
pub mod tools;
