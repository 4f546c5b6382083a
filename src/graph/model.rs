//! 任务图
//!
//! 一次会话内所有工具调用的有向无环记录。节点 id 单调分配；边分数据依赖与
//! 控制依赖两类；重复调用同一能力产生新节点，永远不会出现回边。
//! 不变量：除根节点外每个节点至少有一条入边；数据依赖边的源节点必须已成功，
//! 目标节点才能进入 running。

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub type NodeId = u64;

/// 节点状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// 已创建，等待执行
    Pending,
    /// 正在执行
    Running,
    /// 已成功，输出已写入黑板
    Succeeded,
    /// 失败（契约校验失败或工具报错）
    Failed,
    /// 会话冻结时未执行
    Skipped,
}

/// 节点种类
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// 隐式根：原始 (文件, 问题) 输入
    Source,
    /// 一次工具调用
    Tool(String),
    /// 终止节点，结束时冻结图形态
    Terminal,
}

/// 边种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// 数据依赖：目标节点的参数读取了源节点的输出
    Data,
    /// 控制依赖：规划器指定的顺序约束，无数据流
    Control,
}

/// 图节点；只由 Executor 改变状态
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    /// 解析后的实参（引用已替换为具体值）
    pub args: Value,
    pub status: NodeStatus,
    pub failure: Option<String>,
    pub created_at_ms: i64,
    pub completed_at_ms: Option<i64>,
}

impl Node {
    pub fn tool_name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Tool(name) => Some(name),
            _ => None,
        }
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at_ms.map(|done| done - self.created_at_ms)
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub kind: EdgeKind,
}

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("node not found: {0}")]
    NodeNotFound(NodeId),
    #[error("edge {from} -> {to} would create a cycle")]
    CycleDetected { from: NodeId, to: NodeId },
    #[error("node {node} cannot run: data dependency {dep} has not succeeded")]
    DependencyNotReady { node: NodeId, dep: NodeId },
    #[error("invalid status transition for node {node}: {from:?} -> {to:?}")]
    InvalidTransition {
        node: NodeId,
        from: NodeStatus,
        to: NodeStatus,
    },
    #[error("graph invariant violated: {0}")]
    InvariantViolated(String),
}

/// 任务图：节点与边的有序集合，id 单调递增
pub struct TaskGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    next_id: NodeId,
}

impl TaskGraph {
    /// 根节点 id：代表原始 (文件, 问题) 输入
    pub const ROOT: NodeId = 0;

    /// 创建只含根节点的图；根视为已成功（输入就绪）
    pub fn new() -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            nodes: vec![Node {
                id: Self::ROOT,
                kind: NodeKind::Source,
                args: Value::Null,
                status: NodeStatus::Succeeded,
                failure: None,
                created_at_ms: now,
                completed_at_ms: Some(now),
            }],
            edges: Vec::new(),
            next_id: 1,
        }
    }

    fn push_node(&mut self, kind: NodeKind, args: Value) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        self.nodes.push(Node {
            id,
            kind,
            args,
            status: NodeStatus::Pending,
            failure: None,
            created_at_ms: chrono::Utc::now().timestamp_millis(),
            completed_at_ms: None,
        });
        id
    }

    /// 新建工具调用节点（pending）
    pub fn add_tool_node(&mut self, tool: &str, args: Value) -> NodeId {
        self.push_node(NodeKind::Tool(tool.to_string()), args)
    }

    /// 新建终止节点（pending；由调用方接线后标记完成）
    pub fn add_terminal_node(&mut self) -> NodeId {
        self.push_node(NodeKind::Terminal, Value::Null)
    }

    /// 添加一条边；拒绝未知节点、自环与任何会导致环的边
    pub fn add_edge(&mut self, from: NodeId, to: NodeId, kind: EdgeKind) -> Result<(), GraphError> {
        if self.node(from).is_none() {
            return Err(GraphError::NodeNotFound(from));
        }
        if self.node(to).is_none() {
            return Err(GraphError::NodeNotFound(to));
        }
        if from == to || self.reachable(to, from) {
            return Err(GraphError::CycleDetected { from, to });
        }
        if self
            .edges
            .iter()
            .any(|e| e.from == from && e.to == to && e.kind == kind)
        {
            return Ok(()); // 重复边幂等
        }
        self.edges.push(Edge { from, to, kind });
        Ok(())
    }

    /// from 出发沿边能否到达 target
    fn reachable(&self, from: NodeId, target: NodeId) -> bool {
        let mut stack = vec![from];
        let mut seen = vec![false; self.nodes.len()];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            let idx = id as usize;
            if idx < seen.len() && !seen[idx] {
                seen[idx] = true;
                stack.extend(self.edges.iter().filter(|e| e.from == id).map(|e| e.to));
            }
        }
        false
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, GraphError> {
        self.nodes
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or(GraphError::NodeNotFound(id))
    }

    /// pending -> running；要求每条入向数据依赖边的源节点已成功
    pub fn mark_running(&mut self, id: NodeId) -> Result<(), GraphError> {
        let deps: Vec<NodeId> = self
            .edges
            .iter()
            .filter(|e| e.to == id && e.kind == EdgeKind::Data)
            .map(|e| e.from)
            .collect();
        for dep in deps {
            let ready = self
                .node(dep)
                .map(|n| n.status == NodeStatus::Succeeded)
                .unwrap_or(false);
            if !ready {
                return Err(GraphError::DependencyNotReady { node: id, dep });
            }
        }
        let node = self.node_mut(id)?;
        if node.status != NodeStatus::Pending {
            return Err(GraphError::InvalidTransition {
                node: id,
                from: node.status,
                to: NodeStatus::Running,
            });
        }
        node.status = NodeStatus::Running;
        Ok(())
    }

    /// running -> succeeded
    pub fn mark_succeeded(&mut self, id: NodeId) -> Result<(), GraphError> {
        let node = self.node_mut(id)?;
        if node.status != NodeStatus::Running {
            return Err(GraphError::InvalidTransition {
                node: id,
                from: node.status,
                to: NodeStatus::Succeeded,
            });
        }
        node.status = NodeStatus::Succeeded;
        node.completed_at_ms = Some(chrono::Utc::now().timestamp_millis());
        Ok(())
    }

    /// pending/running -> failed，记录失败原因
    pub fn mark_failed(&mut self, id: NodeId, reason: &str) -> Result<(), GraphError> {
        let node = self.node_mut(id)?;
        match node.status {
            NodeStatus::Pending | NodeStatus::Running => {
                node.status = NodeStatus::Failed;
                node.failure = Some(reason.to_string());
                node.completed_at_ms = Some(chrono::Utc::now().timestamp_millis());
                Ok(())
            }
            from => Err(GraphError::InvalidTransition {
                node: id,
                from,
                to: NodeStatus::Failed,
            }),
        }
    }

    /// 将所有仍在 running 的节点标记失败（会话截止时调用）
    pub fn fail_running(&mut self, reason: &str) {
        let now = chrono::Utc::now().timestamp_millis();
        for node in &mut self.nodes {
            if node.status == NodeStatus::Running {
                node.status = NodeStatus::Failed;
                node.failure = Some(reason.to_string());
                node.completed_at_ms = Some(now);
            }
        }
    }

    /// 冻结：未开始/未结束的节点一律 skipped
    pub fn freeze(&mut self) {
        for node in &mut self.nodes {
            if matches!(node.status, NodeStatus::Pending | NodeStatus::Running) {
                node.status = NodeStatus::Skipped;
            }
        }
    }

    /// 无出边的节点（终止节点接线用）
    pub fn leaves(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| !self.edges.iter().any(|e| e.from == n.id))
            .map(|n| n.id)
            .collect()
    }

    /// 工具节点数（步数预算按此计）
    pub fn tool_node_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::Tool(_)))
            .count()
    }

    /// Kahn 拓扑排序判环（入度表）
    pub fn is_acyclic(&self) -> bool {
        let mut in_degree: HashMap<NodeId, usize> =
            self.nodes.iter().map(|n| (n.id, 0)).collect();
        for edge in &self.edges {
            *in_degree.entry(edge.to).or_insert(0) += 1;
        }
        let mut ready: Vec<NodeId> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = 0usize;
        while let Some(id) = ready.pop() {
            visited += 1;
            for edge in self.edges.iter().filter(|e| e.from == id) {
                let d = in_degree.get_mut(&edge.to).expect("edge target exists");
                *d -= 1;
                if *d == 0 {
                    ready.push(edge.to);
                }
            }
        }
        visited == self.nodes.len()
    }

    /// 除根节点外每个节点是否都有入边
    pub fn all_non_root_have_incoming(&self) -> bool {
        self.nodes
            .iter()
            .filter(|n| n.id != Self::ROOT)
            .all(|n| self.edges.iter().any(|e| e.to == n.id))
    }

    /// 每步之后的结构自检
    pub fn check_invariants(&self) -> Result<(), GraphError> {
        if !self.is_acyclic() {
            return Err(GraphError::InvariantViolated("graph has a cycle".to_string()));
        }
        if !self.all_non_root_have_incoming() {
            return Err(GraphError::InvariantViolated(
                "non-root node without incoming edge".to_string(),
            ));
        }
        Ok(())
    }

    /// 面向规划上下文的单行摘要，按 id 顺序
    pub fn summary(&self) -> String {
        let mut lines = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let label = match &node.kind {
                NodeKind::Source => "(输入)".to_string(),
                NodeKind::Tool(name) => name.clone(),
                NodeKind::Terminal => "(终止)".to_string(),
            };
            let status = match node.status {
                NodeStatus::Pending => "pending",
                NodeStatus::Running => "running",
                NodeStatus::Succeeded => "succeeded",
                NodeStatus::Failed => "failed",
                NodeStatus::Skipped => "skipped",
            };
            let mut line = format!("#{} {} {}", node.id, label, status);
            if let Some(ms) = node.duration_ms() {
                line.push_str(&format!(" ({}ms)", ms));
            }
            if let Some(reason) = &node.failure {
                line.push_str(&format!(" - {}", reason));
            }
            lines.push(line);
        }
        lines.join("\n")
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_monotonic_ids_and_root() {
        let mut g = TaskGraph::new();
        let a = g.add_tool_node("stat_summary", json!({}));
        let b = g.add_tool_node("time_plot", json!({}));
        assert_eq!(a, 1);
        assert_eq!(b, 2);
        assert_eq!(g.node(TaskGraph::ROOT).unwrap().status, NodeStatus::Succeeded);
    }

    #[test]
    fn test_cycle_rejected() {
        let mut g = TaskGraph::new();
        let a = g.add_tool_node("a", json!({}));
        let b = g.add_tool_node("b", json!({}));
        g.add_edge(TaskGraph::ROOT, a, EdgeKind::Control).unwrap();
        g.add_edge(a, b, EdgeKind::Data).unwrap();
        let err = g.add_edge(b, a, EdgeKind::Control).unwrap_err();
        assert!(matches!(err, GraphError::CycleDetected { .. }));
        assert!(g.is_acyclic());
    }

    #[test]
    fn test_self_loop_rejected() {
        let mut g = TaskGraph::new();
        let a = g.add_tool_node("a", json!({}));
        assert!(matches!(
            g.add_edge(a, a, EdgeKind::Control),
            Err(GraphError::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_ordering_invariant() {
        let mut g = TaskGraph::new();
        let a = g.add_tool_node("a", json!({}));
        let b = g.add_tool_node("b", json!({}));
        g.add_edge(TaskGraph::ROOT, a, EdgeKind::Control).unwrap();
        g.add_edge(a, b, EdgeKind::Data).unwrap();

        // a 未成功时 b 不能 running
        let err = g.mark_running(b).unwrap_err();
        assert!(matches!(err, GraphError::DependencyNotReady { dep, .. } if dep == a));

        g.mark_running(a).unwrap();
        g.mark_succeeded(a).unwrap();
        g.mark_running(b).unwrap();
        g.mark_succeeded(b).unwrap();
    }

    #[test]
    fn test_incoming_edge_invariant() {
        let mut g = TaskGraph::new();
        let a = g.add_tool_node("a", json!({}));
        assert!(!g.all_non_root_have_incoming());
        g.add_edge(TaskGraph::ROOT, a, EdgeKind::Control).unwrap();
        assert!(g.all_non_root_have_incoming());
        g.check_invariants().unwrap();
    }

    #[test]
    fn test_freeze_skips_pending() {
        let mut g = TaskGraph::new();
        let a = g.add_tool_node("a", json!({}));
        g.add_edge(TaskGraph::ROOT, a, EdgeKind::Control).unwrap();
        g.freeze();
        assert_eq!(g.node(a).unwrap().status, NodeStatus::Skipped);
    }
}
