//! Synthesizer：最终回答合成
//!
//! 确定性折叠：按节点 id 顺序把已成功节点的黑板载荷原样嵌入 Markdown 报告，
//! 失败步骤单列，末尾附规划器的结论草稿。纯只读，不触发任何工具调用，
//! 终止语义在这里保持干净。

use crate::graph::{Blackboard, NodeStatus, TaskGraph};

/// 由任务图 + 黑板 + 结论草稿合成用户可读的最终回答
pub fn synthesize(graph: &TaskGraph, blackboard: &Blackboard, draft: &str) -> String {
    let mut out = String::from("# 分析报告\n");

    let mut has_results = false;
    for node in graph.nodes() {
        let tool = match node.tool_name() {
            Some(t) => t,
            None => continue,
        };
        if node.status != NodeStatus::Succeeded {
            continue;
        }
        let Some(entry) = blackboard.get(node.id) else {
            continue;
        };
        has_results = true;
        let payload = serde_json::to_string_pretty(&entry.value)
            .unwrap_or_else(|_| entry.value.to_string());
        out.push_str(&format!(
            "\n## 节点 #{} · {}\n\n```json\n{}\n```\n",
            node.id, tool, payload
        ));
    }
    if !has_results {
        out.push_str("\n（没有成功完成的分析步骤。）\n");
    }

    let failed: Vec<&crate::graph::Node> = graph
        .nodes()
        .iter()
        .filter(|n| n.status == NodeStatus::Failed)
        .collect();
    if !failed.is_empty() {
        out.push_str("\n## 未完成的步骤\n\n");
        for node in failed {
            out.push_str(&format!(
                "- #{} {}: {}\n",
                node.id,
                node.tool_name().unwrap_or("?"),
                node.failure.as_deref().unwrap_or("unknown")
            ));
        }
    }

    out.push_str("\n## 结论\n\n");
    if draft.trim().is_empty() {
        out.push_str("（规划器未提供结论草稿。）\n");
    } else {
        out.push_str(draft.trim());
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeKind;
    use serde_json::json;

    #[test]
    fn test_succeeded_payload_embedded_verbatim() {
        let mut graph = TaskGraph::new();
        let mut bb = Blackboard::new();
        let node = graph.add_tool_node("stat_summary", json!({"path": "/x"}));
        graph.add_edge(TaskGraph::ROOT, node, EdgeKind::Control).unwrap();
        graph.mark_running(node).unwrap();
        graph.mark_succeeded(node).unwrap();
        let payload = json!({"mean": {"c0": 1.25}, "std": {"c0": 0.5}});
        bb.write(node, "stat_summary", payload.clone()).unwrap();

        let answer = synthesize(&graph, &bb, "信号平稳。");
        let pretty = serde_json::to_string_pretty(&payload).unwrap();
        assert!(answer.contains(&pretty));
        assert!(answer.contains("信号平稳。"));
        assert!(answer.contains("stat_summary"));
    }

    #[test]
    fn test_failed_nodes_listed() {
        let mut graph = TaskGraph::new();
        let bb = Blackboard::new();
        let node = graph.add_tool_node("fault_classify", json!({}));
        graph.add_edge(TaskGraph::ROOT, node, EdgeKind::Control).unwrap();
        graph.mark_failed(node, "INPUT_TOO_SHORT: 不足 1200 点").unwrap();

        let answer = synthesize(&graph, &bb, "");
        assert!(answer.contains("未完成的步骤"));
        assert!(answer.contains("INPUT_TOO_SHORT"));
        assert!(answer.contains("（规划器未提供结论草稿。）"));
    }
}
