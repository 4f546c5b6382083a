//! 黑板：共享中间结果
//!
//! 以节点 id 为键的追加式存储，版本号单调递增，每个节点只写一次；
//! 重复调用能力产生新节点新条目，从不原地覆盖。大体量产物（图片、转写文本）
//! 在规划上下文里只以节点 id + 截断预览出现，完整内容由 $node 引用取用。

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::graph::NodeId;

#[derive(Error, Debug)]
pub enum BlackboardError {
    #[error("blackboard entry already written for node {0}")]
    AlreadyWritten(NodeId),
}

/// 一条中间结果：产出节点、工具名、按输出 schema 标记的载荷、写入版本
#[derive(Debug, Clone)]
pub struct BlackboardEntry {
    pub node: NodeId,
    pub tool: String,
    pub value: Value,
    pub version: u64,
}

/// 追加式黑板；键空间按节点 id 天然不相交，写入无需加锁竞争
#[derive(Debug, Default)]
pub struct Blackboard {
    entries: BTreeMap<NodeId, BlackboardEntry>,
    next_version: u64,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入一个节点的输出；每节点仅允许一次
    pub fn write(&mut self, node: NodeId, tool: &str, value: Value) -> Result<u64, BlackboardError> {
        if self.entries.contains_key(&node) {
            return Err(BlackboardError::AlreadyWritten(node));
        }
        self.next_version += 1;
        let version = self.next_version;
        self.entries.insert(
            node,
            BlackboardEntry {
                node,
                tool: tool.to_string(),
                value,
                version,
            },
        );
        Ok(version)
    }

    pub fn get(&self, node: NodeId) -> Option<&BlackboardEntry> {
        self.entries.get(&node)
    }

    /// 取某节点输出（可选取其中一个顶层字段）
    pub fn resolve(&self, node: NodeId, field: Option<&str>) -> Option<Value> {
        let entry = self.entries.get(&node)?;
        match field {
            None => Some(entry.value.clone()),
            Some(name) => entry.value.get(name).cloned(),
        }
    }

    /// 面向规划上下文的有界摘要：每条一行，载荷截断到 preview_chars
    pub fn excerpt(&self, preview_chars: usize) -> String {
        let mut lines = Vec::with_capacity(self.entries.len());
        for entry in self.entries.values() {
            let raw = entry.value.to_string();
            let preview: String = raw.chars().take(preview_chars).collect();
            let preview = if raw.chars().count() > preview_chars {
                format!("{}...", preview)
            } else {
                preview
            };
            lines.push(format!(
                "- #{} {} (v{}): {}",
                entry.node, entry.tool, entry.version, preview
            ));
        }
        lines.join("\n")
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlackboardEntry> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_write_once() {
        let mut bb = Blackboard::new();
        bb.write(1, "stat_summary", json!({"mean": {"c0": 1.0}})).unwrap();
        let err = bb.write(1, "stat_summary", json!({})).unwrap_err();
        assert!(matches!(err, BlackboardError::AlreadyWritten(1)));
        assert_eq!(bb.len(), 1);
    }

    #[test]
    fn test_versions_monotonic() {
        let mut bb = Blackboard::new();
        let v1 = bb.write(1, "a", json!(1)).unwrap();
        let v2 = bb.write(2, "b", json!(2)).unwrap();
        assert!(v2 > v1);
    }

    #[test]
    fn test_resolve_field() {
        let mut bb = Blackboard::new();
        bb.write(3, "stat_summary", json!({"mean": {"c0": 2.5}})).unwrap();
        assert_eq!(bb.resolve(3, Some("mean")), Some(json!({"c0": 2.5})));
        assert_eq!(bb.resolve(3, Some("missing")), None);
        assert!(bb.resolve(9, None).is_none());
    }

    #[test]
    fn test_excerpt_truncates() {
        let mut bb = Blackboard::new();
        bb.write(1, "doc_to_text", json!({"text": "x".repeat(500)})).unwrap();
        let excerpt = bb.excerpt(40);
        assert!(excerpt.contains("#1 doc_to_text"));
        assert!(excerpt.contains("..."));
        assert!(excerpt.len() < 200);
    }
}
