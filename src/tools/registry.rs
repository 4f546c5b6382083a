//! 能力注册表
//!
//! 所有工具实现 Tool trait（spec / execute），由 ToolRegistry 按名注册与解析；
//! 重名注册报 DuplicateCapability，未知名解析报 UnknownCapability，
//! validate 在任何调用前按契约校验参数。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::tools::ToolSpec;

/// 工具 trait：声明契约、异步执行（args 为已解析的 JSON 对象）
///
/// 实现约束：对声明输入的纯函数，失败以结构化 Err(String) 上报（不得 panic），
/// 调用之间不保留状态。
#[async_trait]
pub trait Tool: Send + Sync {
    /// 能力契约（名称、输入/输出 schema、幂等、成本提示）
    fn spec(&self) -> ToolSpec;

    /// 执行工具，输出按契约的 outputs 组织为 JSON 对象
    async fn execute(&self, args: Value) -> Result<Value, String>;
}

/// 能力注册表：固定目录，注册后不可变更
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册一个工具；名称已存在则报 DuplicateCapability
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), AgentError> {
        let name = tool.spec().name;
        if self.tools.contains_key(&name) {
            return Err(AgentError::DuplicateCapability(name));
        }
        self.tools.insert(name, Arc::new(tool));
        Ok(())
    }

    /// 按名解析；不存在则报 UnknownCapability
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>, AgentError> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| AgentError::UnknownCapability(name.to_string()))
    }

    pub fn spec(&self, name: &str) -> Result<ToolSpec, AgentError> {
        Ok(self.resolve(name)?.spec())
    }

    /// 调用前的契约校验：未知能力或参数违例都在这里拦下
    pub fn validate(&self, name: &str, args: &Value) -> Result<(), AgentError> {
        let spec = self.spec(name)?;
        spec.validate_args(args)
            .map_err(|detail| AgentError::SchemaError {
                tool: name.to_string(),
                detail,
            })
    }

    /// 按名排序的工具名列表
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 生成注入规划提示词的能力清单 JSON（按名排序，保证提示词确定性）
    pub fn catalog_json(&self) -> String {
        let mut specs: Vec<ToolSpec> = self.tools.values().map(|t| t.spec()).collect();
        specs.sort_by(|a, b| a.name.cmp(&b.name));
        let entries: Vec<Value> = specs.iter().map(|s| s.catalog_entry()).collect();
        serde_json::to_string_pretty(&entries).unwrap_or_else(|_| "[]".to_string())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ValueType;
    use serde_json::json;

    struct FakeTool;

    #[async_trait]
    impl Tool for FakeTool {
        fn spec(&self) -> ToolSpec {
            ToolSpec::new("fake", "测试用").param("path", ValueType::String, true, "路径")
        }

        async fn execute(&self, _args: Value) -> Result<Value, String> {
            Ok(json!({"ok": true}))
        }
    }

    #[test]
    fn test_duplicate_capability() {
        let mut reg = ToolRegistry::new();
        reg.register(FakeTool).unwrap();
        let err = reg.register(FakeTool).unwrap_err();
        assert!(matches!(err, AgentError::DuplicateCapability(name) if name == "fake"));
    }

    #[test]
    fn test_unknown_capability() {
        let reg = ToolRegistry::new();
        assert!(matches!(
            reg.resolve("nope"),
            Err(AgentError::UnknownCapability(_))
        ));
    }

    #[test]
    fn test_validate_gates_bad_args() {
        let mut reg = ToolRegistry::new();
        reg.register(FakeTool).unwrap();
        reg.validate("fake", &json!({"path": "a"})).unwrap();
        assert!(matches!(
            reg.validate("fake", &json!({})),
            Err(AgentError::SchemaError { .. })
        ));
    }

    #[test]
    fn test_catalog_sorted() {
        let mut reg = ToolRegistry::new();
        reg.register(FakeTool).unwrap();
        let catalog = reg.catalog_json();
        assert!(catalog.contains("\"fake\""));
    }
}
