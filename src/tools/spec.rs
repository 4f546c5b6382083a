//! 能力契约
//!
//! 每个工具注册时声明输入参数与输出字段的名称、类型、必填性，外加幂等标记与
//! 成本提示。注册后不可变；validate_args 是恶意/畸形规划输出到达真实工具前的
//! 唯一闸门。

use serde::Serialize;
use serde_json::{json, Value};

/// 参数/输出字段的 JSON 类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl ValueType {
    pub fn matches(&self, v: &Value) -> bool {
        match self {
            ValueType::String => v.is_string(),
            ValueType::Number => v.is_number(),
            ValueType::Integer => v.is_i64() || v.is_u64(),
            ValueType::Boolean => v.is_boolean(),
            ValueType::Array => v.is_array(),
            ValueType::Object => v.is_object(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ValueType::String => "string",
            ValueType::Number => "number",
            ValueType::Integer => "integer",
            ValueType::Boolean => "boolean",
            ValueType::Array => "array",
            ValueType::Object => "object",
        }
    }
}

/// 输入参数声明
#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ValueType,
    pub required: bool,
    pub description: String,
}

/// 输出字段声明
#[derive(Debug, Clone, Serialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ValueType,
    pub description: String,
}

/// 工具契约：名称唯一，输入/输出 schema、幂等标记、成本提示
#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
    pub outputs: Vec<FieldSpec>,
    /// 相同参数重复调用是否得到等价结果
    pub idempotent: bool,
    /// 相对成本，供步数预算权衡参考
    pub cost_hint: u32,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            outputs: Vec::new(),
            idempotent: true,
            cost_hint: 1,
        }
    }

    pub fn param(
        mut self,
        name: &str,
        ty: ValueType,
        required: bool,
        description: &str,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            ty,
            required,
            description: description.to_string(),
        });
        self
    }

    pub fn output(mut self, name: &str, ty: ValueType, description: &str) -> Self {
        self.outputs.push(FieldSpec {
            name: name.to_string(),
            ty,
            description: description.to_string(),
        });
        self
    }

    pub fn idempotent(mut self, yes: bool) -> Self {
        self.idempotent = yes;
        self
    }

    pub fn cost_hint(mut self, cost: u32) -> Self {
        self.cost_hint = cost;
        self
    }

    /// 校验实参（引用已解析为具体值）：必须是对象；必填齐全；类型匹配；不接受未声明参数
    pub fn validate_args(&self, args: &Value) -> Result<(), String> {
        let obj = match args.as_object() {
            Some(o) => o,
            None => return Err("args 必须是 JSON 对象".to_string()),
        };

        let mut issues = Vec::new();
        for param in &self.params {
            match obj.get(&param.name) {
                None if param.required => {
                    issues.push(format!("缺少必填参数 {}", param.name));
                }
                None => {}
                Some(v) if !param.ty.matches(v) => {
                    issues.push(format!(
                        "参数 {} 类型错误：期望 {}，实际 {}",
                        param.name,
                        param.ty.name(),
                        json_type_name(v)
                    ));
                }
                Some(_) => {}
            }
        }
        for key in obj.keys() {
            if !self.params.iter().any(|p| &p.name == key) {
                issues.push(format!("未声明的参数 {}", key));
            }
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues.join("; "))
        }
    }

    /// 注入规划提示词的能力清单条目
    pub fn catalog_entry(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "params": self.params,
            "outputs": self.outputs,
            "idempotent": self.idempotent,
            "cost_hint": self.cost_hint,
        })
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec() -> ToolSpec {
        ToolSpec::new("stat_summary", "统计摘要")
            .param("path", ValueType::String, true, "数据文件路径")
            .param("columns", ValueType::Array, false, "仅统计指定列")
    }

    #[test]
    fn test_valid_args() {
        spec().validate_args(&json!({"path": "/tmp/a.csv"})).unwrap();
        spec()
            .validate_args(&json!({"path": "/tmp/a.csv", "columns": ["c0"]}))
            .unwrap();
    }

    #[test]
    fn test_missing_required() {
        let err = spec().validate_args(&json!({})).unwrap_err();
        assert!(err.contains("path"));
    }

    #[test]
    fn test_wrong_type() {
        let err = spec().validate_args(&json!({"path": 42})).unwrap_err();
        assert!(err.contains("类型错误"));
    }

    #[test]
    fn test_undeclared_param_rejected() {
        let err = spec()
            .validate_args(&json!({"path": "a", "whatever": 1}))
            .unwrap_err();
        assert!(err.contains("whatever"));
    }

    #[test]
    fn test_args_must_be_object() {
        assert!(spec().validate_args(&json!([1, 2])).is_err());
    }
}
