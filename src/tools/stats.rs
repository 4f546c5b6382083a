//! 统计特征提取
//!
//! stat_summary：对数值表逐列给出 mean / std / var / rms / kurtosis。
//! std、var 用样本口径（n-1）；kurtosis 为超值峭度（正态分布为 0）。

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::tools::dataset::NumericTable;
use crate::tools::{Tool, ToolSpec, ValueType};

pub(crate) fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// 样本方差（n-1）；样本数不足时 NaN
pub(crate) fn variance(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return f64::NAN;
    }
    let m = mean(xs);
    xs.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / (xs.len() - 1) as f64
}

pub(crate) fn std_dev(xs: &[f64]) -> f64 {
    variance(xs).sqrt()
}

pub(crate) fn rms(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return f64::NAN;
    }
    (xs.iter().map(|x| x * x).sum::<f64>() / xs.len() as f64).sqrt()
}

/// 超值峭度 m4/m2^2 - 3（矩估计，不做偏差修正）
pub(crate) fn kurtosis(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return f64::NAN;
    }
    let m = mean(xs);
    let m2 = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64;
    if m2 == 0.0 {
        return 0.0;
    }
    let m4 = xs.iter().map(|x| (x - m).powi(4)).sum::<f64>() / xs.len() as f64;
    m4 / (m2 * m2) - 3.0
}

/// 统计摘要工具
pub struct StatSummaryTool;

impl StatSummaryTool {
    fn selected_columns<'a>(
        table: &'a NumericTable,
        args: &'a Value,
    ) -> Result<Vec<(&'a str, &'a [f64])>, String> {
        match args.get("columns").and_then(|v| v.as_array()) {
            None => Ok(table
                .columns
                .iter()
                .enumerate()
                .map(|(i, name)| (name.as_str(), table.column(i).expect("column exists")))
                .collect()),
            Some(wanted) => {
                let mut out = Vec::with_capacity(wanted.len());
                for v in wanted {
                    let name = v
                        .as_str()
                        .ok_or_else(|| "columns 中的元素必须是列名字符串".to_string())?;
                    let data = table
                        .column_by_name(name)
                        .ok_or_else(|| format!("UNKNOWN_COLUMN: 列 {} 不存在", name))?;
                    out.push((name, data));
                }
                Ok(out)
            }
        }
    }
}

#[async_trait]
impl Tool for StatSummaryTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "stat_summary",
            "对数值信号表逐列计算统计特征（mean/std/var/rms/kurtosis），输入 CSV 或空白分隔文本",
        )
        .param("path", ValueType::String, true, "数据文件路径，通常传 \"$input\"")
        .param("columns", ValueType::Array, false, "仅统计这些列名；缺省为全部列")
        .output("mean", ValueType::Object, "列名 -> 均值")
        .output("std", ValueType::Object, "列名 -> 样本标准差")
        .output("var", ValueType::Object, "列名 -> 样本方差")
        .output("rms", ValueType::Object, "列名 -> 均方根")
        .output("kurtosis", ValueType::Object, "列名 -> 超值峭度")
        .cost_hint(1)
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "缺少 path".to_string())?;
        let table = NumericTable::load(std::path::Path::new(path))?;
        let selected = Self::selected_columns(&table, &args)?;

        let mut means = Map::new();
        let mut stds = Map::new();
        let mut vars = Map::new();
        let mut rmss = Map::new();
        let mut kurts = Map::new();
        for (name, data) in selected {
            means.insert(name.to_string(), json!(mean(data)));
            stds.insert(name.to_string(), json!(std_dev(data)));
            vars.insert(name.to_string(), json!(variance(data)));
            rmss.insert(name.to_string(), json!(rms(data)));
            kurts.insert(name.to_string(), json!(kurtosis(data)));
        }

        Ok(json!({
            "mean": means,
            "std": stds,
            "var": vars,
            "rms": rmss,
            "kurtosis": kurts,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_variance() {
        let xs = [1.0, 2.0, 3.0, 4.0];
        assert!((mean(&xs) - 2.5).abs() < 1e-12);
        // 样本方差：sum((x-2.5)^2)/3 = 5/3
        assert!((variance(&xs) - 5.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_rms() {
        let xs = [3.0, 4.0];
        assert!((rms(&xs) - (12.5f64).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_kurtosis_constant_signal() {
        assert_eq!(kurtosis(&[5.0, 5.0, 5.0, 5.0]), 0.0);
    }

    #[tokio::test]
    async fn test_execute_on_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sig.csv");
        std::fs::write(&path, "a,b\n1,10\n2,20\n3,30\n").unwrap();

        let out = StatSummaryTool
            .execute(serde_json::json!({"path": path.display().to_string()}))
            .await
            .unwrap();
        assert_eq!(out["mean"]["a"], serde_json::json!(2.0));
        assert_eq!(out["mean"]["b"], serde_json::json!(20.0));
    }

    #[tokio::test]
    async fn test_execute_unknown_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sig.csv");
        std::fs::write(&path, "a\n1\n2\n").unwrap();

        let err = StatSummaryTool
            .execute(serde_json::json!({
                "path": path.display().to_string(),
                "columns": ["nope"]
            }))
            .await
            .unwrap_err();
        assert!(err.contains("UNKNOWN_COLUMN"));
    }
}
