//! 故障诊断
//!
//! fault_classify：取信号前 1200 个采样点送入 FaultModel，输出四类之一与
//! 各类得分。真实 CNN 推理是外部协作方，这里只固定其接口；内置的
//! SpectralKurtosisModel 按 RMS / 峭度 / 峰值因子 / 高频能量占比的经验规则
//! 确定性打分，使契约可以端到端跑通。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::tools::dataset::NumericTable;
use crate::tools::stats::{kurtosis, rms};
use crate::tools::{Tool, ToolSpec, ValueType};

/// 四个诊断类别，次序与得分数组一致
pub const FAULT_LABELS: [&str; 4] = ["轴承滚珠故障", "健康状态", "轴承内圈故障", "轴承外圈故障"];

/// 诊断窗口长度（采样点）
pub const WINDOW_SAMPLES: usize = 1200;

/// 诊断模型后端：输入定长窗口，输出四类得分（和为 1）
pub trait FaultModel: Send + Sync {
    fn classify(&self, window: &[f64]) -> Result<[f64; 4], String>;
}

/// 内置后端：谱峭度经验规则
///
/// - 峭度接近 0 且峰值因子小 -> 健康
/// - 峭度大、峰值因子大 -> 滚珠故障（冲击性强）
/// - 高频能量占比高 -> 内圈，低 -> 外圈
#[derive(Debug, Default)]
pub struct SpectralKurtosisModel;

impl FaultModel for SpectralKurtosisModel {
    fn classify(&self, window: &[f64]) -> Result<[f64; 4], String> {
        if window.is_empty() {
            return Err("EMPTY_WINDOW: 窗口为空".to_string());
        }
        let r = rms(window);
        if r == 0.0 || !r.is_finite() {
            // 全零/非法信号按健康处理
            return Ok([0.0, 1.0, 0.0, 0.0]);
        }
        let k = kurtosis(window).max(0.0);
        let peak = window.iter().fold(0.0f64, |acc, x| acc.max(x.abs()));
        let crest = peak / r;
        // 一阶差分能量 / 信号能量，作为高频占比
        let diff_energy: f64 = window.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum();
        let energy: f64 = window.iter().map(|x| x * x).sum();
        let hf = (diff_energy / (2.0 * energy)).clamp(0.0, 1.0);

        let impulsive = k / (k + 3.0);
        let spiky = ((crest - 3.0).max(0.0) / 5.0).min(1.0);

        let ball = impulsive * spiky;
        let healthy = (1.0 - impulsive) * (1.0 - spiky);
        let inner = impulsive * (1.0 - spiky) * hf;
        let outer = impulsive * (1.0 - spiky) * (1.0 - hf);

        let sum = ball + healthy + inner + outer;
        if sum == 0.0 {
            return Ok([0.0, 1.0, 0.0, 0.0]);
        }
        Ok([ball / sum, healthy / sum, inner / sum, outer / sum])
    }
}

/// CNN 故障分类工具（模型后端可替换）
pub struct FaultClassifyTool {
    model: Arc<dyn FaultModel>,
    window: usize,
}

impl FaultClassifyTool {
    pub fn new(model: Arc<dyn FaultModel>) -> Self {
        Self {
            model,
            window: WINDOW_SAMPLES,
        }
    }

    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }
}

#[async_trait]
impl Tool for FaultClassifyTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "fault_classify",
            "对振动信号做四分类故障诊断（滚珠/健康/内圈/外圈），需要至少 1200 个采样点",
        )
        .param("path", ValueType::String, true, "信号文件路径，通常传 \"$input\"")
        .output("prediction", ValueType::String, "诊断类别")
        .output("scores", ValueType::Object, "类别 -> 得分")
        .cost_hint(5)
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "缺少 path".to_string())?;
        let table = NumericTable::load(std::path::Path::new(path))?;
        let flat = table.flattened();
        if flat.len() < self.window {
            return Err(format!(
                "INPUT_TOO_SHORT: 信号只有 {} 个采样点，诊断需要至少 {} 个",
                flat.len(),
                self.window
            ));
        }

        let scores = self.model.classify(&flat[..self.window])?;
        let best = scores
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).expect("scores finite"))
            .map(|(i, _)| i)
            .expect("four labels");

        let mut score_map = Map::new();
        for (label, score) in FAULT_LABELS.iter().zip(scores.iter()) {
            score_map.insert(label.to_string(), json!(score));
        }

        Ok(json!({
            "prediction": FAULT_LABELS[best],
            "scores": score_map,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn csv_of(samples: &[f64]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sig.csv");
        let body: String = samples.iter().map(|v| format!("{v}\n")).collect();
        std::fs::write(&path, body).unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_input_too_short() {
        let (_dir, path) = csv_of(&[0.1; 100]);
        let tool = FaultClassifyTool::new(Arc::new(SpectralKurtosisModel));
        let err = tool
            .execute(json!({"path": path.display().to_string()}))
            .await
            .unwrap_err();
        assert!(err.contains("INPUT_TOO_SHORT"));
    }

    #[tokio::test]
    async fn test_smooth_signal_is_healthy() {
        // 低峭度的平滑正弦 -> 健康状态
        let samples: Vec<f64> = (0..1500)
            .map(|t| (2.0 * std::f64::consts::PI * t as f64 / 50.0).sin())
            .collect();
        let (_dir, path) = csv_of(&samples);
        let tool = FaultClassifyTool::new(Arc::new(SpectralKurtosisModel));
        let out = tool
            .execute(json!({"path": path.display().to_string()}))
            .await
            .unwrap();
        assert_eq!(out["prediction"], json!("健康状态"));
    }

    #[tokio::test]
    async fn test_impulsive_signal_is_ball_fault() {
        // 稀疏大冲击叠加小底噪 -> 高峭度高峰值因子
        let samples: Vec<f64> = (0..1500)
            .map(|t| {
                let base = 0.01 * ((t % 7) as f64 - 3.0);
                if t % 120 == 0 {
                    base + 5.0
                } else {
                    base
                }
            })
            .collect();
        let (_dir, path) = csv_of(&samples);
        let tool = FaultClassifyTool::new(Arc::new(SpectralKurtosisModel));
        let out = tool
            .execute(json!({"path": path.display().to_string()}))
            .await
            .unwrap();
        assert_eq!(out["prediction"], json!("轴承滚珠故障"));
    }

    #[tokio::test]
    async fn test_deterministic_scores() {
        let samples: Vec<f64> = (0..1300).map(|t| ((t * 37) % 11) as f64 / 10.0).collect();
        let (_dir, path) = csv_of(&samples);
        let tool = FaultClassifyTool::new(Arc::new(SpectralKurtosisModel));
        let args = json!({"path": path.display().to_string()});
        let a = tool.execute(args.clone()).await.unwrap();
        let b = tool.execute(args).await.unwrap();
        assert_eq!(a, b);
    }
}
