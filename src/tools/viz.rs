//! 可视化
//!
//! time_plot / freq_plot：取前 4 个数值列，渲染为 SVG 折线图写入 plots 目录，
//! 输出图片路径。文件名带 uuid，同参数重复调用生成新文件（幂等标记为 false）。
//! 频谱用朴素 DFT，样本数截到 1024。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::tools::dataset::NumericTable;
use crate::tools::{Tool, ToolSpec, ValueType};

/// 每张图最多画的列数（与数据表前几列的约定一致）
const MAX_SERIES: usize = 4;
/// 折线下采样后的最大点数
const MAX_POINTS: usize = 2000;
/// DFT 输入样本上限
const DFT_SAMPLES: usize = 1024;

const SVG_W: f64 = 640.0;
const SVG_H: f64 = 400.0;
const MARGIN: f64 = 42.0;
const SERIES_COLORS: [&str; MAX_SERIES] = ["#1f77b4", "#ff7f0e", "#2ca02c", "#d62728"];

fn load_series(path: &str) -> Result<(NumericTable, Vec<usize>), String> {
    let table = NumericTable::load(Path::new(path))?;
    let take = table.columns.len().min(MAX_SERIES);
    Ok((table, (0..take).collect()))
}

/// 均匀下采样到 max_points
fn downsample(data: &[f64], max_points: usize) -> Vec<(f64, f64)> {
    if data.len() <= max_points {
        return data.iter().enumerate().map(|(i, y)| (i as f64, *y)).collect();
    }
    let stride = data.len() as f64 / max_points as f64;
    (0..max_points)
        .map(|i| {
            let idx = (i as f64 * stride) as usize;
            (idx as f64, data[idx])
        })
        .collect()
}

/// 实信号幅度谱（朴素 DFT，k ∈ [0, n/2)）
fn dft_magnitude(xs: &[f64]) -> Vec<f64> {
    let n = xs.len().min(DFT_SAMPLES);
    let xs = &xs[..n];
    let half = n / 2;
    let mut mags = Vec::with_capacity(half);
    for k in 0..half {
        let mut re = 0.0;
        let mut im = 0.0;
        for (t, x) in xs.iter().enumerate() {
            let phi = -2.0 * std::f64::consts::PI * (k as f64) * (t as f64) / (n as f64);
            re += x * phi.cos();
            im += x * phi.sin();
        }
        mags.push((re * re + im * im).sqrt());
    }
    mags
}

/// 多条折线渲染为一个自包含 SVG（坐标框 + 右上角图例）
fn render_polylines(title: &str, series: &[(String, Vec<(f64, f64)>)]) -> String {
    let (mut x_min, mut x_max) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for (_, points) in series {
        for (x, y) in points {
            x_min = x_min.min(*x);
            x_max = x_max.max(*x);
            y_min = y_min.min(*y);
            y_max = y_max.max(*y);
        }
    }
    if !x_min.is_finite() {
        x_min = 0.0;
        x_max = 1.0;
        y_min = 0.0;
        y_max = 1.0;
    }
    if (x_max - x_min).abs() < f64::EPSILON {
        x_max = x_min + 1.0;
    }
    if (y_max - y_min).abs() < f64::EPSILON {
        y_max = y_min + 1.0;
    }

    let sx = |x: f64| MARGIN + (x - x_min) / (x_max - x_min) * (SVG_W - 2.0 * MARGIN);
    let sy = |y: f64| SVG_H - MARGIN - (y - y_min) / (y_max - y_min) * (SVG_H - 2.0 * MARGIN);

    let mut svg = String::new();
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\">\n",
        w = SVG_W,
        h = SVG_H
    ));
    svg.push_str("<rect width=\"100%\" height=\"100%\" fill=\"white\"/>\n");
    svg.push_str(&format!(
        "<text x=\"{}\" y=\"24\" text-anchor=\"middle\" font-size=\"15\" font-family=\"sans-serif\">{}</text>\n",
        SVG_W / 2.0,
        title
    ));
    svg.push_str(&format!(
        "<rect x=\"{m}\" y=\"{m}\" width=\"{iw}\" height=\"{ih}\" fill=\"none\" stroke=\"#999\"/>\n",
        m = MARGIN,
        iw = SVG_W - 2.0 * MARGIN,
        ih = SVG_H - 2.0 * MARGIN
    ));

    for (idx, (label, points)) in series.iter().enumerate() {
        let color = SERIES_COLORS[idx % SERIES_COLORS.len()];
        let path: Vec<String> = points
            .iter()
            .map(|(x, y)| format!("{:.2},{:.2}", sx(*x), sy(*y)))
            .collect();
        svg.push_str(&format!(
            "<polyline fill=\"none\" stroke=\"{}\" stroke-width=\"1\" points=\"{}\"/>\n",
            color,
            path.join(" ")
        ));
        svg.push_str(&format!(
            "<text x=\"{}\" y=\"{}\" font-size=\"12\" font-family=\"sans-serif\" fill=\"{}\">{}</text>\n",
            SVG_W - MARGIN - 90.0,
            MARGIN + 16.0 + idx as f64 * 16.0,
            color,
            label
        ));
    }
    svg.push_str("</svg>\n");
    svg
}

fn write_plot(plots_dir: &Path, prefix: &str, svg: &str) -> Result<PathBuf, String> {
    std::fs::create_dir_all(plots_dir)
        .map_err(|e| format!("无法创建绘图目录 {}: {}", plots_dir.display(), e))?;
    let file = plots_dir.join(format!(
        "{}_{}.svg",
        prefix,
        uuid::Uuid::new_v4().simple()
    ));
    std::fs::write(&file, svg).map_err(|e| format!("写入 {} 失败: {}", file.display(), e))?;
    Ok(file)
}

/// 时域折线图工具
pub struct TimePlotTool {
    plots_dir: PathBuf,
}

impl TimePlotTool {
    pub fn new(plots_dir: impl Into<PathBuf>) -> Self {
        Self {
            plots_dir: plots_dir.into(),
        }
    }
}

#[async_trait]
impl Tool for TimePlotTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new("time_plot", "绘制数值表前 4 列的时域折线图，输出 SVG 文件路径")
            .param("path", ValueType::String, true, "数据文件路径，通常传 \"$input\"")
            .output("image_path", ValueType::String, "生成的 SVG 路径")
            .output("columns", ValueType::Array, "绘制的列名")
            .output("samples", ValueType::Integer, "原始样本数")
            .idempotent(false)
            .cost_hint(2)
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "缺少 path".to_string())?;
        let (table, cols) = load_series(path)?;

        let series: Vec<(String, Vec<(f64, f64)>)> = cols
            .iter()
            .map(|&i| {
                (
                    table.columns[i].clone(),
                    downsample(table.column(i).expect("column exists"), MAX_POINTS),
                )
            })
            .collect();
        let svg = render_polylines("Time-domain", &series);
        let file = write_plot(&self.plots_dir, "time", &svg)?;

        Ok(json!({
            "image_path": file.display().to_string(),
            "columns": cols.iter().map(|&i| table.columns[i].clone()).collect::<Vec<_>>(),
            "samples": table.len(),
        }))
    }
}

/// 频谱图工具
pub struct FreqPlotTool {
    plots_dir: PathBuf,
}

impl FreqPlotTool {
    pub fn new(plots_dir: impl Into<PathBuf>) -> Self {
        Self {
            plots_dir: plots_dir.into(),
        }
    }
}

#[async_trait]
impl Tool for FreqPlotTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new("freq_plot", "绘制数值表前 4 列的幅度谱（DFT），输出 SVG 文件路径")
            .param("path", ValueType::String, true, "数据文件路径，通常传 \"$input\"")
            .output("image_path", ValueType::String, "生成的 SVG 路径")
            .output("columns", ValueType::Array, "绘制的列名")
            .output("bins", ValueType::Integer, "频点数")
            .idempotent(false)
            .cost_hint(3)
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "缺少 path".to_string())?;
        let (table, cols) = load_series(path)?;

        let mut bins = 0usize;
        let series: Vec<(String, Vec<(f64, f64)>)> = cols
            .iter()
            .map(|&i| {
                let mags = dft_magnitude(table.column(i).expect("column exists"));
                bins = bins.max(mags.len());
                (
                    table.columns[i].clone(),
                    mags.iter().enumerate().map(|(k, m)| (k as f64, *m)).collect(),
                )
            })
            .collect();
        if bins == 0 {
            return Err("INPUT_TOO_SHORT: 样本数不足以计算频谱".to_string());
        }
        let svg = render_polylines("Frequency Spectrum", &series);
        let file = write_plot(&self.plots_dir, "freq", &svg)?;

        Ok(json!({
            "image_path": file.display().to_string(),
            "columns": cols.iter().map(|&i| table.columns[i].clone()).collect::<Vec<_>>(),
            "bins": bins,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dft_picks_dominant_bin() {
        // 64 个样本的单频正弦（周期 8 样本 -> 频点 8）
        let xs: Vec<f64> = (0..64)
            .map(|t| (2.0 * std::f64::consts::PI * t as f64 / 8.0).sin())
            .collect();
        let mags = dft_magnitude(&xs);
        let peak = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(k, _)| k)
            .unwrap();
        assert_eq!(peak, 8);
    }

    #[test]
    fn test_downsample_bounds() {
        let data: Vec<f64> = (0..10_000).map(|i| i as f64).collect();
        let points = downsample(&data, 100);
        assert_eq!(points.len(), 100);
        assert_eq!(points[0], (0.0, 0.0));
    }

    #[tokio::test]
    async fn test_time_plot_writes_svg() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("sig.csv");
        std::fs::write(&data, "a,b\n1,2\n2,1\n3,4\n").unwrap();

        let tool = TimePlotTool::new(dir.path().join("plots"));
        let out = tool
            .execute(json!({"path": data.display().to_string()}))
            .await
            .unwrap();
        let image = out["image_path"].as_str().unwrap();
        assert!(image.ends_with(".svg"));
        let svg = std::fs::read_to_string(image).unwrap();
        assert!(svg.contains("<polyline"));
    }

    #[tokio::test]
    async fn test_fresh_file_per_invocation() {
        let dir = tempfile::tempdir().unwrap();
        let data = dir.path().join("sig.csv");
        std::fs::write(&data, "a\n1\n2\n3\n").unwrap();

        let tool = TimePlotTool::new(dir.path().join("plots"));
        let args = json!({"path": data.display().to_string()});
        let first = tool.execute(args.clone()).await.unwrap();
        let second = tool.execute(args).await.unwrap();
        assert_ne!(first["image_path"], second["image_path"]);
    }
}
