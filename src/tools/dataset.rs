//! 输入文件装载
//!
//! FileMeta 负责模态嗅探（信号表 / 文档 / 音频），结果进入规划上下文；
//! NumericTable 是统计/绘图/诊断工具共用的数值表解析（CSV 或空白分隔，
//! 首行非数值时视为表头）。

use std::path::{Path, PathBuf};

use serde::Serialize;

/// 输入文件模态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    /// 数值信号表（csv/tsv/dat，或可按数值解析的 txt）
    Signal,
    /// 文本类文档
    Document,
    /// 音频
    Audio,
    Unknown,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Signal => "signal",
            Modality::Document => "document",
            Modality::Audio => "audio",
            Modality::Unknown => "unknown",
        }
    }
}

/// 文件元数据：规划器看到的就是这些（内容本身不进提示词）
#[derive(Debug, Clone, Serialize)]
pub struct FileMeta {
    pub path: PathBuf,
    pub name: String,
    pub modality: Modality,
    pub size_bytes: u64,
}

impl FileMeta {
    /// 读取元数据并嗅探模态；文件不存在/不可读时报错
    pub fn inspect(path: &Path) -> Result<Self, String> {
        let meta = std::fs::metadata(path)
            .map_err(|e| format!("无法读取文件 {}: {}", path.display(), e))?;
        if !meta.is_file() {
            return Err(format!("{} 不是普通文件", path.display()));
        }
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self {
            modality: sniff_modality(path),
            path: path.to_path_buf(),
            name,
            size_bytes: meta.len(),
        })
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

/// 按扩展名分类；txt 歧义（原始数据表或纯文本文档），按内容能否数值解析判定
fn sniff_modality(path: &Path) -> Modality {
    match extension(path).as_str() {
        "csv" | "tsv" | "dat" => Modality::Signal,
        "wav" | "mp3" | "flac" | "m4a" | "ogg" => Modality::Audio,
        "md" | "markdown" | "doc" | "docx" | "pdf" => Modality::Document,
        "txt" => {
            if NumericTable::load(path).is_ok() {
                Modality::Signal
            } else {
                Modality::Document
            }
        }
        _ => Modality::Unknown,
    }
}

/// 数值表：列名 + 按列存储的数据
#[derive(Debug, Clone)]
pub struct NumericTable {
    pub columns: Vec<String>,
    series: Vec<Vec<f64>>,
}

impl NumericTable {
    /// 解析 CSV（含 ','）或空白分隔文本；首行任一 token 非数值则作为表头
    pub fn load(path: &Path) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("无法读取 {}: {}", path.display(), e))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut rows: Vec<Vec<&str>> = Vec::new();
        for line in raw.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let tokens: Vec<&str> = if line.contains(',') {
                line.split(',').map(str::trim).collect()
            } else {
                line.split_whitespace().collect()
            };
            rows.push(tokens);
        }
        if rows.is_empty() {
            return Err("EMPTY_TABLE: 文件中没有数据行".to_string());
        }

        let width = rows[0].len();
        let first_is_header = rows[0].iter().any(|t| t.parse::<f64>().is_err());
        let columns: Vec<String> = if first_is_header {
            rows[0].iter().map(|s| s.to_string()).collect()
        } else {
            (0..width).map(|i| format!("col{}", i)).collect()
        };
        let data_rows = if first_is_header { &rows[1..] } else { &rows[..] };
        if data_rows.is_empty() {
            return Err("EMPTY_TABLE: 只有表头没有数据".to_string());
        }

        let mut series: Vec<Vec<f64>> = vec![Vec::with_capacity(data_rows.len()); width];
        for (i, row) in data_rows.iter().enumerate() {
            if row.len() != width {
                return Err(format!(
                    "RAGGED_ROW: 第 {} 行有 {} 列，期望 {} 列",
                    i + 1,
                    row.len(),
                    width
                ));
            }
            for (col, token) in row.iter().enumerate() {
                let v: f64 = token
                    .parse()
                    .map_err(|_| format!("NOT_NUMERIC: 第 {} 行 '{}' 不是数值", i + 1, token))?;
                series[col].push(v);
            }
        }

        Ok(Self { columns, series })
    }

    /// 行数
    pub fn len(&self) -> usize {
        self.series.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column(&self, idx: usize) -> Option<&[f64]> {
        self.series.get(idx).map(|c| c.as_slice())
    }

    pub fn column_by_name(&self, name: &str) -> Option<&[f64]> {
        let idx = self.columns.iter().position(|c| c == name)?;
        self.column(idx)
    }

    /// 行优先展平（诊断窗口取样用）
    pub fn flattened(&self) -> Vec<f64> {
        let rows = self.len();
        let mut out = Vec::with_capacity(rows * self.series.len());
        for row in 0..rows {
            for col in &self.series {
                out.push(col[row]);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_csv_with_header() {
        let t = NumericTable::parse("ch1,ch2\n1.0,2.0\n3.0,4.0\n").unwrap();
        assert_eq!(t.columns, vec!["ch1", "ch2"]);
        assert_eq!(t.len(), 2);
        assert_eq!(t.column_by_name("ch2").unwrap(), &[2.0, 4.0]);
    }

    #[test]
    fn test_parse_whitespace_no_header() {
        let t = NumericTable::parse("1 2 3\n4 5 6\n").unwrap();
        assert_eq!(t.columns, vec!["col0", "col1", "col2"]);
        assert_eq!(t.column(1).unwrap(), &[2.0, 5.0]);
    }

    #[test]
    fn test_flattened_row_major() {
        let t = NumericTable::parse("1,2\n3,4\n").unwrap();
        assert_eq!(t.flattened(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_ragged_row_rejected() {
        let err = NumericTable::parse("1,2\n3\n").unwrap_err();
        assert!(err.contains("RAGGED_ROW"));
    }

    #[test]
    fn test_non_numeric_rejected() {
        let err = NumericTable::parse("1,2\n3,abc\n").unwrap_err();
        assert!(err.contains("NOT_NUMERIC"));
    }

    #[test]
    fn test_sniff_txt_modality() {
        let dir = tempfile::tempdir().unwrap();
        let sig = dir.path().join("sig.txt");
        let mut f = std::fs::File::create(&sig).unwrap();
        writeln!(f, "0.1 0.2\n0.3 0.4").unwrap();
        assert_eq!(FileMeta::inspect(&sig).unwrap().modality, Modality::Signal);

        let doc = dir.path().join("doc.txt");
        std::fs::write(&doc, "这是一个纯文本报告。\n第二段。").unwrap();
        assert_eq!(FileMeta::inspect(&doc).unwrap().modality, Modality::Document);
    }
}
