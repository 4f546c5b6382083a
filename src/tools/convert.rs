//! 格式转换
//!
//! doc_to_text：txt/markdown 直接读取；doc/docx/pdf 交给 pandoc 子进程，
//! 环境里没有 pandoc 时报结构化错误（可恢复，规划器可另作安排）。
//! audio_to_text：语音识别后端是外部协作方，接口固定为 Transcriber trait；
//! 默认后端只报 ASR_BACKEND_UNAVAILABLE。

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::tools::{Tool, ToolSpec, ValueType};

/// pandoc 可处理的扩展名
const PANDOC_EXTS: [&str; 3] = ["doc", "docx", "pdf"];

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

async fn pandoc_to_text(path: &Path) -> Result<String, String> {
    let output = Command::new("pandoc")
        .arg("-t")
        .arg("plain")
        .arg(path)
        .output()
        .await
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                "CONVERTER_UNAVAILABLE: 未找到 pandoc，无法转换该格式".to_string()
            } else {
                format!("CONVERTER_UNAVAILABLE: pandoc 启动失败: {}", e)
            }
        })?;
    if !output.status.success() {
        return Err(format!(
            "CONVERT_FAILED: pandoc exit {}: {}",
            output.status.code().unwrap_or(-1),
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// 文档转文本工具
pub struct DocToTextTool;

#[async_trait]
impl Tool for DocToTextTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "doc_to_text",
            "把文档转为纯文本：txt/md 直接读取，doc/docx/pdf 走 pandoc",
        )
        .param("path", ValueType::String, true, "文档路径，通常传 \"$input\"")
        .output("text", ValueType::String, "提取出的纯文本")
        .output("chars", ValueType::Integer, "文本字符数")
        .output("source", ValueType::String, "源文件名")
        .cost_hint(2)
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let path_str = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "缺少 path".to_string())?;
        let path = Path::new(path_str);
        let ext = extension(path);

        let text = match ext.as_str() {
            "txt" | "md" | "markdown" => tokio::fs::read_to_string(path)
                .await
                .map_err(|e| format!("READ_FAILED: 无法读取 {}: {}", path.display(), e))?,
            e if PANDOC_EXTS.contains(&e) => pandoc_to_text(path).await?,
            other => {
                return Err(format!("UNSUPPORTED_FORMAT: 暂不支持 .{} 文件", other));
            }
        };

        let source = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(json!({
            "text": text,
            "chars": text.chars().count(),
            "source": source,
        }))
    }
}

/// 语音识别后端接口
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, path: &Path) -> Result<String, String>;
}

/// 默认后端：未接入任何识别引擎
#[derive(Debug, Default)]
pub struct NoopTranscriber;

#[async_trait]
impl Transcriber for NoopTranscriber {
    async fn transcribe(&self, _path: &Path) -> Result<String, String> {
        Err("ASR_BACKEND_UNAVAILABLE: 未配置语音识别后端".to_string())
    }
}

/// 音频转文本工具（后端可替换）
pub struct AudioToTextTool {
    backend: Arc<dyn Transcriber>,
}

impl AudioToTextTool {
    pub fn new(backend: Arc<dyn Transcriber>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for AudioToTextTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new("audio_to_text", "把音频转写为文本（需要配置语音识别后端）")
            .param("path", ValueType::String, true, "音频路径，通常传 \"$input\"")
            .output("transcript", ValueType::String, "转写文本")
            .output("chars", ValueType::Integer, "文本字符数")
            .cost_hint(8)
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let path_str = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "缺少 path".to_string())?;
        let path = Path::new(path_str);
        if !path.exists() {
            return Err(format!("READ_FAILED: 文件不存在: {}", path.display()));
        }
        let transcript = self.backend.transcribe(path).await?;
        Ok(json!({
            "transcript": transcript,
            "chars": transcript.chars().count(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_doc_to_text_reads_markdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.md");
        std::fs::write(&path, "# 标题\n\n正文内容。").unwrap();

        let out = DocToTextTool
            .execute(json!({"path": path.display().to_string()}))
            .await
            .unwrap();
        assert!(out["text"].as_str().unwrap().contains("正文内容"));
        assert_eq!(out["source"], json!("report.md"));
    }

    #[tokio::test]
    async fn test_doc_to_text_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("image.png");
        std::fs::write(&path, b"\x89PNG").unwrap();

        let err = DocToTextTool
            .execute(json!({"path": path.display().to_string()}))
            .await
            .unwrap_err();
        assert!(err.contains("UNSUPPORTED_FORMAT"));
    }

    #[tokio::test]
    async fn test_audio_without_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memo.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        let tool = AudioToTextTool::new(Arc::new(NoopTranscriber));
        let err = tool
            .execute(json!({"path": path.display().to_string()}))
            .await
            .unwrap_err();
        assert!(err.contains("ASR_BACKEND_UNAVAILABLE"));
    }

    struct FixedTranscriber(&'static str);

    #[async_trait]
    impl Transcriber for FixedTranscriber {
        async fn transcribe(&self, _path: &Path) -> Result<String, String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn test_audio_with_backend() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memo.wav");
        std::fs::write(&path, b"RIFF").unwrap();

        let tool = AudioToTextTool::new(Arc::new(FixedTranscriber("会议于九点开始")));
        let out = tool
            .execute(json!({"path": path.display().to_string()}))
            .await
            .unwrap();
        assert_eq!(out["transcript"], json!("会议于九点开始"));
    }
}
