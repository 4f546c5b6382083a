//! Prism - Rust 动态分析智能体
//!
//! CLI 入口：prism <文件> <问题...>
//! 初始化日志与配置，装配组件，跑一次会话并打印报告；Ctrl-C 取消。

use std::path::PathBuf;

use anyhow::{bail, Context};
use tokio_util::sync::CancellationToken;

use prism::agent::{analyze_file, build_components};
use prism::config::load_config;
use prism::plan::{SessionEvent, SessionStatus};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    prism::observability::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 2 {
        bail!("用法: prism <文件> <问题...>");
    }
    let file = PathBuf::from(&args[0]);
    let query = args[1..].join(" ");

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });
    let components = build_components(cfg).context("Failed to build agent components")?;

    // Ctrl-C -> 取消令牌，会话以 aborted:cancelled 收尾
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    // 过程事件打到日志，便于观察规划轨迹
    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<SessionEvent>();
    let printer = tokio::spawn(async move {
        while let Some(ev) = event_rx.recv().await {
            match &ev {
                SessionEvent::Decision { preview } => tracing::info!(%preview, "decision"),
                SessionEvent::ToolCall { node, tool, .. } => {
                    tracing::info!(node, %tool, "tool call")
                }
                SessionEvent::Observation { node, tool, preview } => {
                    tracing::info!(node, %tool, %preview, "observation")
                }
                SessionEvent::NodeFailed { node, tool, reason } => {
                    tracing::warn!(node, %tool, %reason, "node failed")
                }
                SessionEvent::Recovery { action, detail } => {
                    tracing::warn!(%action, %detail, "recovery")
                }
                _ => {}
            }
        }
    });

    let report = analyze_file(&components, &file, &query, Some(event_tx), cancel)
        .await
        .context("Session failed")?;
    let _ = printer.await;

    println!();
    match &report.status {
        SessionStatus::Terminated => {
            println!("{}", report.final_answer.as_deref().unwrap_or(""));
        }
        SessionStatus::Aborted { reason } => {
            println!("会话中止: {}", reason);
        }
    }
    println!("\n--- 轨迹（{} 轮规划）---", report.steps);
    for entry in &report.trace {
        println!(
            "#{} {} {:?}{}",
            entry.node,
            entry.kind,
            entry.status,
            entry
                .failure
                .as_deref()
                .map(|r| format!(" - {}", r))
                .unwrap_or_default()
        );
    }

    if matches!(report.status, SessionStatus::Aborted { .. }) {
        std::process::exit(1);
    }
    Ok(())
}
