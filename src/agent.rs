//! 组件装配与会话入口
//!
//! 无头运行时：注册全部内置能力、按配置建推理后端与 Planner/Executor，
//! analyze_file 跑一次完整会话。CLI 与 Web 都只是它外面的薄适配层。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::core::{AgentError, RecoveryEngine, ToolScheduler};
use crate::llm::{create_llm_from_config, LlmClient};
use crate::plan::{
    run_session, Executor, LoopConfig, Planner, SessionEvent, SessionReport, SessionState,
};
use crate::tools::{
    AudioToTextTool, DocToTextTool, FaultClassifyTool, FileMeta, FreqPlotTool, NoopTranscriber,
    SpectralKurtosisModel, StatSummaryTool, TimePlotTool, ToolRegistry,
};

/// 一次性装配出的 Agent 运行时
pub struct AgentComponents {
    pub config: AppConfig,
    pub llm: Arc<dyn LlmClient>,
    pub registry: Arc<ToolRegistry>,
    pub planner: Planner,
    pub executor: Executor,
    pub recovery: RecoveryEngine,
}

/// 工作目录：配置 > 当前目录下的 workspace
fn workspace_root(cfg: &AppConfig) -> PathBuf {
    cfg.app
        .workspace_root
        .clone()
        .unwrap_or_else(|| PathBuf::from("workspace"))
}

/// 注册全部内置能力（统计 / 绘图 / 诊断 / 转换）
pub fn default_registry(cfg: &AppConfig) -> Result<ToolRegistry, AgentError> {
    let plots_dir = cfg
        .tools
        .plots_dir
        .clone()
        .unwrap_or_else(|| workspace_root(cfg).join("plots"));

    let mut registry = ToolRegistry::new();
    registry.register(StatSummaryTool)?;
    registry.register(TimePlotTool::new(plots_dir.clone()))?;
    registry.register(FreqPlotTool::new(plots_dir))?;
    registry.register(FaultClassifyTool::new(Arc::new(SpectralKurtosisModel)))?;
    registry.register(DocToTextTool)?;
    registry.register(AudioToTextTool::new(Arc::new(NoopTranscriber)))?;
    Ok(registry)
}

/// 用指定推理后端装配组件（测试注入 Mock 用）
pub fn build_components_with_llm(
    cfg: AppConfig,
    llm: Arc<dyn LlmClient>,
) -> Result<AgentComponents, AgentError> {
    let registry = Arc::new(default_registry(&cfg)?);
    let scheduler = Arc::new(ToolScheduler::new(cfg.session.max_parallel_tools));
    let planner = Planner::new(llm.clone(), &registry.catalog_json());
    let executor = Executor::new(registry.clone(), scheduler, cfg.tools.tool_timeout_secs);
    Ok(AgentComponents {
        config: cfg,
        llm,
        registry,
        planner,
        executor,
        recovery: RecoveryEngine::new(),
    })
}

/// 按配置装配组件（后端由 API Key 与 provider 决定，缺省 Mock）
pub fn build_components(cfg: AppConfig) -> Result<AgentComponents, AgentError> {
    let llm = create_llm_from_config(&cfg);
    build_components_with_llm(cfg, llm)
}

impl AgentComponents {
    fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            max_steps: self.config.session.max_steps,
            parse_retries: self.config.session.parse_retries,
            deadline: std::time::Duration::from_secs(self.config.session.deadline_secs),
            preview_chars: self.config.session.preview_chars,
        }
    }
}

/// 跑一次 (文件, 问题) 会话直到终态
pub async fn analyze_file(
    components: &AgentComponents,
    file_path: &Path,
    query: &str,
    events: Option<UnboundedSender<SessionEvent>>,
    cancel: CancellationToken,
) -> Result<SessionReport, AgentError> {
    let file = FileMeta::inspect(file_path).map_err(AgentError::InvalidInput)?;
    tracing::info!(file = %file.name, modality = file.modality.as_str(), %query, "session start");

    let mut state = SessionState::new(query, file);
    let report = run_session(
        &components.planner,
        &components.executor,
        &components.recovery,
        &mut state,
        &components.loop_config(),
        cancel,
        events,
    )
    .await?;

    tracing::info!(steps = report.steps, status = ?report.status, "session end");
    Ok(report)
}
