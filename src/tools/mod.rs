pub mod convert;
pub mod dataset;
pub mod diagnose;
pub mod registry;
pub mod spec;
pub mod stats;
pub mod viz;

pub use convert::{AudioToTextTool, DocToTextTool, NoopTranscriber, Transcriber};
pub use dataset::{FileMeta, Modality, NumericTable};
pub use diagnose::{FaultClassifyTool, FaultModel, SpectralKurtosisModel, FAULT_LABELS};
pub use registry::{Tool, ToolRegistry};
pub use spec::{FieldSpec, ParamSpec, ToolSpec, ValueType};
pub use stats::StatSummaryTool;
pub use viz::{FreqPlotTool, TimePlotTool};
