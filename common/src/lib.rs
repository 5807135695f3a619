//! Skin AI Common Library
//!
//! CLIとテストで共有される型・プロンプト・状態管理

pub mod error;
pub mod export;
pub mod intake;
pub mod parser;
pub mod prompts;
pub mod report;
pub mod state;
pub mod types;

pub use error::{Error, Result};
pub use intake::{intake_files, CandidateFile, IntakeFile, IntakeOutcome};
pub use parser::{parse_analysis_response, parse_overall_response, strip_fence};
pub use state::{Action, AnalysisPlan, AnalysisPoint, AppState, RunMode};
pub use types::{
    LabeledResult, OverallReport, OverallReportContent, PointSummary, RunRecord,
    SkinAnalysisResult,
};
