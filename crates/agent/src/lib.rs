//! The analysis agent: API envelope models and the bounded reason-act loop
//! driving LLM tool calls against the GUAC tool plane.

use thiserror::Error;

pub mod analyzer;
pub mod models;

pub use analyzer::{Analyzer, MAX_STEPS, SYSTEM_PROMPT};
pub use models::{
    AnalysisMetadata, AnalysisOptions, AnalysisRequest, AnalysisResponse, StepData,
    SupportingData,
};

/// Errors that escape the agent loop. Tool-level failures never do; they are
/// recorded as steps and fed back to the model through the findings.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("LLM analysis failed: {0}")]
    Llm(#[from] analyst_provider::ProviderError),

    #[error("LLM produced invalid tool arguments: {0}")]
    Arguments(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AnalyzerError>;
