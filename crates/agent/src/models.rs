//! API envelope models for the analyze endpoint.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// The natural-language query to analyze.
    pub query: String,

    /// Optional parameters to control analysis behavior.
    #[serde(default)]
    pub options: AnalysisOptions,
}

/// Zero values mean "use the provider default".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOptions {
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub max_tokens: u32,

    /// Sampling temperature in [0, 2].
    #[serde(default)]
    pub temperature: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    /// The analyzed result/answer.
    pub result: String,

    /// Supporting data used in the analysis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supporting_data: Option<SupportingData>,

    pub metadata: AnalysisMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportingData {
    /// The tool calls executed, in order.
    pub queries: Vec<QueryRecord>,

    /// Raw GUAC data retrieved per step.
    pub guac_data: Vec<StepData>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    pub function: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetadata {
    /// Wall-clock time taken for the analysis.
    pub duration: String,

    pub model: String,

    /// Token usage of the last LLM call.
    pub tokens_used: u32,

    pub steps: usize,
}

/// One executed (or memoised) tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepData {
    /// 1-based step counter.
    pub step_number: usize,

    pub function_name: String,

    /// Arguments exactly as the LLM produced them.
    pub arguments: Value,

    pub data: String,

    pub findings: String,
}
