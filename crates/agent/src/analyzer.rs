//! The bounded reason-act loop.
//!
//! Per request the loop asks the LLM for the next action, executes at most
//! one tool call per step, and stops on a final answer, the step budget, or
//! an unreachable backend. Tool results are memoised: an identical
//! `(function, arguments)` call replays the recorded data instead of hitting
//! the backend again.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, info, warn};

use analyst_guac::tools::truncate_bytes;
use analyst_guac::{GuacClient, ToolRegistry};
use analyst_provider::{AnalyzeOptions, Provider, Tool, Usage};

use crate::models::{
    AnalysisMetadata, AnalysisRequest, AnalysisResponse, QueryRecord, StepData, SupportingData,
};
use crate::{AnalyzerError, Result};

pub const MAX_STEPS: usize = 5;

const MAX_GUAC_RETRIES: usize = 2;
const MAX_RESULT_BYTES: usize = 5000;

pub const SYSTEM_PROMPT: &str = "\
You are an AI agent analyzing software supply chain data.
You have access to various functions (tools) that can help you gather additional information.
Your goal is to analyze the user's query by possibly calling functions to gather context,
and then provide a final, well-reasoned answer.
When you need more information, call a function instead of making assumptions.
Note: in GUAC, ID fields are numerical identifiers of the nodes in the graph so only use them for referencing specific known nodes.
After you've gathered enough information, provide a concise final answer to the user.

!!!IMPORTANT NOTE!!!: Do not repeat function calls with the same arguments if the results are already known.
If you attempt to call a function with the same arguments again, you will receive no new data.
Thus, do not waste steps by repeating the same call. If no new information is available, proceed to final answer.

If 'top-level package GUAC heuristic' or similar references appear, it indicates some form of dependency or related component was found.
Do not conclude 'no dependencies' if any IsDependency results show packages or files. Instead, list them and accurately describe them.";

struct AgentState {
    steps: usize,
    original_query: String,
    current_query: String,
    gathered_data: Vec<StepData>,
}

impl AgentState {
    fn new(query: &str) -> Self {
        Self {
            steps: 0,
            original_query: query.to_string(),
            current_query: query.to_string(),
            gathered_data: Vec::new(),
        }
    }

    fn push_step(&mut self, function_name: String, arguments: Value, data: String, findings: String) {
        self.gathered_data.push(StepData {
            step_number: self.steps + 1,
            function_name,
            arguments,
            data,
            findings,
        });
        self.steps += 1;
    }
}

enum AgentAction {
    FunctionCall { name: String, arguments: Value },
    FinalResponse { message: String },
}

enum StepOutcome {
    Continue,
    GuacUnreachable,
}

enum FunctionFailure {
    /// Bad tool call: recorded as a failed step, the loop continues.
    Tool(String),
    /// Backend down after all retries.
    Unreachable,
}

pub struct Analyzer<P> {
    guac_client: GuacClient,
    registry: ToolRegistry,
    provider: P,
}

impl<P: Provider> Analyzer<P> {
    pub fn new(guac_client: GuacClient, provider: P) -> Self {
        Self {
            guac_client,
            registry: ToolRegistry::new(),
            provider,
        }
    }

    /// The underlying provider, for callers that need to inspect it.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub async fn analyze(&self, req: AnalysisRequest) -> Result<AnalysisResponse> {
        info!(query = %req.query, "Starting analysis");
        let start = Instant::now();
        let mut state = AgentState::new(&req.query);

        while state.steps < MAX_STEPS {
            let (action, usage) = self.next_agent_action(&req, &state).await?;

            match action {
                AgentAction::FunctionCall { name, arguments } => {
                    match self.handle_function_call(&mut state, name, arguments).await {
                        StepOutcome::Continue => {}
                        StepOutcome::GuacUnreachable => {
                            return self.guac_failure_explanation(&req, start, &state).await
                        }
                    }
                }
                AgentAction::FinalResponse { message } => {
                    info!("Returning final response");
                    return Ok(self.assemble_response(start, &req, &state, usage, message));
                }
            }
        }

        self.final_summary(&req, start, &state).await
    }

    /// Ask the LLM for the next action given the findings so far.
    async fn next_agent_action(
        &self,
        req: &AnalysisRequest,
        state: &AgentState,
    ) -> Result<(AgentAction, Usage)> {
        let findings = summarize_findings(&state.gathered_data);
        let history_reminder = build_history_reminder(&state.gathered_data);

        let system_content = format!(
            "{}\n\nCurrent step: {}/{}\nPrevious findings:\n{}\n\n{}",
            SYSTEM_PROMPT,
            state.steps + 1,
            MAX_STEPS,
            findings,
            history_reminder,
        );

        let response = self
            .provider
            .analyze(
                &[system_content],
                &[state.current_query.clone()],
                self.request_options(req, self.registry.definitions()),
            )
            .await?;

        let action = match response.function_call {
            Some(call) => {
                let arguments: Value =
                    serde_json::from_str(&call.arguments).map_err(AnalyzerError::Arguments)?;
                debug!(function = %call.name, %arguments, "LLM requested function call");
                AgentAction::FunctionCall {
                    name: call.name,
                    arguments,
                }
            }
            None => {
                debug!(message = %response.content, "LLM provided final response");
                AgentAction::FinalResponse {
                    message: response.content,
                }
            }
        };

        Ok((action, response.usage))
    }

    async fn handle_function_call(
        &self,
        state: &mut AgentState,
        name: String,
        arguments: Value,
    ) -> StepOutcome {
        info!(function = %name, "Executing function call");

        // Identical call (JSON-value equal, so key order and whitespace are
        // irrelevant): replay the recorded data without touching the backend.
        let prior = state
            .gathered_data
            .iter()
            .find(|sd| sd.function_name == name && sd.arguments == arguments)
            .map(|sd| (sd.step_number, sd.data.clone()));
        if let Some((prior_step, data)) = prior {
            let findings = format!(
                "Step {}: {} called again with same arguments, reusing results from step {}",
                state.steps + 1,
                name,
                prior_step,
            );
            state.push_step(name, arguments, data, findings);
            return StepOutcome::Continue;
        }

        match self.execute_function(&name, &arguments).await {
            Ok(data) => {
                let findings = format!("Step {}: {} returned {}", state.steps + 1, name, data);
                state.push_step(name, arguments, data, findings);
                StepOutcome::Continue
            }
            Err(FunctionFailure::Tool(failure)) => {
                warn!(function = %name, failure = %failure, "Function execution failed");
                let findings = format!("Step {}: {} failed: {}", state.steps + 1, name, failure);
                state.push_step(name, arguments, failure, findings);
                StepOutcome::Continue
            }
            Err(FunctionFailure::Unreachable) => {
                state.push_step(
                    name,
                    arguments,
                    "Failed to reach GUAC after multiple attempts.".to_string(),
                    "GUAC unreachable after multiple attempts.".to_string(),
                );
                StepOutcome::GuacUnreachable
            }
        }
    }

    /// Dispatch a tool call, retrying backend failures.
    async fn execute_function(
        &self,
        name: &str,
        arguments: &Value,
    ) -> std::result::Result<String, FunctionFailure> {
        for attempt in 1..=MAX_GUAC_RETRIES {
            info!(function = %name, attempt, "Calling GUAC operation");
            match self
                .registry
                .dispatch(&self.guac_client, name, arguments)
                .await
            {
                Ok(data) => return Ok(data),
                Err(err) if err.is_transient() => {
                    warn!(function = %name, attempt, error = %err, "Failed to call GUAC operation");
                }
                Err(err) => return Err(FunctionFailure::Tool(err.to_string())),
            }
        }
        Err(FunctionFailure::Unreachable)
    }

    /// The step budget ran out: ask for a summary of what was found, with no
    /// tools attached.
    async fn final_summary(
        &self,
        req: &AnalysisRequest,
        start: Instant,
        state: &AgentState,
    ) -> Result<AnalysisResponse> {
        let system_content = format!(
            "\nYou have reached the maximum steps ({}). Please provide a final summary.\nOriginal Query: {}\n\nPrevious findings:\n{}\n\nIn your summary provide a truthful and concise final answer that reflects all the data discovered.\n",
            MAX_STEPS,
            state.original_query,
            summarize_findings(&state.gathered_data),
        );

        let response = self
            .provider
            .analyze(
                &[system_content],
                &[String::new()],
                self.request_options(req, Vec::new()),
            )
            .await?;

        Ok(self.assemble_response(start, req, state, response.usage, response.content))
    }

    /// The backend is down: turn that into a friendly answer instead of an
    /// HTTP error.
    async fn guac_failure_explanation(
        &self,
        req: &AnalysisRequest,
        start: Instant,
        state: &AgentState,
    ) -> Result<AnalysisResponse> {
        info!("Generating GUAC failure explanation");

        let system_content = format!(
            "You attempted to use GUAC tools multiple times but they failed.\nNow provide a concise, friendly message to the user explaining that you cannot reach the GUAC service \nand thus cannot complete their request. Apologize briefly and ask them to try again later.\n\nOriginal query: {}\n\nPrevious findings:\n{}\n",
            state.original_query,
            summarize_findings(&state.gathered_data),
        );

        let response = self
            .provider
            .analyze(
                &[system_content],
                &[String::new()],
                self.request_options(req, Vec::new()),
            )
            .await?;

        Ok(self.assemble_response(start, req, state, response.usage, response.content))
    }

    fn assemble_response(
        &self,
        start: Instant,
        req: &AnalysisRequest,
        state: &AgentState,
        usage: Usage,
        message: String,
    ) -> AnalysisResponse {
        AnalysisResponse {
            result: truncate_bytes(message, MAX_RESULT_BYTES),
            supporting_data: Some(SupportingData {
                queries: function_calls(&state.gathered_data),
                guac_data: state.gathered_data.clone(),
            }),
            metadata: AnalysisMetadata {
                duration: format!("{:?}", start.elapsed()),
                model: req.options.model.clone(),
                tokens_used: usage.total_tokens,
                steps: state.steps,
            },
        }
    }

    fn request_options(&self, req: &AnalysisRequest, tools: Vec<Tool>) -> AnalyzeOptions {
        AnalyzeOptions {
            model: (!req.options.model.is_empty()).then(|| req.options.model.clone()),
            max_tokens: (req.options.max_tokens != 0).then_some(req.options.max_tokens),
            temperature: (req.options.temperature != 0.0).then_some(req.options.temperature),
            tools,
        }
    }
}

fn summarize_findings(data: &[StepData]) -> String {
    if data.is_empty() {
        return "No previous findings.".to_string();
    }

    let mut summary = String::new();
    for step in data {
        let _ = write!(
            summary,
            "Step {}:\n  Function: {}\n  Arguments: {}\n  Data: {}\n  Findings: {}\n\n",
            step.step_number, step.function_name, step.arguments, step.data, step.findings,
        );
    }
    summary
}

/// Distinct prior calls, bulleted, so the model stops repeating itself.
fn build_history_reminder(data: &[StepData]) -> String {
    if data.is_empty() {
        return "No previous function calls have been made.".to_string();
    }

    let mut reminder =
        String::from("Previously called functions (do not repeat these exact calls):\n");
    let mut seen = HashSet::new();
    for sd in data {
        let key = format!("{}{}", sd.function_name, sd.arguments);
        if seen.insert(key) {
            let _ = writeln!(
                reminder,
                "- Function: {} Arguments: {}",
                sd.function_name, sd.arguments
            );
        }
    }
    reminder
}

fn function_calls(data: &[StepData]) -> Vec<QueryRecord> {
    data.iter()
        .map(|step| QueryRecord {
            function: step.function_name.clone(),
            arguments: step.arguments.clone(),
        })
        .collect()
}
