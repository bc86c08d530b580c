//! Engine error taxonomy
//!
//! Adapter failures are recovered inside the retriever by fallback chains;
//! everything else is recovered at the orchestrator, which turns it into an
//! error response. `RagEngine::query` never surfaces these to the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Empty or malformed query; rejected before planning
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Planner could not emit a valid step DAG
    #[error("plan infeasible: {0}")]
    PlanInfeasible(String),

    /// Transient adapter error; handled by the retrieval fallback chain
    #[error("adapter failure: {0}")]
    AdapterFailure(String),

    /// Every retrieval step came back empty
    #[error("no documents retrieved")]
    EmptyResults,

    /// Synthesis raised; the orchestrator emits an error response
    #[error("synthesis failed: {0}")]
    SynthesisFailure(String),

    /// Validator could not score the answer
    #[error("validation indeterminate: {0}")]
    ValidationIndeterminate(String),

    /// Request deadline expired
    #[error("request deadline exceeded")]
    Deadline,
}

impl EngineError {
    /// Short root-cause tag carried in response metadata
    pub fn summary(&self) -> String {
        match self {
            EngineError::InvalidQuery(m) => format!("invalid_query: {m}"),
            EngineError::PlanInfeasible(m) => format!("plan_infeasible: {m}"),
            EngineError::AdapterFailure(m) => format!("adapter_failure: {m}"),
            EngineError::EmptyResults => "empty_results".to_string(),
            EngineError::SynthesisFailure(m) => format!("synthesis_failure: {m}"),
            EngineError::ValidationIndeterminate(m) => {
                format!("validation_indeterminate: {m}")
            }
            EngineError::Deadline => "deadline_exceeded".to_string(),
        }
    }
}
