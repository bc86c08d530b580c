//! Agent layer: planning, retrieval, synthesis, validation, and the
//! orchestrator that runs them as a pipeline.

pub mod orchestrator;
pub mod planner;
pub mod retriever;
pub mod synthesizer;
pub mod validator;

pub use orchestrator::RagEngine;
pub use planner::Planner;
pub use retriever::Retriever;
pub use synthesizer::{classify_intent, QueryIntent, Synthesizer};
pub use validator::Validator;
