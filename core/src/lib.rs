//! Mimir Core
//!
//! Data model, error taxonomy, configuration, caches, and text analysis
//! primitives shared by the retrieval agents and the adapters.

pub mod cache;
pub mod config;
pub mod error;
pub mod text;
pub mod types;

pub use cache::{CacheKey, CacheStats, EmbeddingCache, RetrievalCache, SynthesisCache};
pub use config::{EngineConfig, LlmConfig};
pub use error::EngineError;
pub use types::{
    Document, DocumentSource, EngineStatsSnapshot, QueryComplexity, QueryPlan, QueryRequest,
    QueryResponse, ResponseMetadata, RetrievalResult, RetrievalStep, RetrievalStrategy,
    StepMetadata, SynthesisResult, SynthesisStrategy, ValidationDimension, ValidationResult,
};
