//! Mimir Adapters
//!
//! External-interface traits for the vector store, knowledge graph,
//! embedder, and LLM, plus in-process implementations used by the CLI and
//! the test suite. The agents crate depends only on the traits.

pub mod embedding;
pub mod error;
pub mod graph;
pub mod llm;
pub mod vector;

pub use embedding::{cosine_similarity, Embedder, HashEmbedder};
pub use error::AdapterError;
pub use graph::{GraphStore, InMemoryGraphStore, RelatedEntity};
pub use llm::{synthesis_prompt, CompletionParams, HttpLlmClient, LlmClient};
pub use vector::{InMemoryVectorStore, ScoredChunk, VectorStore};
