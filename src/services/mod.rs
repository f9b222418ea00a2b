//! Services module.

pub mod cache;
pub mod candidates;
pub mod example_store;
pub mod llm;
pub mod orchestrator;
pub mod prompts;
pub mod vector_ops;

pub use cache::{
    CacheBackend, CacheEntry, CompletionCache, FileCacheBackend, InMemoryCacheBackend,
};
pub use example_store::{AddOutcome, ExampleStore};
pub use llm::LlmService;
pub use orchestrator::ResolutionOrchestrator;
pub use vector_ops::VectorOps;
