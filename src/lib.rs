//! Medical code resolver - Library Entry Point
//!
//! Resolves free-text medication mentions and condition names to RxNorm and
//! ICD-10 codes using a self-growing example store, terminology services and
//! LLM arbitration.

pub mod clients;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;
pub mod traits;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use clients::{ClinicalTablesClient, OpenAiClient, RxNavClient};
pub use config::{Config, ResolverSettings};
pub use error::{ErrorKind, ResolveError};
pub use models::{CodeExample, CodeType, MedicalCodeResult, Resolution};
pub use services::{CompletionCache, ExampleStore, LlmService, ResolutionOrchestrator};
pub use traits::{CompletionClient, EmbeddingClient, TerminologyClient};
