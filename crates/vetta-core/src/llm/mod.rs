//! LLM provider abstraction for the orchestration core.
//!
//! The language model is invoked as an opaque service: free text for
//! question generation, structured records for extraction and assessment.
//! Providers implement [`LlmProvider`]; [`BoxLlmProvider`] erases the
//! concrete type for runtime composition.

pub mod box_provider;
pub mod provider;
pub mod retry;
pub mod structured;

pub use box_provider::BoxLlmProvider;
pub use provider::LlmProvider;
pub use retry::RetryPolicy;
