//! Vetta orchestration core.
//!
//! Wires the interview components into a single-entry state-transition
//! cycle: interpret the answer, extract skills or criteria, assess
//! engagement, route (follow up, advance, or terminate), generate the next
//! question, and checkpoint the updated session state.
//!
//! Persistence and LLM transport are behind traits ([`CheckpointStore`],
//! [`InterviewRepository`], [`llm::LlmProvider`]); implementations live in
//! `vetta-infra`.
//!
//! [`CheckpointStore`]: checkpoint::CheckpointStore
//! [`InterviewRepository`]: repository::InterviewRepository

pub mod checkpoint;
pub mod emitter;
pub mod engagement;
pub mod extract;
pub mod interpret;
pub mod llm;
pub mod orchestrator;
pub mod question;
pub mod repository;
pub mod routing;
pub mod turn;

pub use orchestrator::{InterviewOrchestrator, StartRequest};
