//! Infrastructure adapters for Vetta.
//!
//! Implements the persistence and transport traits defined in `vetta-core`:
//! SQLite-backed checkpoint store and interview repository (durable mode),
//! in-memory equivalents (ephemeral mode, zero external dependencies), an
//! OpenAI-compatible HTTP LLM provider, and configuration loading.

pub mod bootstrap;
pub mod config;
pub mod llm;
pub mod memory;
pub mod sqlite;
