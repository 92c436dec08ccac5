// ============================================================================
// File: src/lib.rs
// Library root: tool pipeline shared by the CLI and tests
// ============================================================================

pub mod blob_store;
pub mod config;
pub mod error;
pub mod formatter;
pub mod llm_client;
pub mod models;
pub mod normalizer;
pub mod orchestrator;
pub mod prompts;
pub mod throttle;
pub mod transcoder;
