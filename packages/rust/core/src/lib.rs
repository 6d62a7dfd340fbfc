//! Core pipeline orchestration for marketpulse.
//!
//! This crate threads a [`PipelineState`] through the fixed stage sequence
//! (ingestion, preprocessing, deduplication, entity extraction, embedding,
//! impact scoring, and an optional query), calling one external
//! collaborator per stage and containing every fault it raises.

pub mod agents;
pub mod finalize;
pub mod invoke;
pub mod pipeline;
pub mod registry;
pub mod stage;
pub mod state;

#[cfg(test)]
mod test_support;

pub use finalize::finalize;
pub use invoke::{Invocation, invoke};
pub use pipeline::{
    Orchestrator, OrchestratorBuilder, PipelineOptions, ProgressReporter, SilentProgress,
    run_full_pipeline,
};
pub use registry::{CollaboratorRegistry, CollaboratorSlot, RegistryBuilder};
pub use stage::{Assignment, StageAgent, StageContext, StageFuture, StageUpdate, timed_stage};
pub use state::{ItemField, PipelineState, RunStats};
