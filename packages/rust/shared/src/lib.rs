//! Shared types, collaborator contract, error model, and configuration for marketpulse.
//!
//! This crate is the foundation depended on by all other marketpulse crates.
//! It provides:
//! - Error types ([`PipelineError`], [`CollaboratorError`])
//! - Domain types ([`Record`], [`Table`], [`StageName`], [`PipelineStage`], [`RunId`])
//! - The collaborator contract ([`Collaborator`], [`CallArgs`], [`CollaboratorOutput`])
//! - Configuration ([`AppConfig`], config loading)

pub mod collaborator;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use collaborator::{
    Arity, CallArgs, Collaborator, CollaboratorCatalog, CollaboratorFactory, CollaboratorFuture,
    CollaboratorOutput, FnCollaborator, RecordIter, from_fn, json_truthy,
};
pub use config::{
    AppConfig, CollaboratorsConfig, PipelineConfig, SourcesConfig, TuningConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, validate_config,
};
pub use error::{BoxError, CollaboratorError, PipelineError, Result, error_report};
pub use types::{PipelineStage, Record, RunId, StageDuration, StageName, Table};
