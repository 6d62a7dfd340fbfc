//! Stage wrapper: timing and failure containment around each agent.
//!
//! Agents read the state and describe their effect as a [`StageUpdate`].
//! The wrapper applies the update only when the agent succeeds, so a
//! failing agent leaves the state exactly as it found it apart from the
//! duration and error entries.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use marketpulse_shared::{Record, Result, StageDuration, StageName, error_report};

use crate::pipeline::ProgressReporter;
use crate::registry::{CollaboratorRegistry, CollaboratorSlot};
use crate::state::{ItemField, PipelineState};

/// Boxed future returned by [`StageAgent::run`].
pub type StageFuture<'a> = Pin<Box<dyn Future<Output = Result<StageUpdate>> + Send + 'a>>;

/// One pipeline step: select input, call the collaborator, describe the result.
pub trait StageAgent: Send + Sync {
    fn stage(&self) -> StageName;

    fn run<'a>(&'a self, ctx: &'a StageContext<'a>, state: &'a PipelineState) -> StageFuture<'a>;
}

/// What agents can see besides the state.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    registry: &'a CollaboratorRegistry,
    call_timeout: Option<Duration>,
}

impl<'a> StageContext<'a> {
    pub fn new(registry: &'a CollaboratorRegistry, call_timeout: Option<Duration>) -> Self {
        Self {
            registry,
            call_timeout,
        }
    }

    pub fn slot(&self, stage: StageName) -> &'a CollaboratorSlot {
        self.registry.slot(stage)
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }
}

/// Field assignment produced by an agent.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    Items(ItemField, Vec<Record>),
    EmbeddingsIndexed(bool),
}

/// The effect of one successful agent run.
#[derive(Debug, Default)]
pub struct StageUpdate {
    assignment: Option<Assignment>,
    completed: bool,
    diagnostics: Vec<String>,
}

impl StageUpdate {
    /// Replace `field` with `items`.
    pub fn items(field: ItemField, items: Vec<Record>) -> Self {
        Self {
            assignment: Some(Assignment::Items(field, items)),
            ..Self::default()
        }
    }

    pub fn embeddings_indexed(flag: bool) -> Self {
        Self {
            assignment: Some(Assignment::EmbeddingsIndexed(flag)),
            ..Self::default()
        }
    }

    /// Leave every field alone.
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// Advance `current_stage` past this stage when applied.
    pub fn completed(mut self) -> Self {
        self.completed = true;
        self
    }

    /// Attach an adapter diagnostic; it becomes an `errors` entry.
    pub fn with_diagnostic(mut self, diagnostic: Option<&str>) -> Self {
        self.diagnostics.extend(diagnostic.map(str::to_string));
        self
    }

    pub fn assignment(&self) -> Option<&Assignment> {
        self.assignment.as_ref()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    /// Write the update into `state`. Returns whether it carried diagnostics.
    fn apply(self, stage: StageName, state: &mut PipelineState) -> bool {
        match self.assignment {
            Some(Assignment::Items(field, items)) => state.set_items(field, items),
            Some(Assignment::EmbeddingsIndexed(flag)) => state.embeddings_indexed = flag,
            None => {}
        }
        if self.completed {
            state.advance(stage.completion_marker());
        }
        let degraded = !self.diagnostics.is_empty();
        state.errors.extend(self.diagnostics);
        degraded
    }
}

/// Run `agent` against `state`, timing it and containing any failure.
///
/// Exactly one duration entry is appended per call. A failing agent adds
/// one formatted `errors` entry and leaves the rest of the state untouched.
pub async fn timed_stage(
    agent: &dyn StageAgent,
    ctx: &StageContext<'_>,
    state: &mut PipelineState,
    progress: &dyn ProgressReporter,
) {
    let stage = agent.stage();
    info!(%stage, "=== stage start ===");
    progress.stage_started(stage);

    let started = Instant::now();
    let outcome = agent.run(ctx, state).await;
    let duration = started.elapsed().as_secs_f64();

    let error = match outcome {
        Ok(update) => {
            let degraded = update.apply(stage, state);
            if degraded {
                warn!(%stage, duration_secs = duration, "stage finished degraded");
            } else {
                info!(%stage, duration_secs = duration, "stage done");
            }
            degraded
        }
        Err(e) => {
            error!(%stage, duration_secs = duration, error = %e, "stage failed");
            state.errors.push(format!("{stage}: {}", error_report(&e)));
            true
        }
    };

    let entry = StageDuration {
        stage,
        duration,
        error,
    };
    progress.stage_finished(&entry);
    state.stage_durations.push(entry);
}
