//! End-to-end run: ingestion → preprocessing → deduplication → ner →
//! embedding → impact scoring → [query] → finalize.

use std::time::Duration;

use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, Instrument, info, info_span};

use marketpulse_shared::{AppConfig, StageDuration, StageName};

use crate::agents::{
    DEDUPLICATION, EmbeddingAgent, EntityAgent, IMPACT_SCORING, INGESTION, PREPROCESSING,
    QueryAgent,
};
use crate::finalize::finalize;
use crate::registry::CollaboratorRegistry;
use crate::stage::{StageAgent, StageContext, timed_stage};
use crate::state::PipelineState;

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called before a stage runs.
    fn stage_started(&self, stage: StageName);
    /// Called after a stage's duration entry is recorded.
    fn stage_finished(&self, entry: &StageDuration);
    /// Called once the run is finalized.
    fn done(&self, state: &PipelineState);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn stage_started(&self, _stage: StageName) {}
    fn stage_finished(&self, _entry: &StageDuration) {}
    fn done(&self, _state: &PipelineState) {}
}

/// Tunables applied to every stage of a run.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Upper bound on a single collaborator call. `None` waits indefinitely.
    pub stage_timeout: Option<Duration>,
}

impl From<&AppConfig> for PipelineOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            stage_timeout: config.pipeline.stage_timeout(),
        }
    }
}

/// Runs the fixed stage sequence against a resolved collaborator registry.
///
/// An orchestrator holds no per-run state; each call to [`Orchestrator::run`]
/// builds its own [`PipelineState`], so one orchestrator may serve
/// concurrent runs.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    registry: CollaboratorRegistry,
    options: PipelineOptions,
    dispatch: Option<Dispatch>,
}

/// Builder for [`Orchestrator`].
#[derive(Debug)]
pub struct OrchestratorBuilder {
    registry: CollaboratorRegistry,
    options: PipelineOptions,
    dispatch: Option<Dispatch>,
}

impl OrchestratorBuilder {
    pub fn options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.options.stage_timeout = timeout;
        self
    }

    /// Send this orchestrator's logs to `dispatch` instead of the global subscriber.
    pub fn dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = Some(dispatch);
        self
    }

    pub fn build(self) -> Orchestrator {
        Orchestrator {
            registry: self.registry,
            options: self.options,
            dispatch: self.dispatch,
        }
    }
}

impl Orchestrator {
    pub fn builder(registry: CollaboratorRegistry) -> OrchestratorBuilder {
        OrchestratorBuilder {
            registry,
            options: PipelineOptions::default(),
            dispatch: None,
        }
    }

    pub fn registry(&self) -> &CollaboratorRegistry {
        &self.registry
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run every stage once and return the finalized state.
    ///
    /// Never fails: stage faults end up in `errors` and `stage_durations`.
    pub async fn run(&self, query: Option<&str>, progress: &dyn ProgressReporter) -> PipelineState {
        let run = self.execute(query, progress);
        match &self.dispatch {
            Some(dispatch) => run.with_subscriber(dispatch.clone()).await,
            None => run.await,
        }
    }

    async fn execute(&self, query: Option<&str>, progress: &dyn ProgressReporter) -> PipelineState {
        let mut state = PipelineState::new(query);
        let span = info_span!("pipeline_run", run_id = %state.run_id);
        async {
            self.run_stages(&mut state, progress).await;
            finalize(&mut state);
            progress.done(&state);
        }
        .instrument(span)
        .await;
        state
    }

    async fn run_stages(&self, state: &mut PipelineState, progress: &dyn ProgressReporter) {
        info!(query = %state.query, "starting pipeline run");
        let ctx = StageContext::new(&self.registry, self.options.stage_timeout);

        let agents: [&dyn StageAgent; 6] = [
            &INGESTION,
            &PREPROCESSING,
            &DEDUPLICATION,
            &EntityAgent,
            &EmbeddingAgent,
            &IMPACT_SCORING,
        ];
        for agent in agents {
            timed_stage(agent, &ctx, state, progress).await;
        }

        if state.query.trim().is_empty() {
            info!("no query provided; skipping query stage");
        } else {
            timed_stage(&QueryAgent, &ctx, state, progress).await;
        }
    }
}

/// Run the whole pipeline once with default options and no progress reporting.
pub async fn run_full_pipeline(registry: CollaboratorRegistry, query: Option<&str>) -> PipelineState {
    Orchestrator::builder(registry)
        .build()
        .run(query, &SilentProgress)
        .await
}
