//! Record-sequence stages: ingestion, preprocessing, deduplication, impact scoring.

use tracing::{debug, info, warn};

use marketpulse_shared::{CallArgs, Record, StageName};

use crate::invoke::{Invocation, invoke};
use crate::stage::{StageAgent, StageContext, StageFuture, StageUpdate};
use crate::state::{ItemField, PipelineState};

use super::{DOWNSTREAM_INPUT, normalize_records};

/// Output used when the collaborator is unavailable, fails, or returns nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Degrade {
    /// Carry the stage input forward unchanged.
    PassInput,
    /// Store an empty sequence.
    Empty,
}

/// A stage that maps records (or nothing) to records.
#[derive(Debug, Clone, Copy)]
pub struct ItemsAgent {
    pub stage: StageName,
    /// Fallback chain; empty for the first stage, which takes no input.
    pub input: &'static [ItemField],
    pub output: ItemField,
    pub degrade: Degrade,
    /// Whether a `Nothing` result still counts as a completed stage.
    pub nothing_completes: bool,
}

pub const INGESTION: ItemsAgent = ItemsAgent {
    stage: StageName::Ingestion,
    input: &[],
    output: ItemField::RawItems,
    degrade: Degrade::Empty,
    nothing_completes: true,
};

pub const PREPROCESSING: ItemsAgent = ItemsAgent {
    stage: StageName::Preprocessing,
    input: &[ItemField::RawItems],
    output: ItemField::PreprocessedItems,
    degrade: Degrade::PassInput,
    nothing_completes: false,
};

pub const DEDUPLICATION: ItemsAgent = ItemsAgent {
    stage: StageName::Deduplication,
    input: &[ItemField::PreprocessedItems, ItemField::RawItems],
    output: ItemField::DeduplicatedItems,
    degrade: Degrade::PassInput,
    nothing_completes: false,
};

pub const IMPACT_SCORING: ItemsAgent = ItemsAgent {
    stage: StageName::ImpactScoring,
    input: DOWNSTREAM_INPUT,
    output: ItemField::ImpactScores,
    degrade: Degrade::Empty,
    nothing_completes: false,
};

impl ItemsAgent {
    fn fallback(&self, input: Vec<Record>) -> Vec<Record> {
        match self.degrade {
            Degrade::PassInput => input,
            Degrade::Empty => Vec::new(),
        }
    }
}

impl StageAgent for ItemsAgent {
    fn stage(&self) -> StageName {
        self.stage
    }

    fn run<'a>(&'a self, ctx: &'a StageContext<'a>, state: &'a PipelineState) -> StageFuture<'a> {
        Box::pin(async move {
            let stage = self.stage;

            let input = if self.input.is_empty() {
                None
            } else {
                match state.first_available(self.input) {
                    Some((field, items)) => {
                        debug!(%stage, from = field.as_str(), count = items.len(), "selected input");
                        Some(items.to_vec())
                    }
                    None => {
                        warn!(%stage, "no input records available; skipping");
                        return Ok(StageUpdate::items(self.output, Vec::new()));
                    }
                }
            };

            let args = input
                .as_ref()
                .map_or(CallArgs::Empty, |items| CallArgs::Items(items.clone()));
            let input = input.unwrap_or_default();

            let invocation = invoke(stage, ctx.slot(stage), args, ctx.call_timeout()).await;
            let diagnostic = invocation.diagnostic().map(str::to_string);

            match invocation {
                Invocation::Returned(output) => match normalize_records(stage, output) {
                    Ok(Some(records)) => {
                        info!(%stage, count = records.len(), field = self.output.as_str(), "stored records");
                        Ok(StageUpdate::items(self.output, records).completed())
                    }
                    Ok(None) if self.nothing_completes => {
                        info!(%stage, field = self.output.as_str(), "collaborator returned nothing; stored no records");
                        Ok(StageUpdate::items(self.output, Vec::new()).completed())
                    }
                    Ok(None) => {
                        warn!(
                            %stage,
                            fallback = ?self.degrade,
                            "collaborator returned nothing; using fallback"
                        );
                        Ok(StageUpdate::items(self.output, self.fallback(input)))
                    }
                    Err(e) => Err(e),
                },
                Invocation::Unavailable { .. } | Invocation::Failed { .. } => {
                    warn!(%stage, fallback = ?self.degrade, "collaborator degraded; using fallback");
                    Ok(StageUpdate::items(self.output, self.fallback(input))
                        .with_diagnostic(diagnostic.as_deref()))
                }
            }
        })
    }
}
