//! Entity extraction and embedding: stages whose collaborators may work
//! by side effect.

use tracing::{info, warn};

use marketpulse_shared::{CallArgs, CollaboratorOutput, StageName};

use crate::invoke::{Invocation, invoke};
use crate::stage::{StageAgent, StageContext, StageFuture, StageUpdate};
use crate::state::{ItemField, PipelineState};

use super::{DOWNSTREAM_INPUT, into_records};

/// Stores extracted entities when the collaborator returns a sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityAgent;

impl StageAgent for EntityAgent {
    fn stage(&self) -> StageName {
        StageName::Ner
    }

    fn run<'a>(&'a self, ctx: &'a StageContext<'a>, state: &'a PipelineState) -> StageFuture<'a> {
        Box::pin(async move {
            let stage = self.stage();
            let Some((from, input)) = state.first_available(DOWNSTREAM_INPUT) else {
                warn!(%stage, "no input records available; skipping");
                return Ok(StageUpdate::items(ItemField::ExtractedEntities, Vec::new()));
            };

            info!(%stage, from = from.as_str(), count = input.len(), "extracting entities");
            let args = CallArgs::Items(input.to_vec());
            match invoke(stage, ctx.slot(stage), args, ctx.call_timeout()).await {
                Invocation::Returned(output) => match into_records(output) {
                    Ok(entities) => {
                        info!(%stage, count = entities.len(), "stored extracted entities");
                        Ok(StageUpdate::items(ItemField::ExtractedEntities, entities).completed())
                    }
                    Err(other) => {
                        info!(
                            %stage,
                            output = other.kind(),
                            "collaborator returned no sequence; assuming it enriched in place"
                        );
                        Ok(StageUpdate::unchanged().completed())
                    }
                },
                degraded => Ok(StageUpdate::unchanged().with_diagnostic(degraded.diagnostic())),
            }
        })
    }
}

/// Records whether the collaborator indexed the current records.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbeddingAgent;

impl StageAgent for EmbeddingAgent {
    fn stage(&self) -> StageName {
        StageName::Embedding
    }

    fn run<'a>(&'a self, ctx: &'a StageContext<'a>, state: &'a PipelineState) -> StageFuture<'a> {
        Box::pin(async move {
            let stage = self.stage();
            let Some((from, input)) = state.first_available(DOWNSTREAM_INPUT) else {
                warn!(%stage, "no input records available; skipping");
                return Ok(StageUpdate::embeddings_indexed(false));
            };

            info!(%stage, from = from.as_str(), count = input.len(), "indexing records");
            let args = CallArgs::Items(input.to_vec());
            match invoke(stage, ctx.slot(stage), args, ctx.call_timeout()).await {
                Invocation::Returned(CollaboratorOutput::Nothing) => {
                    info!(%stage, "collaborator returned nothing; treating as indexed");
                    Ok(StageUpdate::embeddings_indexed(true).completed())
                }
                Invocation::Returned(output) => {
                    let indexed = output.is_truthy();
                    info!(%stage, indexed, "embedding finished");
                    Ok(StageUpdate::embeddings_indexed(indexed).completed())
                }
                degraded => Ok(StageUpdate::embeddings_indexed(false)
                    .with_diagnostic(degraded.diagnostic())),
            }
        })
    }
}
