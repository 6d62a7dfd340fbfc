//! Semantic query over the indexed records.

use serde_json::{Map, Value};
use tracing::{info, warn};

use marketpulse_shared::{
    CallArgs, CollaboratorOutput, PipelineError, Record, StageName, json_truthy,
};

use crate::invoke::{Invocation, invoke};
use crate::stage::{StageAgent, StageContext, StageFuture, StageUpdate};
use crate::state::{ItemField, PipelineState};

const DOCUMENT_KEYS: &[&str] = &["documents", "docs", "documents_list"];
const ID_KEYS: &[&str] = &["ids", "doc_ids"];
const DISTANCE_KEYS: &[&str] = &["distances", "scores"];
const METADATA_KEYS: &[&str] = &["metadatas", "metadata"];

/// Runs the state's query and parses the result bundle into records.
///
/// The orchestrator only schedules this agent when the trimmed query is
/// non-empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryAgent;

impl StageAgent for QueryAgent {
    fn stage(&self) -> StageName {
        StageName::Query
    }

    fn run<'a>(&'a self, ctx: &'a StageContext<'a>, state: &'a PipelineState) -> StageFuture<'a> {
        Box::pin(async move {
            let stage = self.stage();
            let query = state.query.trim();

            if !state.embeddings_indexed {
                warn!(%stage, "embeddings not indexed; results may be stale or empty");
            }

            let args = CallArgs::Text(query.to_string());
            let output = match invoke(stage, ctx.slot(stage), args, ctx.call_timeout()).await {
                Invocation::Returned(output) => output,
                degraded => {
                    return Ok(StageUpdate::items(ItemField::QueryResults, Vec::new())
                        .with_diagnostic(degraded.diagnostic()));
                }
            };

            let results = match output {
                CollaboratorOutput::Bundle(bundle) => parse_bundle(&bundle),
                CollaboratorOutput::Scalar(Value::Object(bundle)) => parse_bundle(&bundle),
                other if !other.is_truthy() => Vec::new(),
                other => {
                    return Err(PipelineError::shape(format!(
                        "query collaborator must return a result mapping, got {}",
                        other.kind()
                    )));
                }
            };

            if results.is_empty() {
                info!(%stage, "query returned no data");
            } else {
                info!(%stage, count = results.len(), "query results parsed");
            }
            Ok(StageUpdate::items(ItemField::QueryResults, results).completed())
        })
    }
}

/// Zip a query result bundle's parallel arrays into one record per position.
///
/// Each column is looked up under its aliases, first truthy value wins. A
/// column whose first element is itself an array is unwrapped one level.
/// Columns shorter than the longest one yield `null` for missing positions.
pub fn parse_bundle(bundle: &Map<String, Value>) -> Vec<Record> {
    let documents = column(bundle, DOCUMENT_KEYS);
    let ids = column(bundle, ID_KEYS);
    let distances = column(bundle, DISTANCE_KEYS);
    let metadatas = column(bundle, METADATA_KEYS);

    let len = [documents.len(), ids.len(), distances.len(), metadatas.len()]
        .into_iter()
        .max()
        .unwrap_or(0);

    let at = |col: &[Value], i: usize| col.get(i).cloned().unwrap_or(Value::Null);
    (0..len)
        .map(|i| {
            Record::new()
                .with("id", at(ids, i))
                .with("document", at(documents, i))
                .with("distance", at(distances, i))
                .with("metadata", at(metadatas, i))
        })
        .collect()
}

fn column<'a>(bundle: &'a Map<String, Value>, aliases: &[&str]) -> &'a [Value] {
    let found = aliases
        .iter()
        .filter_map(|key| bundle.get(*key))
        .find(|value| json_truthy(value));

    let Some(Value::Array(values)) = found else {
        return &[];
    };
    match values.first() {
        Some(Value::Array(inner)) => inner,
        _ => values,
    }
}
