//! The seven stage agents and the output normalization they share.
//!
//! Record-sequence stages (ingestion, preprocessing, deduplication,
//! impact scoring) are instances of [`ItemsAgent`]. Entity extraction,
//! embedding, and query each have their own agent because their outputs
//! are interpreted differently.

mod enrich;
mod items;
mod query;

use serde_json::Value;

use marketpulse_shared::{CollaboratorOutput, PipelineError, Record, Result, StageName};

use crate::state::ItemField;

pub use enrich::{EmbeddingAgent, EntityAgent};
pub use items::{DEDUPLICATION, Degrade, INGESTION, IMPACT_SCORING, ItemsAgent, PREPROCESSING};
pub use query::{QueryAgent, parse_bundle};

/// Fallback chain for every stage after deduplication.
pub const DOWNSTREAM_INPUT: &[ItemField] = &[
    ItemField::DeduplicatedItems,
    ItemField::PreprocessedItems,
    ItemField::RawItems,
];

/// Turn sequence-like output into records, handing anything else back.
pub(crate) fn into_records(
    output: CollaboratorOutput,
) -> std::result::Result<Vec<Record>, CollaboratorOutput> {
    match output {
        CollaboratorOutput::Table(table) => Ok(table.into_records()),
        CollaboratorOutput::Records(records) => Ok(records),
        CollaboratorOutput::Iter(iter) => Ok(iter.collect()),
        CollaboratorOutput::Scalar(Value::Array(values)) if values.iter().all(Value::is_object) => {
            Ok(values.into_iter().filter_map(Record::from_value).collect())
        }
        other => Err(other),
    }
}

/// Normalize a record-producing stage's output.
///
/// `Ok(None)` means the collaborator returned nothing. Shapes that are not
/// sequences violate the stage contract.
pub(crate) fn normalize_records(
    stage: StageName,
    output: CollaboratorOutput,
) -> Result<Option<Vec<Record>>> {
    match into_records(output) {
        Ok(records) => Ok(Some(records)),
        Err(CollaboratorOutput::Nothing | CollaboratorOutput::Scalar(Value::Null)) => Ok(None),
        Err(other) => Err(PipelineError::shape(format!(
            "{stage} collaborator must return a table, list, or iterable of records, got {}",
            other.kind()
        ))),
    }
}
