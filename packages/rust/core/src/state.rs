//! Per-run pipeline state threaded through every stage.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use marketpulse_shared::{PipelineStage, Record, RunId, StageDuration, StageName};

/// The record-sequence fields of [`PipelineState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemField {
    RawItems,
    PreprocessedItems,
    DeduplicatedItems,
    ExtractedEntities,
    ImpactScores,
    QueryResults,
}

impl ItemField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RawItems => "raw_items",
            Self::PreprocessedItems => "preprocessed_items",
            Self::DeduplicatedItems => "deduplicated_items",
            Self::ExtractedEntities => "extracted_entities",
            Self::ImpactScores => "impact_scores",
            Self::QueryResults => "query_results",
        }
    }
}

/// Summary computed by the finalizer.
#[derive(Debug, Clone, Serialize)]
pub struct RunStats {
    pub workflow_complete: bool,
    /// Sum of every duration entry, in seconds.
    pub total_duration_seconds: f64,
    /// Number of stages attempted (one per duration entry).
    pub stages_completed: usize,
    pub errors_count: usize,
    pub timestamp: DateTime<Utc>,
    pub stage_breakdown: Vec<StageDuration>,
    pub raw_items_count: usize,
    pub deduplicated_items_count: usize,
    pub query_results_count: usize,
}

/// Everything a run accumulates, owned by that run alone.
///
/// Each record-sequence field is replaced wholesale when its stage
/// completes. `stage_durations` and `errors` only ever grow.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineState {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub raw_items: Vec<Record>,
    pub preprocessed_items: Vec<Record>,
    pub deduplicated_items: Vec<Record>,
    pub extracted_entities: Vec<Record>,
    pub embeddings_indexed: bool,
    pub impact_scores: Vec<Record>,
    /// Input query, empty when none was supplied.
    pub query: String,
    pub query_results: Vec<Record>,
    pub current_stage: PipelineStage,
    pub stage_durations: Vec<StageDuration>,
    pub errors: Vec<String>,
    /// Populated only by the finalizer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<RunStats>,
}

impl PipelineState {
    /// Fresh state for a run seeded with an optional query.
    pub fn new(query: Option<&str>) -> Self {
        Self {
            run_id: RunId::new(),
            started_at: Utc::now(),
            raw_items: Vec::new(),
            preprocessed_items: Vec::new(),
            deduplicated_items: Vec::new(),
            extracted_entities: Vec::new(),
            embeddings_indexed: false,
            impact_scores: Vec::new(),
            query: query.unwrap_or_default().to_string(),
            query_results: Vec::new(),
            current_stage: PipelineStage::Initialized,
            stage_durations: Vec::new(),
            errors: Vec::new(),
            stats: None,
        }
    }

    pub fn items(&self, field: ItemField) -> &[Record] {
        match field {
            ItemField::RawItems => &self.raw_items,
            ItemField::PreprocessedItems => &self.preprocessed_items,
            ItemField::DeduplicatedItems => &self.deduplicated_items,
            ItemField::ExtractedEntities => &self.extracted_entities,
            ItemField::ImpactScores => &self.impact_scores,
            ItemField::QueryResults => &self.query_results,
        }
    }

    pub(crate) fn set_items(&mut self, field: ItemField, items: Vec<Record>) {
        let slot = match field {
            ItemField::RawItems => &mut self.raw_items,
            ItemField::PreprocessedItems => &mut self.preprocessed_items,
            ItemField::DeduplicatedItems => &mut self.deduplicated_items,
            ItemField::ExtractedEntities => &mut self.extracted_entities,
            ItemField::ImpactScores => &mut self.impact_scores,
            ItemField::QueryResults => &mut self.query_results,
        };
        *slot = items;
    }

    /// First non-empty field in `chain`, with the field it came from.
    pub fn first_available(&self, chain: &[ItemField]) -> Option<(ItemField, &[Record])> {
        chain
            .iter()
            .map(|&field| (field, self.items(field)))
            .find(|(_, items)| !items.is_empty())
    }

    /// Move `current_stage` to `marker`. Markers never move backwards.
    pub(crate) fn advance(&mut self, marker: PipelineStage) {
        if marker < self.current_stage {
            warn!(
                current = %self.current_stage,
                requested = %marker,
                "ignoring backwards stage transition"
            );
            return;
        }
        self.current_stage = marker;
    }

    /// Whether the finalizer has run.
    pub fn is_finalized(&self) -> bool {
        self.current_stage == PipelineStage::Finalized
    }

    /// Whether any stage has recorded an attempt under `stage`.
    pub fn attempted(&self, stage: StageName) -> bool {
        self.stage_durations.iter().any(|d| d.stage == stage)
    }
}
