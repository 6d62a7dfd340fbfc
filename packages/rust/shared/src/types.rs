//! Core domain types shared by the orchestrator and its collaborators.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for pipeline run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// One data item flowing between stages: an insertion-ordered mapping from
/// field names to JSON values.
///
/// Records are built once and not edited in place afterwards. A stage that
/// adds fields (`clean_text`, `sentiment`, ...) produces a new record with
/// [`Record::with`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// An empty record.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Return this record with `key` set to `value` (appended if new).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Look up a field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Look up a string field. Returns `None` for missing or non-string values.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Field names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Convert a JSON object into a record. Non-objects yield `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Value::Object(record.0)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

/// A columnar frame returned by table-producing collaborators.
///
/// Converted to records row by row; a short row leaves its trailing
/// columns `null`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    /// Create an empty table with the given column names.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Value>) {
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// One record per row, fields in column order.
    pub fn into_records(self) -> Vec<Record> {
        let columns = self.columns;
        self.rows
            .into_iter()
            .map(|row| {
                let mut values = row.into_iter();
                columns
                    .iter()
                    .map(|col| (col.clone(), values.next().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// StageName
// ---------------------------------------------------------------------------

/// The seven pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Ingestion,
    Preprocessing,
    Deduplication,
    Ner,
    Embedding,
    ImpactScoring,
    Query,
}

impl StageName {
    /// Every stage in execution order.
    pub const ALL: [StageName; 7] = [
        Self::Ingestion,
        Self::Preprocessing,
        Self::Deduplication,
        Self::Ner,
        Self::Embedding,
        Self::ImpactScoring,
        Self::Query,
    ];

    /// Name used in logs, duration entries, and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingestion => "ingestion",
            Self::Preprocessing => "preprocessing",
            Self::Deduplication => "deduplication",
            Self::Ner => "ner",
            Self::Embedding => "embedding",
            Self::ImpactScoring => "impact_scoring",
            Self::Query => "query",
        }
    }

    /// The marker `current_stage` moves to when this stage completes.
    pub fn completion_marker(&self) -> PipelineStage {
        match self {
            Self::Ingestion => PipelineStage::IngestionComplete,
            Self::Preprocessing => PipelineStage::PreprocessingComplete,
            Self::Deduplication => PipelineStage::DeduplicationComplete,
            Self::Ner => PipelineStage::NerComplete,
            Self::Embedding => PipelineStage::EmbeddingComplete,
            Self::ImpactScoring => PipelineStage::ImpactComplete,
            Self::Query => PipelineStage::QueryComplete,
        }
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StageName {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown stage '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// PipelineStage
// ---------------------------------------------------------------------------

/// Marker naming the last completed stage of a run.
///
/// Variants are declared in transition order, so `Ord` follows the state
/// machine.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    #[default]
    Initialized,
    IngestionComplete,
    PreprocessingComplete,
    DeduplicationComplete,
    NerComplete,
    EmbeddingComplete,
    ImpactComplete,
    QueryComplete,
    Finalized,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::IngestionComplete => "ingestion_complete",
            Self::PreprocessingComplete => "preprocessing_complete",
            Self::DeduplicationComplete => "deduplication_complete",
            Self::NerComplete => "ner_complete",
            Self::EmbeddingComplete => "embedding_complete",
            Self::ImpactComplete => "impact_complete",
            Self::QueryComplete => "query_complete",
            Self::Finalized => "finalized",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// StageDuration
// ---------------------------------------------------------------------------

/// Timing entry for one attempted stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageDuration {
    /// Which stage was attempted.
    pub stage: StageName,
    /// Wall-clock duration in seconds.
    pub duration: f64,
    /// Whether the attempt contributed to `errors`.
    #[serde(default)]
    pub error: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let parsed: RunId = id.to_string().parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn record_preserves_insertion_order() {
        let record = Record::new()
            .with("title", "Rates hold")
            .with("content", "The central bank kept rates unchanged.")
            .with("link", "https://news.example.com/a");

        let keys: Vec<_> = record.keys().collect();
        assert_eq!(keys, ["title", "content", "link"]);

        let json = serde_json::to_string(&record).expect("serialize");
        assert!(json.starts_with(r#"{"title":"#));
    }

    #[test]
    fn record_from_non_object_is_none() {
        assert!(Record::from_value(json!([1, 2])).is_none());
        assert!(Record::from_value(json!({"a": 1})).is_some());
    }

    #[test]
    fn table_converts_rows_in_order() {
        let mut table = Table::new(["id", "sentiment"]);
        table.push_row(vec![json!(1), json!("positive")]);
        table.push_row(vec![json!(2)]);

        let records = table.into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get_str("sentiment"), Some("positive"));
        assert_eq!(records[1].get("id"), Some(&json!(2)));
        assert_eq!(records[1].get("sentiment"), Some(&Value::Null));
    }

    #[test]
    fn stage_markers_are_ordered() {
        assert!(PipelineStage::Initialized < PipelineStage::IngestionComplete);
        assert!(PipelineStage::ImpactComplete < PipelineStage::QueryComplete);
        assert!(PipelineStage::QueryComplete < PipelineStage::Finalized);
        assert_eq!(
            StageName::Ner.completion_marker(),
            PipelineStage::NerComplete
        );
    }

    #[test]
    fn stage_names_serialize_snake_case() {
        let entry = StageDuration {
            stage: StageName::ImpactScoring,
            duration: 0.5,
            error: false,
        };
        let json = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(json["stage"], "impact_scoring");
        assert_eq!("ner".parse::<StageName>(), Ok(StageName::Ner));
    }
}
