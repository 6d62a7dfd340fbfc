//! In-process vector index backing both the embedding and the query stage.
//!
//! Vectors are hashed bag-of-words counts, L2-normalized, compared by
//! cosine distance. Query results come back in the nested
//! `documents`/`ids`/`distances`/`metadatas` layout of a vector database.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info};

use marketpulse_shared::{
    AppConfig, CallArgs, Collaborator, CollaboratorError, CollaboratorFuture, CollaboratorOutput,
    Record,
};

use crate::clean::clean_text;
use crate::dedup::compute_hash;

/// Vector dimensionality.
const DIMENSIONS: usize = 256;

#[derive(Debug, Clone)]
struct Entry {
    id: String,
    document: String,
    metadata: Value,
    vector: Vec<f32>,
}

/// Entries in insertion order, with each id's position.
#[derive(Debug, Default)]
struct Entries {
    rows: Vec<Entry>,
    positions: HashMap<String, usize>,
}

impl Entries {
    fn upsert(&mut self, entry: Entry) {
        match self.positions.get(&entry.id) {
            Some(&position) => self.rows[position] = entry,
            None => {
                self.positions.insert(entry.id.clone(), self.rows.len());
                self.rows.push(entry);
            }
        }
    }
}

/// Shared storage for [`MemoryIndex`] handles.
#[derive(Debug, Default)]
pub struct IndexStore {
    entries: RwLock<Entries>,
}

impl IndexStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.rows.len()
    }
}

/// The `memory_index` collaborator.
///
/// Called with records it indexes them and returns `true`. Called with a
/// query string it returns the `top_k` nearest documents.
#[derive(Debug, Clone)]
pub struct MemoryIndex {
    store: Arc<IndexStore>,
    top_k: usize,
}

impl MemoryIndex {
    pub fn new(store: Arc<IndexStore>, top_k: usize) -> Self {
        Self { store, top_k }
    }

    pub fn from_config(store: Arc<IndexStore>, config: &AppConfig) -> Self {
        Self::new(store, config.tuning.query_top_k)
    }

    /// Insert or replace records by id. Returns the number indexed.
    pub async fn add(&self, records: &[Record]) -> usize {
        let mut entries = self.store.entries.write().await;
        for record in records {
            entries.upsert(to_entry(record));
        }
        info!(added = records.len(), total = entries.rows.len(), "indexed records");
        records.len()
    }

    /// Nearest documents to `query`, closest first.
    pub async fn query(&self, query: &str) -> Map<String, Value> {
        let target = embed(query);
        let entries = self.store.entries.read().await;

        let mut scored: Vec<(f32, &Entry)> = entries
            .rows
            .iter()
            .map(|entry| (cosine_distance(&target, &entry.vector), entry))
            .collect();
        scored.sort_by(|a, b| a.0.total_cmp(&b.0));
        scored.truncate(self.top_k);
        debug!(query, hits = scored.len(), "queried index");

        let ids: Vec<Value> = scored.iter().map(|(_, e)| json!(e.id)).collect();
        let documents: Vec<Value> = scored.iter().map(|(_, e)| json!(e.document)).collect();
        let distances: Vec<Value> = scored.iter().map(|(d, _)| json!(d)).collect();
        let metadatas: Vec<Value> = scored.iter().map(|(_, e)| e.metadata.clone()).collect();

        let mut bundle = Map::new();
        bundle.insert("ids".into(), json!([ids]));
        bundle.insert("documents".into(), json!([documents]));
        bundle.insert("distances".into(), json!([distances]));
        bundle.insert("metadatas".into(), json!([metadatas]));
        bundle
    }
}

impl Collaborator for MemoryIndex {
    fn name(&self) -> &str {
        "memory_index"
    }

    fn call(&self, args: CallArgs) -> CollaboratorFuture {
        let index = self.clone();
        Box::pin(async move {
            match args {
                CallArgs::Items(records) => {
                    let added = index.add(&records).await;
                    Ok(CollaboratorOutput::Flag(added > 0))
                }
                CallArgs::Text(query) => Ok(CollaboratorOutput::Bundle(index.query(&query).await)),
                CallArgs::Empty => Err(CollaboratorError::ArityMismatch(
                    "memory_index expects records or a query string".into(),
                )),
            }
        })
    }
}

fn to_entry(record: &Record) -> Entry {
    let document = record
        .get_str("clean_text")
        .map_or_else(|| clean_text(record), str::to_string);
    let id = match record.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => record
            .get_str("hash")
            .map_or_else(|| compute_hash(&document), str::to_string),
    };
    let metadata = json!({
        "source": record.get("source").cloned().unwrap_or(Value::Null),
        "published_at": record.get("published_at").cloned().unwrap_or(Value::Null),
    });

    Entry {
        id,
        vector: embed(&document),
        document,
        metadata,
    }
}

/// Hashed bag-of-words vector, L2-normalized.
pub fn embed(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0f32; DIMENSIONS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let digest = Sha256::digest(word.to_lowercase().as_bytes());
        let bucket = u16::from_be_bytes([digest[0], digest[1]]) as usize % DIMENSIONS;
        vector[bucket] += 1.0;
    }

    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
    vector
}

/// `1 - cosine similarity` of two normalized vectors; zero vectors are maximally distant.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    if a.iter().all(|x| *x == 0.0) || b.iter().all(|x| *x == 0.0) {
        return 1.0;
    }
    1.0 - dot
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(id: &str, text: &str) -> Record {
        Record::new()
            .with("id", id)
            .with("clean_text", text)
            .with("source", "RSS")
    }

    #[test]
    fn identical_text_has_zero_distance() {
        let a = embed("Tesla shares fell");
        let b = embed("tesla SHARES fell");
        assert!(cosine_distance(&a, &b).abs() < 1e-6);
        assert_eq!(cosine_distance(&a, &embed("")), 1.0);
    }

    #[tokio::test]
    async fn query_ranks_closest_first() {
        let index = MemoryIndex::new(IndexStore::new(), 2);
        index
            .add(&[
                article("a", "RBI keeps repo rate unchanged"),
                article("b", "Tesla shares fell after delivery miss"),
                article("c", "Tesla recalls vehicles over software issue"),
            ])
            .await;

        let bundle = index.query("Tesla shares").await;
        assert_eq!(bundle["ids"][0][0], "b");
        assert_eq!(bundle["ids"][0].as_array().map(Vec::len), Some(2));
        assert_eq!(bundle["metadatas"][0][0]["source"], "RSS");
        assert!(bundle["distances"][0][0].as_f64().is_some());
    }

    #[tokio::test]
    async fn handles_share_one_store() {
        let store = IndexStore::new();
        let embedder = MemoryIndex::new(Arc::clone(&store), 5);
        let querier = MemoryIndex::new(Arc::clone(&store), 5);

        let out = embedder
            .call(CallArgs::Items(vec![article("x", "Infosys wins deal")]))
            .await
            .unwrap();
        assert!(matches!(out, CollaboratorOutput::Flag(true)));

        match querier.call(CallArgs::Text("Infosys".into())).await.unwrap() {
            CollaboratorOutput::Bundle(bundle) => assert_eq!(bundle["documents"][0][0], "Infosys wins deal"),
            other => panic!("unexpected output {other:?}"),
        }
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn re_adding_replaces_by_id() {
        let store = IndexStore::new();
        let index = MemoryIndex::new(Arc::clone(&store), 5);
        index.add(&[article("x", "old text")]).await;
        index.add(&[article("x", "new text")]).await;

        assert_eq!(store.len().await, 1);
        let bundle = index.query("new").await;
        assert_eq!(bundle["documents"][0][0], "new text");
    }

    #[tokio::test]
    async fn upserts_keep_positions_consistent() {
        let store = IndexStore::new();
        let index = MemoryIndex::new(Arc::clone(&store), 10);
        index
            .add(&[
                article("a", "alpha report"),
                article("b", "beta report"),
                article("a", "alpha revised"),
            ])
            .await;
        index
            .add(&[article("c", "gamma report"), article("b", "beta revised")])
            .await;

        assert_eq!(store.len().await, 3);
        let entries = store.entries.read().await;
        let documents: Vec<&str> = entries.rows.iter().map(|e| e.document.as_str()).collect();
        assert_eq!(documents, ["alpha revised", "beta revised", "gamma report"]);
        assert_eq!(entries.positions.get("c"), Some(&2));
    }

    #[tokio::test]
    async fn empty_index_returns_empty_columns() {
        let index = MemoryIndex::new(IndexStore::new(), 5);
        let bundle = index.query("anything").await;
        assert_eq!(bundle["ids"], json!([[]]));
    }
}
