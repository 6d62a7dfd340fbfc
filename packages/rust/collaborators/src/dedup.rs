//! Deduplication: exact content hashes, then near-duplicate shingle overlap.

use std::collections::HashSet;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use marketpulse_shared::{
    AppConfig, CallArgs, Collaborator, CollaboratorError, CollaboratorFuture, CollaboratorOutput,
    Record,
};

use crate::clean::clean_text;

/// Words per shingle for near-duplicate comparison.
const SHINGLE_WORDS: usize = 3;

/// The `content_hash` deduplication collaborator.
#[derive(Debug, Clone)]
pub struct ContentHash {
    threshold: f64,
}

impl ContentHash {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.tuning.near_duplicate_threshold)
    }

    /// Remove exact and near duplicates, keeping the first occurrence of each.
    ///
    /// Every surviving record gains a `hash` field with the SHA-256 of its text.
    pub fn dedup(&self, records: Vec<Record>) -> Vec<Record> {
        let before = records.len();
        let unique = remove_exact(records);
        let exact_removed = before - unique.len();

        let kept = remove_near(unique, self.threshold);
        info!(
            before,
            exact_removed,
            near_removed = before - exact_removed - kept.len(),
            after = kept.len(),
            "deduplicated articles"
        );
        kept
    }
}

impl Collaborator for ContentHash {
    fn name(&self) -> &str {
        "content_hash"
    }

    fn call(&self, args: CallArgs) -> CollaboratorFuture {
        let dedup = self.clone();
        Box::pin(async move {
            match args {
                CallArgs::Items(records) => Ok(CollaboratorOutput::Records(dedup.dedup(records))),
                other => Err(CollaboratorError::ArityMismatch(format!(
                    "content_hash expects records, got {other:?}"
                ))),
            }
        })
    }
}

/// Text used for comparison: `clean_text` when present, else derived from title and content.
fn text_of(record: &Record) -> String {
    record
        .get_str("clean_text")
        .map_or_else(|| clean_text(record), str::to_string)
}

/// Compute SHA-256 hash of content.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn remove_exact(records: Vec<Record>) -> Vec<Record> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter_map(|record| {
            let hash = compute_hash(&text_of(&record));
            if seen.insert(hash.clone()) {
                Some(record.with("hash", hash))
            } else {
                debug!(%hash, "dropping exact duplicate");
                None
            }
        })
        .collect()
}

fn remove_near(records: Vec<Record>, threshold: f64) -> Vec<Record> {
    let mut kept: Vec<(Record, HashSet<String>)> = Vec::with_capacity(records.len());

    for record in records {
        let shingles = shingles(&text_of(&record));
        let duplicate_of = kept
            .iter()
            .position(|(_, other)| jaccard(&shingles, other) > threshold);

        match duplicate_of {
            Some(index) => debug!(index, "dropping near duplicate"),
            None => kept.push((record, shingles)),
        }
    }

    kept.into_iter().map(|(record, _)| record).collect()
}

/// Lowercased word shingles. Texts shorter than one shingle yield a single shingle.
pub fn shingles(text: &str) -> HashSet<String> {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    if words.len() < SHINGLE_WORDS {
        return std::iter::once(words.join(" "))
            .filter(|s| !s.is_empty())
            .collect();
    }
    words.windows(SHINGLE_WORDS).map(|w| w.join(" ")).collect()
}

/// Jaccard similarity of two shingle sets; two empty sets are identical.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}
