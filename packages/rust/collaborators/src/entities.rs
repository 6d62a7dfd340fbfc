//! Entity extraction from capitalized names and ticker symbols.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::info;

use marketpulse_shared::{
    CallArgs, Collaborator, CollaboratorError, CollaboratorFuture, CollaboratorOutput, Record,
};

use crate::clean::clean_text;

/// Canonical names for common long-form company names.
const ALIASES: &[(&str, &str)] = &[
    ("Reliance Industries Ltd", "Reliance"),
    ("Reliance Industries", "Reliance"),
    ("Tata Consultancy Services", "TCS"),
    ("Apple Inc", "Apple"),
];

/// Capitalized words that start sentences more often than they name things.
const STOPWORDS: &[&str] = &[
    "The", "A", "An", "In", "On", "At", "For", "And", "But", "Or", "It", "Its", "This", "That",
    "These", "Those", "After", "Before", "As", "By", "With", "From", "To", "Of", "Is", "Are",
    "Was", "Were", "He", "She", "They", "We", "I", "If", "When", "While",
];

/// The `keyword_entities` collaborator. Adds an `entities` array to each record.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordEntities;

impl KeywordEntities {
    pub fn annotate(&self, records: Vec<Record>) -> Vec<Record> {
        let annotated: Vec<Record> = records
            .into_iter()
            .map(|record| {
                let text = record
                    .get_str("clean_text")
                    .map_or_else(|| clean_text(&record), str::to_string);
                let entities: Vec<Value> = extract_entities(&text)
                    .into_iter()
                    .map(Value::from)
                    .collect();
                record.with("entities", entities)
            })
            .collect();

        let total: usize = annotated
            .iter()
            .filter_map(|r| r.get("entities").and_then(Value::as_array))
            .map(Vec::len)
            .sum();
        info!(articles = annotated.len(), entities = total, "extracted entities");
        annotated
    }
}

impl Collaborator for KeywordEntities {
    fn name(&self) -> &str {
        "keyword_entities"
    }

    fn call(&self, args: CallArgs) -> CollaboratorFuture {
        let extractor = *self;
        Box::pin(async move {
            match args {
                CallArgs::Items(records) => {
                    Ok(CollaboratorOutput::Records(extractor.annotate(records)))
                }
                other => Err(CollaboratorError::ArityMismatch(format!(
                    "keyword_entities expects records, got {other:?}"
                ))),
            }
        })
    }
}

/// Distinct entity names in order of first appearance.
pub fn extract_entities(text: &str) -> Vec<String> {
    static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"\b[A-Z][A-Za-z&.'-]*(?:\s+[A-Z][A-Za-z&.'-]*)*").expect("valid regex")
    });
    static TICKER_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\$([A-Z]{1,5})\b").expect("valid regex"));

    let mut entities: Vec<String> = Vec::new();
    let mut push = |entity: String| {
        if !entity.is_empty() && !entities.contains(&entity) {
            entities.push(entity);
        }
    };

    for caps in TICKER_RE.captures_iter(text) {
        push(caps[1].to_string());
    }

    for m in NAME_RE.find_iter(text) {
        let words: Vec<&str> = m
            .as_str()
            .split_whitespace()
            .map(|w| w.trim_end_matches(['.', '\'']))
            .skip_while(|w| STOPWORDS.contains(w))
            .collect();
        if words.is_empty() {
            continue;
        }
        push(normalize_entity(&words.join(" ")));
    }

    entities
}

fn normalize_entity(entity: &str) -> String {
    ALIASES
        .iter()
        .find(|(long, _)| *long == entity)
        .map_or_else(|| entity.to_string(), |(_, short)| short.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_names_and_tickers() {
        let entities =
            extract_entities("The shares of Tata Motors rose while $TSLA fell. Infosys gained.");
        assert_eq!(entities, ["TSLA", "Tata Motors", "Infosys"]);
    }

    #[test]
    fn leading_stopwords_are_dropped() {
        let entities = extract_entities("After HDFC Bank results, The RBI spoke.");
        assert_eq!(entities, ["HDFC Bank", "RBI"]);
    }

    #[test]
    fn aliases_are_normalized() {
        let entities = extract_entities("Reliance Industries announced a buyback");
        assert_eq!(entities, ["Reliance"]);
    }

    #[test]
    fn annotates_every_record() {
        let records = vec![
            Record::new().with("clean_text", "Wipro signs deal with Apple Inc"),
            Record::new().with("clean_text", "markets were quiet"),
        ];
        let out = KeywordEntities.annotate(records);
        assert_eq!(out[0].get("entities"), Some(&serde_json::json!(["Wipro", "Apple"])));
        assert_eq!(out[1].get("entities"), Some(&serde_json::json!([])));
    }
}
