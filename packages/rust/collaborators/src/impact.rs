//! Impact scoring: sentiment, sector, urgency, and expected price impact.

use std::fmt;

use serde_json::{Value, json};
use tracing::info;

use marketpulse_shared::{
    CallArgs, Collaborator, CollaboratorError, CollaboratorFuture, CollaboratorOutput, Record,
    Table,
};

use crate::clean::clean_text;

/// Company keyword to sector, checked in order.
const SECTOR_MAP: &[(&str, &str)] = &[
    ("TCS", "IT"),
    ("Infosys", "IT"),
    ("Wipro", "IT"),
    ("HDFC", "Banking"),
    ("SBI", "Banking"),
    ("RBI", "Banking"),
    ("Reliance", "Energy"),
    ("ONGC", "Energy"),
    ("Tata Motors", "Automobile"),
    ("Maruti", "Automobile"),
    ("Sun Pharma", "Pharma"),
    ("Dr Reddy", "Pharma"),
];

const DEFAULT_SECTOR: &str = "General";

const HIGH_URGENCY: &[&str] = &[
    "breaking",
    "urgent",
    "crash",
    "bankruptcy",
    "ceo resigns",
    "fraud",
    "fine",
    "regulator",
    "lawsuit",
    "merger",
];

const MEDIUM_URGENCY: &[&str] = &["forecast", "upgrade", "downgrade", "quarterly", "earnings"];

const POSITIVE_WORDS: &[&str] = &[
    "gain", "gains", "gained", "rise", "rises", "rose", "jump", "jumps", "jumped", "surge",
    "surged", "beat", "beats", "profit", "profits", "growth", "upgrade", "record", "rally",
    "strong", "higher", "boost", "outperform",
];

const NEGATIVE_WORDS: &[&str] = &[
    "fall", "falls", "fell", "drop", "drops", "dropped", "decline", "declined", "loss", "losses",
    "crash", "fraud", "lawsuit", "downgrade", "weak", "lower", "cut", "recall", "miss", "missed",
    "plunge", "plunged", "slump", "bankruptcy",
];

const COLUMNS: [&str; 7] = [
    "id",
    "title",
    "sentiment",
    "sentiment_score",
    "sector",
    "urgency",
    "price_impact",
];

/// Three-way sentiment label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentiment {
    Negative,
    Neutral,
    Positive,
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Negative => "negative",
            Self::Neutral => "neutral",
            Self::Positive => "positive",
        })
    }
}

/// `High` / `Medium` / `Low`, used for both urgency and price impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    High,
    Medium,
    Low,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        })
    }
}

/// The `keyword_impact` collaborator. Returns one table row per input record.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordImpact;

impl KeywordImpact {
    pub fn score(&self, records: &[Record]) -> Table {
        let mut table = Table::new(COLUMNS);
        for (i, record) in records.iter().enumerate() {
            let text = record
                .get_str("clean_text")
                .map_or_else(|| clean_text(record), str::to_string);
            let (sentiment, sentiment_score) = sentiment(&text);
            let urgency = urgency(&text);

            table.push_row(vec![
                record.get("id").cloned().unwrap_or_else(|| json!(i)),
                record.get("title").cloned().unwrap_or(Value::Null),
                json!(sentiment.to_string()),
                json!(sentiment_score),
                json!(sector(&text)),
                json!(urgency.to_string()),
                json!(price_impact(sentiment, urgency).to_string()),
            ]);
        }

        info!(rows = table.len(), "scored impact");
        table
    }
}

impl Collaborator for KeywordImpact {
    fn name(&self) -> &str {
        "keyword_impact"
    }

    fn call(&self, args: CallArgs) -> CollaboratorFuture {
        let scorer = *self;
        Box::pin(async move {
            match args {
                CallArgs::Items(records) => Ok(CollaboratorOutput::Table(scorer.score(&records))),
                other => Err(CollaboratorError::ArityMismatch(format!(
                    "keyword_impact expects records, got {other:?}"
                ))),
            }
        })
    }
}

/// Lexicon sentiment with the winning share of matched words as its score.
pub fn sentiment(text: &str) -> (Sentiment, f64) {
    let lower = text.to_lowercase();
    let (mut positive, mut negative) = (0usize, 0usize);
    for word in lower.split(|c: char| !c.is_alphanumeric()) {
        if POSITIVE_WORDS.contains(&word) {
            positive += 1;
        } else if NEGATIVE_WORDS.contains(&word) {
            negative += 1;
        }
    }

    let hits = (positive + negative) as f64;
    match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => (Sentiment::Positive, positive as f64 / hits),
        std::cmp::Ordering::Less => (Sentiment::Negative, negative as f64 / hits),
        std::cmp::Ordering::Equal if hits == 0.0 => (Sentiment::Neutral, 1.0),
        std::cmp::Ordering::Equal => (Sentiment::Neutral, 0.5),
    }
}

/// First sector whose keyword appears in the text (case-insensitive).
pub fn sector(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    SECTOR_MAP
        .iter()
        .find(|(keyword, _)| lower.contains(&keyword.to_lowercase()))
        .map_or(DEFAULT_SECTOR, |&(_, sector)| sector)
}

pub fn urgency(text: &str) -> Level {
    let lower = text.to_lowercase();
    if HIGH_URGENCY.iter().any(|k| lower.contains(k)) {
        Level::High
    } else if MEDIUM_URGENCY.iter().any(|k| lower.contains(k)) {
        Level::Medium
    } else {
        Level::Low
    }
}

pub fn price_impact(sentiment: Sentiment, urgency: Level) -> Level {
    match (sentiment, urgency) {
        (Sentiment::Positive | Sentiment::Negative, Level::High) => Level::High,
        (_, Level::Medium) => Level::Medium,
        _ => Level::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sector_lookup_is_ordered_and_case_insensitive() {
        assert_eq!(sector("tcs wins a contract"), "IT");
        assert_eq!(sector("HDFC and Reliance"), "Banking");
        assert_eq!(sector("Dr Reddy launches generic"), "Pharma");
        assert_eq!(sector("Tesla deliveries"), "General");
    }

    #[test]
    fn urgency_levels() {
        assert_eq!(urgency("BREAKING: markets halt"), Level::High);
        assert_eq!(urgency("Quarterly earnings due"), Level::Medium);
        assert_eq!(urgency("Calm session"), Level::Low);
    }

    #[test]
    fn price_impact_matrix() {
        assert_eq!(price_impact(Sentiment::Positive, Level::High), Level::High);
        assert_eq!(price_impact(Sentiment::Negative, Level::High), Level::High);
        assert_eq!(price_impact(Sentiment::Neutral, Level::High), Level::Low);
        assert_eq!(price_impact(Sentiment::Neutral, Level::Medium), Level::Medium);
        assert_eq!(price_impact(Sentiment::Positive, Level::Low), Level::Low);
    }

    #[test]
    fn sentiment_counts_lexicon_hits() {
        assert_eq!(sentiment("Shares jumped to a record high").0, Sentiment::Positive);
        let (label, score) = sentiment("Profit fell and losses widened");
        assert_eq!(label, Sentiment::Negative);
        assert!((score - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(sentiment("The meeting is on Tuesday"), (Sentiment::Neutral, 1.0));
    }

    #[test]
    fn scores_records_into_table() {
        let records = vec![
            Record::new()
                .with("id", "a1")
                .with("title", "Infosys")
                .with("clean_text", "Infosys shares jumped after a merger announcement"),
            Record::new().with("clean_text", "Maruti quarterly sales steady"),
        ];
        let rows = KeywordImpact.score(&records).into_records();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_str("id"), Some("a1"));
        assert_eq!(rows[0].get_str("sector"), Some("IT"));
        assert_eq!(rows[0].get_str("urgency"), Some("High"));
        assert_eq!(rows[0].get_str("price_impact"), Some("High"));
        assert_eq!(rows[1].get("id"), Some(&json!(1)));
        assert_eq!(rows[1].get_str("sector"), Some("Automobile"));
        assert_eq!(rows[1].get_str("price_impact"), Some("Medium"));
        assert_eq!(rows[1].get("title"), Some(&Value::Null));
    }
}
