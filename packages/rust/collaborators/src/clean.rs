//! Preprocessing: HTML stripping and text normalization.
//!
//! Each record's title and content are reduced to plain text, normalized,
//! and merged into a `clean_text` field. Records whose merged text is too
//! short to be useful are dropped.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Node};
use tracing::{debug, info};

use marketpulse_shared::{
    AppConfig, CallArgs, Collaborator, CollaboratorError, CollaboratorFuture, CollaboratorOutput,
    Record,
};

/// Boilerplate phrases removed from article text.
const BOILERPLATE: &[&str] = &[
    "ADVERTISEMENT",
    "Read more on ET Markets",
    "Download The Economic Times",
    "Read more",
    "Reuters Graphics",
];

/// Elements whose text is never kept.
const SKIPPED_ELEMENTS: &[&str] = &["script", "style"];

/// The `html_clean` preprocessing collaborator.
#[derive(Debug, Clone)]
pub struct HtmlClean {
    min_len: usize,
}

impl HtmlClean {
    pub fn new(min_len: usize) -> Self {
        Self { min_len }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.tuning.min_clean_text_len)
    }

    /// Clean every record, keeping those whose `clean_text` is longer than the minimum.
    pub fn clean_records(&self, records: Vec<Record>) -> Vec<Record> {
        let before = records.len();
        let kept: Vec<Record> = records
            .into_iter()
            .filter_map(|record| {
                let text = clean_text(&record);
                if text.chars().count() > self.min_len {
                    Some(record.with("clean_text", text))
                } else {
                    debug!(len = text.len(), "dropping short article");
                    None
                }
            })
            .collect();

        info!(before, after = kept.len(), "cleaned articles");
        kept
    }
}

impl Collaborator for HtmlClean {
    fn name(&self) -> &str {
        "html_clean"
    }

    fn call(&self, args: CallArgs) -> CollaboratorFuture {
        let cleaner = self.clone();
        Box::pin(async move {
            match args {
                CallArgs::Items(records) => {
                    Ok(CollaboratorOutput::Records(cleaner.clean_records(records)))
                }
                other => Err(CollaboratorError::ArityMismatch(format!(
                    "html_clean expects records, got {other:?}"
                ))),
            }
        })
    }
}

/// Merge a record's cleaned title and content as `"{title}. {content}"`.
pub fn clean_text(record: &Record) -> String {
    let title = normalize_text(&strip_html(record.get_str("title").unwrap_or_default()));
    let content = normalize_text(&strip_html(record.get_str("content").unwrap_or_default()));
    format!("{title}. {content}").trim().to_string()
}

// ---------------------------------------------------------------------------
// Pass 1: Strip HTML
// ---------------------------------------------------------------------------

/// Plain text of an HTML fragment, without script or style contents.
pub fn strip_html(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }

    let fragment = Html::parse_fragment(html);
    let mut parts: Vec<&str> = Vec::new();

    for node in fragment.tree.root().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let skipped = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| SKIPPED_ELEMENTS.contains(&el.name()))
        });
        if !skipped {
            parts.push(text);
        }
    }

    parts.join(" ").trim().to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: Normalize text
// ---------------------------------------------------------------------------

/// Collapse whitespace, drop URLs, and remove boilerplate phrases.
pub fn normalize_text(text: &str) -> String {
    static WS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));
    static URL_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"http\S+").expect("valid regex"));

    if text.is_empty() {
        return String::new();
    }

    let mut result = URL_RE.replace_all(text, "").to_string();
    for phrase in BOILERPLATE {
        result = result.replace(phrase, "");
    }
    WS_RE.replace_all(&result, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn article(title: &str, content: &str) -> Record {
        Record::new().with("title", title).with("content", content)
    }

    #[test]
    fn strips_tags_and_scripts() {
        let html = "<p>Shares <b>rose</b> 3%</p><script>track()</script><style>p{}</style>";
        assert_eq!(strip_html(html), "Shares  rose  3%");
    }

    #[test]
    fn normalizes_whitespace_urls_and_boilerplate() {
        let text = "Sensex  gains\n\tADVERTISEMENT see https://x.io/a  Read more on ET Markets";
        assert_eq!(normalize_text(text), "Sensex gains see");
    }

    #[test]
    fn merges_title_and_content() {
        let record = article("<h1>RBI holds rates</h1>", "<p>The policy rate was kept at 6.5%.</p>");
        assert_eq!(clean_text(&record), "RBI holds rates. The policy rate was kept at 6.5%.");
    }

    #[test]
    fn drops_short_articles() {
        let cleaner = HtmlClean::new(50);
        let records = vec![
            article("Brief", "Too short."),
            article(
                "Infosys raises guidance",
                "Infosys raised its full-year revenue forecast after a strong quarter.",
            ),
        ];

        let kept = cleaner.clean_records(records);
        assert_eq!(kept.len(), 1);
        assert!(kept[0].get_str("clean_text").is_some_and(|t| t.starts_with("Infosys raises")));
        assert_eq!(kept[0].get_str("title"), Some("Infosys raises guidance"));
    }

    #[tokio::test]
    async fn rejects_non_record_arguments() {
        let err = HtmlClean::new(10).call(CallArgs::Empty).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::ArityMismatch(_)));
    }
}
