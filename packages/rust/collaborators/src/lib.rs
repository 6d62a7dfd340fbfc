//! Built-in collaborators for the marketpulse pipeline.
//!
//! Each module implements one stage's domain logic behind the
//! [`Collaborator`] trait. [`builtin_catalog`] registers all of them under
//! the names used by the default configuration.

mod clean;
mod dedup;
mod entities;
mod impact;
mod index;
mod ingest;

use std::sync::Arc;

use marketpulse_shared::{Collaborator, CollaboratorCatalog};

pub use clean::{HtmlClean, clean_text, normalize_text, strip_html};
pub use dedup::{ContentHash, compute_hash, jaccard, shingles};
pub use entities::{KeywordEntities, extract_entities};
pub use impact::{KeywordImpact, Level, Sentiment, price_impact, sector, sentiment, urgency};
pub use index::{IndexStore, MemoryIndex, cosine_distance, embed};
pub use ingest::{FeedFile, HttpApi, RssFeeds, load_feed};

/// Catalog of every built-in collaborator.
///
/// `memory_index` handles built from one catalog share a single store, so
/// records indexed by the embedding stage are visible to the query stage.
pub fn builtin_catalog() -> CollaboratorCatalog {
    let store = IndexStore::new();
    let mut catalog = CollaboratorCatalog::new();

    catalog
        .register("feed_file", |config| {
            Ok(Arc::new(FeedFile::from_config(config)?) as Arc<dyn Collaborator>)
        })
        .register("http_api", |config| {
            Ok(Arc::new(HttpApi::from_config(config)?) as Arc<dyn Collaborator>)
        })
        .register("rss", |config| {
            Ok(Arc::new(RssFeeds::from_config(config)?) as Arc<dyn Collaborator>)
        })
        .register("html_clean", |config| {
            Ok(Arc::new(HtmlClean::from_config(config)) as Arc<dyn Collaborator>)
        })
        .register("content_hash", |config| {
            Ok(Arc::new(ContentHash::from_config(config)) as Arc<dyn Collaborator>)
        })
        .register("keyword_entities", |_| {
            Ok(Arc::new(KeywordEntities) as Arc<dyn Collaborator>)
        })
        .register("keyword_impact", |_| {
            Ok(Arc::new(KeywordImpact) as Arc<dyn Collaborator>)
        })
        .register("memory_index", move |config| {
            let index = MemoryIndex::from_config(Arc::clone(&store), config);
            Ok(Arc::new(index) as Arc<dyn Collaborator>)
        });

    catalog
}
