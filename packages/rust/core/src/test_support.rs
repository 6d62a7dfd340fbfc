//! Scripted collaborators for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use marketpulse_shared::{
    Arity, CallArgs, Collaborator, CollaboratorError, CollaboratorOutput, Record, from_fn,
};

pub(crate) type CallResult = Result<CollaboratorOutput, CollaboratorError>;

/// Collaborator answering synchronously from `f`.
pub(crate) fn scripted<F>(name: &str, arity: Arity, f: F) -> Arc<dyn Collaborator>
where
    F: Fn(CallArgs) -> CallResult + Send + Sync + 'static,
{
    Arc::new(from_fn(name, arity, move |args| std::future::ready(f(args))))
}

/// Returns its input records unchanged.
pub(crate) fn passthrough(name: &str) -> Arc<dyn Collaborator> {
    scripted(name, Arity::TakesInput, |args| match args {
        CallArgs::Items(items) => Ok(CollaboratorOutput::Records(items)),
        other => Err(CollaboratorError::failed(format!("unexpected args {other:?}"))),
    })
}

/// Always returns `output()` regardless of arguments.
pub(crate) fn returning<F>(name: &str, output: F) -> Arc<dyn Collaborator>
where
    F: Fn() -> CollaboratorOutput + Send + Sync + 'static,
{
    scripted(name, Arity::TakesInput, move |_| Ok(output()))
}

/// Always fails with `message`.
pub(crate) fn failing(name: &str, message: &'static str) -> Arc<dyn Collaborator> {
    scripted(name, Arity::TakesInput, move |_| {
        Err(CollaboratorError::failed(message))
    })
}

/// `n` article records with distinct titles.
pub(crate) fn articles(n: usize) -> Vec<Record> {
    (0..n)
        .map(|i| {
            Record::new()
                .with("title", format!("Headline {i}"))
                .with("content", format!("Body of article {i}"))
                .with("link", format!("https://news.example.com/{i}"))
                .with("source", "RSS")
        })
        .collect()
}

/// Counts calls made through it.
#[derive(Default)]
pub(crate) struct CallCounter(AtomicUsize);

impl CallCounter {
    pub(crate) fn hit(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
