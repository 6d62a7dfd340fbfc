//! Invocation adapter: calls a collaborator and turns every way it can go
//! wrong into a value.
//!
//! The call runs on its own tokio task so a panicking collaborator is
//! contained, and is awaited before returning so stages stay sequential.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::instrument::WithSubscriber;
use tracing::{error, warn};

use marketpulse_shared::{
    Arity, CallArgs, Collaborator, CollaboratorError, CollaboratorOutput, StageName, error_report,
};

use crate::registry::CollaboratorSlot;

/// What came back from a collaborator call.
#[derive(Debug)]
pub enum Invocation {
    /// The collaborator ran and produced a value.
    Returned(CollaboratorOutput),
    /// No collaborator is resolved for the stage; nothing was called.
    Unavailable { diagnostic: String },
    /// The collaborator raised, panicked, or timed out.
    Failed { diagnostic: String },
}

impl Invocation {
    /// Diagnostic for degraded outcomes, `None` when the call returned.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Self::Returned(_) => None,
            Self::Unavailable { diagnostic } | Self::Failed { diagnostic } => Some(diagnostic),
        }
    }
}

/// Why a single call attempt produced no output.
enum CallFault {
    Raised(CollaboratorError),
    Panicked(String),
    TimedOut(Duration),
}

impl fmt::Display for CallFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Raised(e) => f.write_str(&error_report(e)),
            Self::Panicked(msg) => write!(f, "panicked: {msg}"),
            Self::TimedOut(limit) => write!(f, "timed out after {:.3}s", limit.as_secs_f64()),
        }
    }
}

/// Call the collaborator in `slot` for `stage`.
///
/// Collaborators declaring [`Arity::TakesNoInput`] are called with no
/// arguments. An [`CollaboratorError::ArityMismatch`] on a call with
/// arguments is retried once without them.
pub async fn invoke(
    stage: StageName,
    slot: &CollaboratorSlot,
    args: CallArgs,
    timeout: Option<Duration>,
) -> Invocation {
    let Some(collaborator) = slot.handle() else {
        let diagnostic = format!(
            "{stage}: collaborator '{}' is not available (resolution failed)",
            slot.name()
        );
        error!(%stage, collaborator = slot.name(), "collaborator is not available; call skipped");
        return Invocation::Unavailable { diagnostic };
    };

    let args = match collaborator.arity() {
        Arity::TakesInput => args,
        Arity::TakesNoInput => CallArgs::Empty,
    };
    let may_retry = !args.is_empty();

    match call_once(collaborator, args, timeout).await {
        Ok(output) => Invocation::Returned(output),
        Err(CallFault::Raised(CollaboratorError::ArityMismatch(reason))) if may_retry => {
            warn!(
                %stage,
                collaborator = collaborator.name(),
                %reason,
                "collaborator rejected its arguments; retrying without"
            );
            match call_once(collaborator, CallArgs::Empty, timeout).await {
                Ok(output) => Invocation::Returned(output),
                Err(fault) => failed(stage, &**collaborator, "fallback no-argument call", fault),
            }
        }
        Err(fault) => failed(stage, &**collaborator, "call", fault),
    }
}

fn failed(
    stage: StageName,
    collaborator: &dyn Collaborator,
    attempt: &str,
    fault: CallFault,
) -> Invocation {
    let diagnostic = format!(
        "{stage}: collaborator '{}' {attempt} failed: {fault}",
        collaborator.name()
    );
    error!(
        %stage,
        collaborator = collaborator.name(),
        attempt,
        error = %fault,
        "collaborator call failed"
    );
    Invocation::Failed { diagnostic }
}

async fn call_once(
    collaborator: &Arc<dyn Collaborator>,
    args: CallArgs,
    timeout: Option<Duration>,
) -> Result<CollaboratorOutput, CallFault> {
    let collaborator = Arc::clone(collaborator);
    let task = tokio::spawn(
        async move { collaborator.call(args).await.map(materialize) }.with_current_subscriber(),
    );
    let abort = task.abort_handle();

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, task).await {
            Ok(joined) => joined,
            Err(_) => {
                abort.abort();
                return Err(CallFault::TimedOut(limit));
            }
        },
        None => task.await,
    };

    match joined {
        Ok(result) => result.map_err(CallFault::Raised),
        Err(join_err) if join_err.is_panic() => {
            Err(CallFault::Panicked(panic_message(join_err.into_panic())))
        }
        Err(join_err) => Err(CallFault::Panicked(join_err.to_string())),
    }
}

/// Drain lazy output on the call's task so its panics and run time count
/// against the call.
fn materialize(output: CollaboratorOutput) -> CollaboratorOutput {
    match output {
        CollaboratorOutput::Iter(iter) => CollaboratorOutput::Records(iter.collect()),
        other => other,
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{CallCounter, articles, failing, passthrough, scripted};

    fn slot(collaborator: Arc<dyn Collaborator>) -> CollaboratorSlot {
        CollaboratorSlot::resolved(collaborator)
    }

    #[tokio::test]
    async fn absent_collaborator_is_unavailable() {
        let outcome = invoke(
            StageName::Preprocessing,
            &CollaboratorSlot::absent("html_clean"),
            CallArgs::Items(articles(2)),
            None,
        )
        .await;

        match outcome {
            Invocation::Unavailable { diagnostic } => {
                assert!(diagnostic.starts_with("preprocessing:"));
                assert!(diagnostic.contains("html_clean"));
            }
            other => panic!("expected Unavailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn passes_arguments_to_input_taking_collaborator() {
        let outcome = invoke(
            StageName::Deduplication,
            &slot(passthrough("dedup")),
            CallArgs::Items(articles(3)),
            None,
        )
        .await;

        match outcome {
            Invocation::Returned(CollaboratorOutput::Records(records)) => {
                assert_eq!(records, articles(3));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[tokio::test]
    async fn no_input_collaborator_gets_no_arguments() {
        let collab = scripted("loader", Arity::TakesNoInput, |args| {
            assert!(args.is_empty(), "expected no arguments, got {args:?}");
            Ok(CollaboratorOutput::Records(articles(1)))
        });

        let outcome = invoke(
            StageName::Preprocessing,
            &slot(collab),
            CallArgs::Items(articles(5)),
            None,
        )
        .await;
        assert!(matches!(outcome, Invocation::Returned(CollaboratorOutput::Records(r)) if r.len() == 1));
    }

    #[tokio::test]
    async fn arity_mismatch_retries_once_without_arguments() {
        let calls = Arc::new(CallCounter::default());
        let seen = Arc::clone(&calls);
        let collab = scripted("legacy", Arity::TakesInput, move |args| {
            seen.hit();
            match args {
                CallArgs::Empty => Ok(CollaboratorOutput::Flag(true)),
                _ => Err(CollaboratorError::ArityMismatch("takes 0 arguments".into())),
            }
        });

        let outcome = invoke(
            StageName::Embedding,
            &slot(collab),
            CallArgs::Items(articles(2)),
            None,
        )
        .await;

        assert!(matches!(outcome, Invocation::Returned(CollaboratorOutput::Flag(true))));
        assert_eq!(calls.count(), 2);
    }

    #[tokio::test]
    async fn failed_retry_is_reported() {
        let collab = scripted("legacy", Arity::TakesInput, |args| match args {
            CallArgs::Empty => Err(CollaboratorError::failed("database locked")),
            _ => Err(CollaboratorError::ArityMismatch("takes 0 arguments".into())),
        });

        let outcome = invoke(StageName::Ner, &slot(collab), CallArgs::Items(articles(1)), None).await;
        let diagnostic = outcome.diagnostic().expect("failed outcome").to_string();
        assert!(matches!(outcome, Invocation::Failed { .. }));
        assert!(diagnostic.contains("fallback no-argument call failed"));
        assert!(diagnostic.contains("database locked"));
    }

    #[tokio::test]
    async fn other_faults_are_not_retried() {
        let calls = Arc::new(CallCounter::default());
        let seen = Arc::clone(&calls);
        let collab = scripted("flaky", Arity::TakesInput, move |_| {
            seen.hit();
            Err(CollaboratorError::failed("connection reset"))
        });

        let outcome = invoke(
            StageName::ImpactScoring,
            &slot(collab),
            CallArgs::Items(articles(1)),
            None,
        )
        .await;

        assert!(matches!(outcome, Invocation::Failed { .. }));
        assert_eq!(calls.count(), 1);
        assert!(outcome.diagnostic().is_some_and(|d| d.starts_with("impact_scoring:")));
    }

    #[tokio::test]
    async fn raised_error_keeps_source_chain() {
        let collab = scripted("reader", Arity::TakesNoInput, |_| {
            let io = std::io::Error::new(std::io::ErrorKind::NotFound, "feed.json");
            Err(CollaboratorError::with_source("could not open feed", io))
        });

        let outcome = invoke(StageName::Ingestion, &slot(collab), CallArgs::Empty, None).await;
        let diagnostic = outcome.diagnostic().expect("diagnostic");
        assert!(diagnostic.contains("could not open feed"));
        assert!(diagnostic.contains("caused by: feed.json"));
    }

    #[tokio::test]
    async fn panics_are_contained() {
        let collab = scripted("boom", Arity::TakesInput, |_| panic!("index out of range"));

        let outcome = invoke(StageName::Query, &slot(collab), CallArgs::Text("q".into()), None).await;
        let diagnostic = outcome.diagnostic().expect("diagnostic");
        assert!(diagnostic.contains("panicked: index out of range"));
    }

    #[tokio::test]
    async fn slow_calls_time_out() {
        let collab: Arc<dyn Collaborator> = Arc::new(marketpulse_shared::from_fn(
            "slow",
            Arity::TakesInput,
            |_| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(CollaboratorOutput::Nothing)
            },
        ));

        let outcome = invoke(
            StageName::Embedding,
            &slot(collab),
            CallArgs::Items(articles(1)),
            Some(Duration::from_millis(20)),
        )
        .await;
        assert!(outcome.diagnostic().is_some_and(|d| d.contains("timed out")));
    }

    #[tokio::test]
    async fn iterators_are_drained_on_the_call_task() {
        let collab = scripted("rows", Arity::TakesNoInput, |_| {
            Ok(CollaboratorOutput::Iter(Box::new(articles(2).into_iter())))
        });
        let outcome = invoke(StageName::Ingestion, &slot(collab), CallArgs::Empty, None).await;
        assert!(matches!(outcome, Invocation::Returned(CollaboratorOutput::Records(r)) if r.len() == 2));

        let collab = scripted("rows", Arity::TakesNoInput, |_| {
            let rows = articles(3).into_iter().enumerate().map(|(i, record)| {
                if i == 1 {
                    panic!("row decode failed");
                }
                record
            });
            Ok(CollaboratorOutput::Iter(Box::new(rows)))
        });
        let outcome = invoke(StageName::Ingestion, &slot(collab), CallArgs::Empty, None).await;
        assert!(outcome.diagnostic().is_some_and(|d| d.contains("panicked: row decode failed")));
    }

    #[tokio::test]
    async fn failing_helper_reports_message() {
        let outcome = invoke(
            StageName::Deduplication,
            &slot(failing("dedup", "model not loaded")),
            CallArgs::Items(articles(1)),
            None,
        )
        .await;
        assert!(outcome.diagnostic().is_some_and(|d| d.contains("model not loaded")));
    }
}
