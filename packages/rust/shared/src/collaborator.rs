//! Contract between the orchestrator and the external collaborators that
//! implement each stage's domain logic.
//!
//! A collaborator declares its calling convention once ([`Arity`]) and
//! translates whatever it produces into the closed [`CollaboratorOutput`]
//! variant set. The catalog maps configured names to factories so the
//! orchestrator can resolve collaborators at startup.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::AppConfig;
use crate::error::{CollaboratorError, PipelineError, Result};
use crate::types::{Record, Table};

/// Boxed future returned by [`Collaborator::call`].
pub type CollaboratorFuture = Pin<
    Box<dyn Future<Output = std::result::Result<CollaboratorOutput, CollaboratorError>> + Send>,
>;

/// Lazily produced records, materialized by the orchestrator.
pub type RecordIter = Box<dyn Iterator<Item = Record> + Send>;

// ---------------------------------------------------------------------------
// Call shape
// ---------------------------------------------------------------------------

/// Whether a collaborator consumes the stage input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// Called with the stage input (records or query text).
    TakesInput,
    /// Called with no arguments; it loads its own input.
    TakesNoInput,
}

/// Arguments handed to a collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum CallArgs {
    Empty,
    Items(Vec<Record>),
    Text(String),
}

impl CallArgs {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Everything a collaborator may hand back.
pub enum CollaboratorOutput {
    /// Columnar frame, converted to records by row.
    Table(Table),
    /// Ordered records, passed through unchanged.
    Records(Vec<Record>),
    /// Any other record source, materialized into a sequence.
    Iter(RecordIter),
    /// Success indicator.
    Flag(bool),
    /// String-keyed mapping (query result bundles).
    Bundle(Map<String, Value>),
    /// The collaborator ran but returned nothing.
    Nothing,
    /// An arbitrary JSON value.
    Scalar(Value),
}

impl CollaboratorOutput {
    /// Short variant name for logs and shape errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Table(_) => "table",
            Self::Records(_) => "records",
            Self::Iter(_) => "iterator",
            Self::Flag(_) => "flag",
            Self::Bundle(_) => "bundle",
            Self::Nothing => "nothing",
            Self::Scalar(_) => "scalar",
        }
    }

    /// Truthiness of the output, used when a stage only needs a success bit.
    ///
    /// Empty collections, `false`, `0`, `""`, and `null` are falsy. An
    /// iterator is truthy; it is never drained here.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Table(t) => !t.is_empty(),
            Self::Records(r) => !r.is_empty(),
            Self::Iter(_) => true,
            Self::Flag(b) => *b,
            Self::Bundle(m) => !m.is_empty(),
            Self::Nothing => false,
            Self::Scalar(v) => json_truthy(v),
        }
    }
}

impl fmt::Debug for CollaboratorOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Table(t) => f.debug_tuple("Table").field(t).finish(),
            Self::Records(r) => f.debug_tuple("Records").field(r).finish(),
            Self::Iter(_) => f.write_str("Iter(..)"),
            Self::Flag(b) => f.debug_tuple("Flag").field(b).finish(),
            Self::Bundle(m) => f.debug_tuple("Bundle").field(m).finish(),
            Self::Nothing => f.write_str("Nothing"),
            Self::Scalar(v) => f.debug_tuple("Scalar").field(v).finish(),
        }
    }
}

/// JSON truthiness: `null`, `false`, `0`, and empty strings/arrays/objects are falsy.
pub fn json_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// An external function implementing one stage's domain logic.
pub trait Collaborator: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// Calling convention, fixed when the collaborator is built.
    fn arity(&self) -> Arity {
        Arity::TakesInput
    }

    /// Run the collaborator. The returned future must own everything it uses.
    fn call(&self, args: CallArgs) -> CollaboratorFuture;
}

/// Collaborator backed by a closure.
pub struct FnCollaborator<F> {
    name: String,
    arity: Arity,
    func: F,
}

/// Wrap a closure as a [`Collaborator`].
pub fn from_fn<F, Fut>(name: impl Into<String>, arity: Arity, func: F) -> FnCollaborator<F>
where
    F: Fn(CallArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<CollaboratorOutput, CollaboratorError>>
        + Send
        + 'static,
{
    FnCollaborator {
        name: name.into(),
        arity,
        func,
    }
}

impl<F, Fut> Collaborator for FnCollaborator<F>
where
    F: Fn(CallArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<CollaboratorOutput, CollaboratorError>>
        + Send
        + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn arity(&self) -> Arity {
        self.arity
    }

    fn call(&self, args: CallArgs) -> CollaboratorFuture {
        Box::pin((self.func)(args))
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Builds a collaborator from the loaded configuration.
pub type CollaboratorFactory =
    Box<dyn Fn(&AppConfig) -> Result<Arc<dyn Collaborator>> + Send + Sync>;

/// Named collaborator factories available for resolution.
#[derive(Default)]
pub struct CollaboratorCatalog {
    factories: BTreeMap<String, CollaboratorFactory>,
}

impl CollaboratorCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&AppConfig) -> Result<Arc<dyn Collaborator>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
        self
    }

    /// Registered names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Build the collaborator registered under `name`.
    pub fn build(&self, name: &str, config: &AppConfig) -> Result<Arc<dyn Collaborator>> {
        let factory = self.factories.get(name).ok_or_else(|| {
            PipelineError::config(format!("no collaborator named '{name}' is registered"))
        })?;
        factory(config)
    }
}

impl fmt::Debug for CollaboratorCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo() -> Arc<dyn Collaborator> {
        Arc::new(from_fn("echo", Arity::TakesInput, |args| async move {
            match args {
                CallArgs::Items(items) => Ok(CollaboratorOutput::Records(items)),
                _ => Err(CollaboratorError::ArityMismatch("expected records".into())),
            }
        }))
    }

    #[tokio::test]
    async fn fn_collaborator_calls_closure() {
        let collab = echo();
        assert_eq!(collab.name(), "echo");
        assert_eq!(collab.arity(), Arity::TakesInput);

        let items = vec![Record::new().with("title", "a")];
        match collab.call(CallArgs::Items(items)).await {
            Ok(CollaboratorOutput::Records(out)) => assert_eq!(out.len(), 1),
            other => panic!("unexpected output: {other:?}"),
        }

        let err = collab.call(CallArgs::Empty).await.unwrap_err();
        assert!(matches!(err, CollaboratorError::ArityMismatch(_)));
    }

    #[test]
    fn truthiness_follows_json_rules() {
        assert!(!CollaboratorOutput::Nothing.is_truthy());
        assert!(!CollaboratorOutput::Flag(false).is_truthy());
        assert!(!CollaboratorOutput::Records(vec![]).is_truthy());
        assert!(!CollaboratorOutput::Scalar(json!(0)).is_truthy());
        assert!(!CollaboratorOutput::Scalar(json!("")).is_truthy());
        assert!(CollaboratorOutput::Scalar(json!(3)).is_truthy());
        assert!(CollaboratorOutput::Scalar(json!({"ok": true})).is_truthy());
    }

    #[test]
    fn catalog_builds_registered_names() {
        let mut catalog = CollaboratorCatalog::new();
        catalog.register("echo", |_| Ok(echo()));
        catalog.register("broken", |_| Err(PipelineError::config("missing feed path")));

        let config = AppConfig::default();
        assert_eq!(catalog.names().collect::<Vec<_>>(), ["broken", "echo"]);
        assert!(catalog.build("echo", &config).is_ok());
        assert!(catalog.build("broken", &config).is_err());

        let err = catalog.build("nope", &config).err().expect("unknown name");
        assert!(err.to_string().contains("'nope'"));
    }
}
