//! Collaborator resolution: one slot per stage, filled at startup.
//!
//! A slot whose collaborator could not be built stays absent. Absent slots
//! are not fatal; the invocation adapter reports them when the stage runs.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info};

use marketpulse_shared::{AppConfig, Collaborator, CollaboratorCatalog, StageName, error_report};

/// Name recorded for stages nobody configured.
const UNCONFIGURED: &str = "<unconfigured>";

/// The collaborator serving one stage, or the name that failed to resolve.
#[derive(Clone)]
pub struct CollaboratorSlot {
    name: String,
    handle: Option<Arc<dyn Collaborator>>,
}

impl CollaboratorSlot {
    pub fn resolved(handle: Arc<dyn Collaborator>) -> Self {
        Self {
            name: handle.name().to_string(),
            handle: Some(handle),
        }
    }

    pub fn absent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            handle: None,
        }
    }

    /// Collaborator name (configured name when absent).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> Option<&Arc<dyn Collaborator>> {
        self.handle.as_ref()
    }

    pub fn is_available(&self) -> bool {
        self.handle.is_some()
    }
}

impl fmt::Debug for CollaboratorSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollaboratorSlot")
            .field("name", &self.name)
            .field("available", &self.is_available())
            .finish()
    }
}

/// Resolved collaborators for all seven stages.
#[derive(Debug, Clone)]
pub struct CollaboratorRegistry {
    slots: [CollaboratorSlot; 7],
}

impl CollaboratorRegistry {
    /// Resolve each stage's configured collaborator from `catalog`.
    ///
    /// Unknown names and failing factories are logged and leave the slot absent.
    pub fn resolve(config: &AppConfig, catalog: &CollaboratorCatalog) -> Self {
        let slots = StageName::ALL.map(|stage| {
            let name = config.collaborators.name_for(stage);
            match catalog.build(name, config) {
                Ok(handle) => {
                    debug!(%stage, collaborator = name, "resolved collaborator");
                    CollaboratorSlot {
                        name: name.to_string(),
                        handle: Some(handle),
                    }
                }
                Err(e) => {
                    error!(
                        %stage,
                        collaborator = name,
                        error = %error_report(&e),
                        "failed to resolve collaborator; stage will degrade"
                    );
                    CollaboratorSlot::absent(name)
                }
            }
        });

        let registry = Self { slots };
        info!(
            available = StageName::ALL.len() - registry.missing().len(),
            missing = ?registry.missing(),
            "collaborators resolved"
        );
        registry
    }

    /// Start an empty registry and install collaborators by hand.
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn slot(&self, stage: StageName) -> &CollaboratorSlot {
        &self.slots[stage as usize]
    }

    /// Stages whose collaborator is absent.
    pub fn missing(&self) -> Vec<StageName> {
        StageName::ALL
            .into_iter()
            .filter(|&stage| !self.slot(stage).is_available())
            .collect()
    }
}

/// Hand-assembled registry; stages left unset are absent.
#[derive(Default)]
pub struct RegistryBuilder {
    slots: [Option<CollaboratorSlot>; 7],
}

impl RegistryBuilder {
    /// Serve `stage` with `collaborator`.
    pub fn with(mut self, stage: StageName, collaborator: Arc<dyn Collaborator>) -> Self {
        self.slots[stage as usize] = Some(CollaboratorSlot::resolved(collaborator));
        self
    }

    /// Mark `stage` as configured with `name` but unresolvable.
    pub fn absent(mut self, stage: StageName, name: impl Into<String>) -> Self {
        self.slots[stage as usize] = Some(CollaboratorSlot::absent(name));
        self
    }

    pub fn build(self) -> CollaboratorRegistry {
        CollaboratorRegistry {
            slots: self
                .slots
                .map(|slot| slot.unwrap_or_else(|| CollaboratorSlot::absent(UNCONFIGURED))),
        }
    }
}
