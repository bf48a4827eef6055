//! Unified Error Model
use thiserror::Error;

use crate::translator::DependencyId;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// One or more ids in a registration batch already had a translator.
    /// Non-duplicate ids of the same batch are still registered.
    #[error("REGISTRY/translators already registered for dependencies: {}", join_ids(.duplicate_ids))]
    RegistrationConflict { duplicate_ids: Vec<DependencyId> },

    /// An operation referenced a dependency id with no registered translator.
    #[error("RESOLVE/no translator registered for dependency '{0}'")]
    UnresolvedDependency(DependencyId),

    /// Translator registration was attempted while a cascade is in flight.
    /// The registry is read-only during propagation.
    #[error("REGISTRY/registration rejected while a cascade is in flight")]
    RegistryLocked,

    /// Opaque failure raised by a translator, propagated unchanged.
    #[error("STORE/{0}")]
    Store(anyhow::Error),
}

impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        Self::Store(err)
    }
}

fn join_ids(ids: &[DependencyId]) -> String {
    ids.join(", ")
}
