//! Riffle Core: dependency translation, stages, and the cascade scheduler
//!
//! Named dependencies live in pluggable backing stores behind the
//! [`DependencyTranslator`] contract. Stages register against the dependency
//! ids that trigger them; when a dependency changes, every stage that
//! consumes it runs exactly once per cascade, producers before consumers.
//!
//! # Change Flow
//!
//! ```text
//! set_dependency → DependencyManager → Translator → change listener
//!                                                        ↓
//!            Stage ← ordered, deduplicated batch ← cascade queue
//! ```

pub mod error;
pub mod manager;
pub mod pipeline;
pub mod stage;
pub mod translator;

pub use error::PipelineError;
pub use manager::{DependencyManager, Registration};
pub use pipeline::Pipeline;
pub use stage::{ExecutionFn, Stage};
pub use translator::{
    ChangeListener, DependencyId, DependencyTranslator, DependencyValue, SharedTranslator,
};

/// Version of the riffle engine
pub const RIFFLE_VERSION: &str = "1.0.0";
