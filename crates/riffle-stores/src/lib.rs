//! Riffle Stores: reference DependencyTranslator implementations.
//!
//! These stores stay intentionally small. They act as defaults so a pipeline
//! can run without a bespoke backing store; teams with remote config or
//! database-backed dependencies implement `riffle_core::DependencyTranslator`
//! themselves.

mod variable;

pub use variable::VariableStore;
