//! Stage: a unit of work triggered by dependency changes
use std::collections::HashMap;

use crate::error::PipelineError;
use crate::pipeline::Pipeline;
use crate::translator::{DependencyId, DependencyValue};

/// Callback invoked when a stage runs. Receives the owning pipeline (for
/// further dependency reads/writes, which join the in-flight cascade) and the
/// current values of the stage's declared dependencies.
pub type ExecutionFn =
    Box<dyn Fn(&Pipeline, &HashMap<DependencyId, DependencyValue>) -> Result<(), PipelineError>>;

/// An execution stage: a set of dependency ids and a callback to run when any
/// of them changes. Immutable after construction. A stage only declares what
/// it reads; what its callback writes is observed by the scheduler at run
/// time.
pub struct Stage {
    dependency_ids: Vec<DependencyId>,
    execution_fn: ExecutionFn,
}

impl Stage {
    pub fn new<F>(dependency_ids: Vec<DependencyId>, execution_fn: F) -> Self
    where
        F: Fn(&Pipeline, &HashMap<DependencyId, DependencyValue>) -> Result<(), PipelineError>
            + 'static,
    {
        Self {
            dependency_ids,
            execution_fn: Box::new(execution_fn),
        }
    }

    /// The dependency ids given at construction.
    pub fn dependency_ids(&self) -> &[DependencyId] {
        &self.dependency_ids
    }

    /// Whether this stage is triggered by changes to `id`. Used by the
    /// scheduler to decide relevance, not by the stage itself.
    pub fn depends_on(&self, id: &str) -> bool {
        self.dependency_ids.iter().any(|dep| dep == id)
    }

    /// Invoke the execution callback with the owning pipeline and the current
    /// dependency values. What the callback does is its own business; side
    /// effects (including further dependency writes) become part of the
    /// enclosing cascade.
    pub fn execute(
        &self,
        pipeline: &Pipeline,
        values: &HashMap<DependencyId, DependencyValue>,
    ) -> Result<(), PipelineError> {
        (self.execution_fn)(pipeline, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::Cell;
    use std::rc::Rc;

    fn ids(names: &[&str]) -> Vec<DependencyId> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_reports_declared_dependencies() {
        let stage = Stage::new(ids(&["A", "B"]), |_, _| Ok(()));

        assert_eq!(stage.dependency_ids().len(), 2);
        assert!(stage.depends_on("A"));
        assert!(stage.depends_on("B"));
        assert!(!stage.depends_on("Z"));
    }

    #[test]
    fn test_execute_passes_pipeline_and_values() {
        let seen = Rc::new(Cell::new(false));
        let seen_in_fn = Rc::clone(&seen);
        let stage = Stage::new(ids(&["A"]), move |_, values| {
            assert_eq!(values["A"], json!(42));
            seen_in_fn.set(true);
            Ok(())
        });

        let pipeline = Pipeline::new();
        let mut values = HashMap::new();
        values.insert("A".to_string(), json!(42));
        stage.execute(&pipeline, &values).unwrap();
        assert!(seen.get());
    }

    #[test]
    fn test_empty_dependency_set_is_allowed() {
        let stage = Stage::new(Vec::new(), |_, _| Ok(()));
        assert!(stage.dependency_ids().is_empty());
        assert!(!stage.depends_on("A"));
    }
}
