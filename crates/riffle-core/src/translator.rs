//! DependencyTranslator: contract for backing stores that serve dependencies
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde_json::Value;

/// Opaque identifier of a dependency. One key space shared by every
/// translator and every stage of a pipeline.
pub type DependencyId = String;

/// Current value of a dependency. The core never inspects it.
pub type DependencyValue = Value;

/// Change callback fired by a translator after a dependency is written.
/// Arguments are `(dependency_id, new_value, old_value)`.
pub type ChangeListener = Box<dyn FnMut(&str, &DependencyValue, &DependencyValue)>;

/// Shared handle to a translator. Propagation is single-threaded, so
/// translators are shared with `Rc<RefCell<_>>` rather than locks.
pub type SharedTranslator = Rc<RefCell<dyn DependencyTranslator>>;

/// Contract every backing store must satisfy to serve dependencies to a
/// pipeline. Implementations own the storage semantics: whether "never set"
/// is distinguishable from "set to a default" is the store's concern, and the
/// core never assumes a uniform sentinel.
///
/// Errors are opaque to the core: whatever a store returns is propagated
/// unchanged to the caller of the pipeline operation that triggered it.
pub trait DependencyTranslator {
    /// Store `value` under `id`. The new value must be visible to later
    /// reads, and every listener registered for `id` must fire with
    /// `(id, new_value, old_value)`.
    fn set_dependency(&mut self, id: &str, value: DependencyValue) -> anyhow::Result<()>;

    /// Current value of `id`, or an implementation-defined default when the
    /// dependency was never set.
    fn get_dependency(&self, id: &str) -> anyhow::Result<DependencyValue>;

    /// Current values of all requested ids. The result must contain one
    /// entry per requested id, even for ids that were never set.
    fn get_dependencies(
        &self,
        ids: &[DependencyId],
    ) -> anyhow::Result<HashMap<DependencyId, DependencyValue>>;

    /// Register `listener` to fire on every future change of `id`. Multiple
    /// listeners per id all fire; no ordering is guaranteed between
    /// listeners on different ids.
    fn listen_to_dependency(&mut self, id: &str, listener: ChangeListener) -> anyhow::Result<()>;
}
