//! In-memory variable store
use std::collections::HashMap;

use serde_json::Value;

use riffle_core::{ChangeListener, DependencyId, DependencyTranslator, DependencyValue};

/// The simplest conforming translator: a variable map held in memory.
/// Dependencies that were never set read as `Value::Null`; the store does
/// not distinguish "unset" from "set to null".
#[derive(Default)]
pub struct VariableStore {
    values: HashMap<DependencyId, DependencyValue>,
    listeners: HashMap<DependencyId, Vec<ChangeListener>>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a value without firing listeners, for setup.
    pub fn with_value(mut self, id: impl Into<DependencyId>, value: DependencyValue) -> Self {
        self.values.insert(id.into(), value);
        self
    }
}

impl DependencyTranslator for VariableStore {
    fn set_dependency(&mut self, id: &str, value: DependencyValue) -> anyhow::Result<()> {
        let old = self.values.get(id).cloned().unwrap_or(Value::Null);
        self.values.insert(id.to_string(), value.clone());
        if let Some(listeners) = self.listeners.get_mut(id) {
            for listener in listeners.iter_mut() {
                listener(id, &value, &old);
            }
        }
        Ok(())
    }

    fn get_dependency(&self, id: &str) -> anyhow::Result<DependencyValue> {
        Ok(self.values.get(id).cloned().unwrap_or(Value::Null))
    }

    fn get_dependencies(
        &self,
        ids: &[DependencyId],
    ) -> anyhow::Result<HashMap<DependencyId, DependencyValue>> {
        Ok(ids
            .iter()
            .map(|id| (id.clone(), self.values.get(id).cloned().unwrap_or(Value::Null)))
            .collect())
    }

    fn listen_to_dependency(&mut self, id: &str, listener: ChangeListener) -> anyhow::Result<()> {
        self.listeners.entry(id.to_string()).or_default().push(listener);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_unset_dependency_reads_null() {
        let store = VariableStore::new();
        assert_eq!(store.get_dependency("missing").unwrap(), Value::Null);

        let values = store
            .get_dependencies(&["missing".to_string(), "also".to_string()])
            .unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values["missing"], Value::Null);
    }

    #[test]
    fn test_set_makes_value_visible_to_reads() {
        let mut store = VariableStore::new();
        store.set_dependency("A", json!({"n": 1})).unwrap();
        assert_eq!(store.get_dependency("A").unwrap(), json!({"n": 1}));
    }

    #[test]
    fn test_every_listener_fires_with_new_and_old() {
        let mut store = VariableStore::new();
        let calls = Rc::new(RefCell::new(Vec::new()));

        for tag in ["first", "second"] {
            let calls = Rc::clone(&calls);
            store
                .listen_to_dependency(
                    "A",
                    Box::new(move |id, new, old| {
                        calls
                            .borrow_mut()
                            .push(format!("{tag}:{id}:{new}:{old}"));
                    }),
                )
                .unwrap();
        }

        store.set_dependency("A", json!(1)).unwrap();
        store.set_dependency("A", json!(2)).unwrap();

        let calls = calls.borrow();
        // Both listeners fire on every set, including the first.
        assert_eq!(
            calls.as_slice(),
            [
                "first:A:1:null",
                "second:A:1:null",
                "first:A:2:1",
                "second:A:2:1"
            ]
        );
    }

    #[test]
    fn test_seeded_values_do_not_fire_listeners() {
        let store = VariableStore::new().with_value("A", json!("seed"));
        assert_eq!(store.get_dependency("A").unwrap(), json!("seed"));
    }
}
