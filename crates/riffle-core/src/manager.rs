//! DependencyManager: routes dependency requests to registered translators
//!
//! Single source of truth for "which translator serves which dependency id".
//! At most one translator per id; batched reads are gathered so each distinct
//! translator is called once regardless of how many ids route to it.
use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use crate::error::PipelineError;
use crate::translator::{ChangeListener, DependencyId, DependencyValue, SharedTranslator};

/// One registered translator with the ids it owns, in registration order.
struct TranslatorGroup {
    translator: SharedTranslator,
    ids: Vec<DependencyId>,
}

/// Outcome of one registration batch. Duplicated ids are rejected without
/// touching their existing mapping, but the remaining ids of the batch are
/// registered anyway so partial batches are not silently lost.
pub struct Registration {
    /// Ids this batch actually added to the registry.
    pub registered: Vec<DependencyId>,
    /// Ids that already had a translator and were left untouched.
    pub duplicates: Vec<DependencyId>,
}

impl Registration {
    /// Collapse into the caller-facing result: a batch with any duplicate is
    /// a `RegistrationConflict` naming all of them.
    pub fn into_result(self) -> Result<(), PipelineError> {
        if self.duplicates.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::RegistrationConflict {
                duplicate_ids: self.duplicates,
            })
        }
    }
}

#[derive(Default)]
pub struct DependencyManager {
    groups: Vec<TranslatorGroup>,
    index: HashMap<DependencyId, usize>,
}

impl DependencyManager {
    pub fn new() -> Self {
        Self {
            groups: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register `translator` for each id in `ids`. Returns the detailed
    /// outcome; use [`Registration::into_result`] for the plain error form.
    pub fn register(&mut self, translator: SharedTranslator, ids: &[DependencyId]) -> Registration {
        let mut outcome = Registration {
            registered: Vec::new(),
            duplicates: Vec::new(),
        };
        // Created lazily so an all-duplicate batch leaves no empty group.
        let mut group_index = None;

        for id in ids {
            if self.index.contains_key(id) {
                outcome.duplicates.push(id.clone());
                continue;
            }
            let group = match group_index {
                Some(group) => group,
                None => {
                    let group = self.group_for(&translator);
                    group_index = Some(group);
                    group
                }
            };
            self.index.insert(id.clone(), group);
            self.groups[group].ids.push(id.clone());
            outcome.registered.push(id.clone());
        }

        trace!(
            registered = outcome.registered.len(),
            duplicates = outcome.duplicates.len(),
            "translator registration processed"
        );
        outcome
    }

    /// Register `translator` for `ids`, failing with `RegistrationConflict`
    /// when any id is already taken. Non-duplicate ids of the batch are
    /// registered even in the failure case.
    pub fn add_dependency_translator(
        &mut self,
        translator: SharedTranslator,
        ids: &[DependencyId],
    ) -> Result<(), PipelineError> {
        self.register(translator, ids).into_result()
    }

    /// The translator registered for `id`, if any. Never errors.
    pub fn dependency_translator(&self, id: &str) -> Option<SharedTranslator> {
        self.index
            .get(id)
            .map(|&group| Rc::clone(&self.groups[group].translator))
    }

    /// All registered translators with the ids they own, in registration
    /// order.
    pub fn dependency_translators(&self) -> Vec<(SharedTranslator, Vec<DependencyId>)> {
        self.groups
            .iter()
            .map(|group| (Rc::clone(&group.translator), group.ids.clone()))
            .collect()
    }

    pub fn set_dependency(&self, id: &str, value: DependencyValue) -> Result<(), PipelineError> {
        let translator = self.resolve(id)?;
        translator.borrow_mut().set_dependency(id, value)?;
        Ok(())
    }

    pub fn get_dependency(&self, id: &str) -> Result<DependencyValue, PipelineError> {
        let translator = self.resolve(id)?;
        let value = translator.borrow().get_dependency(id)?;
        Ok(value)
    }

    /// Batched read across translators. The requested ids are gathered into
    /// one sub-list per owning translator (preserving request order), each
    /// translator is called exactly once, and the per-translator maps are
    /// merged. Any requested id with no translator fails the whole call
    /// before a single store is touched.
    pub fn get_dependencies(
        &self,
        ids: &[DependencyId],
    ) -> Result<HashMap<DependencyId, DependencyValue>, PipelineError> {
        let mut per_group: Vec<Vec<DependencyId>> = vec![Vec::new(); self.groups.len()];
        for id in ids {
            let group = *self
                .index
                .get(id)
                .ok_or_else(|| PipelineError::UnresolvedDependency(id.clone()))?;
            per_group[group].push(id.clone());
        }

        let mut merged = HashMap::with_capacity(ids.len());
        for (group, requested) in per_group.iter().enumerate() {
            if requested.is_empty() {
                continue;
            }
            trace!(ids = ?requested, "gathered batch read");
            let values = self.groups[group].translator.borrow().get_dependencies(requested)?;
            // Collisions cannot occur: each id maps to exactly one translator.
            merged.extend(values);
        }
        Ok(merged)
    }

    pub fn listen_to_dependency(
        &self,
        id: &str,
        listener: ChangeListener,
    ) -> Result<(), PipelineError> {
        let translator = self.resolve(id)?;
        translator.borrow_mut().listen_to_dependency(id, listener)?;
        Ok(())
    }

    fn resolve(&self, id: &str) -> Result<SharedTranslator, PipelineError> {
        self.dependency_translator(id)
            .ok_or_else(|| PipelineError::UnresolvedDependency(id.to_string()))
    }

    /// Slot for this translator instance, reusing an existing group when the
    /// same instance is registered again so batched reads stay one call per
    /// distinct translator.
    fn group_for(&mut self, translator: &SharedTranslator) -> usize {
        if let Some(existing) = self
            .groups
            .iter()
            .position(|group| Rc::ptr_eq(&group.translator, translator))
        {
            return existing;
        }
        self.groups.push(TranslatorGroup {
            translator: Rc::clone(translator),
            ids: Vec::new(),
        });
        self.groups.len() - 1
    }
}
