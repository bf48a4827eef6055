//! Pipeline: stage registry plus the cascade scheduler
//!
//! A dependency write is an event. Each event is resolved to the stages that
//! depend on the changed id and have not yet run in the current cascade;
//! those stages run producer-before-consumer, each at most once per cascade,
//! reading the values of their dependencies at the moment they finally run.
//! Writes performed inside a stage callback are queued onto the same cascade
//! (an iterative work-list, never recursion), so one external mutation drains
//! to quiescence before the caller gets control back.
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::manager::DependencyManager;
use crate::stage::Stage;
use crate::translator::{
    ChangeListener, DependencyId, DependencyValue, SharedTranslator,
};

/// Per-cascade bookkeeping plus the producer relation learned across
/// cascades.
#[derive(Default)]
struct SchedulerState {
    /// A cascade is draining. External mutations arriving now are merged
    /// into it instead of starting a second one.
    in_flight: bool,
    /// Stage indices already run in the current cascade.
    executed: HashSet<usize>,
    /// Stage currently inside its execution callback, for attributing the
    /// writes it performs.
    current_stage: Option<usize>,
    /// Dependency ids each stage's callback has been observed writing.
    /// Stages never declare outputs, so the producer relation is learned
    /// here and kept across cascades.
    observed_writes: HashMap<usize, HashSet<DependencyId>>,
}

pub struct Pipeline {
    manager: RefCell<DependencyManager>,
    stages: RefCell<Vec<Rc<Stage>>>,
    /// FIFO of changed ids, fed by the pipeline's own change listeners.
    /// Shared with those listener closures.
    events: Rc<RefCell<VecDeque<DependencyId>>>,
    scheduler: RefCell<SchedulerState>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            manager: RefCell::new(DependencyManager::new()),
            stages: RefCell::new(Vec::new()),
            events: Rc::new(RefCell::new(VecDeque::new())),
            scheduler: RefCell::new(SchedulerState::default()),
        }
    }

    /// Append an execution stage. Insertion order is kept and used as the
    /// tie-break whenever no producer relation constrains two stages.
    pub fn add_stage<F>(&self, dependency_ids: Vec<DependencyId>, execution_fn: F)
    where
        F: Fn(&Pipeline, &HashMap<DependencyId, DependencyValue>) -> Result<(), PipelineError>
            + 'static,
    {
        self.stages
            .borrow_mut()
            .push(Rc::new(Stage::new(dependency_ids, execution_fn)));
    }

    /// All stages in insertion order.
    pub fn stages(&self) -> Vec<Rc<Stage>> {
        self.stages.borrow().clone()
    }

    /// Register `translator` for `ids` and subscribe the scheduler to every
    /// id the registration actually added, so future writes feed the cascade
    /// queue. Duplicate ids fail the call with `RegistrationConflict`, but
    /// the non-duplicate ids of the batch are registered (and subscribed)
    /// anyway. Rejected outright while a cascade is in flight: the registry
    /// is read-only during propagation.
    pub fn add_dependency_translator(
        &self,
        translator: SharedTranslator,
        ids: &[DependencyId],
    ) -> Result<(), PipelineError> {
        if self.scheduler.borrow().in_flight {
            return Err(PipelineError::RegistryLocked);
        }

        let outcome = self.manager.borrow_mut().register(translator, ids);
        for id in &outcome.registered {
            let events = Rc::clone(&self.events);
            let listener: ChangeListener = Box::new(move |changed, _new, _old| {
                events.borrow_mut().push_back(changed.to_string());
            });
            self.manager.borrow().listen_to_dependency(id, listener)?;
        }
        outcome.into_result()
    }

    /// The translator registered for `id`, if any.
    pub fn dependency_translator(&self, id: &str) -> Option<SharedTranslator> {
        self.manager.borrow().dependency_translator(id)
    }

    /// All registered translators with their owned ids, in registration
    /// order.
    pub fn dependency_translators(&self) -> Vec<(SharedTranslator, Vec<DependencyId>)> {
        self.manager.borrow().dependency_translators()
    }

    /// Write a dependency and propagate. Fails with `UnresolvedDependency`
    /// before any stage runs when no translator owns `id`.
    ///
    /// Called from outside a cascade, this starts one and drains it to
    /// quiescence before returning. Called from inside a stage's execution
    /// callback, the change joins the in-flight cascade and the write
    /// returns immediately; the stage that performed it is recorded as a
    /// producer of `id` for future ordering decisions.
    ///
    /// On a mid-cascade failure the error propagates to the caller that
    /// triggered the cascade; stages that already ran are not rolled back.
    pub fn set_dependency(&self, id: &str, value: DependencyValue) -> Result<(), PipelineError> {
        self.manager.borrow().set_dependency(id, value)?;

        {
            let mut scheduler = self.scheduler.borrow_mut();
            if scheduler.in_flight {
                if let Some(stage) = scheduler.current_stage {
                    scheduler
                        .observed_writes
                        .entry(stage)
                        .or_default()
                        .insert(id.to_string());
                }
                return Ok(());
            }
            scheduler.in_flight = true;
        }

        let result = self.drain_cascade();

        let mut scheduler = self.scheduler.borrow_mut();
        scheduler.in_flight = false;
        scheduler.current_stage = None;
        scheduler.executed.clear();
        // Non-empty only when the drain aborted on an error.
        self.events.borrow_mut().clear();
        result
    }

    /// Current value of `id`.
    pub fn get_dependency(&self, id: &str) -> Result<DependencyValue, PipelineError> {
        self.manager.borrow().get_dependency(id)
    }

    /// Current values of all requested ids, one batched store call per
    /// owning translator.
    pub fn get_dependencies(
        &self,
        ids: &[DependencyId],
    ) -> Result<HashMap<DependencyId, DependencyValue>, PipelineError> {
        self.manager.borrow().get_dependencies(ids)
    }

    /// Register a change callback on `id`, alongside any listeners the
    /// scheduler itself holds.
    pub fn listen_to_dependency(
        &self,
        id: &str,
        listener: ChangeListener,
    ) -> Result<(), PipelineError> {
        self.manager.borrow().listen_to_dependency(id, listener)
    }

    /// Work-list drain of one cascade. Terminates when the event queue is
    /// empty and no stage execution produced a new event.
    fn drain_cascade(&self) -> Result<(), PipelineError> {
        let cascade = Uuid::new_v4();
        debug!(%cascade, "cascade started");

        loop {
            let changed = self.events.borrow_mut().pop_front();
            let Some(changed) = changed else { break };

            let batch = self.affected_stages(&changed);
            if batch.is_empty() {
                continue;
            }
            let ordered = self.order_batch(batch);

            for index in ordered {
                // A nested event may have run this stage already.
                if self.scheduler.borrow().executed.contains(&index) {
                    continue;
                }
                let stage = Rc::clone(&self.stages.borrow()[index]);
                // Values are read at execution time, not at queue time.
                let values = self.manager.borrow().get_dependencies(stage.dependency_ids())?;

                {
                    let mut scheduler = self.scheduler.borrow_mut();
                    scheduler.executed.insert(index);
                    scheduler.current_stage = Some(index);
                }
                debug!(%cascade, stage = index, trigger = %changed, "executing stage");
                let result = stage.execute(self, &values);
                self.scheduler.borrow_mut().current_stage = None;
                result?;
            }
        }

        debug!(%cascade, "cascade quiescent");
        Ok(())
    }

    /// Stages triggered by `changed` that have not run in this cascade, in
    /// insertion order.
    fn affected_stages(&self, changed: &str) -> Vec<usize> {
        let stages = self.stages.borrow();
        let scheduler = self.scheduler.borrow();
        stages
            .iter()
            .enumerate()
            .filter(|(index, stage)| {
                stage.depends_on(changed) && !scheduler.executed.contains(index)
            })
            .map(|(index, _)| index)
            .collect()
    }

    /// Order a batch producer-before-consumer using the observed writes:
    /// repeatedly pick the first remaining stage (insertion order) that no
    /// other remaining stage is known to feed. A write cycle leaves no such
    /// stage; the remainder then falls back to plain insertion order.
    fn order_batch(&self, mut batch: Vec<usize>) -> Vec<usize> {
        let stages = self.stages.borrow();
        let scheduler = self.scheduler.borrow();

        let feeds = |producer: usize, consumer: usize| -> bool {
            scheduler
                .observed_writes
                .get(&producer)
                .map_or(false, |writes| {
                    stages[consumer]
                        .dependency_ids()
                        .iter()
                        .any(|id| writes.contains(id))
                })
        };

        let mut ordered = Vec::with_capacity(batch.len());
        while !batch.is_empty() {
            let pick = batch
                .iter()
                .position(|&candidate| {
                    !batch
                        .iter()
                        .any(|&other| other != candidate && feeds(other, candidate))
                })
                .unwrap_or(0);
            let index = batch.remove(pick);
            if pick != 0 {
                trace!(stage = index, "deferred consumers behind observed producer");
            }
            ordered.push(index);
        }
        ordered
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
