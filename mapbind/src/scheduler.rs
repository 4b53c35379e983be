//! One-shot coalescing of downstream provider calls.
//!
//! Declarative property changes never call the provider directly. Each
//! change schedules an operation keyed by `(entity, operation)` instead; the
//! host flushes the scheduler once per render cycle, so a batch of changes
//! mapping to the same downstream call (e.g. setting both `lat` and `lng`
//! of a marker) produces that call exactly once. Scheduled tasks read the
//! entity state at flush time, so the last value written within a cycle
//! wins.

use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

use ahash::AHashSet;

/// Crate-wide unique id of a component entity.
pub(crate) type EntityId = u64;

static NEXT_ENTITY_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates a new entity id.
pub(crate) fn next_entity_id() -> EntityId {
    NEXT_ENTITY_ID.fetch_add(1, Ordering::Relaxed)
}

/// Downstream operations used as coalescing keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum OpKind {
    SetOptions,
    SetZoom,
    SetCenter,
    FitBounds,
    SetPosition,
    SetIcon,
    SetLabel,
    SetTitle,
    SetZIndex,
    SetDraggable,
    SetPath,
    SetStyle,
    UpdateRoute,
}

struct Task {
    key: (EntityId, OpKind),
    run: Box<dyn FnOnce()>,
}

/// Single-threaded update queue with at most one pending task per
/// `(entity, operation)` key.
#[derive(Default)]
pub(crate) struct Scheduler {
    queue: RefCell<Vec<Task>>,
    scheduled: RefCell<AHashSet<(EntityId, OpKind)>>,
}

impl Scheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Schedules `run` unless the same operation of the same entity is
    /// already pending.
    pub(crate) fn schedule_once(&self, entity: EntityId, op: OpKind, run: impl FnOnce() + 'static) {
        if !self.scheduled.borrow_mut().insert((entity, op)) {
            return;
        }

        self.queue.borrow_mut().push(Task {
            key: (entity, op),
            run: Box::new(run),
        });
    }

    /// Runs every pending task, including tasks scheduled while flushing.
    ///
    /// A task's key is released right before the task runs, so a task may
    /// re-schedule its own operation for the next iteration.
    pub(crate) fn flush(&self) {
        loop {
            let tasks = std::mem::take(&mut *self.queue.borrow_mut());
            if tasks.is_empty() {
                break;
            }

            for task in tasks {
                self.scheduled.borrow_mut().remove(&task.key);
                (task.run)();
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn has_pending(&self) -> bool {
        !self.queue.borrow().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn same_key_is_coalesced() {
        let scheduler = Scheduler::new();
        let runs = Rc::new(Cell::new(0));

        for _ in 0..3 {
            let runs = runs.clone();
            scheduler.schedule_once(1, OpKind::SetPosition, move || runs.set(runs.get() + 1));
        }

        scheduler.flush();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn distinct_keys_all_run() {
        let scheduler = Scheduler::new();
        let runs = Rc::new(Cell::new(0));

        for op in [OpKind::SetPosition, OpKind::SetIcon, OpKind::SetLabel] {
            let runs = runs.clone();
            scheduler.schedule_once(1, op, move || runs.set(runs.get() + 1));
        }
        let runs_clone = runs.clone();
        scheduler.schedule_once(2, OpKind::SetPosition, move || {
            runs_clone.set(runs_clone.get() + 1)
        });

        scheduler.flush();
        assert_eq!(runs.get(), 4);
    }

    #[test]
    fn key_is_released_before_task_runs() {
        let scheduler = Rc::new(Scheduler::new());
        let runs = Rc::new(Cell::new(0));

        let scheduler_clone = scheduler.clone();
        let runs_clone = runs.clone();
        scheduler.schedule_once(1, OpKind::FitBounds, move || {
            runs_clone.set(runs_clone.get() + 1);
            let runs = runs_clone.clone();
            // rescheduling the same key from within the task must work
            scheduler_clone.schedule_once(1, OpKind::FitBounds, move || runs.set(runs.get() + 1));
        });

        scheduler.flush();
        assert_eq!(runs.get(), 2);
        assert!(!scheduler.has_pending());
    }

    #[test]
    fn flush_on_empty_queue_is_a_no_op() {
        let scheduler = Scheduler::new();
        scheduler.flush();
        assert!(!scheduler.has_pending());
    }
}
