//! A dependency-driven task scheduler for the per-stage work of a mesh
//! partition. A [`TaskCollection`] is an ordered sequence of
//! [`TaskRegion`]s; each region holds independent [`TaskList`]s (typically
//! one per mesh partition) that are swept round-robin until every list
//! completes. Tasks are closures returning a [`TaskStatus`]. A task that
//! returns `Incomplete` (e.g. a receive whose message has not arrived) is
//! simply revisited on the next sweep, so the scheduler never blocks.
//!
//! Every task registered in the same collection draws its number from a
//! shared registry, so a [`TaskID`] from one list can be used as a
//! prerequisite in another list or a later region.

use std::cell::RefCell;
use std::rc::Rc;

mod collection;
mod region;
mod task_id;
mod task_list;

pub use collection::TaskCollection;
pub use region::TaskRegion;
pub use task_id::TaskID;
pub use task_list::{IterativeTasks, TaskList};




/// Returned by a task closure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskStatus {
    /// The task failed; the enclosing list stops and reports failure.
    Fail,
    /// The task is done and its dependents may run.
    Complete,
    /// The task could not finish yet and must be invoked again later.
    Incomplete,
    /// Returned by a completion task to request another sweep of its
    /// iterative region.
    Iterate,
}

/// Result of sweeping a task list once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskListStatus {
    Running,
    Complete,
    Fail,
}

/// Overall result of executing a region, a collection, or a driver step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverStatus {
    Complete,
    Failed,
    Timeout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TaskType {
    Single,
    Iterative,
    CompletionCriteria,
}




#[derive(Clone, Copy, Debug)]
pub(crate) struct Owner {
    pub region: usize,
    pub list: usize,
}

/// Task numbering and completion state shared by every list of a
/// collection.
#[derive(Default)]
pub(crate) struct Registry {
    pub owners: Vec<Owner>,
    pub completed: TaskID,
    pub failure: Option<String>,
}

pub(crate) type SharedRegistry = Rc<RefCell<Registry>>;

pub(crate) fn new_registry() -> SharedRegistry {
    Rc::new(RefCell::new(Registry::default()))
}

/// Outcome of one pass over a list or region: the resulting status, and
/// the number of task closures invoked. A pass that invokes nothing while
/// work remains can never make progress.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Sweep {
    pub status: TaskListStatus,
    pub invoked: usize,
}
