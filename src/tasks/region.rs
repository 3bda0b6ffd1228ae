use std::ops::{Index, IndexMut};
use std::time::Instant;
use log::{error, warn};
use super::{new_registry, DriverStatus, SharedRegistry, Sweep, TaskList, TaskListStatus};




/// A fixed number of task lists that are logically independent, indexed by
/// partition. Lists are swept round-robin: each pass sweeps every unfinished
/// list once, so a list whose next task is waiting on a message never holds
/// up the others. Lists may still depend on each other through shared
/// [`super::TaskID`] tokens.
pub struct TaskRegion<'a> {
    lists: Vec<TaskList<'a>>,
    registry: SharedRegistry,
    index: usize,
}

impl<'a> TaskRegion<'a> {
    /// Create a stand-alone region of `size` lists.
    pub fn new(size: usize) -> Self {
        Self::with_registry(new_registry(), 0, size)
    }

    pub(crate) fn with_registry(registry: SharedRegistry, index: usize, size: usize) -> Self {
        let lists = (0..size)
            .map(|n| TaskList::with_registry(registry.clone(), index, n))
            .collect();
        Self { lists, registry, index }
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TaskList<'a>> {
        self.lists.iter_mut()
    }

    /// Execute the region until every list completes or one fails.
    pub fn execute(&mut self) -> DriverStatus {
        self.execute_until(None)
    }

    /// Like `execute`, but gives up with `Timeout` if the deadline passes
    /// between two passes.
    pub fn execute_until(&mut self, deadline: Option<Instant>) -> DriverStatus {
        loop {
            let pass = self.pass();

            match pass.status {
                TaskListStatus::Complete => return DriverStatus::Complete,
                TaskListStatus::Fail => return DriverStatus::Failed,
                TaskListStatus::Running if pass.invoked == 0 => {
                    let message = format!("deadlock: no runnable task in region {}", self.index);
                    error!("{}", message);
                    self.registry.borrow_mut().failure.get_or_insert(message);
                    return DriverStatus::Failed;
                }
                TaskListStatus::Running => {
                    if deadline.map_or(false, |d| Instant::now() >= d) {
                        warn!("region {} timed out", self.index);
                        return DriverStatus::Timeout;
                    }
                }
            }
        }
    }

    /// Sweep each unfinished list once.
    pub(crate) fn pass(&mut self) -> Sweep {
        let mut invoked = 0;
        let mut complete = true;

        for list in self.lists.iter_mut().filter(|l| !l.is_complete()) {
            let sweep = list.sweep();
            invoked += sweep.invoked;

            match sweep.status {
                TaskListStatus::Fail => {
                    return Sweep { status: TaskListStatus::Fail, invoked };
                }
                TaskListStatus::Running => complete = false,
                TaskListStatus::Complete => {}
            }
        }

        let status = if complete {
            TaskListStatus::Complete
        } else {
            TaskListStatus::Running
        };
        Sweep { status, invoked }
    }
}

impl<'a> Index<usize> for TaskRegion<'a> {
    type Output = TaskList<'a>;

    fn index(&self, n: usize) -> &TaskList<'a> {
        &self.lists[n]
    }
}

impl<'a> IndexMut<usize> for TaskRegion<'a> {
    fn index_mut(&mut self, n: usize) -> &mut TaskList<'a> {
        &mut self.lists[n]
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use std::cell::Cell;
    use crate::tasks::{TaskID, TaskStatus};
    use super::*;

    #[test]
    fn polling_list_does_not_block_the_others() {
        let polls = Cell::new(0);
        let done = [Cell::new(0), Cell::new(0), Cell::new(0)];
        let done = &done;
        let mut region = TaskRegion::new(3);

        for n in [0, 2].iter().copied() {
            let a = region[n].add_task(TaskID::none(), move || { done[n].set(done[n].get() + 1); TaskStatus::Complete }).unwrap();
            region[n].add_task(a, move || { done[n].set(done[n].get() + 1); TaskStatus::Complete }).unwrap();
        }
        let first = region[1].add_task(TaskID::none(), || {
            polls.set(polls.get() + 1);
            if polls.get() <= 2 { TaskStatus::Incomplete } else { TaskStatus::Complete }
        }).unwrap();
        region[1].add_task(first, || { done[1].set(1); TaskStatus::Complete }).unwrap();

        assert_eq!(region.pass().status, TaskListStatus::Running);
        assert_eq!(done[0].get(), 2);
        assert_eq!(done[2].get(), 2);
        assert_eq!(done[1].get(), 0);
        assert_eq!(region.pass().status, TaskListStatus::Running);
        assert_eq!(region.execute(), DriverStatus::Complete);
        assert_eq!(polls.get(), 3);
        assert_eq!(done[1].get(), 1);
    }

    #[test]
    fn cross_list_dependency_is_honored() {
        let order = std::cell::RefCell::new(Vec::new());
        let mut region = TaskRegion::new(2);
        let armed = region[0].add_task(TaskID::none(), || { order.borrow_mut().push("arm"); TaskStatus::Complete }).unwrap();
        region[1].add_task(armed, || { order.borrow_mut().push("send"); TaskStatus::Complete }).unwrap();
        assert_eq!(region.execute(), DriverStatus::Complete);
        assert_eq!(*order.borrow(), vec!["arm", "send"]);
    }

    #[test]
    fn endless_polling_times_out() {
        let mut region = TaskRegion::new(2);
        region[0].add_task(TaskID::none(), || TaskStatus::Complete).unwrap();
        region[1].add_task(TaskID::none(), || TaskStatus::Incomplete).unwrap();
        assert_eq!(region.execute_until(Some(Instant::now())), DriverStatus::Timeout);
        assert!(region[0].is_complete());
        assert!(!region[1].is_complete());
    }
}
