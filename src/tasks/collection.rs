use std::ops::{Index, IndexMut};
use std::time::{Duration, Instant};
use log::debug;
use super::{new_registry, DriverStatus, SharedRegistry, TaskRegion};




/// The full schedule of one stage: an ordered sequence of regions. Region
/// `n + 1` starts only after every list of region `n` has completed. All
/// tasks of the collection share one numbering, so a token from an earlier
/// region can be used as a prerequisite in a later one.
pub struct TaskCollection<'a> {
    registry: SharedRegistry,
    regions: Vec<TaskRegion<'a>>,
    timeout: Option<Duration>,
}

impl<'a> TaskCollection<'a> {
    pub fn new() -> Self {
        Self {
            registry: new_registry(),
            regions: Vec::new(),
            timeout: None,
        }
    }

    /// Append a region of `size` independent lists and return it.
    pub fn add_region(&mut self, size: usize) -> &mut TaskRegion<'a> {
        let index = self.regions.len();
        self.regions.push(TaskRegion::with_registry(self.registry.clone(), index, size));
        &mut self.regions[index]
    }

    pub fn num_regions(&self) -> usize {
        self.regions.len()
    }

    /// Give up with `DriverStatus::Timeout` if execution takes longer than
    /// `timeout`.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    /// Execute every region in order. Stops at the first region that fails
    /// or times out.
    pub fn execute(&mut self) -> DriverStatus {
        let deadline = self.timeout.map(|t| Instant::now() + t);
        let num_regions = self.regions.len();

        for (n, region) in self.regions.iter_mut().enumerate() {
            let status = region.execute_until(deadline);
            debug!("region {} of {}: {:?}", n, num_regions, status);

            if status != DriverStatus::Complete {
                return status;
            }
        }
        DriverStatus::Complete
    }

    /// Return a description of the first task that failed, if any.
    pub fn failure(&self) -> Option<String> {
        self.registry.borrow().failure.clone()
    }
}

impl<'a> Default for TaskCollection<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Index<usize> for TaskCollection<'a> {
    type Output = TaskRegion<'a>;

    fn index(&self, n: usize) -> &TaskRegion<'a> {
        &self.regions[n]
    }
}

impl<'a> IndexMut<usize> for TaskCollection<'a> {
    fn index_mut(&mut self, n: usize) -> &mut TaskRegion<'a> {
        &mut self.regions[n]
    }
}




// ============================================================================
#[cfg(test)]
mod test {

    use std::cell::{Cell, RefCell};
    use crate::error::Error;
    use crate::tasks::{TaskID, TaskStatus};
    use super::*;

    #[test]
    fn regions_run_in_order() {
        let order = RefCell::new(Vec::new());
        let mut tc = TaskCollection::new();
        {
            let first = tc.add_region(2);
            for n in 0..2 {
                let order = &order;
                first[n].add_task(TaskID::none(), move || { order.borrow_mut().push(n); TaskStatus::Complete }).unwrap();
            }
        }
        {
            let second = tc.add_region(1);
            second[0].add_task(TaskID::none(), || { order.borrow_mut().push(10); TaskStatus::Complete }).unwrap();
        }
        assert_eq!(tc.execute(), DriverStatus::Complete);
        assert_eq!(*order.borrow(), vec![0, 1, 10]);
    }

    #[test]
    fn failure_short_circuits_later_regions() {
        let ran = Cell::new(false);
        let mut tc = TaskCollection::new();
        tc.add_region(1)[0].add_named_task("bad", TaskID::none(), || TaskStatus::Fail).unwrap();
        tc.add_region(1)[0].add_task(TaskID::none(), || { ran.set(true); TaskStatus::Complete }).unwrap();
        assert_eq!(tc.execute(), DriverStatus::Failed);
        assert!(!ran.get());
        assert_eq!(tc.failure().unwrap(), "task 'bad' (region 0, list 0) failed");
    }

    #[test]
    fn token_may_span_regions() {
        let mut tc = TaskCollection::new();
        let early = tc.add_region(1)[0].add_task(TaskID::none(), || TaskStatus::Complete).unwrap();
        let late = tc.add_region(1)[0].add_task(early, || TaskStatus::Complete);
        assert!(late.is_ok());
        assert_eq!(tc.execute(), DriverStatus::Complete);
    }

    #[test]
    fn token_from_a_later_region_is_rejected() {
        let mut tc = TaskCollection::new();
        tc.add_region(1);
        let late = tc.add_region(1)[0].add_task(TaskID::none(), || TaskStatus::Complete).unwrap();
        let early = tc[0][0].add_task(late, || TaskStatus::Complete);
        assert!(matches!(early, Err(Error::Dependency(_))));
    }

    #[test]
    fn iterative_region_fails_at_the_cap() {
        let mut tc = TaskCollection::new();
        {
            let region = tc.add_region(1);
            let mut solver = region[0].add_iteration();
            let update = solver.add_task(TaskID::none(), || TaskStatus::Complete).unwrap();
            solver.add_completion_task(update, || TaskStatus::Iterate).unwrap();
            solver.set_max_iterations(5);
            solver.set_fail_with_max_iterations(true);
        }
        assert_eq!(tc.execute(), DriverStatus::Failed);
        assert!(tc.failure().unwrap().contains("maximum of 5 iterations"));
    }
}
