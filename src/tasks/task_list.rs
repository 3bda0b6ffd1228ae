use log::{debug, error, warn};
use crate::error::{Error, Result};
use super::{new_registry, Owner, SharedRegistry, Sweep, TaskID, TaskListStatus, TaskStatus, TaskType};




struct Task<'a> {
    id: TaskID,
    dep: TaskID,
    kind: TaskType,
    key: Option<usize>,
    label: String,
    func: Box<dyn FnMut() -> TaskStatus + 'a>,
    done: bool,
}

struct Iteration {
    max_iterations: Option<usize>,
    fail_with_max: bool,
    warn_with_max: bool,
    count: usize,
}




/// An ordered stream of tasks, e.g. all the work of one mesh partition in
/// one stage. Tasks run in program order once their prerequisites are
/// satisfied. A task can only depend on tasks added before it, so the list
/// is acyclic by construction.
///
/// A list may contain iterative sub-lists (see [`TaskList::add_iteration`]),
/// which are swept repeatedly until their completion task reports
/// `Complete` or their iteration cap is reached.
pub struct TaskList<'a> {
    registry: SharedRegistry,
    region: usize,
    index: usize,
    tasks: Vec<Task<'a>>,
    iterations: Vec<Iteration>,
}

impl<'a> TaskList<'a> {
    /// Create a stand-alone list with its own task numbering.
    pub fn new() -> Self {
        Self::with_registry(new_registry(), 0, 0)
    }

    pub(crate) fn with_registry(registry: SharedRegistry, region: usize, index: usize) -> Self {
        Self {
            registry,
            region,
            index,
            tasks: Vec::new(),
            iterations: Vec::new(),
        }
    }

    /// Add a task which may run once every task in `dep` has completed, and
    /// return its token. Returns an error if `dep` names a task that has not
    /// been added yet, or one that belongs to a later region.
    pub fn add_task<F>(&mut self, dep: TaskID, func: F) -> Result<TaskID>
    where
        F: FnMut() -> TaskStatus + 'a,
    {
        self.add(None, dep, TaskType::Single, None, Box::new(func))
    }

    /// Like `add_task`, with a label used in failure reports and logs.
    pub fn add_named_task<F>(&mut self, label: &str, dep: TaskID, func: F) -> Result<TaskID>
    where
        F: FnMut() -> TaskStatus + 'a,
    {
        self.add(Some(label.to_string()), dep, TaskType::Single, None, Box::new(func))
    }

    /// Open a new iterative sub-list and return a handle for adding tasks to
    /// it. By default an iteration is unbounded and warns when a cap set
    /// later is reached.
    pub fn add_iteration(&mut self) -> IterativeTasks<'_, 'a> {
        let key = self.iterations.len();
        self.iterations.push(Iteration {
            max_iterations: None,
            fail_with_max: false,
            warn_with_max: true,
            count: 0,
        });
        IterativeTasks { list: self, key }
    }

    /// Return a handle to an iterative sub-list opened earlier.
    pub fn iteration(&mut self, key: usize) -> Option<IterativeTasks<'_, 'a>> {
        if key < self.iterations.len() {
            Some(IterativeTasks { list: self, key })
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.tasks.iter().all(|t| t.done)
    }

    /// Run every task whose prerequisites are satisfied, once, in program
    /// order.
    pub fn do_available(&mut self) -> TaskListStatus {
        self.sweep().status
    }

    /// Sweep the list until it completes or fails. A sweep that finds no
    /// runnable task while tasks remain is a deadlock, reported as failure.
    pub fn execute(&mut self) -> TaskListStatus {
        loop {
            let sweep = self.sweep();

            match sweep.status {
                TaskListStatus::Running if sweep.invoked == 0 => {
                    self.record_failure(format!(
                        "deadlock: no runnable task in list {} of region {}",
                        self.index, self.region));
                    return TaskListStatus::Fail;
                }
                TaskListStatus::Running => continue,
                status => return status,
            }
        }
    }

    /// Return the first failure recorded in this list's registry.
    pub fn failure(&self) -> Option<String> {
        self.registry.borrow().failure.clone()
    }

    pub(crate) fn sweep(&mut self) -> Sweep {
        let mut invoked = 0;

        for n in 0..self.tasks.len() {
            if self.tasks[n].done {
                continue;
            }
            if !self.tasks[n].dep.is_satisfied_by(&self.registry.borrow().completed) {
                continue;
            }
            invoked += 1;

            let status = (self.tasks[n].func)();

            match (self.tasks[n].kind, status) {
                (_, TaskStatus::Incomplete) => {}
                (_, TaskStatus::Complete) => self.mark_done(n),
                (_, TaskStatus::Fail) => {
                    self.record_failure(format!("{} failed", self.describe(n)));
                    return Sweep { status: TaskListStatus::Fail, invoked };
                }
                (TaskType::CompletionCriteria, TaskStatus::Iterate) => {
                    if !self.next_iteration(n) {
                        return Sweep { status: TaskListStatus::Fail, invoked };
                    }
                }
                (_, TaskStatus::Iterate) => {
                    self.record_failure(format!("{} requested iteration outside an iterative region", self.describe(n)));
                    return Sweep { status: TaskListStatus::Fail, invoked };
                }
            }
        }

        let status = if self.is_complete() {
            TaskListStatus::Complete
        } else {
            TaskListStatus::Running
        };
        Sweep { status, invoked }
    }

    fn add(
        &mut self,
        label: Option<String>,
        dep: TaskID,
        kind: TaskType,
        key: Option<usize>,
        func: Box<dyn FnMut() -> TaskStatus + 'a>,
    ) -> Result<TaskID> {
        let mut registry = self.registry.borrow_mut();
        let number = registry.owners.len();

        if let Some(highest) = dep.highest() {
            if highest >= number {
                return Err(Error::Dependency(format!(
                    "prerequisite names task {}, which has not been added (next task is {})",
                    highest, number)));
            }
        }
        if let Some(t) = dep.iter().find(|t| registry.owners[*t].region > self.region) {
            return Err(Error::Dependency(format!(
                "prerequisite names task {} of region {}, which runs after region {}",
                t, registry.owners[t].region, self.region)));
        }
        registry.owners.push(Owner {
            region: self.region,
            list: self.index,
        });

        let id = TaskID::single(number);
        self.tasks.push(Task {
            id: id.clone(),
            dep,
            kind,
            key,
            label: label.unwrap_or_else(|| format!("task {}", number)),
            func,
            done: false,
        });
        Ok(id)
    }

    fn mark_done(&mut self, n: usize) {
        self.tasks[n].done = true;
        self.registry.borrow_mut().completed.insert(&self.tasks[n].id);
    }

    /// Handle an `Iterate` from the completion task at `n`. Returns false if
    /// the iteration cap was reached under the fail policy.
    fn next_iteration(&mut self, n: usize) -> bool {
        let key = match self.tasks[n].key {
            Some(key) => key,
            None => return false,
        };
        let count = {
            let iteration = &mut self.iterations[key];
            iteration.count += 1;
            iteration.count
        };
        let Iteration { max_iterations, fail_with_max, warn_with_max, .. } = self.iterations[key];

        if let Some(max) = max_iterations {
            if count >= max {
                if fail_with_max {
                    self.record_failure(format!(
                        "{} reached the maximum of {} iterations",
                        self.describe(n), max));
                    return false;
                }
                if warn_with_max {
                    warn!("{} reached the maximum of {} iterations, continuing", self.describe(n), max);
                }
                self.mark_done(n);
                return true;
            }
        }
        debug!("iteration {} of list {}: starting sweep {}", key, self.index, count + 1);

        let mut registry = self.registry.borrow_mut();

        for task in self.tasks.iter_mut().filter(|t| t.key == Some(key)) {
            task.done = false;
            registry.completed.remove(&task.id);
        }
        true
    }

    fn describe(&self, n: usize) -> String {
        format!("task '{}' (region {}, list {})", self.tasks[n].label, self.region, self.index)
    }

    fn record_failure(&self, message: String) {
        error!("{}", message);
        self.registry.borrow_mut().failure.get_or_insert(message);
    }
}

impl<'a> Default for TaskList<'a> {
    fn default() -> Self {
        Self::new()
    }
}




/// Handle to an iterative sub-list of a [`TaskList`]. Tasks added through
/// it are reset and run again each time its completion task returns
/// `Iterate`.
pub struct IterativeTasks<'l, 'a> {
    list: &'l mut TaskList<'a>,
    key: usize,
}

impl<'l, 'a> IterativeTasks<'l, 'a> {
    pub fn key(&self) -> usize {
        self.key
    }

    pub fn add_task<F>(&mut self, dep: TaskID, func: F) -> Result<TaskID>
    where
        F: FnMut() -> TaskStatus + 'a,
    {
        self.list.add(None, dep, TaskType::Iterative, Some(self.key), Box::new(func))
    }

    pub fn add_named_task<F>(&mut self, label: &str, dep: TaskID, func: F) -> Result<TaskID>
    where
        F: FnMut() -> TaskStatus + 'a,
    {
        self.list.add(Some(label.to_string()), dep, TaskType::Iterative, Some(self.key), Box::new(func))
    }

    /// Add the task deciding whether the iteration has converged. It should
    /// return `Complete` to end the iteration, `Iterate` to sweep again, or
    /// `Incomplete` if it cannot decide yet.
    pub fn add_completion_task<F>(&mut self, dep: TaskID, func: F) -> Result<TaskID>
    where
        F: FnMut() -> TaskStatus + 'a,
    {
        self.list.add(None, dep, TaskType::CompletionCriteria, Some(self.key), Box::new(func))
    }

    /// Cap the number of sweeps. Zero removes the cap.
    pub fn set_max_iterations(&mut self, max: usize) {
        self.list.iterations[self.key].max_iterations = if max == 0 { None } else { Some(max) };
    }

    /// Fail the list when the cap is reached. Takes precedence over the
    /// warn policy.
    pub fn set_fail_with_max_iterations(&mut self, flag: bool) {
        self.list.iterations[self.key].fail_with_max = flag;
    }

    /// Log a warning when the cap is reached and continue with the last
    /// iterate. With neither policy set the iteration stops silently.
    pub fn set_warn_with_max_iterations(&mut self, flag: bool) {
        self.list.iterations[self.key].warn_with_max = flag;
    }
}
