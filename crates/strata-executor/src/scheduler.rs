//! Task-based operator execution
//!
//! Operators are wrapped in tasks with explicit predecessor edges; a
//! scheduler decides whether the ready set runs sequentially or on the
//! worker pool. The only suspension point is `schedule_and_wait`; inside an
//! operator, work is CPU-bound and does not yield.

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use strata_storage::Table;

use crate::errors::ExecutorError;
use crate::operator::OperatorRef;

/// One schedulable unit: an operator plus the indices of the tasks that must
/// finish first.
pub struct OperatorTask {
    pub operator: OperatorRef,
    pub predecessors: Vec<usize>,
}

impl OperatorTask {
    fn run(&self) -> Result<(), ExecutorError> {
        let mut operator = self.operator.lock();
        if operator.is_executed() {
            // Shared sub-plans translate to shared operators; the first task
            // wins and the rest observe the output.
            return Ok(());
        }
        operator.execute()
    }
}

/// Abstract task submission and wait primitive.
pub trait Scheduler: Send + Sync {
    /// Run `tasks` (topologically ordered, predecessor indices pointing
    /// backwards) and block until all finished or one failed.
    fn schedule_and_wait(&self, tasks: &[OperatorTask]) -> Result<(), ExecutorError>;
}

/// Executes every task inline, in submission order.
#[derive(Debug, Default)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn schedule_and_wait(&self, tasks: &[OperatorTask]) -> Result<(), ExecutorError> {
        for task in tasks {
            task.run()?;
        }
        Ok(())
    }
}

/// Runs independent tasks on the rayon pool, wave by wave: all tasks whose
/// predecessors finished form a wave and execute in parallel.
#[cfg(feature = "parallel")]
#[derive(Debug, Default)]
pub struct PoolScheduler;

#[cfg(feature = "parallel")]
impl Scheduler for PoolScheduler {
    fn schedule_and_wait(&self, tasks: &[OperatorTask]) -> Result<(), ExecutorError> {
        use rayon::prelude::*;

        let mut done = vec![false; tasks.len()];
        while done.iter().any(|finished| !finished) {
            let ready: Vec<usize> = (0..tasks.len())
                .filter(|&index| {
                    !done[index]
                        && tasks[index].predecessors.iter().all(|&previous| done[previous])
                })
                .collect();
            debug_assert!(!ready.is_empty(), "task graph contains a cycle");

            ready
                .par_iter()
                .map(|&index| tasks[index].run())
                .collect::<Result<Vec<()>, ExecutorError>>()?;
            for index in ready {
                done[index] = true;
            }
        }
        Ok(())
    }
}

/// Flatten an operator DAG into a topologically ordered task list. Shared
/// operators become a single task.
pub fn tasks_from_plan(root: &OperatorRef) -> Vec<OperatorTask> {
    let mut tasks: Vec<OperatorTask> = Vec::new();
    let mut indices: HashMap<usize, usize> = HashMap::new();
    collect_tasks(root, &mut tasks, &mut indices);
    tasks
}

fn collect_tasks(
    operator: &OperatorRef,
    tasks: &mut Vec<OperatorTask>,
    indices: &mut HashMap<usize, usize>,
) -> usize {
    let key = Arc::as_ptr(operator) as *const () as usize;
    if let Some(&index) = indices.get(&key) {
        return index;
    }
    let (left, right) = {
        let guard = operator.lock();
        (guard.input_left(), guard.input_right())
    };
    let mut predecessors = Vec::new();
    if let Some(left) = left {
        predecessors.push(collect_tasks(&left, tasks, indices));
    }
    if let Some(right) = right {
        predecessors.push(collect_tasks(&right, tasks, indices));
    }
    let index = tasks.len();
    tasks.push(OperatorTask { operator: operator.clone(), predecessors });
    indices.insert(key, index);
    index
}

/// Execute a whole operator DAG: install a shared cancellation flag, submit
/// the tasks, and return the root's output. On failure the flag is raised so
/// in-flight operators stop at their next chunk boundary.
pub fn execute_plan(
    root: &OperatorRef,
    scheduler: &dyn Scheduler,
) -> Result<Arc<Table>, ExecutorError> {
    crate::profile!("execute_plan");
    let tasks = tasks_from_plan(root);
    let cancellation_flag = Arc::new(AtomicBool::new(false));
    for task in &tasks {
        task.operator.lock().set_cancellation_flag(cancellation_flag.clone());
    }

    let result = scheduler.schedule_and_wait(&tasks);
    if result.is_err() {
        cancellation_flag.store(true, std::sync::atomic::Ordering::Relaxed);
    }
    result?;
    root.lock().get_output()
}

/// Execute a DAG with the default scheduler choice for this build.
pub fn execute_plan_default(root: &OperatorRef) -> Result<Arc<Table>, ExecutorError> {
    #[cfg(feature = "parallel")]
    let scheduler: &dyn Scheduler = &PoolScheduler;
    #[cfg(not(feature = "parallel"))]
    let scheduler: &dyn Scheduler = &ImmediateScheduler;
    execute_plan(root, scheduler)
}
