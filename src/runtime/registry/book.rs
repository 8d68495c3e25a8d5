//! Registry bookkeeping.
//!
//! [`TaskBook`] is the single aggregate behind the registry lock: the running
//! map, the finished map and the completion-ordered FIFO of finished ids.
//! Keeping all three in one structure makes "remove from running, evict,
//! insert into finished" one atomic step.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use super::error::ContractViolation;
use super::task::{Task, TaskId};

pub(crate) struct TaskBook<C> {
    /// Last allocated id; ids start at 1.
    last_id: u64,
    /// Capacity of `finished`.
    max_finished: usize,
    /// Keyed by id, so iteration follows submission order.
    running: BTreeMap<TaskId, Arc<Task<C>>>,
    finished: HashMap<TaskId, Arc<Task<C>>>,
    /// Keys of `finished`, oldest completion first.
    finished_order: VecDeque<TaskId>,
}

impl<C> TaskBook<C> {
    /// Create an empty book. `max_finished` must be at least 1.
    pub(crate) fn new(max_finished: usize) -> Self {
        assert!(max_finished > 0, "finished-task capacity must be at least 1");
        Self {
            last_id: 0,
            max_finished,
            running: BTreeMap::new(),
            finished: HashMap::with_capacity(max_finished),
            finished_order: VecDeque::with_capacity(max_finished),
        }
    }

    /// Allocate the next task id.
    pub(crate) fn allocate_id(&mut self) -> TaskId {
        self.last_id += 1;
        TaskId(self.last_id)
    }

    /// Register a newly submitted task as running.
    pub(crate) fn insert_running(
        &mut self,
        task: Arc<Task<C>>,
    ) -> Result<(), ContractViolation> {
        let id = task.id();
        if self.running.contains_key(&id) || self.finished.contains_key(&id) {
            return Err(ContractViolation::DuplicateId(id));
        }
        self.running.insert(id, task);
        Ok(())
    }

    /// Remove a running task that never reached the pool.
    pub(crate) fn withdraw(
        &mut self,
        id: TaskId,
    ) -> Option<Arc<Task<C>>> {
        self.running.remove(&id)
    }

    /// Move a task from running to finished.
    ///
    /// When finished is at capacity the oldest completion is evicted first and
    /// returned.
    pub(crate) fn complete(
        &mut self,
        id: TaskId,
    ) -> Result<Option<Arc<Task<C>>>, ContractViolation> {
        let task = self
            .running
            .remove(&id)
            .ok_or(ContractViolation::NotRunning(id))?;

        let mut evicted = None;
        if self.finished.len() >= self.max_finished {
            if let Some(oldest) = self.finished_order.pop_front() {
                evicted = self.finished.remove(&oldest);
            }
        }

        self.finished.insert(id, task);
        self.finished_order.push_back(id);
        Ok(evicted)
    }

    /// All tasks: running in submission order, then finished in completion
    /// order.
    pub(crate) fn snapshot(&self) -> Vec<Arc<Task<C>>> {
        let mut tasks = Vec::with_capacity(self.running.len() + self.finished.len());
        tasks.extend(self.running.values().cloned());
        tasks.extend(
            self.finished_order
                .iter()
                .filter_map(|id| self.finished.get(id).cloned()),
        );
        tasks
    }

    pub(crate) fn get(
        &self,
        id: TaskId,
    ) -> Option<Arc<Task<C>>> {
        self.running
            .get(&id)
            .or_else(|| self.finished.get(&id))
            .cloned()
    }

    pub(crate) fn get_running(
        &self,
        id: TaskId,
    ) -> Option<Arc<Task<C>>> {
        self.running.get(&id).cloned()
    }

    #[inline]
    pub(crate) fn running_len(&self) -> usize {
        self.running.len()
    }

    #[inline]
    pub(crate) fn finished_len(&self) -> usize {
        self.finished.len()
    }

    /// Finished ids, oldest completion first.
    pub(crate) fn finished_order(&self) -> Vec<TaskId> {
        self.finished_order.iter().copied().collect()
    }

    /// Check the structural invariants; returns a description of the first
    /// one that does not hold.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) -> Result<(), String> {
        if self.finished.len() > self.max_finished {
            return Err(format!(
                "{} finished tasks exceed capacity {}",
                self.finished.len(),
                self.max_finished
            ));
        }
        if self.finished_order.len() != self.finished.len() {
            return Err(format!(
                "finished order has {} ids but finished map has {}",
                self.finished_order.len(),
                self.finished.len()
            ));
        }
        if let Some(id) = self
            .finished_order
            .iter()
            .find(|id| !self.finished.contains_key(id))
        {
            return Err(format!("finished order holds unknown id {}", id));
        }
        if let Some(id) = self.running.keys().find(|id| self.finished.contains_key(id)) {
            return Err(format!("task {} is both running and finished", id));
        }
        Ok(())
    }
}
