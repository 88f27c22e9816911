//! Core model: run queue, contention bias, per-epoch scheduling history, and
//! the owned cache + MMU through which every reference is walked.

use std::collections::VecDeque;

use crate::cache::{Cache, CacheConfig};
use crate::mmu::Mmu;
use crate::params::{MISS_PENALTY, PAGE_FAULT_PENALTY};
use crate::ram::Ram;
use crate::task::{Task, TaskId};

/// Identifies a core (0..N).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CoreId(pub usize);

/// One scheduling epoch as seen by a core: how much work and how many tasks
/// it was handed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedRecord {
    pub work: u64,
    pub ntasks: usize,
}

pub struct Core {
    id: CoreId,
    /// Maximum number of concurrently scheduled tasks.
    capacity: usize,
    /// Accumulated workload over all epochs, penalties included.
    wtotal: u64,
    /// Signed bias applied to entry moments of the next epoch.
    contention: i64,
    run_queue: VecDeque<TaskId>,
    history: Vec<SchedRecord>,

    page_hits: u64,
    page_faults: u64,
    cache_hits: u64,
    cache_misses: u64,

    cache: Cache,
    mmu: Mmu,
}

impl Core {
    pub fn new(id: CoreId, capacity: usize, cache_config: CacheConfig) -> Self {
        assert!(capacity > 0, "core capacity must be positive");
        Self {
            id,
            capacity,
            wtotal: 0,
            contention: 0,
            run_queue: VecDeque::new(),
            history: Vec::new(),
            page_hits: 0,
            page_faults: 0,
            cache_hits: 0,
            cache_misses: 0,
            cache: Cache::new(cache_config),
            mmu: Mmu::new(id),
        }
    }

    pub fn id(&self) -> CoreId {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn scheduled(&self) -> usize {
        self.run_queue.len()
    }

    pub fn has_work(&self) -> bool {
        !self.run_queue.is_empty()
    }

    /// Appends a task to the run queue.
    pub fn assign(&mut self, tid: TaskId) {
        assert!(
            self.run_queue.len() < self.capacity,
            "core {} over capacity",
            self.id.0
        );
        self.run_queue.push_back(tid);
    }

    pub fn pop_task(&mut self) -> Option<TaskId> {
        self.run_queue.pop_front()
    }

    pub fn run_queue(&self) -> &VecDeque<TaskId> {
        &self.run_queue
    }

    /// Empties the run queue. Tasks are re-homed by the processer before
    /// this is called.
    pub fn vacate(&mut self) {
        self.run_queue.clear();
    }

    pub fn set_contention(&mut self, value: i64) {
        self.contention = value;
    }

    pub fn contention(&self) -> i64 {
        self.contention
    }

    pub fn add_workload(&mut self, amount: u64) {
        self.wtotal += amount;
    }

    pub fn wtotal(&self) -> u64 {
        self.wtotal
    }

    pub fn push_history(&mut self, work: u64, ntasks: usize) {
        self.history.push(SchedRecord { work, ntasks });
    }

    pub fn history(&self) -> &[SchedRecord] {
        &self.history
    }

    pub fn page_hits(&self) -> u64 {
        self.page_hits
    }

    pub fn page_faults(&self) -> u64 {
        self.page_faults
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses
    }

    pub fn cache_mut(&mut self) -> &mut Cache {
        &mut self.cache
    }

    /// Walks one reference of `tid` through the MMU and the cache, updating
    /// task and core counters and the task's locality history. Returns the
    /// time penalty (fault and/or miss) the reference incurred.
    pub fn consume_ref(&mut self, tasks: &mut [Task], tid: TaskId, ram: &mut Ram) -> u64 {
        let pos = tasks[tid.0].memptr();
        let mut penalty = 0;

        let page_hit = self.mmu.translate(tasks, tid, pos, ram);
        if page_hit {
            tasks[tid.0].add_page_hit();
            self.page_hits += 1;
        } else {
            tasks[tid.0].add_page_fault();
            self.page_faults += 1;
            penalty += PAGE_FAULT_PENALTY;
        }

        let r = tasks[tid.0].mem_ref(pos).clone();
        tasks[tid.0].record_access(self.cache.set_index(&r), r.physical_frame());

        if self.cache.lookup(&r) {
            tasks[tid.0].add_cache_hit();
            self.cache_hits += 1;
        } else {
            tasks[tid.0].add_cache_miss();
            self.cache_misses += 1;
            penalty += MISS_PENALTY;
            self.cache.replace(&r);
        }
        penalty
    }
}
