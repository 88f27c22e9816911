//! Workload: master task arena, pre-arrival queue, per-core bucket queues,
//! sorting, and the text file format.

use std::collections::VecDeque;
use std::io::{Read, Write};

use rand::seq::SliceRandom;
use rand::Rng;

use crate::error::{Result, SimError};
use crate::task::{Task, TaskId};

/// Orderings the workload supports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sorting {
    /// Ascending total work.
    WorkAscending,
    /// Descending total work.
    WorkDescending,
    /// Ascending arrival time.
    Arrival,
    /// Ascending remaining work, applied to each bucket independently.
    RemainingWork,
}

/// Owns every task of the simulation (keyed by stable id) plus the queues
/// they travel through: the arrival-sorted pre-arrival queue, `ncores + 2`
/// buckets (per-core, orphan, waiting), and the finished list.
pub struct Workload {
    tasks: Vec<Task>,
    pending: VecDeque<TaskId>,
    buckets: Vec<VecDeque<TaskId>>,
    finished: Vec<TaskId>,
    ncores: usize,
}

impl Workload {
    pub fn new(ncores: usize) -> Self {
        assert!(ncores > 0, "workload needs at least one core bucket");
        Self {
            tasks: Vec::new(),
            pending: VecDeque::new(),
            buckets: (0..ncores + 2).map(|_| VecDeque::new()).collect(),
            finished: Vec::new(),
            ncores,
        }
    }

    /// Index of the orphan bucket (processed, awaiting regrouping).
    pub fn orphan(&self) -> usize {
        self.ncores
    }

    /// Index of the waiting bucket (arrived, never processed).
    pub fn waiting(&self) -> usize {
        self.ncores + 1
    }

    pub fn ncores(&self) -> usize {
        self.ncores
    }

    pub fn ntasks(&self) -> usize {
        self.tasks.len()
    }

    /// Creates a task and places it on the pre-arrival queue.
    pub fn push_task(&mut self, real_id: u64, work: u64, arrival: u64, addrs: &[u64]) -> TaskId {
        let id = TaskId(self.tasks.len());
        self.tasks.push(Task::new(id, real_id, work, arrival, addrs));
        self.pending.push_back(id);
        id
    }

    pub fn task(&self, tid: TaskId) -> &Task {
        &self.tasks[tid.0]
    }

    pub fn task_mut(&mut self, tid: TaskId) -> &mut Task {
        &mut self.tasks[tid.0]
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn tasks_mut(&mut self) -> &mut [Task] {
        &mut self.tasks
    }

    pub fn bucket(&self, idx: usize) -> &VecDeque<TaskId> {
        &self.buckets[idx]
    }

    pub fn bucket_len(&self, idx: usize) -> usize {
        self.buckets[idx].len()
    }

    pub fn push_bucket(&mut self, idx: usize, tid: TaskId) {
        debug_assert!(!self.task(tid).is_finished(), "finished task in bucket");
        self.buckets[idx].push_back(tid);
    }

    pub fn pop_bucket(&mut self, idx: usize) -> Option<TaskId> {
        self.buckets[idx].pop_front()
    }

    pub fn finish(&mut self, tid: TaskId) {
        debug_assert!(self.task(tid).is_finished());
        self.finished.push(tid);
    }

    pub fn finished(&self) -> &[TaskId] {
        &self.finished
    }

    /// Tasks left anywhere but the finished queue (cores excluded; the
    /// processer re-homes tasks before the driver looks again).
    pub fn remaining(&self) -> usize {
        self.pending.len() + self.current()
    }

    /// Tasks currently sitting in buckets.
    pub fn current(&self) -> usize {
        self.buckets.iter().map(|b| b.len()).sum()
    }

    /// Moves every task with `arrival <= now` from the pre-arrival queue to
    /// the waiting bucket. The queue is arrival-sorted, so this stops at the
    /// first task still in the future. Tasks that carry no work (possible
    /// after a kernel rescale) go straight to the finished queue.
    pub fn admit_arrivals(&mut self, now: u64) {
        while let Some(&tid) = self.pending.front() {
            if self.tasks[tid.0].arrival() > now {
                break;
            }
            self.pending.pop_front();
            if self.tasks[tid.0].is_finished() {
                self.finished.push(tid);
            } else {
                self.buckets[self.ncores + 1].push_back(tid);
            }
        }
    }

    /// Applies a work-rescaling kernel to every task.
    pub fn apply_kernel(&mut self, kernel: impl Fn(u64) -> u64) {
        for task in &mut self.tasks {
            let scaled = kernel(task.work());
            task.set_work(scaled);
        }
    }

    pub fn sort(&mut self, sorting: Sorting) {
        match sorting {
            Sorting::WorkAscending => {
                let tasks = &self.tasks;
                self.pending
                    .make_contiguous()
                    .sort_by_key(|&tid| (tasks[tid.0].work(), tid));
            }
            Sorting::WorkDescending => {
                let tasks = &self.tasks;
                self.pending
                    .make_contiguous()
                    .sort_by_key(|&tid| (std::cmp::Reverse(tasks[tid.0].work()), tid));
            }
            Sorting::Arrival => {
                let tasks = &self.tasks;
                self.pending
                    .make_contiguous()
                    .sort_by_key(|&tid| (tasks[tid.0].arrival(), tid));
            }
            Sorting::RemainingWork => {
                for idx in 0..self.buckets.len() {
                    self.sort_bucket_by_remaining(idx);
                }
            }
        }
    }

    /// Ascending remaining work, task id as the tie-breaker.
    pub fn sort_bucket_by_remaining(&mut self, idx: usize) {
        let tasks = &self.tasks;
        self.buckets[idx]
            .make_contiguous()
            .sort_by_key(|&tid| (tasks[tid.0].work_left(), tid));
    }

    /// Fisher–Yates shuffle of the pre-arrival queue through the shared RNG.
    pub fn shuffle(&mut self, rng: &mut impl Rng) {
        self.pending.make_contiguous().shuffle(rng);
    }

    /// Reads the text format: `ntasks`, then per task
    /// `real_id work arrival addr_0 … addr_{work-1}`.
    pub fn from_text<R: Read>(mut reader: R, ncores: usize) -> Result<Self> {
        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .map_err(|e| SimError::MalformedWorkload(format!("unreadable input: {e}")))?;
        let mut tokens = content.split_ascii_whitespace();

        let mut next = |what: &str| -> Result<u64> {
            let tok = tokens
                .next()
                .ok_or_else(|| SimError::MalformedWorkload(format!("missing {what}")))?;
            tok.parse::<u64>()
                .map_err(|_| SimError::MalformedWorkload(format!("bad {what}: {tok:?}")))
        };

        let ntasks = next("task count")?;
        let mut w = Self::new(ncores);
        for i in 0..ntasks {
            let real_id = next(&format!("real id of task {i}"))?;
            let work = next(&format!("work of task {i}"))?;
            let arrival = next(&format!("arrival of task {i}"))?;
            let mut addrs = Vec::with_capacity(work as usize);
            for j in 0..work {
                addrs.push(next(&format!("address {j} of task {i}"))?);
            }
            w.push_task(real_id, work, arrival, &addrs);
        }
        Ok(w)
    }

    /// Writes the text format back out, addresses verbatim.
    pub fn write_text<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        writeln!(writer, "{}", self.tasks.len())?;
        for task in &self.tasks {
            write!(
                writer,
                "{} {} {}",
                task.real_id(),
                task.work(),
                task.arrival()
            )?;
            for r in task.memacc() {
                write!(writer, " {}", r.address())?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}
