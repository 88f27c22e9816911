//! Task entity: work counters, memory-reference stream, paging state, and
//! the per-reference locality history consumed by the groupers.

use crate::core::CoreId;
use crate::mem::{MemRef, PageTable};
use crate::params::PAGE_SIZE;

/// Stable task identity, also the index into the workload's task arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub usize);

/// One entry of the per-reference history: the cache set and the physical
/// page a walked reference touched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessRecord {
    pub set: usize,
    pub page: u64,
}

/// A schedulable unit of work. One cycle of work corresponds to one memory
/// reference of the stream.
#[derive(Debug)]
pub struct Task {
    id: TaskId,
    real_id: u64,
    arrival: u64,
    work: u64,
    processed: u64,
    waiting: u64,
    /// Moment (relative to arrival) the task last entered a core.
    last_entry: u64,
    /// Moment (relative to arrival) the task last left a core.
    last_exit: u64,
    /// Core the task is bound to under sticky scheduling.
    assigned_core: Option<CoreId>,

    page_hits: u64,
    page_faults: u64,
    cache_hits: u64,
    cache_misses: u64,

    memacc: Vec<MemRef>,
    /// Cursor into `memacc`: references before it have been walked.
    memptr: usize,
    history: Vec<AccessRecord>,
    page_table: PageTable,
}

impl Task {
    /// Builds a task from its workload-file description. The page table
    /// covers every page the stream can touch.
    pub fn new(id: TaskId, real_id: u64, work: u64, arrival: u64, addrs: &[u64]) -> Self {
        let memacc: Vec<MemRef> = addrs.iter().map(|&a| MemRef::new(a)).collect();
        let max_page = memacc.iter().map(|r| r.virtual_page()).max().unwrap_or(0);
        let num_lines = ((work / PAGE_SIZE + 1) as usize).max(max_page as usize + 1);
        Self {
            id,
            real_id,
            arrival,
            work,
            processed: 0,
            waiting: 0,
            last_entry: 0,
            last_exit: 0,
            assigned_core: None,
            page_hits: 0,
            page_faults: 0,
            cache_hits: 0,
            cache_misses: 0,
            history: Vec::with_capacity(memacc.len()),
            memacc,
            memptr: 0,
            page_table: PageTable::new(num_lines),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn real_id(&self) -> u64 {
        self.real_id
    }

    pub fn arrival(&self) -> u64 {
        self.arrival
    }

    pub fn work(&self) -> u64 {
        self.work
    }

    /// Rescales the total work. Used by the workload kernels; the memory
    /// stream keeps its recorded length.
    pub fn set_work(&mut self, work: u64) {
        self.work = work;
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn work_left(&self) -> u64 {
        self.work - self.processed
    }

    pub fn is_finished(&self) -> bool {
        self.work_left() == 0
    }

    pub fn waiting(&self) -> u64 {
        self.waiting
    }

    pub fn add_processed(&mut self, amount: u64) {
        self.processed += amount;
        debug_assert!(self.processed <= self.work);
    }

    /// Marks a (re-)entry into a core at `moment` (relative to arrival).
    /// Waiting time grows by the idle gap since the task last left a core.
    pub fn enter(&mut self, moment: u64) {
        self.waiting += moment.saturating_sub(self.last_exit);
        self.last_entry = moment;
    }

    /// Marks the task leaving a core at `moment` (relative to arrival).
    pub fn leave(&mut self, moment: u64) {
        self.last_exit = moment;
    }

    pub fn last_entry(&self) -> u64 {
        self.last_entry
    }

    pub fn last_exit(&self) -> u64 {
        self.last_exit
    }

    pub fn assigned_core(&self) -> Option<CoreId> {
        self.assigned_core
    }

    pub fn assign_core(&mut self, core: CoreId) {
        self.assigned_core = Some(core);
    }

    pub fn memacc(&self) -> &[MemRef] {
        &self.memacc
    }

    pub fn memptr(&self) -> usize {
        self.memptr
    }

    /// References still available for walking. The stream can be shorter
    /// than `work_left` when a kernel rescaled the workload.
    pub fn refs_left(&self) -> usize {
        self.memacc.len() - self.memptr
    }

    pub fn mem_ref(&self, pos: usize) -> &MemRef {
        &self.memacc[pos]
    }

    pub fn resolve_ref(&mut self, pos: usize, frame: u64) {
        self.memacc[pos].resolve(frame);
    }

    /// Appends one walked reference to the locality history and advances the
    /// cursor.
    pub fn record_access(&mut self, set: usize, page: u64) {
        self.history.push(AccessRecord { set, page });
        self.memptr += 1;
    }

    pub fn history(&self) -> &[AccessRecord] {
        &self.history
    }

    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    pub fn page_table_mut(&mut self) -> &mut PageTable {
        &mut self.page_table
    }

    pub fn add_page_hit(&mut self) {
        self.page_hits += 1;
    }

    pub fn add_page_fault(&mut self) {
        self.page_faults += 1;
    }

    pub fn add_cache_hit(&mut self) {
        self.cache_hits += 1;
    }

    pub fn add_cache_miss(&mut self) {
        self.cache_misses += 1;
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

    /// The last-`winsize` cache-set indices of the walked history, clamped
    /// to what has actually been walked.
    pub fn fingerprint(&self, winsize: usize) -> Vec<u32> {
        let len = self.history.len();
        let start = len.saturating_sub(winsize);
        self.history[start..].iter().map(|a| a.set as u32).collect()
    }

    /// Fraction of repeated sets within the last-`winsize` fingerprint.
    pub fn hotness(&self, winsize: usize) -> f64 {
        let window = self.fingerprint(winsize);
        if window.is_empty() {
            return 0.0;
        }
        let mut distinct: Vec<u32> = window.clone();
        distinct.sort_unstable();
        distinct.dedup();
        (window.len() - distinct.len()) as f64 / window.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with_history(sets: &[usize]) -> Task {
        let addrs: Vec<u64> = sets.iter().map(|&s| s as u64).collect();
        let mut t = Task::new(TaskId(0), 0, addrs.len() as u64, 0, &addrs);
        for &s in sets {
            t.record_access(s, 0);
        }
        t
    }

    #[test]
    fn work_accounting() {
        let mut t = Task::new(TaskId(3), 7, 10, 2, &[0; 10]);
        assert_eq!(t.work_left(), 10);
        t.add_processed(4);
        assert_eq!(t.processed(), 4);
        assert_eq!(t.work_left(), 6);
        assert!(!t.is_finished());
        t.add_processed(6);
        assert!(t.is_finished());
    }

    #[test]
    fn waiting_grows_by_idle_gaps() {
        let mut t = Task::new(TaskId(0), 0, 10, 0, &[0; 10]);
        t.enter(5);
        assert_eq!(t.waiting(), 5);
        t.leave(8);
        t.enter(8);
        assert_eq!(t.waiting(), 5);
        t.leave(12);
        t.enter(20);
        assert_eq!(t.waiting(), 13);
    }

    #[test]
    fn page_table_covers_stream() {
        let t = Task::new(TaskId(0), 0, 2, 0, &[0, 3 * PAGE_SIZE]);
        assert!(t.page_table().num_lines() >= 4);
    }

    #[test]
    fn fingerprint_takes_last_window() {
        let t = task_with_history(&[1, 2, 3, 4, 5]);
        assert_eq!(t.fingerprint(3), vec![3, 4, 5]);
    }

    #[test]
    fn fingerprint_clamps_short_history() {
        let t = task_with_history(&[1, 2]);
        assert_eq!(t.fingerprint(8), vec![1, 2]);
    }

    #[test]
    fn hotness_counts_repeats() {
        let t = task_with_history(&[1, 1, 2, 2]);
        assert!((t.hotness(4) - 0.5).abs() < 1e-9);
        let cold = task_with_history(&[1, 2, 3, 4]);
        assert_eq!(cold.hotness(4), 0.0);
        let empty = Task::new(TaskId(0), 0, 4, 0, &[0; 4]);
        assert_eq!(empty.hotness(4), 0.0);
    }
}
