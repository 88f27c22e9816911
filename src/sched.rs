//! Scheduling policies: each drains a bucket into a core's run queue
//! following its own rule. None of them cares how the bucket was filled.

use crate::core::Core;
use crate::workload::Workload;

/// A scheduling policy. `sched` returns how many tasks were dispatched; the
/// driver charges that amount (at least one) as queue contention.
pub trait Scheduler {
    fn name(&self) -> &'static str;

    fn sched(&mut self, core: &mut Core, workload: &mut Workload, bucket: usize) -> usize;
}

/// First-come, first-served: head of the bucket, up to capacity.
pub struct Fcfs;

impl Scheduler for Fcfs {
    fn name(&self) -> &'static str {
        "fcfs"
    }

    fn sched(&mut self, core: &mut Core, workload: &mut Workload, bucket: usize) -> usize {
        let free = core.capacity() - core.scheduled();
        let take = free.min(workload.bucket_len(bucket));
        for _ in 0..take {
            let tid = workload.pop_bucket(bucket).expect("bucket length checked");
            core.assign(tid);
        }
        take
    }
}

/// Shortest remaining time first: the bucket is re-ordered by remaining
/// work (task id breaks ties) before draining.
pub struct Srtf;

impl Scheduler for Srtf {
    fn name(&self) -> &'static str {
        "srtf"
    }

    fn sched(&mut self, core: &mut Core, workload: &mut Workload, bucket: usize) -> usize {
        if workload.bucket_len(bucket) >= 2 {
            workload.sort_bucket_by_remaining(bucket);
        }
        Fcfs.sched(core, workload, bucket)
    }
}

/// Same-core-always: a task is bound to the first core that dispatches it
/// and is only ever dispatched there again. Tasks bound elsewhere rotate to
/// the bucket's tail.
pub struct Sca;

impl Scheduler for Sca {
    fn name(&self) -> &'static str {
        "sca"
    }

    fn sched(&mut self, core: &mut Core, workload: &mut Workload, bucket: usize) -> usize {
        let mut n = 0;
        // Examine each resident at most once; rotation must not loop.
        let mut residents = workload.bucket_len(bucket);
        while residents > 0 && core.scheduled() < core.capacity() {
            residents -= 1;
            let tid = workload.pop_bucket(bucket).expect("bucket length checked");
            match workload.task(tid).assigned_core() {
                Some(bound) if bound != core.id() => workload.push_bucket(bucket, tid),
                _ => {
                    workload.task_mut(tid).assign_core(core.id());
                    core.assign(tid);
                    n += 1;
                }
            }
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::core::CoreId;
    use crate::task::TaskId;

    fn core(id: usize, capacity: usize) -> Core {
        Core::new(CoreId(id), capacity, CacheConfig::default())
    }

    fn bucket_of(works: &[u64]) -> Workload {
        let mut w = Workload::new(2);
        for (i, &work) in works.iter().enumerate() {
            let tid = w.push_task(i as u64, work, 0, &vec![0; work as usize]);
            // Straight into the orphan bucket, as the driver would.
            w.admit_arrivals(0);
            while w.pop_bucket(w.waiting()).is_some() {}
            w.push_bucket(w.orphan(), tid);
        }
        w
    }

    #[test]
    fn fcfs_takes_head_up_to_capacity() {
        let mut w = bucket_of(&[5, 3, 8]);
        let mut c = core(0, 2);
        let orphan = w.orphan();
        let n = Fcfs.sched(&mut c, &mut w, orphan);
        assert_eq!(n, 2);
        assert_eq!(c.pop_task(), Some(TaskId(0)));
        assert_eq!(c.pop_task(), Some(TaskId(1)));
        assert_eq!(w.bucket_len(w.orphan()), 1);
    }

    #[test]
    fn fcfs_on_empty_bucket_schedules_nothing() {
        let mut w = Workload::new(1);
        let mut c = core(0, 4);
        let orphan = w.orphan();
        assert_eq!(Fcfs.sched(&mut c, &mut w, orphan), 0);
    }

    #[test]
    fn srtf_dispatches_shortest_first() {
        let mut w = bucket_of(&[10, 2, 6]);
        let mut c = core(0, 3);
        let orphan = w.orphan();
        let n = Srtf.sched(&mut c, &mut w, orphan);
        assert_eq!(n, 3);
        // Non-decreasing remaining work.
        assert_eq!(c.pop_task(), Some(TaskId(1)));
        assert_eq!(c.pop_task(), Some(TaskId(2)));
        assert_eq!(c.pop_task(), Some(TaskId(0)));
    }

    #[test]
    fn sca_binds_and_respects_affinity() {
        let mut w = bucket_of(&[4, 4]);
        let mut c0 = core(0, 1);
        let mut c1 = core(1, 1);

        let orphan = w.orphan();
        assert_eq!(Sca.sched(&mut c0, &mut w, orphan), 1);
        let orphan = w.orphan();
        assert_eq!(Sca.sched(&mut c1, &mut w, orphan), 1);
        assert_eq!(w.task(TaskId(0)).assigned_core(), Some(CoreId(0)));
        assert_eq!(w.task(TaskId(1)).assigned_core(), Some(CoreId(1)));

        // Re-inserted in swapped order: bindings still win.
        let orphan = w.orphan();
        w.push_bucket(orphan, TaskId(1));
        w.push_bucket(orphan, TaskId(0));
        let mut c0 = core(0, 1);
        let mut c1 = core(1, 1);
        let orphan = w.orphan();
        assert_eq!(Sca.sched(&mut c0, &mut w, orphan), 1);
        assert_eq!(c0.pop_task(), Some(TaskId(0)));
        let orphan = w.orphan();
        assert_eq!(Sca.sched(&mut c1, &mut w, orphan), 1);
        assert_eq!(c1.pop_task(), Some(TaskId(1)));
    }

    #[test]
    fn sca_gives_up_when_all_residents_are_foreign() {
        let mut w = bucket_of(&[4, 4]);
        let mut c0 = core(0, 2);
        let orphan = w.orphan();
        assert_eq!(Sca.sched(&mut c0, &mut w, orphan), 2);

        let orphan = w.orphan();
        w.push_bucket(orphan, TaskId(0));
        w.push_bucket(orphan, TaskId(1));
        let mut c1 = core(1, 2);
        // Both bound to core 0: nothing dispatched, bucket intact.
        let orphan = w.orphan();
        assert_eq!(Sca.sched(&mut c1, &mut w, orphan), 0);
        assert_eq!(w.bucket_len(w.orphan()), 2);
    }
}
