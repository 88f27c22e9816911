//! Processing strategies: consume scheduled tasks one quantum at a time,
//! walking their memory references and charging fault/miss penalties. The
//! strategies differ only in how large a quantum they grant.

use rand::rngs::StdRng;
use rand::Rng;

use crate::core::Core;
use crate::params::QUANTUM;
use crate::ram::Ram;
use crate::simulator::Clock;
use crate::task::Task;
use crate::workload::Workload;

/// A processing strategy. One `process` call is an epoch: every core works
/// through its run queue, finished tasks reach the finished queue, everything
/// else returns to the orphan bucket, and the clock advances to the slowest
/// core.
pub trait Processor {
    fn name(&self) -> &'static str;

    fn process(
        &mut self,
        workload: &mut Workload,
        cores: &mut [Core],
        ram: &mut Ram,
        clock: &mut Clock,
        rng: &mut StdRng,
    );
}

/// Runs one epoch, asking `quantum_for` how much of each task to consume.
fn run_epoch(
    workload: &mut Workload,
    cores: &mut [Core],
    ram: &mut Ram,
    clock: &mut Clock,
    rng: &mut StdRng,
    mut quantum_for: impl FnMut(&Task, &mut StdRng) -> u64,
) {
    // Preparation cost: the core with the most tasks paces the batch.
    let mut max_prep = 0;
    for core in cores.iter_mut() {
        let assigned: u64 = core
            .run_queue()
            .iter()
            .map(|tid| workload.task(*tid).work_left())
            .sum();
        core.push_history(assigned, core.scheduled());
        max_prep = max_prep.max(core.scheduled() as u64);
    }

    // Per-core accumulated time this epoch: work plus penalties.
    let mut acc = vec![0u64; cores.len()];

    for (i, core) in cores.iter_mut().enumerate() {
        while let Some(tid) = core.pop_task() {
            let arrival = workload.task(tid).arrival();
            let entry_abs = clock.now() as i128 + acc[i] as i128 + core.contention() as i128;
            let entry = (entry_abs - arrival as i128).max(0) as u64;
            workload.task_mut(tid).enter(entry);

            let quantum = quantum_for(workload.task(tid), rng);
            debug_assert!(quantum >= 1 && quantum <= workload.task(tid).work_left());

            // Walk what the stream still covers; the rest is plain cycles.
            let refs = (quantum as usize).min(workload.task(tid).refs_left());
            let mut penalty = 0;
            for _ in 0..refs {
                penalty += core.consume_ref(workload.tasks_mut(), tid, ram);
            }

            let task = workload.task_mut(tid);
            task.add_processed(quantum);
            task.leave(entry + quantum);
            acc[i] += quantum + penalty;

            if workload.task(tid).is_finished() {
                workload.finish(tid);
            } else {
                let orphan = workload.orphan();
                workload.push_bucket(orphan, tid);
            }
        }
        core.add_workload(acc[i]);
        tracing::debug!(
            core = i,
            elapsed = acc[i],
            conflicts = core.cache_mut().take_conflicts(),
            "epoch done"
        );
    }

    // The batch waits for the slowest core, plus the preparation cost.
    let slowest = acc.iter().copied().max().unwrap_or(0);
    clock.advance(slowest + max_prep);
}

/// Each task runs to completion in the epoch it was scheduled.
pub struct NonPreemptive;

impl Processor for NonPreemptive {
    fn name(&self) -> &'static str {
        "non-preemptive"
    }

    fn process(
        &mut self,
        workload: &mut Workload,
        cores: &mut [Core],
        ram: &mut Ram,
        clock: &mut Clock,
        rng: &mut StdRng,
    ) {
        run_epoch(workload, cores, ram, clock, rng, |t, _| t.work_left());
    }
}

/// Each task runs a uniformly random share of its remaining work.
pub struct RandomPreemptive;

impl Processor for RandomPreemptive {
    fn name(&self) -> &'static str {
        "random-preemptive"
    }

    fn process(
        &mut self,
        workload: &mut Workload,
        cores: &mut [Core],
        ram: &mut Ram,
        clock: &mut Clock,
        rng: &mut StdRng,
    ) {
        run_epoch(workload, cores, ram, clock, rng, |t, rng| {
            rng.gen_range(1..=t.work_left())
        });
    }
}

/// Each task runs at most one fixed quantum per epoch.
pub struct RoundRobin;

impl Processor for RoundRobin {
    fn name(&self) -> &'static str {
        "rr-preemptive"
    }

    fn process(
        &mut self,
        workload: &mut Workload,
        cores: &mut [Core],
        ram: &mut Ram,
        clock: &mut Clock,
        rng: &mut StdRng,
    ) {
        run_epoch(workload, cores, ram, clock, rng, |t, _| {
            QUANTUM.min(t.work_left())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::core::CoreId;
    use crate::params::{MISS_PENALTY, PAGE_FAULT_PENALTY};
    use crate::task::TaskId;
    use rand::SeedableRng;

    fn setup(works: &[u64]) -> (Workload, Vec<Core>, Ram, Clock, StdRng) {
        let mut w = Workload::new(1);
        for (i, &work) in works.iter().enumerate() {
            w.push_task(i as u64, work, 0, &vec![0; work as usize]);
        }
        let cores = vec![Core::new(
            CoreId(0),
            8,
            CacheConfig {
                num_sets: 1,
                num_ways: 1,
                num_blocks: 1,
            },
        )];
        (w, cores, Ram::with_frames(16), Clock::new(), StdRng::seed_from_u64(0))
    }

    fn schedule_all(w: &mut Workload, core: &mut Core) {
        w.admit_arrivals(0);
        while let Some(tid) = w.pop_bucket(w.waiting()) {
            core.assign(tid);
        }
    }

    #[test]
    fn non_preemptive_finishes_everything() {
        let (mut w, mut cores, mut ram, mut clock, mut rng) = setup(&[4, 2]);
        schedule_all(&mut w, &mut cores[0]);
        NonPreemptive.process(&mut w, &mut cores, &mut ram, &mut clock, &mut rng);

        assert_eq!(w.finished().len(), 2);
        assert_eq!(w.bucket_len(w.orphan()), 0);
        // Both tasks touch word 0 of their own page 0: each pays one cold
        // fault + miss, the remaining refs hit.
        assert_eq!(cores[0].page_faults(), 2);
        assert_eq!(cores[0].page_hits(), 4);
        assert_eq!(cores[0].cache_hits() + cores[0].cache_misses(), 6);
        // Epoch time: 6 cycles + both penalties + 2 tasks of preparation.
        let work = 6 + 2 * (PAGE_FAULT_PENALTY + MISS_PENALTY);
        assert_eq!(clock.now(), work + 2);
        assert_eq!(cores[0].wtotal(), work);
    }

    #[test]
    fn round_robin_cuts_at_quantum() {
        let (mut w, mut cores, mut ram, mut clock, mut rng) = setup(&[25_000]);
        schedule_all(&mut w, &mut cores[0]);

        RoundRobin.process(&mut w, &mut cores, &mut ram, &mut clock, &mut rng);
        assert_eq!(w.task(TaskId(0)).processed(), 10_000);
        assert_eq!(w.bucket_len(w.orphan()), 1);

        let tid = w.pop_bucket(w.orphan()).unwrap();
        cores[0].assign(tid);
        RoundRobin.process(&mut w, &mut cores, &mut ram, &mut clock, &mut rng);
        assert_eq!(w.task(TaskId(0)).processed(), 20_000);

        let tid = w.pop_bucket(w.orphan()).unwrap();
        cores[0].assign(tid);
        RoundRobin.process(&mut w, &mut cores, &mut ram, &mut clock, &mut rng);
        assert_eq!(w.task(TaskId(0)).processed(), 25_000);
        assert_eq!(w.finished(), &[TaskId(0)]);
    }

    #[test]
    fn random_preemptive_conserves_work() {
        let (mut w, mut cores, mut ram, mut clock, mut rng) = setup(&[100]);
        schedule_all(&mut w, &mut cores[0]);

        let mut epochs = 0;
        while w.finished().is_empty() {
            RandomPreemptive.process(&mut w, &mut cores, &mut ram, &mut clock, &mut rng);
            if let Some(tid) = w.pop_bucket(w.orphan()) {
                cores[0].assign(tid);
            }
            epochs += 1;
            assert!(epochs < 1000);
        }
        assert_eq!(w.task(TaskId(0)).processed(), 100);
        // P1/P2: every walked reference is accounted once.
        let t = w.task(TaskId(0));
        assert_eq!(t.cache_hits() + t.cache_misses(), 100);
        assert_eq!(t.page_hits() + t.page_faults(), 100);
    }

    #[test]
    fn waiting_counts_idle_gap_between_epochs() {
        let (mut w, mut cores, mut ram, mut clock, mut rng) = setup(&[20_000]);
        schedule_all(&mut w, &mut cores[0]);

        RoundRobin.process(&mut w, &mut cores, &mut ram, &mut clock, &mut rng);
        let after_first = w.task(TaskId(0)).waiting();

        // Re-dispatch later: the gap since last exit becomes waiting time.
        let tid = w.pop_bucket(w.orphan()).unwrap();
        cores[0].assign(tid);
        cores[0].set_contention(0);
        RoundRobin.process(&mut w, &mut cores, &mut ram, &mut clock, &mut rng);
        assert!(w.task(TaskId(0)).waiting() > after_first);
        assert_eq!(w.finished(), &[TaskId(0)]);
    }

    #[test]
    fn contention_bias_shifts_entry() {
        let (mut w, mut cores, mut ram, mut clock, mut rng) = setup(&[4]);
        schedule_all(&mut w, &mut cores[0]);
        clock.advance(10);
        // A core that just scheduled 4 tasks is owed 4 ticks back.
        cores[0].set_contention(-4);
        NonPreemptive.process(&mut w, &mut cores, &mut ram, &mut clock, &mut rng);
        // Entry at 10 - 4 = 6, nothing waited before that.
        assert_eq!(w.task(TaskId(0)).waiting(), 6);
    }
}
