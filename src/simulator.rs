//! Tick-driven simulation driver: arrival admission, batching, optional
//! regrouping, randomised scheduling rounds with queue-contention
//! accounting, and epoch processing.

use std::path::Path;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, warn};

use crate::config::{CoreSpec, OptimizeMode, ProcessPolicy, SchedPolicy, SimConfig};
use crate::core::{Core, CoreId};
use crate::kmedoids::KMedoids;
use crate::metrics::{build_report, Report};
use crate::process::{NonPreemptive, Processor, RandomPreemptive, RoundRobin};
use crate::qlearn::QLearning;
use crate::ram::Ram;
use crate::sched::{Fcfs, Scheduler, Sca, Srtf};
use crate::workload::{Sorting, Workload};

/// Monotonic simulated time.
pub struct Clock {
    now: u64,
}

impl Clock {
    pub fn new() -> Self {
        Self { now: 0 }
    }

    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn advance(&mut self, amount: u64) {
        self.now += amount;
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// The optimization layer reshaping buckets before each scheduling round.
enum Grouping {
    /// Waiting tasks drain straight into the orphan bucket.
    PassThrough,
    KMedoids(KMedoids),
    RoundRobinFill,
    QLearning(QLearning),
}

pub struct Simulator {
    workload: Workload,
    cores: Vec<Core>,
    ram: Ram,
    scheduler: Box<dyn Scheduler>,
    processor: Box<dyn Processor>,
    grouping: Grouping,
    optimize: OptimizeMode,
    batchsize: usize,
    winsize: usize,
    clock: Clock,
    rng: StdRng,
}

impl Simulator {
    /// Wires a simulation together. `state_dir` hosts the Q-learning
    /// persistence files.
    pub fn new(
        workload: Workload,
        specs: &[CoreSpec],
        scheduler: SchedPolicy,
        processor: ProcessPolicy,
        config: &SimConfig,
        state_dir: &Path,
    ) -> Self {
        assert_eq!(workload.ncores(), specs.len(), "workload/architecture core count mismatch");
        let cores: Vec<Core> = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| Core::new(CoreId(i), spec.capacity, spec.cache_config()))
            .collect();

        let scheduler: Box<dyn Scheduler> = match scheduler {
            SchedPolicy::Fcfs => Box::new(Fcfs),
            SchedPolicy::Srtf => Box::new(Srtf),
            SchedPolicy::Sca => Box::new(Sca),
        };
        let processor: Box<dyn Processor> = match processor {
            ProcessPolicy::NonPreemptive => Box::new(NonPreemptive),
            ProcessPolicy::RandomPreemptive => Box::new(RandomPreemptive),
            ProcessPolicy::RrPreemptive => Box::new(RoundRobin),
        };
        let grouping = match config.optimize {
            OptimizeMode::None => Grouping::PassThrough,
            OptimizeMode::KMeans => Grouping::KMedoids(KMedoids::new(specs.len())),
            OptimizeMode::RoundRobin => Grouping::RoundRobinFill,
            OptimizeMode::QLearning => {
                Grouping::QLearning(QLearning::new(specs.len(), config.winsize, state_dir))
            }
        };

        Self {
            workload,
            cores,
            ram: Ram::new(),
            scheduler,
            processor,
            grouping,
            optimize: config.optimize,
            batchsize: config.batchsize,
            winsize: config.winsize,
            clock: Clock::new(),
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    /// Runs the workload to completion and returns the final report.
    pub fn run(&mut self) -> Report {
        debug!(
            scheduler = self.scheduler.name(),
            processor = self.processor.name(),
            ntasks = self.workload.ntasks(),
            "simulation started"
        );
        self.workload.sort(Sorting::Arrival);

        while self.workload.remaining() > 0 {
            self.workload.admit_arrivals(self.clock.now());

            // Wait for a full batch unless everything left has arrived.
            let current = self.workload.current();
            if current < self.batchsize && current != self.workload.remaining() {
                self.clock.advance(1);
                continue;
            }

            self.regroup();
            let scheduled = self.schedule_round();
            if scheduled > 0 {
                self.processor.process(
                    &mut self.workload,
                    &mut self.cores,
                    &mut self.ram,
                    &mut self.clock,
                    &mut self.rng,
                );
                debug!(now = self.clock.now(), scheduled, "epoch complete");
            } else if current > 0 {
                // Nothing was dispatchable: every bucket resident sits in a
                // bucket whose core refuses it. Re-home them so the next
                // round makes progress.
                self.rescue_stuck_buckets();
            }
        }

        if let Grouping::QLearning(q) = &mut self.grouping {
            if let Err(e) = q.save() {
                warn!("failed to persist Q-learning state: {e}");
            }
        }
        build_report(&self.workload, &self.cores)
    }

    /// One scheduling pass over all cores in random order. Every visit
    /// charges queue contention; cores that dispatched tasks are credited
    /// via their contention bias.
    fn schedule_round(&mut self) -> usize {
        let orphan = self.workload.orphan();
        let mut order: Vec<usize> = (0..self.cores.len()).collect();
        order.shuffle(&mut self.rng);

        let mut total = 0;
        for idx in order {
            let bucket = match self.optimize {
                OptimizeMode::None => orphan,
                _ => idx,
            };
            let n = self
                .scheduler
                .sched(&mut self.cores[idx], &mut self.workload, bucket);
            self.clock.advance((n as u64).max(1));
            self.cores[idx].set_contention(-(n as i64));
            total += n;
        }
        total
    }

    fn regroup(&mut self) {
        let orphan = self.workload.orphan();
        let waiting = self.workload.waiting();
        match &mut self.grouping {
            Grouping::PassThrough => {
                while let Some(tid) = self.workload.pop_bucket(waiting) {
                    self.workload.push_bucket(orphan, tid);
                }
            }
            Grouping::KMedoids(km) => {
                if self.workload.bucket_len(orphan) >= self.batchsize {
                    km.group(&mut self.workload, self.winsize, &mut self.rng);
                } else {
                    round_robin_fill(&mut self.workload, &self.cores);
                }
            }
            Grouping::RoundRobinFill => round_robin_fill(&mut self.workload, &self.cores),
            Grouping::QLearning(q) => {
                if self.workload.bucket_len(orphan) >= self.batchsize {
                    q.group(&mut self.workload, &mut self.rng);
                } else {
                    round_robin_fill(&mut self.workload, &self.cores);
                }
            }
        }
    }

    /// Re-homes per-core bucket residents that their core will not take:
    /// core-bound tasks go to their bound core's bucket, everything else
    /// returns to the orphan bucket for redistribution.
    fn rescue_stuck_buckets(&mut self) {
        let orphan = self.workload.orphan();
        for idx in 0..self.cores.len() {
            let mut residents = Vec::new();
            while let Some(tid) = self.workload.pop_bucket(idx) {
                residents.push(tid);
            }
            for tid in residents {
                match self.workload.task(tid).assigned_core() {
                    Some(bound) => self.workload.push_bucket(bound.0, tid),
                    None => self.workload.push_bucket(orphan, tid),
                }
            }
        }
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn cores(&self) -> &[Core] {
        &self.cores
    }

    pub fn workload(&self) -> &Workload {
        &self.workload
    }
}

/// Fills the per-core buckets round-robin from the waiting and orphan
/// buckets, leaving tasks behind once every bucket is at its core's
/// capacity.
fn round_robin_fill(workload: &mut Workload, cores: &[Core]) {
    let sources = [workload.waiting(), workload.orphan()];
    let ncores = cores.len();
    let mut cursor = 0;
    for src in sources {
        while workload.bucket_len(src) > 0 {
            let mut probed = 0;
            while probed < ncores
                && workload.bucket_len(cursor % ncores) >= cores[cursor % ncores].capacity()
            {
                cursor += 1;
                probed += 1;
            }
            if probed == ncores {
                return;
            }
            let target = cursor % ncores;
            let tid = workload.pop_bucket(src).expect("bucket length checked");
            workload.push_bucket(target, tid);
            cursor += 1;
        }
    }
}
