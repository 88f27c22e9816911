//! Tabular Q-learning grouper: places each orphan task into a per-core
//! bucket to minimise intra-bucket cache-set conflicts. The Q-table and the
//! exploration rate persist across runs.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::Rng;
use tracing::warn;

use crate::params::{
    Q_ALPHA, Q_EPS_DECAY, Q_EPS_FILE, Q_EPS_START, Q_GAMMA, Q_MIN_EPS, Q_NUM_INTERVALS,
    Q_REWARD_PENALTY, Q_TABLE_FILE,
};
use crate::workload::Workload;

/// Rolling view of one per-core bucket during a grouping round.
#[derive(Clone, Copy, Debug, Default)]
struct BucketState {
    load: u64,
    waiting: u64,
    ntasks: usize,
    /// Fraction of cross-task set collisions in the members' windows.
    conflicts: f64,
}

pub struct QLearning {
    num_actions: usize,
    num_states: usize,
    winsize: usize,
    /// Row-major `num_states × num_actions`.
    q: Vec<f64>,
    epsilon: f64,
    /// Whether a previously trained table was loaded.
    trained: bool,
    buckets: Vec<BucketState>,
    table_path: PathBuf,
    eps_path: PathBuf,
}

impl QLearning {
    /// Builds the grouper for `ncores` buckets, reloading persisted state
    /// from `dir` when its shape matches the current configuration.
    pub fn new(ncores: usize, winsize: usize, dir: &Path) -> Self {
        assert!(ncores > 0);
        let num_states = Q_NUM_INTERVALS.pow(ncores as u32) * Q_NUM_INTERVALS;
        let mut model = Self {
            num_actions: ncores,
            num_states,
            winsize,
            q: vec![0.0; num_states * ncores],
            epsilon: Q_EPS_START,
            trained: false,
            buckets: vec![BucketState::default(); ncores],
            table_path: dir.join(Q_TABLE_FILE),
            eps_path: dir.join(Q_EPS_FILE),
        };
        model.load();
        model
    }

    pub fn num_states(&self) -> usize {
        self.num_states
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Quantises a 0..1 fraction into low / medium / high.
    fn level(x: f64) -> usize {
        if x < 0.33 {
            0
        } else if x < 0.66 {
            1
        } else {
            2
        }
    }

    /// Mixed-radix encoding of the per-bucket conflict levels, refined by
    /// the incoming task's hotness level.
    fn state_for(&self, hotness: f64) -> usize {
        let mut radix = 0;
        let mut scale = 1;
        for bucket in &self.buckets {
            radix += Self::level(bucket.conflicts) * scale;
            scale *= Q_NUM_INTERVALS;
        }
        radix * Q_NUM_INTERVALS + Self::level(hotness)
    }

    fn q_at(&self, state: usize, action: usize) -> f64 {
        self.q[state * self.num_actions + action]
    }

    /// Highest-valued action; ties break to the lowest index.
    fn best_action(&self, state: usize) -> usize {
        let row = &self.q[state * self.num_actions..(state + 1) * self.num_actions];
        let mut best = 0;
        for (a, &v) in row.iter().enumerate() {
            if v > row[best] {
                best = a;
            }
        }
        best
    }

    fn choose_action(&self, state: usize, rng: &mut StdRng) -> usize {
        if rng.gen::<f64>() < self.epsilon {
            rng.gen_range(0..self.num_actions)
        } else {
            self.best_action(state)
        }
    }

    /// Fraction of window accesses that touch a set last touched by a
    /// *different* task of the same bucket. Members that have never been
    /// processed contribute nothing.
    fn conflict_fraction(&self, workload: &Workload, bucket: usize) -> f64 {
        let windows: Vec<Vec<u32>> = workload
            .bucket(bucket)
            .iter()
            .filter(|&&tid| workload.task(tid).processed() > 0)
            .map(|&tid| workload.task(tid).fingerprint(self.winsize))
            .collect();
        if windows.len() < 2 {
            return 0.0;
        }

        let mut last_toucher: HashMap<u32, usize> = HashMap::new();
        let mut accesses = 0u64;
        let mut conflicts = 0u64;
        for pos in 0..self.winsize {
            for (member, window) in windows.iter().enumerate() {
                let Some(&set) = window.get(pos) else {
                    continue;
                };
                accesses += 1;
                if let Some(&prev) = last_toucher.get(&set) {
                    if prev != member {
                        conflicts += 1;
                    }
                }
                last_toucher.insert(set, member);
            }
        }
        if accesses == 0 {
            0.0
        } else {
            conflicts as f64 / accesses as f64
        }
    }

    /// One grouping episode: every orphan task is placed into a bucket by an
    /// ε-greedy step and the Q-table learns from the conflict delta.
    pub fn group(&mut self, workload: &mut Workload, rng: &mut StdRng) {
        let mut queue: VecDeque<_> = VecDeque::new();
        while let Some(tid) = workload.pop_bucket(workload.orphan()) {
            queue.push_back(tid);
        }

        while let Some(tid) = queue.pop_front() {
            let state = self.state_for(workload.task(tid).hotness(self.winsize));
            let action = self.choose_action(state, rng);
            let before = self.buckets[action].conflicts;

            workload.push_bucket(action, tid);
            let (work_left, waiting) = {
                let t = workload.task(tid);
                (t.work_left(), t.waiting())
            };
            let bucket = &mut self.buckets[action];
            bucket.load += work_left;
            bucket.waiting += waiting;
            bucket.ntasks += 1;
            self.buckets[action].conflicts = self.conflict_fraction(workload, action);

            let delta = self.buckets[action].conflicts - before;
            let reward = 1.0 / (1.0 + delta.abs()) - Q_REWARD_PENALTY * delta.max(0.0);

            let next_tid = queue.front().copied().unwrap_or(tid);
            let next_state = self.state_for(workload.task(next_tid).hotness(self.winsize));

            let old = self.q_at(state, action);
            let next_max = (0..self.num_actions)
                .map(|a| self.q_at(next_state, a))
                .fold(f64::NEG_INFINITY, f64::max);
            self.q[state * self.num_actions + action] =
                old + Q_ALPHA * (reward + Q_GAMMA * next_max - old);
        }

        self.buckets.fill(BucketState::default());
    }

    /// Reloads persisted state; a shape mismatch discards it and restarts
    /// training from zeros.
    fn load(&mut self) {
        let expected = self.num_states * self.num_actions * 8;
        match fs::read(&self.table_path) {
            Ok(bytes) if bytes.len() == expected => {
                for (i, chunk) in bytes.chunks_exact(8).enumerate() {
                    self.q[i] = f64::from_le_bytes(chunk.try_into().expect("8-byte chunk"));
                }
                self.trained = true;
            }
            Ok(bytes) => {
                warn!(
                    path = %self.table_path.display(),
                    found = bytes.len(),
                    expected,
                    "persisted Q-table does not match the current shape; retraining"
                );
                return;
            }
            Err(_) => return,
        }

        match fs::read(&self.eps_path) {
            Ok(bytes) if bytes.len() == 8 => {
                self.epsilon = f64::from_le_bytes(bytes[..8].try_into().expect("8-byte file"));
            }
            Ok(_) | Err(_) => {
                warn!(
                    path = %self.eps_path.display(),
                    "persisted epsilon unreadable; starting from the default"
                );
                self.epsilon = Q_EPS_START;
            }
        }
    }

    /// Persists the Q-table and the (decayed) exploration rate.
    pub fn save(&mut self) -> io::Result<()> {
        let mut bytes = Vec::with_capacity(self.q.len() * 8);
        for v in &self.q {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        fs::write(&self.table_path, bytes)?;

        if self.epsilon > Q_MIN_EPS {
            self.epsilon = (self.epsilon * Q_EPS_DECAY).max(Q_MIN_EPS);
        }
        fs::write(&self.eps_path, self.epsilon.to_le_bytes())?;
        Ok(())
    }
}
