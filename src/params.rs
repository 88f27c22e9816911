//! Centralised model constants shared across the memory hierarchy, the
//! processing strategies, and the groupers.

/// Word size in bytes.
pub const WORD_SIZE: u64 = 4;

/// Cache block size in bytes.
pub const BLOCK_SIZE: u64 = 64;

/// Page (and RAM frame) size in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// Total modeled RAM in bytes.
pub const RAM_SIZE: u64 = 1 << 32;

/// Words covered by one cache block.
pub const WORDS_PER_BLOCK: u64 = BLOCK_SIZE / WORD_SIZE;

/// Round-robin per-task time slice, in references.
pub const QUANTUM: u64 = 10_000;

/// Time penalty for a cache miss.
pub const MISS_PENALTY: u64 = 50;

/// Time penalty for a page fault.
pub const PAGE_FAULT_PENALTY: u64 = 500_000;

/// Iteration cap for the k-medoids grouper.
pub const KMEDOIDS_MAX_ITER: usize = 100;

/// Q-learning learning rate.
pub const Q_ALPHA: f64 = 0.5;

/// Q-learning discount factor.
pub const Q_GAMMA: f64 = 0.9;

/// Weight of the conflict-increase penalty in the reward.
pub const Q_REWARD_PENALTY: f64 = 0.2;

/// Initial exploration rate when no persisted state exists.
pub const Q_EPS_START: f64 = 0.5;

/// Multiplicative ε decay applied once per persisted run.
pub const Q_EPS_DECAY: f64 = 0.995;

/// Exploration-rate floor.
pub const Q_MIN_EPS: f64 = 0.0;

/// Conflict/hotness quantisation levels (low, medium, high).
pub const Q_NUM_INTERVALS: usize = 3;

/// Persisted Q-table file name.
pub const Q_TABLE_FILE: &str = "q_table.dat";

/// Persisted ε file name.
pub const Q_EPS_FILE: &str = "q_eps.dat";
