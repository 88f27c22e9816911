//! Simulation configuration: strategy selectors, work kernels, run
//! parameters, and the architecture file.

use std::io::Read;

use clap::ValueEnum;

use crate::cache::CacheConfig;
use crate::error::{Result, SimError};
use crate::params::QUANTUM;

/// Scheduling policy selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SchedPolicy {
    Fcfs,
    Srtf,
    Sca,
}

/// Processing strategy selector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ProcessPolicy {
    #[value(name = "non-preemptive")]
    NonPreemptive,
    #[value(name = "random-preemptive")]
    RandomPreemptive,
    #[value(name = "rr-preemptive")]
    RrPreemptive,
}

/// Queue-optimization layer applied before scheduling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptimizeMode {
    /// Waiting tasks drain straight into the orphan bucket.
    None,
    /// K-medoids grouping of processed tasks by locality fingerprint.
    KMeans,
    /// Plain round-robin fill of the per-core buckets.
    RoundRobin,
    /// Tabular Q-learning placement minimising cache-set conflicts.
    QLearning,
}

impl OptimizeMode {
    pub fn from_flag(flag: u8) -> Result<Self> {
        match flag {
            0 => Ok(Self::None),
            1 => Ok(Self::KMeans),
            2 => Ok(Self::RoundRobin),
            3 => Ok(Self::QLearning),
            other => Err(SimError::InvalidArgument(format!(
                "optimize must be 0..=3, got {other}"
            ))),
        }
    }
}

/// Work-rescaling kernel applied to every task before simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Kernel {
    Linear,
    Logarithmic,
    Quadratic,
}

impl Kernel {
    pub fn apply(self, work: u64) -> u64 {
        match self {
            Kernel::Linear => work,
            Kernel::Logarithmic => {
                if work == 0 {
                    0
                } else {
                    (work as f64 * (work as f64).log2()).floor() as u64
                }
            }
            Kernel::Quadratic => work * work,
        }
    }
}

/// One core line of the architecture file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CoreSpec {
    pub capacity: usize,
    pub cache_sets: usize,
    pub cache_ways: usize,
    pub cache_blocks: usize,
}

impl CoreSpec {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            num_sets: self.cache_sets,
            num_ways: self.cache_ways,
            num_blocks: self.cache_blocks,
        }
    }
}

/// Parsed architecture file: `ncores`, then one
/// `capacity cache_sets cache_ways num_blocks` line per core.
#[derive(Clone, Debug)]
pub struct Architecture {
    cores: Vec<CoreSpec>,
}

impl Architecture {
    pub fn from_text<R: Read>(mut reader: R) -> Result<Self> {
        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .map_err(|e| SimError::MalformedArch(format!("unreadable input: {e}")))?;
        let mut tokens = content.split_ascii_whitespace();

        let mut next = |what: &str| -> Result<usize> {
            let tok = tokens
                .next()
                .ok_or_else(|| SimError::MalformedArch(format!("missing {what}")))?;
            tok.parse::<usize>()
                .map_err(|_| SimError::MalformedArch(format!("bad {what}: {tok:?}")))
        };

        let ncores = next("core count")?;
        if ncores == 0 {
            return Err(SimError::MalformedArch("core count must be positive".into()));
        }
        let mut cores = Vec::with_capacity(ncores);
        for i in 0..ncores {
            let spec = CoreSpec {
                capacity: next(&format!("capacity of core {i}"))?,
                cache_sets: next(&format!("cache sets of core {i}"))?,
                cache_ways: next(&format!("cache ways of core {i}"))?,
                cache_blocks: next(&format!("cache blocks of core {i}"))?,
            };
            if spec.capacity == 0 {
                return Err(SimError::MalformedArch(format!(
                    "core {i} has zero capacity"
                )));
            }
            cores.push(spec);
        }
        Ok(Self { cores })
    }

    /// The cores to simulate: the file's, truncated to a requested count.
    pub fn select(&self, requested: Option<usize>) -> &[CoreSpec] {
        let n = match requested {
            Some(r) => r.min(self.cores.len()),
            None => self.cores.len(),
        };
        &self.cores[..n]
    }

    pub fn ncores(&self) -> usize {
        self.cores.len()
    }
}

/// Run parameters gathered from the command line.
#[derive(Clone, Debug)]
pub struct SimConfig {
    pub batchsize: usize,
    pub winsize: usize,
    pub seed: u64,
    pub optimize: OptimizeMode,
}

impl SimConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batchsize == 0 {
            return Err(SimError::InvalidArgument("batchsize must be >= 1".into()));
        }
        if self.winsize == 0 || self.winsize as u64 > QUANTUM {
            return Err(SimError::InvalidArgument(format!(
                "winsize must be in 1..={QUANTUM}, got {}",
                self.winsize
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernels_rescale_work() {
        assert_eq!(Kernel::Linear.apply(7), 7);
        assert_eq!(Kernel::Quadratic.apply(7), 49);
        // floor(8 * log2(8)) = 24
        assert_eq!(Kernel::Logarithmic.apply(8), 24);
        assert_eq!(Kernel::Logarithmic.apply(1), 0);
        assert_eq!(Kernel::Logarithmic.apply(0), 0);
    }

    #[test]
    fn arch_file_parses() {
        let text = "2\n2 4 2 2\n1 8 1 4\n";
        let arch = Architecture::from_text(text.as_bytes()).unwrap();
        assert_eq!(arch.ncores(), 2);
        assert_eq!(
            arch.select(None)[1],
            CoreSpec {
                capacity: 1,
                cache_sets: 8,
                cache_ways: 1,
                cache_blocks: 4
            }
        );
    }

    #[test]
    fn select_takes_minimum_of_file_and_request() {
        let arch = Architecture::from_text("2\n1 1 1 1\n1 1 1 1\n".as_bytes()).unwrap();
        assert_eq!(arch.select(Some(5)).len(), 2);
        assert_eq!(arch.select(Some(1)).len(), 1);
        assert_eq!(arch.select(None).len(), 2);
    }

    #[test]
    fn bad_arch_files_are_rejected() {
        assert!(Architecture::from_text("0\n".as_bytes()).is_err());
        assert!(Architecture::from_text("1\n1 2".as_bytes()).is_err());
        assert!(Architecture::from_text("x".as_bytes()).is_err());
        assert!(Architecture::from_text("1\n0 1 1 1\n".as_bytes()).is_err());
    }

    #[test]
    fn config_validation() {
        let ok = SimConfig {
            batchsize: 1,
            winsize: 8,
            seed: 0,
            optimize: OptimizeMode::None,
        };
        assert!(ok.validate().is_ok());

        let bad_batch = SimConfig { batchsize: 0, ..ok.clone() };
        assert!(bad_batch.validate().is_err());

        let bad_win = SimConfig {
            winsize: QUANTUM as usize + 1,
            ..ok.clone()
        };
        assert!(bad_win.validate().is_err());

        let zero_win = SimConfig { winsize: 0, ..ok };
        assert!(zero_win.validate().is_err());
    }

    #[test]
    fn optimize_flags() {
        assert_eq!(OptimizeMode::from_flag(0).unwrap(), OptimizeMode::None);
        assert_eq!(OptimizeMode::from_flag(3).unwrap(), OptimizeMode::QLearning);
        assert!(OptimizeMode::from_flag(4).is_err());
    }
}
