//! Simulation statistics: per-task report lines plus the aggregate summary
//! printed after a run.

use std::fmt;

use crate::core::Core;
use crate::workload::Workload;

/// One finished task as reported.
#[derive(Clone, Debug)]
pub struct TaskLine {
    pub real_id: u64,
    pub id: usize,
    pub work: u64,
    pub waiting: u64,
    /// `(waiting + work) / work`.
    pub slowdown: f64,
}

/// Aggregate figures over the whole run.
#[derive(Clone, Debug, Default)]
pub struct Summary {
    pub waiting_sum: u64,
    pub p99_waiting: u64,
    pub p99_slowdown: f64,
    pub page_hits: u64,
    pub page_faults: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Sum over epochs of pairwise per-core task-count differences.
    pub unbalancement: u64,
    pub makespan: u64,
    pub cost: u64,
    pub total: u64,
    pub throughput: f64,
    /// stddev / mean of per-core workload.
    pub cov: f64,
    /// max / min workload over cores that did any work.
    pub slowdown: f64,
}

/// Full report: per-task lines in ascending-waiting order plus the summary.
pub struct Report {
    pub tasks: Vec<TaskLine>,
    pub summary: Summary,
}

/// Nearest-rank percentile of an ascending-sorted slice.
fn percentile<T: Copy>(sorted: &[T], p: f64) -> Option<T> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (p * sorted.len() as f64).ceil() as usize;
    Some(sorted[rank.clamp(1, sorted.len()) - 1])
}

pub fn build_report(workload: &Workload, cores: &[Core]) -> Report {
    let mut tasks: Vec<TaskLine> = workload
        .finished()
        .iter()
        .map(|&tid| {
            let t = workload.task(tid);
            let work = t.work().max(1);
            TaskLine {
                real_id: t.real_id(),
                id: tid.0,
                work: t.work(),
                waiting: t.waiting(),
                slowdown: (t.waiting() + work) as f64 / work as f64,
            }
        })
        .collect();
    tasks.sort_by_key(|l| (l.waiting, l.id));

    let waitings: Vec<u64> = tasks.iter().map(|l| l.waiting).collect();
    let mut slowdowns: Vec<f64> = tasks.iter().map(|l| l.slowdown).collect();
    slowdowns.sort_by(|a, b| a.total_cmp(b));

    let mut summary = Summary {
        waiting_sum: waitings.iter().sum(),
        p99_waiting: percentile(&waitings, 0.99).unwrap_or(0),
        p99_slowdown: percentile(&slowdowns, 0.99).unwrap_or(0.0),
        page_hits: cores.iter().map(Core::page_hits).sum(),
        page_faults: cores.iter().map(Core::page_faults).sum(),
        cache_hits: cores.iter().map(Core::cache_hits).sum(),
        cache_misses: cores.iter().map(Core::cache_misses).sum(),
        unbalancement: unbalancement(cores),
        ..Summary::default()
    };

    let workloads: Vec<u64> = cores.iter().map(Core::wtotal).collect();
    summary.makespan = workloads.iter().copied().max().unwrap_or(0);
    summary.total = workloads.iter().sum();
    summary.cost = summary.makespan * cores.len() as u64;
    if summary.makespan > 0 {
        summary.throughput = summary.total as f64 / summary.makespan as f64;
    }

    let mean = summary.total as f64 / cores.len().max(1) as f64;
    if mean > 0.0 {
        let var = workloads
            .iter()
            .map(|&w| (w as f64 - mean).powi(2))
            .sum::<f64>()
            / cores.len() as f64;
        summary.cov = var.sqrt() / mean;
    }

    let busy_min = workloads.iter().copied().filter(|&w| w > 0).min();
    if let Some(min) = busy_min {
        summary.slowdown = summary.makespan as f64 / min as f64;
    }

    Report { tasks, summary }
}

/// How unevenly tasks were spread: per epoch, the sum of pairwise absolute
/// differences of per-core task counts.
fn unbalancement(cores: &[Core]) -> u64 {
    let epochs = cores.iter().map(|c| c.history().len()).max().unwrap_or(0);
    let mut total = 0u64;
    for e in 0..epochs {
        for i in 0..cores.len() {
            for j in i + 1..cores.len() {
                let a = cores[i].history().get(e).map_or(0, |r| r.ntasks) as i64;
                let b = cores[j].history().get(e).map_or(0, |r| r.ntasks) as i64;
                total += a.abs_diff(b);
            }
        }
    }
    total
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for line in &self.tasks {
            writeln!(
                f,
                "task {} waited {} work {} (id {})",
                line.real_id, line.waiting, line.work, line.id
            )?;
        }
        let s = &self.summary;
        writeln!(f, "waiting sum: {}", s.waiting_sum)?;
        writeln!(f, "waiting p99: {}", s.p99_waiting)?;
        writeln!(f, "slowdown p99: {:.6}", s.p99_slowdown)?;
        writeln!(f, "page hits: {}", s.page_hits)?;
        writeln!(f, "page faults: {}", s.page_faults)?;
        writeln!(f, "cache hits: {}", s.cache_hits)?;
        writeln!(f, "cache misses: {}", s.cache_misses)?;
        writeln!(f, "unbalancement: {}", s.unbalancement)?;
        writeln!(f, "makespan: {}", s.makespan)?;
        writeln!(f, "cost: {}", s.cost)?;
        writeln!(f, "total: {}", s.total)?;
        writeln!(f, "throughput: {:.6}", s.throughput)?;
        writeln!(f, "cov: {:.6}", s.cov)?;
        writeln!(f, "slowdown: {:.6}", s.slowdown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheConfig;
    use crate::core::CoreId;

    fn core_with_work(id: usize, work: u64, epochs: &[usize]) -> Core {
        let mut c = Core::new(CoreId(id), 8, CacheConfig::default());
        c.add_workload(work);
        for &n in epochs {
            c.push_history(0, n);
        }
        c
    }

    #[test]
    fn percentile_nearest_rank() {
        let values: Vec<u64> = (1..=100).collect();
        assert_eq!(percentile(&values, 0.99), Some(99));
        assert_eq!(percentile(&values, 1.0), Some(100));
        assert_eq!(percentile(&[5u64], 0.99), Some(5));
        assert_eq!(percentile::<u64>(&[], 0.99), None);
    }

    #[test]
    fn unbalancement_sums_pairwise_differences() {
        let cores = vec![
            core_with_work(0, 10, &[3, 1]),
            core_with_work(1, 10, &[1, 1]),
        ];
        // Epoch 0: |3-1| = 2; epoch 1: |1-1| = 0.
        assert_eq!(unbalancement(&cores), 2);
    }

    #[test]
    fn summary_workload_figures() {
        let mut w = Workload::new(2);
        let tid = w.push_task(0, 4, 0, &[0; 4]);
        w.task_mut(tid).add_processed(4);
        w.finish(tid);

        let cores = vec![core_with_work(0, 100, &[]), core_with_work(1, 50, &[])];
        let report = build_report(&w, &cores);
        let s = &report.summary;
        assert_eq!(s.makespan, 100);
        assert_eq!(s.total, 150);
        assert_eq!(s.cost, 200);
        assert!((s.throughput - 1.5).abs() < 1e-9);
        assert!((s.slowdown - 2.0).abs() < 1e-9);
        assert!(s.cov > 0.0);
    }

    #[test]
    fn report_orders_tasks_by_waiting() {
        let mut w = Workload::new(1);
        let a = w.push_task(0, 2, 0, &[0, 0]);
        let b = w.push_task(1, 2, 0, &[0, 0]);
        w.task_mut(a).add_processed(2);
        w.task_mut(b).add_processed(2);
        w.task_mut(a).enter(10);
        w.finish(a);
        w.finish(b);

        let cores = vec![core_with_work(0, 4, &[])];
        let report = build_report(&w, &cores);
        assert_eq!(report.tasks[0].id, b.0);
        assert_eq!(report.tasks[1].id, a.0);
        assert_eq!(report.summary.waiting_sum, 10);
        let text = report.to_string();
        assert!(text.contains("waiting sum: 10"));
        assert!(text.contains("task 1 waited 0 work 2 (id 1)"));
    }
}
