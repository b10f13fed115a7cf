//! Parallel execution heuristics and configuration
//!
//! Chunk-parallel operator paths engage only when the row count makes the
//! coordination overhead worthwhile. Thresholds are picked from the hardware
//! tier and can be overridden via the STRATA_PARALLEL_THRESHOLD environment
//! variable.

use std::sync::OnceLock;

/// Global parallel configuration, initialized once on first access
static PARALLEL_CONFIG: OnceLock<ParallelConfig> = OnceLock::new();

/// Configuration for parallel execution decisions
#[derive(Debug, Clone)]
pub struct ParallelConfig {
    /// Number of worker threads available
    pub num_threads: usize,
    /// Thresholds for different operations based on hardware tier
    pub thresholds: ParallelThresholds,
}

/// Operation-specific row count thresholds for parallel execution
#[derive(Debug, Clone, Copy)]
pub struct ParallelThresholds {
    /// Threshold for scan/filter operations
    pub scan_filter: usize,
    /// Threshold for aggregation operations
    pub aggregate: usize,
    /// Threshold for join operations
    pub join: usize,
    /// Threshold for sort operations
    pub sort: usize,
}

impl ParallelConfig {
    /// Get or initialize the global parallel configuration
    pub fn global() -> &'static ParallelConfig {
        PARALLEL_CONFIG.get_or_init(Self::detect)
    }

    /// Detect hardware capabilities and create appropriate configuration
    fn detect() -> Self {
        #[cfg(feature = "parallel")]
        let num_threads = rayon::current_num_threads();
        #[cfg(not(feature = "parallel"))]
        let num_threads = 1;

        let thresholds = if let Ok(threshold_str) = std::env::var("STRATA_PARALLEL_THRESHOLD") {
            Self::parse_threshold_override(&threshold_str)
        } else {
            Self::thresholds_for_hardware(num_threads)
        };

        ParallelConfig { num_threads, thresholds }
    }

    /// Parse STRATA_PARALLEL_THRESHOLD.
    /// Supports:
    /// - Numbers: "5000" -> custom threshold for all operations
    /// - "max" or "disabled" -> effectively disable parallelism
    fn parse_threshold_override(threshold_str: &str) -> ParallelThresholds {
        let threshold_str = threshold_str.trim().to_lowercase();

        if threshold_str == "max" || threshold_str == "disabled" {
            ParallelThresholds {
                scan_filter: usize::MAX,
                aggregate: usize::MAX,
                join: usize::MAX,
                sort: usize::MAX,
            }
        } else if let Ok(threshold) = threshold_str.parse::<usize>() {
            ParallelThresholds {
                scan_filter: threshold,
                aggregate: threshold,
                join: threshold,
                sort: threshold,
            }
        } else {
            Self::thresholds_for_hardware(Self::global_thread_count())
        }
    }

    fn global_thread_count() -> usize {
        #[cfg(feature = "parallel")]
        let count = rayon::current_num_threads();
        #[cfg(not(feature = "parallel"))]
        let count = 1;
        count
    }

    /// Determine appropriate thresholds based on hardware tier
    fn thresholds_for_hardware(num_threads: usize) -> ParallelThresholds {
        match num_threads {
            // Single core: never parallelize
            1 => ParallelThresholds {
                scan_filter: usize::MAX,
                aggregate: usize::MAX,
                join: usize::MAX,
                sort: usize::MAX,
            },
            // 2-3 cores: very conservative (most overhead from coordination)
            2..=3 => ParallelThresholds {
                scan_filter: 20_000,
                aggregate: 25_000,
                join: 30_000,
                sort: 30_000,
            },
            // 4-7 cores: moderate thresholds
            4..=7 => ParallelThresholds {
                scan_filter: 5_000,
                aggregate: 7_500,
                join: 10_000,
                sort: 10_000,
            },
            // 8+ cores: aggressive thresholds
            _ => ParallelThresholds {
                scan_filter: 2_000,
                aggregate: 3_000,
                join: 5_000,
                sort: 5_000,
            },
        }
    }

    /// Check if parallel execution should be used for a scan/filter operation
    pub fn should_parallelize_scan(&self, row_count: usize) -> bool {
        row_count >= self.thresholds.scan_filter
    }

    /// Check if parallel execution should be used for an aggregation
    pub fn should_parallelize_aggregate(&self, row_count: usize) -> bool {
        row_count >= self.thresholds.aggregate
    }

    /// Check if parallel execution should be used for a join
    pub fn should_parallelize_join(&self, row_count: usize) -> bool {
        row_count >= self.thresholds.join
    }

    /// Check if parallel execution should be used for a sort
    pub fn should_parallelize_sort(&self, row_count: usize) -> bool {
        row_count >= self.thresholds.sort
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_core_never_parallelizes() {
        let thresholds = ParallelConfig::thresholds_for_hardware(1);
        assert_eq!(thresholds.scan_filter, usize::MAX);
    }

    #[test]
    fn test_override_parsing() {
        let thresholds = ParallelConfig::parse_threshold_override("disabled");
        assert_eq!(thresholds.join, usize::MAX);
        let thresholds = ParallelConfig::parse_threshold_override("4000");
        assert_eq!(thresholds.sort, 4000);
    }
}
