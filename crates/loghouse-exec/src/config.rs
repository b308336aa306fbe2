//! Runtime Configuration
//!
//! Knobs for query execution, with the defaults the rest of the engine
//! assumes. Every limit can be overridden per query; AST nodes that carry
//! their own limit (sort, group-by) fall back to these when the node says 0.

use std::time::Duration;

/// Configures compilation and the running proc graph.
#[derive(Debug, Clone)]
pub struct ExecConfig {
    /// Records per outbound batch (default: 100). Small enough that a
    /// serialized batch stays well under typical network frame limits while
    /// still amortizing per-batch overhead.
    pub batch_size: usize,

    /// Maximum records the sort stage will buffer before it degrades to
    /// passthrough with a warning (default: 1,000,000).
    pub sort_limit: usize,

    /// Maximum distinct groups a group-by will track before it discards new
    /// groups with a warning (default: 1,000,000).
    pub group_limit: usize,

    /// Whether null sort keys order after every non-null value
    /// (default: true).
    pub nulls_max: bool,

    /// Invert sort direction and read time-ordered sources tail-first.
    pub reverse: bool,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            sort_limit: 1_000_000,
            group_limit: 1_000_000,
            nulls_max: true,
            reverse: false,
        }
    }
}

/// Configures the driver loop.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Cadence of periodic scanner-stats control events (default: 500 ms).
    pub stats_interval: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            stats_interval: Duration::from_millis(500),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exec_defaults() {
        let config = ExecConfig::default();
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.sort_limit, 1_000_000);
        assert_eq!(config.group_limit, 1_000_000);
        assert!(config.nulls_max);
        assert!(!config.reverse);
    }

    #[test]
    fn test_driver_defaults() {
        assert_eq!(
            DriverConfig::default().stats_interval,
            Duration::from_millis(500)
        );
    }
}
