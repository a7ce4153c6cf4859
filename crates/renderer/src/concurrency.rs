//! Concurrency planning module
//!
//! Resolves the configured capture parallelism against the machine's physical core count.

use crate::config::{Config, ParallelGames};

/// Concurrency plan derived from configuration and system resources
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencyPlan {
    /// Physical CPU cores detected on this machine
    pub physical_cores: u32,
    /// Maximum number of capture jobs running at once
    pub parallel_games: u32,
}

impl ConcurrencyPlan {
    /// Derive a concurrency plan from configuration
    ///
    /// `recommended` resolves to one capture per physical core; an explicit count is
    /// used unchanged. The result is never below one.
    pub fn derive(cfg: &Config) -> Self {
        Self::derive_with_cores(cfg, num_cpus::get_physical() as u32)
    }

    /// Derive a plan against a known core count
    pub fn derive_with_cores(cfg: &Config, physical_cores: u32) -> Self {
        let physical_cores = physical_cores.max(1);
        let parallel_games = match cfg.render.parallel_games {
            ParallelGames::Recommended => physical_cores,
            ParallelGames::Fixed(n) => n.max(1),
        };

        Self {
            physical_cores,
            parallel_games,
        }
    }
}

/// Public function to derive a concurrency plan from configuration
pub fn derive_plan(cfg: &Config) -> ConcurrencyPlan {
    ConcurrencyPlan::derive(cfg)
}
