//! Validated knobs for the scheduler, a single analysis pass, and backfill.
//!
//! Every struct exposes `clamped()`, which forces each field into its
//! documented bounds. Values built from config or API input go through it
//! before use.

use serde::{Deserialize, Serialize};

pub const LIMIT_MIN: usize = 1;
pub const LIMIT_MAX: usize = 50;
pub const DEFAULT_LIMIT: usize = 10;

pub const MAX_ASSETS_MIN: usize = 20;
pub const MAX_ASSETS_MAX: usize = 240;
pub const DEFAULT_MAX_ASSETS: usize = 60;

pub const MAX_POSTS_MIN: usize = 30;
pub const MAX_POSTS_MAX: usize = 300;
pub const DEFAULT_MAX_POSTS: usize = 90;

pub const INTERVAL_MINUTES_MIN: u64 = 1;
pub const DEFAULT_INTERVAL_MINUTES: u64 = 15;
pub const MAX_JOBS_PER_CYCLE_MAX: usize = 50;
pub const DEFAULT_MAX_JOBS_PER_CYCLE: usize = 3;

pub const BACKFILL_CYCLES_MIN: u32 = 1;
pub const BACKFILL_CYCLES_MAX: u32 = 100;
pub const DEFAULT_BACKFILL_CYCLES: u32 = 10;
pub const DEFAULT_TARGET_COVERAGE: f64 = 0.9;

/// Caps and flags for one orchestration pass. Persisted verbatim as the
/// run's `config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisSettings {
    /// Maximum assets analyzed in one pass.
    pub limit: usize,
    /// Hard cap on asset ids produced by prioritization.
    #[serde(rename = "maxAssets")]
    pub max_eligible_assets: usize,
    /// Hard cap on posts selected by prioritization.
    #[serde(rename = "maxPosts")]
    pub max_eligible_posts: usize,
    pub allow_degraded: bool,
    pub skip_already_analyzed: bool,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            max_eligible_assets: DEFAULT_MAX_ASSETS,
            max_eligible_posts: DEFAULT_MAX_POSTS,
            allow_degraded: false,
            skip_already_analyzed: true,
        }
    }
}

impl AnalysisSettings {
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            limit: self.limit.clamp(LIMIT_MIN, LIMIT_MAX),
            max_eligible_assets: self
                .max_eligible_assets
                .clamp(MAX_ASSETS_MIN, MAX_ASSETS_MAX),
            max_eligible_posts: self.max_eligible_posts.clamp(MAX_POSTS_MIN, MAX_POSTS_MAX),
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    pub enabled: bool,
    pub interval_minutes: u64,
    pub max_jobs_per_cycle: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            max_jobs_per_cycle: DEFAULT_MAX_JOBS_PER_CYCLE,
        }
    }
}

impl SchedulerSettings {
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            enabled: self.enabled,
            interval_minutes: self.interval_minutes.max(INTERVAL_MINUTES_MIN),
            max_jobs_per_cycle: self.max_jobs_per_cycle.clamp(1, MAX_JOBS_PER_CYCLE_MAX),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BackfillSettings {
    pub max_cycles: u32,
    /// Fraction in `[0, 1]` of eligible assets that must carry an analysis
    /// before backfill stops early.
    pub target_coverage: f64,
}

impl Default for BackfillSettings {
    fn default() -> Self {
        Self {
            max_cycles: DEFAULT_BACKFILL_CYCLES,
            target_coverage: DEFAULT_TARGET_COVERAGE,
        }
    }
}

impl BackfillSettings {
    #[must_use]
    pub fn clamped(self) -> Self {
        let target_coverage = if self.target_coverage.is_nan() {
            DEFAULT_TARGET_COVERAGE
        } else {
            self.target_coverage.clamp(0.0, 1.0)
        };
        Self {
            max_cycles: self.max_cycles.clamp(BACKFILL_CYCLES_MIN, BACKFILL_CYCLES_MAX),
            target_coverage,
        }
    }
}
