//! Analysis run bookkeeping types.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{AssetId, CoreError};

/// Upper bound on per-asset errors kept in a run's diagnostics.
pub const MAX_DIAGNOSTIC_ERRORS: usize = 10;

/// Lifecycle status of an analysis run. `Running` is the only non-terminal
/// state; a run moves out of it exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Complete,
    Skipped,
    Failed,
}

impl RunStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Complete => "complete",
            RunStatus::Skipped => "skipped",
            RunStatus::Failed => "failed",
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "complete" => Ok(RunStatus::Complete),
            "skipped" => Ok(RunStatus::Skipped),
            "failed" => Ok(RunStatus::Failed),
            other => Err(CoreError::UnknownRunStatus(other.to_string())),
        }
    }
}

/// Stable, machine-readable reason a pass performed no analysis.
///
/// Variants are listed in evaluation priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    OpenaiNotConfigured,
    NoQualifiedScopedPosts,
    NoQualifiedMediaAssets,
    NoDownloadedAssets,
    NoUnanalyzedMedia,
}

impl SkipReason {
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            SkipReason::OpenaiNotConfigured => "openai_not_configured",
            SkipReason::NoQualifiedScopedPosts => "no_qualified_scoped_posts",
            SkipReason::NoQualifiedMediaAssets => "no_qualified_media_assets",
            SkipReason::NoDownloadedAssets => "no_downloaded_assets",
            SkipReason::NoUnanalyzedMedia => "no_unanalyzed_media",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for SkipReason {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai_not_configured" => Ok(SkipReason::OpenaiNotConfigured),
            "no_qualified_scoped_posts" => Ok(SkipReason::NoQualifiedScopedPosts),
            "no_qualified_media_assets" => Ok(SkipReason::NoQualifiedMediaAssets),
            "no_downloaded_assets" => Ok(SkipReason::NoDownloadedAssets),
            "no_unanalyzed_media" => Ok(SkipReason::NoUnanalyzedMedia),
            other => Err(CoreError::UnknownSkipReason(other.to_string())),
        }
    }
}

/// Point-in-time counters for a job's analysis scope.
///
/// Always recomputed from storage, never incremented in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeCounters {
    pub downloaded_total: i64,
    pub qualified_for_ai: i64,
    pub analysis_window: i64,
    pub analyzed_in_window: i64,
}

/// One failed asset analysis, as recorded in run diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetFailure {
    pub asset_id: AssetId,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_reason_codes_round_trip_through_from_str() {
        for reason in [
            SkipReason::OpenaiNotConfigured,
            SkipReason::NoQualifiedScopedPosts,
            SkipReason::NoQualifiedMediaAssets,
            SkipReason::NoDownloadedAssets,
            SkipReason::NoUnanalyzedMedia,
        ] {
            assert_eq!(reason.code().parse::<SkipReason>().unwrap(), reason);
        }
    }

    #[test]
    fn skip_reason_serializes_as_its_code() {
        let json = serde_json::to_string(&SkipReason::NoDownloadedAssets).unwrap();
        assert_eq!(json, "\"no_downloaded_assets\"");
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(matches!(
            "queued".parse::<RunStatus>(),
            Err(CoreError::UnknownRunStatus(ref s)) if s == "queued"
        ));
    }

    #[test]
    fn only_running_is_non_terminal() {
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Complete.is_terminal());
        assert!(RunStatus::Skipped.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
    }

    #[test]
    fn scope_counters_serialize_camel_case() {
        let counters = ScopeCounters {
            downloaded_total: 4,
            qualified_for_ai: 3,
            analysis_window: 2,
            analyzed_in_window: 1,
        };
        let json = serde_json::to_value(counters).unwrap();
        assert_eq!(json["downloadedTotal"], 4);
        assert_eq!(json["analyzedInWindow"], 1);
    }
}
