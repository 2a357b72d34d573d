//! The sequential per-asset analysis loop.

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use reelscope_core::{AnalysisContext, AssetFailure, AssetId, JobId, MediaAsset, MAX_DIAGNOSTIC_ERRORS};

use crate::events::{EventLevel, JobEvent, CODE_ASSET_FAILED};
use crate::ports::{AssetAnalyzer, EventEmitter};

/// One asset queued for analysis with its prompt context.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub asset: MediaAsset,
    pub context: AnalysisContext,
}

/// Counts from one pass of the loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionTally {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// First [`MAX_DIAGNOSTIC_ERRORS`] failures, in loop order.
    pub failures: Vec<AssetFailure>,
}

impl ExecutionTally {
    fn record_failure(&mut self, asset_id: AssetId, error: String) {
        self.failed += 1;
        if self.failures.len() < MAX_DIAGNOSTIC_ERRORS {
            self.failures.push(AssetFailure { asset_id, error });
        }
    }
}

/// Analyzes `items` one at a time.
///
/// A failed verdict, a collaborator error and a panic inside the analyzer
/// all count as a failure for that asset; the loop always continues.
pub async fn execute_window(
    analyzer: &dyn AssetAnalyzer,
    events: &dyn EventEmitter,
    job_id: JobId,
    items: &[WorkItem],
) -> ExecutionTally {
    let mut tally = ExecutionTally::default();

    for item in items {
        let asset_id = item.asset.id;
        tally.attempted += 1;

        let result = AssertUnwindSafe(analyzer.analyze(&item.asset, &item.context))
            .catch_unwind()
            .await;

        let error = match result {
            Ok(Ok(verdict)) if verdict.success => {
                tally.succeeded += 1;
                tracing::debug!(job_id, asset_id, "orchestrator: asset analyzed");
                continue;
            }
            Ok(Ok(verdict)) => verdict
                .error
                .unwrap_or_else(|| "analyzer reported failure".to_string()),
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("analyzer panicked: {}", panic_message(panic.as_ref())),
        };

        tracing::warn!(
            job_id,
            asset_id,
            source = item.context.source.as_str(),
            error = %error,
            "orchestrator: asset analysis failed"
        );
        events.emit(
            JobEvent::new(
                job_id,
                CODE_ASSET_FAILED,
                EventLevel::Warn,
                format!("analysis failed for media asset {asset_id}"),
            )
            .with_metadata(serde_json::json!({
                "assetId": asset_id,
                "source": item.context.source,
                "error": error,
            })),
        );
        tally.record_failure(asset_id, error);
    }

    tally
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
