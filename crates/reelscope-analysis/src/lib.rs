//! Content analysis orchestration: prioritization, readiness gates, the
//! per-job pass, backfill, and adapters for the systems a pass talks to.

pub mod backfill;
pub mod error;
pub mod events;
pub mod execution;
pub mod http;
pub mod ledger;
pub mod orchestrator;
pub mod pg;
pub mod ports;
pub mod prioritize;
pub mod readiness;
mod wiring;

#[cfg(test)]
mod fakes;

pub use backfill::{run_backfill, BackfillReport, BackfillStop};
pub use error::{AnalysisError, CollaboratorError, StoreError};
pub use events::{EventLevel, JobEvent};
pub use http::{HttpAssetAnalyzer, HttpPoolProvider, HttpSettings};
pub use orchestrator::{Collaborators, Orchestrator, PassOutcome};
pub use pg::{PgEventEmitter, PgMediaStore, PgRunLedger};
pub use ports::{AnalyzerVerdict, AssetAnalyzer, EventEmitter, MediaStore, PoolProvider, RunLedger};
pub use prioritize::{prioritize, PrioritizationParams, Selection, SelectionLane};
pub use reelscope_db::RunFinalization;
pub use wiring::build_orchestrator;
