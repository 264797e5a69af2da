//! Results of per-object transfers and of a whole run.

use crate::{
    errors::{MarkerDeleteError, MoveError},
    models::blob::BlobRef,
};
use std::{fmt, time::Duration};

/// Outcome of processing one listed blob.
#[derive(Debug)]
pub struct MoveResult {
    pub blob: BlobRef,
    /// Name the blob was (or would have been) written to in the destination container.
    pub destination: String,
    pub outcome: Result<(), MoveError>,
}

impl MoveResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// What happened to the source marker object after the transfers finished.
#[derive(Debug)]
pub enum MarkerOutcome {
    Deleted,
    /// The store reported no marker object to delete.
    Missing,
    /// The marker policy kept the marker because some transfers failed.
    Skipped,
    /// Copy-only runs never touch the marker.
    NotApplicable,
    Failed(MarkerDeleteError),
}

impl fmt::Display for MarkerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerOutcome::Deleted => write!(f, "marker deleted"),
            MarkerOutcome::Missing => write!(f, "no marker present"),
            MarkerOutcome::Skipped => write!(f, "marker kept after failures"),
            MarkerOutcome::NotApplicable => write!(f, "marker untouched"),
            MarkerOutcome::Failed(err) => write!(f, "{err}"),
        }
    }
}

/// Aggregate of a finished archive or copy run.
#[derive(Debug)]
pub struct Summary {
    pub moved: usize,
    pub failed: usize,
    pub elapsed: Duration,
    /// Every unsuccessful result, in completion order.
    pub failures: Vec<MoveResult>,
    pub marker: MarkerOutcome,
}

impl Summary {
    /// Fold per-object results into counts. The marker outcome is settled
    /// afterwards, once the caller knows whether any transfer failed.
    pub fn from_results(results: Vec<MoveResult>) -> Self {
        let total = results.len();
        let failures: Vec<MoveResult> = results.into_iter().filter(|r| !r.is_success()).collect();
        Self {
            moved: total - failures.len(),
            failed: failures.len(),
            elapsed: Duration::ZERO,
            failures,
            marker: MarkerOutcome::NotApplicable,
        }
    }

    pub fn total(&self) -> usize {
        self.moved + self.failed
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0 && !matches!(self.marker, MarkerOutcome::Failed(_))
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed in {:.4}s ({})",
            self.moved,
            self.failed,
            self.elapsed.as_secs_f64(),
            self.marker
        )
    }
}
