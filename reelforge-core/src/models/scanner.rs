//! Scan-job records consumed by the Scanner Job Coordinator (C10).
//!
//! The scan itself (walking a library's filesystem, probing files) is an
//! external collaborator; the core only reconciles the persisted row against
//! the in-memory scanner that is (or isn't) running for it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{LibraryId, ScanJobId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Queued,
    Running,
    Paused,
    Completed,
    Failed,
}

impl ScanStatus {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Paused)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A persisted scan-job row. At most one row per `library_id` may sit in
/// `{running, paused}` at a time (§3 invariant), which the coordinator (C10)
/// enforces rather than the database schema, since "which one wins" requires
/// comparing progress between candidate rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: ScanJobId,
    pub library_id: LibraryId,
    pub status: ScanStatus,
    pub files_found: u64,
    pub files_processed: u64,
    pub updated_at: DateTime<Utc>,
}

impl ScanJob {
    #[must_use]
    pub fn new(library_id: LibraryId) -> Self {
        Self {
            id: ScanJobId::new(),
            library_id,
            status: ScanStatus::Queued,
            files_found: 0,
            files_processed: 0,
            updated_at: Utc::now(),
        }
    }

    /// Percent complete, 0.0 when `files_found` is unknown (zero).
    #[must_use]
    pub fn percent_complete(&self) -> f64 {
        if self.files_found == 0 {
            0.0
        } else {
            (self.files_processed as f64 / self.files_found as f64) * 100.0
        }
    }

    /// "Significant progress" per §4.10.5: `files_processed >= min_files` or
    /// `percent >= min_percent`. Used by the coordinator to decide whether a
    /// paused job should be auto-resumed.
    #[must_use]
    pub fn has_significant_progress(&self, min_files: u64, min_percent: f64) -> bool {
        self.files_processed >= min_files || self.percent_complete() >= min_percent
    }

    /// Ranks two non-terminal rows for the same library so the coordinator
    /// can keep the one with the most progress and retire the rest (§4.10.3).
    #[must_use]
    pub fn has_more_progress_than(&self, other: &Self) -> bool {
        let mine = self.files_processed.max(self.percent_complete() as u64);
        let theirs = other.files_processed.max(other.percent_complete() as u64);
        mine > theirs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_complete_with_zero_found_is_zero() {
        let job = ScanJob::new(LibraryId::from_string("L1".to_string()));
        assert_eq!(job.percent_complete(), 0.0);
    }

    #[test]
    fn significant_progress_by_file_count() {
        let mut job = ScanJob::new(LibraryId::from_string("L1".to_string()));
        job.files_found = 10_000;
        job.files_processed = 500;
        assert!(job.has_significant_progress(10, 1.0));
    }

    #[test]
    fn insignificant_progress_below_both_thresholds() {
        let mut job = ScanJob::new(LibraryId::from_string("L1".to_string()));
        job.files_found = 10_000;
        job.files_processed = 3;
        assert!(!job.has_significant_progress(10, 1.0));
    }

    #[test]
    fn more_progress_wins_tiebreak() {
        let mut a = ScanJob::new(LibraryId::from_string("L1".to_string()));
        a.files_found = 100;
        a.files_processed = 50;
        let mut b = ScanJob::new(LibraryId::from_string("L1".to_string()));
        b.files_found = 100;
        b.files_processed = 10;
        assert!(a.has_more_progress_than(&b));
        assert!(!b.has_more_progress_than(&a));
    }
}
