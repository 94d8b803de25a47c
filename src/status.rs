//! Per-file processing decision.
//!
//! [`decide`] is evaluated once per file, before any image is loaded or any
//! model is called. It is the only place a record's status is cleared or an
//! identifier assigned, and together with the persisted status it guarantees
//! a file is successfully generated at most once across any number of runs
//! unless a reprocess mode is explicitly requested.

use crate::models::{CanonicalRecord, FileId, Status};

/// Opt-in reprocessing switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusPolicy {
    /// Regenerate every file regardless of status.
    pub reprocess_all: bool,
    /// Regenerate files previously marked failed.
    pub reprocess_failed: bool,
    /// Mark orphans (identifier + keywords, no status) successful without
    /// regenerating them.
    pub repair_orphans: bool,
}

impl Default for StatusPolicy {
    fn default() -> Self {
        Self {
            reprocess_all: false,
            reprocess_failed: false,
            repair_orphans: true,
        }
    }
}

/// Why a file is being (re)generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProceedReason {
    /// No identifier yet; one was just assigned.
    NewFile,
    /// Full reprocess requested.
    Reprocess,
    /// Previous attempt ended in `retry`.
    Retry,
    /// Previous attempt failed and failed files are being reprocessed.
    ReprocessFailed,
    /// Identifier present but no keywords; an earlier attempt never finished.
    Incomplete,
}

/// Why a file is left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyTagged,
    Failed,
    Complete,
}

/// Outcome of [`decide`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Generate metadata for the updated record.
    Proceed {
        record: CanonicalRecord,
        reason: ProceedReason,
    },
    /// Persist the record (now carrying `Status::Success`) and skip generation.
    RepairOrphan(CanonicalRecord),
    /// Nothing to do for this file.
    Skip(SkipReason),
}

impl Decision {
    pub fn is_proceed(&self) -> bool {
        matches!(self, Decision::Proceed { .. })
    }
}

/// Decides whether a file needs processing.
///
/// Evaluated in order:
///
/// 1. No identifier: assign one, proceed
/// 2. Orphan with orphan repair on: mark successful and skip, unless a full
///    reprocess is requested (then fall through)
/// 3. `success`: skip, unless full reprocess (clear status, proceed)
/// 4. `retry` or full reprocess: clear status, proceed
/// 5. `failed`: proceed only when failed files are reprocessed
/// 6. No keywords: proceed
/// 7. Otherwise skip
pub fn decide(mut record: CanonicalRecord, policy: &StatusPolicy) -> Decision {
    if record.identifier.is_none() {
        record.identifier = Some(FileId::generate());
        return Decision::Proceed {
            record,
            reason: ProceedReason::NewFile,
        };
    }

    if record.is_orphan() && policy.repair_orphans && !policy.reprocess_all {
        record.status = Some(Status::Success);
        return Decision::RepairOrphan(record);
    }

    if record.status == Some(Status::Success) && !policy.reprocess_all {
        return Decision::Skip(SkipReason::AlreadyTagged);
    }

    if policy.reprocess_all || record.status == Some(Status::Retry) {
        let reason = if policy.reprocess_all {
            ProceedReason::Reprocess
        } else {
            ProceedReason::Retry
        };
        record.status = None;
        return Decision::Proceed { record, reason };
    }

    if record.status == Some(Status::Failed) {
        if policy.reprocess_failed {
            record.status = None;
            return Decision::Proceed {
                record,
                reason: ProceedReason::ReprocessFailed,
            };
        }
        return Decision::Skip(SkipReason::Failed);
    }

    if record.keywords.is_empty() {
        record.status = None;
        return Decision::Proceed {
            record,
            reason: ProceedReason::Incomplete,
        };
    }

    Decision::Skip(SkipReason::Complete)
}
