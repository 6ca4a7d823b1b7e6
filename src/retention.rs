// Count-based retention for one archive tier.
// The newest `max_count` records are kept; every other record is handed to the
// caller's delete function. Deletions are independent: a failure is recorded and
// the batch continues. Tiers are enforced separately, never against each other.

use crate::models::{ArchiveRecord, RetentionPolicy};
use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use tracing::{info, warn};

/// Keep/delete split computed before any deletion runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    /// Newest first.
    pub keep: Vec<ArchiveRecord>,
    /// Newest first.
    pub delete: Vec<ArchiveRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteError {
    pub record: ArchiveRecord,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub kept: Vec<ArchiveRecord>,
    pub deleted: Vec<ArchiveRecord>,
    pub delete_errors: Vec<DeleteError>,
}

impl RetentionReport {
    pub fn is_clean(&self) -> bool {
        self.delete_errors.is_empty()
    }
}

/// Pure split: sort newest first, collapse duplicate names, keep the first `max_count`.
pub fn plan(records: &[ArchiveRecord], policy: &RetentionPolicy) -> RetentionPlan {
    let mut ordered = records.to_vec();
    ordered.sort_by(ArchiveRecord::newest_first);
    let mut seen = HashSet::new();
    ordered.retain(|r| seen.insert(r.name.clone()));

    let split = policy.max_count.min(ordered.len());
    let delete = ordered.split_off(split);
    RetentionPlan {
        keep: ordered,
        delete,
    }
}

pub fn enforce<F, E>(
    records: &[ArchiveRecord],
    policy: &RetentionPolicy,
    mut delete_fn: F,
) -> RetentionReport
where
    F: FnMut(&ArchiveRecord) -> Result<(), E>,
    E: Display,
{
    let RetentionPlan { keep, delete } = plan(records, policy);
    let mut report = RetentionReport {
        kept: keep,
        ..Default::default()
    };
    for record in delete {
        let outcome = delete_fn(&record);
        settle(&mut report, record, outcome);
    }
    log_report(&report, policy);
    report
}

/// `enforce` for stores whose delete is async (the remote tier).
pub async fn enforce_async<F, Fut, E>(
    records: &[ArchiveRecord],
    policy: &RetentionPolicy,
    mut delete_fn: F,
) -> RetentionReport
where
    F: FnMut(ArchiveRecord) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let RetentionPlan { keep, delete } = plan(records, policy);
    let mut report = RetentionReport {
        kept: keep,
        ..Default::default()
    };
    for record in delete {
        let outcome = delete_fn(record.clone()).await;
        settle(&mut report, record, outcome);
    }
    log_report(&report, policy);
    report
}

fn settle<E: Display>(report: &mut RetentionReport, record: ArchiveRecord, outcome: Result<(), E>) {
    match outcome {
        Ok(()) => {
            info!(archive = %record.name, tier = %record.tier, "pruned archive");
            report.deleted.push(record);
        }
        Err(e) => {
            warn!(
                archive = %record.name,
                tier = %record.tier,
                error = %e,
                operation = "prune",
                "failed to delete archive"
            );
            report.delete_errors.push(DeleteError {
                record,
                reason: e.to_string(),
            });
        }
    }
}

fn log_report(report: &RetentionReport, policy: &RetentionPolicy) {
    info!(
        max_count = policy.max_count,
        kept = report.kept.len(),
        deleted = report.deleted.len(),
        failed = report.delete_errors.len(),
        "retention enforced"
    );
}
