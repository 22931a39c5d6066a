//! Per-item results of Begin and End.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::template::TemplateId;

/// One external mutation attempted by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOperation {
    ReadStarred,
    Unstar,
    Star,
    SetPolicy,
    SetFilter,
}

/// Outcome of a single item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Success,
    /// The collaborator refused; processing continued with the next item
    Failed { reason: String },
    /// Not attempted
    Skipped { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
    /// Lookup key, contact name, or `"policy"` / `"filter"`
    pub target: String,
    pub operation: ItemOperation,
    pub status: ItemStatus,
}

impl ItemResult {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, ItemStatus::Failed { .. })
    }
}

/// Collects item results while a sequence of best-effort mutations runs.
#[derive(Debug, Default)]
pub(crate) struct ItemLog {
    items: Vec<ItemResult>,
}

impl ItemLog {
    pub(crate) fn record<E: std::fmt::Display>(
        &mut self,
        target: &str,
        operation: ItemOperation,
        outcome: Result<(), E>,
    ) {
        let status = match outcome {
            Ok(()) => ItemStatus::Success,
            Err(e) => {
                tracing::warn!(target_item = target, ?operation, error = %e, "item failed, continuing");
                ItemStatus::Failed { reason: e.to_string() }
            }
        };
        self.items.push(ItemResult {
            target: target.to_string(),
            operation,
            status,
        });
    }

    pub(crate) fn skip(&mut self, target: &str, operation: ItemOperation, reason: &str) {
        tracing::debug!(target_item = target, ?operation, reason, "item skipped");
        self.items.push(ItemResult {
            target: target.to_string(),
            operation,
            status: ItemStatus::Skipped {
                reason: reason.to_string(),
            },
        });
    }

    pub(crate) fn finish(self) -> Vec<ItemResult> {
        self.items
    }
}

fn count(items: &[ItemResult], pred: impl Fn(&ItemStatus) -> bool) -> usize {
    items.iter().filter(|r| pred(&r.status)).count()
}

/// What Begin did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyReport {
    pub template_id: TemplateId,
    pub executed_at: DateTime<Utc>,
    /// A previously applied template that was ended first.
    pub handed_off_from: Option<RestoreReport>,
    /// False when the template was already applied and the existing
    /// snapshot was kept.
    pub snapshot_captured: bool,
    pub items: Vec<ItemResult>,
}

impl ApplyReport {
    pub fn success_count(&self) -> usize {
        count(&self.items, |s| matches!(s, ItemStatus::Success))
    }

    pub fn failure_count(&self) -> usize {
        count(&self.items, |s| matches!(s, ItemStatus::Failed { .. }))
    }

    pub fn skipped_count(&self) -> usize {
        count(&self.items, |s| matches!(s, ItemStatus::Skipped { .. }))
    }
}

/// What End did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreReport {
    pub template_id: TemplateId,
    pub executed_at: DateTime<Utc>,
    pub stars_restored: bool,
    pub items: Vec<ItemResult>,
}

impl RestoreReport {
    pub fn success_count(&self) -> usize {
        count(&self.items, |s| matches!(s, ItemStatus::Success))
    }

    pub fn failure_count(&self) -> usize {
        count(&self.items, |s| matches!(s, ItemStatus::Failed { .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EndOutcome {
    /// The template was not applied; nothing happened.
    NotApplied,
    Restored(RestoreReport),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformError;

    #[test]
    fn item_log_counts() {
        let mut log = ItemLog::default();
        log.record::<PlatformError>("lk-a", ItemOperation::Star, Ok(()));
        log.record("lk-b", ItemOperation::Star, Err(PlatformError::ContactNotFound("lk-b".into())));
        log.skip("Bob", ItemOperation::Star, "no contact reference");

        let report = ApplyReport {
            template_id: "t".into(),
            executed_at: Utc::now(),
            handed_off_from: None,
            snapshot_captured: true,
            items: log.finish(),
        };
        assert_eq!(report.success_count(), 1);
        assert_eq!(report.failure_count(), 1);
        assert_eq!(report.skipped_count(), 1);
        assert!(report.items[1].is_failure());
    }

    #[test]
    fn status_serializes_tagged() {
        let v = serde_json::to_value(ItemStatus::Failed { reason: "x".into() }).unwrap();
        assert_eq!(v["status"], "failed");
        assert_eq!(v["reason"], "x");
    }
}
