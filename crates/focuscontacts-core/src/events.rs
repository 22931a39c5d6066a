use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alarm::AlarmEdge;
use crate::template::TemplateId;

/// Every state change the automation performs produces an Event.
/// The CLI prints them; the daemon logs them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A template was applied (or re-applied without a new snapshot).
    FocusBegan {
        template_id: TemplateId,
        snapshot_captured: bool,
        failed_items: usize,
        at: DateTime<Utc>,
    },
    /// A template was ended and the snapshot consumed.
    FocusEnded {
        template_id: TemplateId,
        stars_restored: bool,
        failed_items: usize,
        at: DateTime<Utc>,
    },
    /// Begin of `to` ended `from` first.
    HandOff {
        from: TemplateId,
        to: TemplateId,
        at: DateTime<Utc>,
    },
    /// Begin/End could not run; the user was asked to grant access.
    PermissionNeeded {
        template_id: TemplateId,
        reason: String,
        at: DateTime<Utc>,
    },
    /// A timer fired.
    AlarmFired {
        template_id: TemplateId,
        edge: AlarmEdge,
        at: DateTime<Utc>,
    },
    /// The timer set was re-derived.
    AlarmsRescheduled {
        registered: usize,
        cancelled: usize,
        next: Option<NaiveDateTime>,
        at: DateTime<Utc>,
    },
    /// Reconciliation found "now" inside a window and began the template.
    SelfHealed {
        template_id: TemplateId,
        at: DateTime<Utc>,
    },
}
