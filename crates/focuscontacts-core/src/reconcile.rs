//! Reconciliation: re-derive every timer, then begin the template whose
//! window contains "now" in case its start timer was missed.

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::alarm::{AlarmBackend, AlarmScheduler, RescheduleSummary};
use crate::engine::{ApplyReport, FocusEngine};
use crate::error::{FocusError, StoreError};
use crate::platform::Platform;
use crate::schedule::is_active_at;
use crate::state::AppState;
use crate::template::Template;

/// First template, in list order, whose effective schedule contains `now`.
///
/// Overlapping windows are resolved purely by list order.
pub fn find_active_template(templates: &[Template], now: NaiveDateTime) -> Option<&Template> {
    templates
        .iter()
        .find(|t| t.effective_schedule().is_some_and(|s| is_active_at(s, now)))
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub alarms: RescheduleSummary,
    /// Template whose window contains "now", if any.
    pub in_window: Option<String>,
    /// Begin was run for `in_window`.
    pub self_healed: Option<ApplyReport>,
    /// Begin for `in_window` was attempted and refused.
    #[serde(skip)]
    pub begin_error: Option<FocusError>,
}

impl ReconcileReport {
    pub fn began(&self) -> bool {
        self.self_healed.is_some()
    }
}

/// Re-register all timers for `state.templates` and, when `self_heal` is
/// set, begin the in-window template unless it is already applied.
/// `checkpoint` persists the snapshot of a self-healing begin.
///
/// An applied template whose window has passed is left applied; only its
/// end timer (or a user) ends it.
pub fn reconcile<P, B, F>(
    state: &mut AppState,
    engine: &mut FocusEngine<P>,
    scheduler: &mut AlarmScheduler<B>,
    now: NaiveDateTime,
    self_heal: bool,
    checkpoint: F,
) -> ReconcileReport
where
    P: Platform,
    B: AlarmBackend,
    F: FnOnce(&AppState) -> Result<(), StoreError>,
{
    let mut report = ReconcileReport {
        alarms: scheduler.reschedule_all(&state.templates, now),
        ..Default::default()
    };
    tracing::debug!(
        registered = report.alarms.registered,
        unchanged = report.alarms.unchanged,
        cancelled = report.alarms.cancelled,
        "alarms re-derived"
    );

    let Some(template_id) = find_active_template(&state.templates, now).map(|t| t.id.clone()) else {
        return report;
    };
    report.in_window = Some(template_id.clone());

    if !self_heal {
        tracing::debug!(template_id = %template_id, "in window, self-heal disabled");
        return report;
    }
    if state.session().is_applied(&template_id) {
        tracing::debug!(template_id = %template_id, "in window and already applied");
        return report;
    }

    tracing::info!(template_id = %template_id, "window active without session, beginning");
    match engine.begin_with(state, &template_id, checkpoint) {
        Ok(applied) => report.self_healed = Some(applied),
        Err(e) => {
            tracing::warn!(template_id = %template_id, error = %e, "self-heal begin failed");
            report.begin_error = Some(e);
        }
    }
    report
}
