//! Alarm scheduling.
//!
//! Every template with an effective schedule owns exactly two timers, keyed
//! by `(template_id, edge)`. [`AlarmScheduler::reschedule_all`] re-derives the
//! whole set from the template list; registration is an upsert so running it
//! repeatedly never duplicates a timer. Delivery is best-effort and owned by
//! an [`AlarmBackend`]; missed firings are compensated by reconciliation.

mod timer;

pub use timer::TokioAlarmBackend;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::schedule::{current_window_end, next_end_occurrence, next_occurrence};
use crate::template::{Template, TemplateId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmEdge {
    Start,
    End,
}

impl fmt::Display for AlarmEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::End => write!(f, "end"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AlarmKey {
    pub template_id: TemplateId,
    pub edge: AlarmEdge,
}

impl AlarmKey {
    pub fn new(template_id: &str, edge: AlarmEdge) -> Self {
        Self {
            template_id: template_id.to_string(),
            edge,
        }
    }
}

impl fmt::Display for AlarmKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.template_id, self.edge)
    }
}

/// Signal delivered when a timer expires: Begin for `Start`, End for `End`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmFired {
    pub template_id: TemplateId,
    pub edge: AlarmEdge,
}

impl From<&AlarmKey> for AlarmFired {
    fn from(key: &AlarmKey) -> Self {
        Self {
            template_id: key.template_id.clone(),
            edge: key.edge,
        }
    }
}

/// Timer delivery mechanism.
pub trait AlarmBackend {
    /// Arm (or re-arm) the timer for `key`, replacing any earlier one.
    fn register(&mut self, key: &AlarmKey, at: NaiveDateTime);
    fn cancel(&mut self, key: &AlarmKey);
}

/// Backend that delivers nothing, for processes that exit right after
/// computing the timer set.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAlarmBackend;

impl AlarmBackend for NoopAlarmBackend {
    fn register(&mut self, _key: &AlarmKey, _at: NaiveDateTime) {}
    fn cancel(&mut self, _key: &AlarmKey) {}
}

/// Next start and end for one template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmPlan {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

/// Compute the two timers of a template, or `None` if it has no effective
/// schedule.
///
/// While a window is in progress the end timer targets that window's end;
/// otherwise it is the end of the next window.
pub fn plan_for(template: &Template, now: NaiveDateTime) -> Option<AlarmPlan> {
    let schedule = template.effective_schedule()?;
    let start = next_occurrence(schedule, now)?;
    let end = current_window_end(schedule, now).or_else(|| next_end_occurrence(schedule, now))?;
    Some(AlarmPlan { start, end })
}

/// Outcome of a full re-derivation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RescheduleSummary {
    /// Timers armed or re-armed.
    pub registered: usize,
    /// Timers already armed at the right time.
    pub unchanged: usize,
    pub cancelled: usize,
    pub next: Option<NaiveDateTime>,
}

pub struct AlarmScheduler<B> {
    backend: B,
    registrations: BTreeMap<AlarmKey, NaiveDateTime>,
}

impl<B: AlarmBackend> AlarmScheduler<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            registrations: BTreeMap::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Armed timers in key order.
    pub fn registrations(&self) -> impl Iterator<Item = (&AlarmKey, &NaiveDateTime)> {
        self.registrations.iter()
    }

    pub fn get(&self, key: &AlarmKey) -> Option<NaiveDateTime> {
        self.registrations.get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Earliest armed timer.
    pub fn next_due(&self) -> Option<(&AlarmKey, NaiveDateTime)> {
        self.registrations
            .iter()
            .min_by_key(|(_, at)| **at)
            .map(|(k, at)| (k, *at))
    }

    /// Upsert one timer. Returns `false` if it was already armed for `at`.
    pub fn register(&mut self, key: AlarmKey, at: NaiveDateTime) -> bool {
        if self.registrations.get(&key) == Some(&at) {
            return false;
        }
        self.backend.register(&key, at);
        tracing::debug!(key = %key, at = %at, "alarm registered");
        self.registrations.insert(key, at);
        true
    }

    pub fn cancel(&mut self, key: &AlarmKey) -> bool {
        if self.registrations.remove(key).is_none() {
            return false;
        }
        self.backend.cancel(key);
        tracing::debug!(key = %key, "alarm cancelled");
        true
    }

    /// Forget a timer the backend has already delivered, so the next
    /// re-derivation arms it again even if the computed time is unchanged.
    pub fn mark_fired(&mut self, fired: &AlarmFired) {
        self.registrations
            .remove(&AlarmKey::new(&fired.template_id, fired.edge));
    }

    /// Cancel both timers of a template.
    pub fn cancel_template(&mut self, template_id: &str) -> usize {
        [AlarmEdge::Start, AlarmEdge::End]
            .into_iter()
            .filter(|&edge| self.cancel(&AlarmKey::new(template_id, edge)))
            .count()
    }

    /// Recompute and re-register the timers of every template; cancel the
    /// timers of templates that lost their schedule or no longer exist.
    pub fn reschedule_all(&mut self, templates: &[Template], now: NaiveDateTime) -> RescheduleSummary {
        let mut summary = RescheduleSummary::default();
        let mut live = BTreeSet::new();

        for template in templates {
            match plan_for(template, now) {
                Some(plan) => {
                    for (edge, at) in [(AlarmEdge::Start, plan.start), (AlarmEdge::End, plan.end)] {
                        let key = AlarmKey::new(&template.id, edge);
                        live.insert(key.clone());
                        if self.register(key, at) {
                            summary.registered += 1;
                        } else {
                            summary.unchanged += 1;
                        }
                    }
                }
                None => summary.cancelled += self.cancel_template(&template.id),
            }
        }

        let stale: Vec<AlarmKey> = self
            .registrations
            .keys()
            .filter(|k| !live.contains(*k))
            .cloned()
            .collect();
        for key in stale {
            if self.cancel(&key) {
                summary.cancelled += 1;
            }
        }

        summary.next = self.next_due().map(|(_, at)| at);
        summary
    }
}
