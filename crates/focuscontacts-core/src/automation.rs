//! The automation: persisted state, the focus engine and the alarm
//! scheduler behind one `&mut self` API.
//!
//! Every public operation is a transaction: take the store lock, reload the
//! state and the platform, run, then flush the platform. Other processes
//! sharing the data directory therefore never interleave with it. Every
//! template-set mutation is persisted and followed by a full timer
//! re-derivation. Begin persists its snapshot before touching the device.

use chrono::{NaiveDateTime, Utc};

use crate::alarm::{AlarmBackend, AlarmEdge, AlarmFired, AlarmKey, AlarmScheduler, RescheduleSummary};
use crate::engine::{ApplyReport, EndOutcome, FocusEngine, RestoreReport};
use crate::error::{CoreError, Result, ValidationError};
use crate::events::Event;
use crate::platform::{PickedContact, Platform, PlatformSync};
use crate::reconcile::{reconcile, ReconcileReport};
use crate::schedule::now_local;
use crate::state::{AppState, ThemeMode};
use crate::storage::{Config, StateStore, StoreLock};
use crate::template::{AllowedContact, Template, TemplatePatch};

pub struct Automation<P, B> {
    state: AppState,
    store: StateStore,
    engine: FocusEngine<P>,
    scheduler: AlarmScheduler<B>,
    config: Config,
    clock: fn() -> NaiveDateTime,
}

impl<P: Platform, B: AlarmBackend> Automation<P, B> {
    /// Load the persisted state and wire the collaborators together.
    /// No timers are registered until the first mutation or reconcile.
    pub fn open(store: StateStore, platform: P, backend: B, config: Config) -> Result<Self> {
        let state = store.load()?;
        let engine = FocusEngine::new(platform).with_notifications(config.notifications.enabled);
        Ok(Self {
            state,
            store,
            engine,
            scheduler: AlarmScheduler::new(backend),
            config,
            clock: now_local,
        })
    }

    /// Replace the wall clock used for scheduling.
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    /// State as of the last operation.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn platform(&self) -> &P {
        self.engine.platform()
    }

    pub fn platform_mut(&mut self) -> &mut P {
        self.engine.platform_mut()
    }

    pub fn scheduler(&self) -> &AlarmScheduler<B> {
        &self.scheduler
    }

    /// Consume the automation, returning the platform.
    pub fn into_platform(self) -> P {
        self.engine.into_platform()
    }

    fn lock_and_reload(&mut self) -> Result<StoreLock> {
        let lock = self.store.lock()?;
        self.state = self.store.load()?;
        self.engine.platform_mut().reload()?;
        Ok(lock)
    }

    /// Run `op` under the store lock against freshly loaded state.
    ///
    /// The platform is flushed even when `op` fails, since a failed
    /// hand-off may already have restored the previous template.
    fn transaction<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let _lock = self.lock_and_reload()?;
        let result = op(self);
        let flushed = self.engine.platform().flush();
        match (result, flushed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e.into()),
            (Err(e), flushed) => {
                if let Err(flush_err) = flushed {
                    tracing::warn!(error = %flush_err, "platform flush failed");
                }
                Err(e)
            }
        }
    }

    fn persist(&self) -> Result<()> {
        self.store.save(&self.state)?;
        Ok(())
    }

    /// Recompute every timer from the in-memory template set.
    pub fn reschedule(&mut self) -> RescheduleSummary {
        let now = self.now();
        self.scheduler.reschedule_all(&self.state.templates, now)
    }

    fn commit(&mut self) -> Result<RescheduleSummary> {
        self.persist()?;
        Ok(self.reschedule())
    }

    // ── Focus ────────────────────────────────────────────────────────

    pub fn begin(&mut self, template_id: &str) -> Result<ApplyReport> {
        self.transaction(|a| a.begin_locked(template_id))
    }

    fn begin_locked(&mut self, template_id: &str) -> Result<ApplyReport> {
        let store = &self.store;
        let outcome = self
            .engine
            .begin_with(&mut self.state, template_id, |state| store.save(state));
        // A hand-off may have ended the previous template before a failure.
        let persisted = self.persist();
        let report = outcome?;
        persisted?;
        Ok(report)
    }

    pub fn end(&mut self, template_id: &str) -> Result<EndOutcome> {
        self.transaction(|a| a.end_locked(template_id))
    }

    fn end_locked(&mut self, template_id: &str) -> Result<EndOutcome> {
        let outcome = self.engine.end(&mut self.state, template_id)?;
        if matches!(outcome, EndOutcome::Restored(_)) {
            self.persist()?;
        }
        Ok(outcome)
    }

    /// End whatever template is applied.
    pub fn end_applied(&mut self) -> Result<EndOutcome> {
        self.transaction(|a| match a.state.applied_template_id().map(str::to_string) {
            Some(id) => a.end_locked(&id),
            None => Ok(EndOutcome::NotApplied),
        })
    }

    /// Load, re-derive every timer and self-heal.
    pub fn reconcile(&mut self) -> Result<ReconcileReport> {
        self.transaction(Self::reconcile_locked)
    }

    fn reconcile_locked(&mut self) -> Result<ReconcileReport> {
        let now = self.now();
        let store = &self.store;
        let report = reconcile(
            &mut self.state,
            &mut self.engine,
            &mut self.scheduler,
            now,
            self.config.automation.self_heal,
            |state| store.save(state),
        );
        if report.began() {
            self.persist()?;
        }
        Ok(report)
    }

    /// Reload after an outside write and re-derive every timer.
    ///
    /// Unlike [`reconcile`](Self::reconcile) this never begins a template, so
    /// a focus ended elsewhere inside its window stays ended.
    pub fn resync(&mut self) -> Result<RescheduleSummary> {
        self.transaction(|a| Ok(a.reschedule()))
    }

    /// Run Begin or End for a fired timer, then reconcile.
    ///
    /// Never fails: there is nobody waiting on a timer, so errors become
    /// events and log lines. If the store lock or reload fails the alarm is
    /// handled against the in-memory state.
    pub fn handle_alarm(&mut self, fired: &AlarmFired) -> Vec<Event> {
        tracing::info!(template_id = %fired.template_id, edge = %fired.edge, "alarm fired");
        self.scheduler.mark_fired(fired);

        let lock = match self.lock_and_reload() {
            Ok(lock) => Some(lock),
            Err(e) => {
                tracing::warn!(error = %e, "state reload failed, using in-memory state");
                None
            }
        };
        let events = self.alarm_locked(fired);
        if lock.is_some() {
            if let Err(e) = self.engine.platform().flush() {
                tracing::warn!(error = %e, "platform flush after alarm failed");
            }
        }
        events
    }

    fn alarm_locked(&mut self, fired: &AlarmFired) -> Vec<Event> {
        let mut events = vec![Event::AlarmFired {
            template_id: fired.template_id.clone(),
            edge: fired.edge,
            at: Utc::now(),
        }];

        let result = match fired.edge {
            AlarmEdge::Start => self.begin_locked(&fired.template_id).map(|r| events_for_begin(&r)),
            AlarmEdge::End => self.end_locked(&fired.template_id).map(|o| events_for_end(&o)),
        };
        match result {
            Ok(more) => events.extend(more),
            Err(e) => {
                tracing::warn!(template_id = %fired.template_id, edge = %fired.edge, error = %e, "alarm action failed");
                if let CoreError::Focus(focus) = &e {
                    if focus.needs_user_action() {
                        events.push(permission_event(&fired.template_id, &focus.to_string()));
                    }
                }
            }
        }

        match self.reconcile_locked() {
            Ok(report) => events.extend(report_events(&report)),
            Err(e) => {
                tracing::warn!(error = %e, "reconcile after alarm failed");
                let summary = self.reschedule();
                events.push(rescheduled_event(&summary));
            }
        }
        events
    }

    /// Armed timers in key order.
    pub fn alarms(&self) -> Vec<(AlarmKey, NaiveDateTime)> {
        self.scheduler
            .registrations()
            .map(|(k, at)| (k.clone(), *at))
            .collect()
    }

    // ── Template editing ─────────────────────────────────────────────

    pub fn create_template(&mut self, name: &str) -> Result<Template> {
        self.transaction(|a| {
            let template = a.state.create_template(name)?.clone();
            a.commit()?;
            tracing::info!(template_id = %template.id, name = %template.name, "template created");
            Ok(template)
        })
    }

    pub fn update_template(&mut self, template_id: &str, patch: TemplatePatch) -> Result<RescheduleSummary> {
        self.transaction(|a| {
            a.state.update_template(template_id, patch)?;
            a.commit()
        })
    }

    /// Delete a template, ending it first if it is applied.
    pub fn delete_template(&mut self, template_id: &str) -> Result<(Template, Option<RestoreReport>)> {
        self.transaction(|a| {
            if a.state.template(template_id).is_none() {
                return Err(ValidationError::TemplateNotFound(template_id.to_string()).into());
            }
            let restored = match a.end_locked(template_id)? {
                EndOutcome::Restored(report) => Some(report),
                EndOutcome::NotApplied => None,
            };
            let removed = a.state.remove_template(template_id)?;
            a.scheduler.cancel_template(template_id);
            a.commit()?;
            tracing::info!(template_id, "template deleted");
            Ok((removed, restored))
        })
    }

    pub fn set_active_template(&mut self, template_id: &str) -> Result<()> {
        self.transaction(|a| {
            a.state.set_active_template(template_id)?;
            a.persist()
        })
    }

    pub fn add_allowed_contact(&mut self, template_id: &str, contact: AllowedContact) -> Result<AllowedContact> {
        self.transaction(|a| a.add_contact_locked(template_id, contact))
    }

    fn add_contact_locked(&mut self, template_id: &str, contact: AllowedContact) -> Result<AllowedContact> {
        self.state.add_allowed_contact(template_id, contact.clone())?;
        self.commit()?;
        Ok(contact)
    }

    /// Turn a picker result into an allowed contact of `template_id`.
    pub fn add_picked_contact(
        &mut self,
        template_id: &str,
        picked: &PickedContact,
        number: Option<&str>,
    ) -> Result<AllowedContact> {
        self.transaction(|a| {
            let template = a
                .state
                .template(template_id)
                .ok_or_else(|| ValidationError::TemplateNotFound(template_id.to_string()))?;
            let contact = AllowedContact::from_pick(&template.allowed_contacts, picked, number)
                .map_err(ValidationError::ContactRejected)?;
            a.add_contact_locked(template_id, contact)
        })
    }

    pub fn remove_allowed_contact(&mut self, template_id: &str, contact_id: &str) -> Result<AllowedContact> {
        self.transaction(|a| {
            let removed = a.state.remove_allowed_contact(template_id, contact_id)?;
            a.commit()?;
            Ok(removed)
        })
    }

    pub fn clear_allowed_contacts(&mut self, template_id: &str) -> Result<usize> {
        self.transaction(|a| {
            let n = a.state.clear_allowed_contacts(template_id)?;
            a.commit()?;
            Ok(n)
        })
    }

    pub fn set_theme_mode(&mut self, theme_mode: ThemeMode) -> Result<()> {
        self.transaction(|a| {
            a.state.set_theme_mode(theme_mode);
            a.persist()
        })
    }
}

pub fn events_for_begin(report: &ApplyReport) -> Vec<Event> {
    let mut events = Vec::new();
    if let Some(previous) = &report.handed_off_from {
        events.push(Event::HandOff {
            from: previous.template_id.clone(),
            to: report.template_id.clone(),
            at: report.executed_at,
        });
        events.extend(events_for_end(&EndOutcome::Restored(previous.clone())));
    }
    events.push(Event::FocusBegan {
        template_id: report.template_id.clone(),
        snapshot_captured: report.snapshot_captured,
        failed_items: report.failure_count(),
        at: report.executed_at,
    });
    events
}

pub fn events_for_end(outcome: &EndOutcome) -> Vec<Event> {
    match outcome {
        EndOutcome::NotApplied => Vec::new(),
        EndOutcome::Restored(report) => vec![Event::FocusEnded {
            template_id: report.template_id.clone(),
            stars_restored: report.stars_restored,
            failed_items: report.failure_count(),
            at: report.executed_at,
        }],
    }
}

pub(crate) fn rescheduled_event(summary: &RescheduleSummary) -> Event {
    Event::AlarmsRescheduled {
        registered: summary.registered,
        cancelled: summary.cancelled,
        next: summary.next,
        at: Utc::now(),
    }
}

fn permission_event(template_id: &str, reason: &str) -> Event {
    Event::PermissionNeeded {
        template_id: template_id.to_string(),
        reason: reason.to_string(),
        at: Utc::now(),
    }
}

/// Events describing a reconciliation pass.
pub fn report_events(report: &ReconcileReport) -> Vec<Event> {
    let mut events = vec![rescheduled_event(&report.alarms)];
    if let Some(applied) = &report.self_healed {
        events.push(Event::SelfHealed {
            template_id: applied.template_id.clone(),
            at: applied.executed_at,
        });
        events.extend(events_for_begin(applied));
    }
    if let (Some(template_id), Some(e)) = (&report.in_window, &report.begin_error) {
        if e.needs_user_action() {
            events.push(permission_event(template_id, &e.to_string()));
        }
    }
    events
}
