//! Snapshot, apply and restore.
//!
//! [`FocusEngine::begin`] captures the system state before touching it and
//! [`FocusEngine::end`] puts it back. Permission checks, the snapshot
//! capture and the snapshot checkpoint abort before any mutation; every
//! later star or policy update is best-effort and recorded per item.

mod report;

pub use report::{ApplyReport, EndOutcome, ItemOperation, ItemResult, ItemStatus, RestoreReport};

use chrono::Utc;

use report::ItemLog;

use crate::error::{FocusError, StoreError};
use crate::platform::{InterruptionFilter, NotificationPolicy, Platform};
use crate::session::SystemSnapshot;
use crate::state::AppState;

const POLICY_TARGET: &str = "policy";
const FILTER_TARGET: &str = "filter";

pub struct FocusEngine<P> {
    platform: P,
    notifications_enabled: bool,
}

impl<P: Platform> FocusEngine<P> {
    pub fn new(platform: P) -> Self {
        Self {
            platform,
            notifications_enabled: true,
        }
    }

    /// Whether permission-needed notifications are raised.
    pub fn with_notifications(mut self, enabled: bool) -> Self {
        self.notifications_enabled = enabled;
        self
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn into_platform(self) -> P {
        self.platform
    }

    fn check_permissions(&mut self, template_name: &str) -> Result<(), FocusError> {
        let (err, body) = if !self.platform.has_contact_permissions() {
            (
                FocusError::PermissionMissing,
                format!("Allow contacts access so \"{template_name}\" can manage starred contacts."),
            )
        } else if !self.platform.is_policy_access_granted() {
            (
                FocusError::PolicyAccessRevoked,
                format!("Allow Do Not Disturb access so \"{template_name}\" can silence calls."),
            )
        } else {
            return Ok(());
        };

        tracing::warn!(template = template_name, error = %err, "focus change blocked");
        if self.notifications_enabled {
            self.platform.notify_permission_needed("Focus needs permission", &body);
        }
        Err(err)
    }

    /// Apply a template without persisting the snapshot first.
    pub fn begin(&mut self, state: &mut AppState, template_id: &str) -> Result<ApplyReport, FocusError> {
        self.begin_with(state, template_id, |_| Ok(()))
    }

    /// Apply a template.
    ///
    /// Any other applied template is ended first. If `template_id` is
    /// already applied the allow-list and policy are re-applied and the
    /// existing snapshot is kept. Otherwise the fresh snapshot is handed to
    /// `checkpoint` with the session marked applied; if that fails the
    /// session is cleared and nothing on the device is touched.
    pub fn begin_with<F>(
        &mut self,
        state: &mut AppState,
        template_id: &str,
        checkpoint: F,
    ) -> Result<ApplyReport, FocusError>
    where
        F: FnOnce(&AppState) -> Result<(), StoreError>,
    {
        let template = state
            .template(template_id)
            .cloned()
            .ok_or_else(|| FocusError::TemplateNotFound(template_id.to_string()))?;
        self.check_permissions(&template.name)?;

        let mut handed_off_from = None;
        if let Some(previous) = state.applied_template_id().filter(|id| *id != template_id) {
            let previous = previous.to_string();
            tracing::info!(from = %previous, to = template_id, "handing off");
            if let EndOutcome::Restored(report) = self.end(state, &previous)? {
                handed_off_from = Some(report);
            }
        }

        let mut log = ItemLog::default();
        let already_applied = state.session().is_applied(template_id);

        let currently_starred = if already_applied {
            match self.platform.starred_keys() {
                Ok(keys) => keys,
                Err(e) => {
                    log.record("starred", ItemOperation::ReadStarred, Err(e));
                    Vec::new()
                }
            }
        } else {
            let snapshot = SystemSnapshot::capture(&self.platform).map_err(FocusError::SnapshotCapture)?;
            tracing::debug!(
                template_id,
                filter = snapshot.dnd.interruption_filter.label(),
                policy_present = snapshot.dnd.policy.is_some(),
                starred = snapshot.starred_keys.len(),
                "snapshot captured"
            );
            let keys = snapshot.starred_keys.clone();
            state.store_snapshot(snapshot);
            state.set_applied(template_id);
            if let Err(e) = checkpoint(state) {
                tracing::error!(template_id, error = %e, "snapshot not saved, focus not applied");
                state.clear_session();
                return Err(FocusError::SnapshotPersist(e.to_string()));
            }
            keys
        };

        for key in &currently_starred {
            let outcome = self.platform.set_starred(key, false);
            log.record(key, ItemOperation::Unstar, outcome);
        }
        for contact in &template.allowed_contacts {
            match contact.resolvable_lookup_key() {
                Some(key) => {
                    let outcome = self.platform.set_starred(key, true);
                    log.record(key, ItemOperation::Star, outcome);
                }
                None => log.skip(&contact.display_name, ItemOperation::Star, "no contact reference"),
            }
        }

        let policy = NotificationPolicy::starred_calls_only(template.settings.repeat_callers_enabled);
        let outcome = self.platform.set_policy(policy);
        log.record(POLICY_TARGET, ItemOperation::SetPolicy, outcome);
        let outcome = self.platform.set_interruption_filter(InterruptionFilter::PRIORITY);
        log.record(FILTER_TARGET, ItemOperation::SetFilter, outcome);

        let report = ApplyReport {
            template_id: template_id.to_string(),
            executed_at: Utc::now(),
            handed_off_from,
            snapshot_captured: !already_applied,
            items: log.finish(),
        };
        tracing::info!(
            template_id,
            refreshed = already_applied,
            ok = report.success_count(),
            failed = report.failure_count(),
            "focus began"
        );
        Ok(report)
    }

    /// Restore the snapshot taken when `template_id` began.
    ///
    /// A template that is not applied is left alone. A template that no
    /// longer exists is restored with stars included.
    pub fn end(&mut self, state: &mut AppState, template_id: &str) -> Result<EndOutcome, FocusError> {
        if !state.session().is_applied(template_id) {
            tracing::debug!(template_id, "end ignored, template not applied");
            return Ok(EndOutcome::NotApplied);
        }

        let template = state.template(template_id);
        let name = template.map_or(template_id, |t| t.name.as_str()).to_string();
        let restore_stars = template.map_or(true, |t| t.settings.restore_stars_enabled);
        self.check_permissions(&name)?;

        let snapshot = state.snapshot();
        let mut log = ItemLog::default();

        match snapshot.as_ref().and_then(|s| s.dnd.policy) {
            Some(policy) => {
                let outcome = self.platform.set_policy(policy);
                log.record(POLICY_TARGET, ItemOperation::SetPolicy, outcome);
            }
            None => log.skip(POLICY_TARGET, ItemOperation::SetPolicy, "no policy captured"),
        }
        let filter = snapshot
            .as_ref()
            .map_or(InterruptionFilter::ALL, SystemSnapshot::restore_filter);
        let outcome = self.platform.set_interruption_filter(filter);
        log.record(FILTER_TARGET, ItemOperation::SetFilter, outcome);

        let stars_restored = match (&snapshot, restore_stars) {
            (_, false) => {
                log.skip("starred", ItemOperation::Star, "star restoration disabled");
                false
            }
            (None, true) => {
                log.skip("starred", ItemOperation::Star, "no snapshot captured");
                false
            }
            (Some(snapshot), true) => {
                self.restore_stars(&snapshot.starred_keys, &mut log);
                true
            }
        };

        state.clear_session();

        let report = RestoreReport {
            template_id: template_id.to_string(),
            executed_at: Utc::now(),
            stars_restored,
            items: log.finish(),
        };
        tracing::info!(
            template_id,
            stars_restored,
            ok = report.success_count(),
            failed = report.failure_count(),
            "focus ended"
        );
        Ok(EndOutcome::Restored(report))
    }

    fn restore_stars(&mut self, keys: &[String], log: &mut ItemLog) {
        match self.platform.starred_keys() {
            Ok(current) => {
                for key in &current {
                    let outcome = self.platform.set_starred(key, false);
                    log.record(key, ItemOperation::Unstar, outcome);
                }
            }
            Err(e) => log.record("starred", ItemOperation::ReadStarred, Err(e)),
        }
        for key in keys {
            let outcome = self.platform.set_starred(key, true);
            log.record(key, ItemOperation::Star, outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::SimulatedDevice;
    use crate::template::AllowedContact;
    use std::collections::BTreeSet;

    fn keys(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn device() -> SimulatedDevice {
        let mut d = SimulatedDevice::new();
        d.add_contact("lk-mom", "Mom", &["111"], true);
        d.add_contact("lk-boss", "Boss", &["222"], false);
        d.add_contact("lk-dentist", "Dentist", &["333"], true);
        d
    }

    fn state_with_boss() -> AppState {
        let mut state = AppState::initial();
        state
            .add_allowed_contact(
                "tpl_work",
                AllowedContact::new("Boss".into(), "222".into(), Some("lk-boss".into())),
            )
            .unwrap();
        state
            .add_allowed_contact(
                "tpl_family",
                AllowedContact::new("Mom".into(), "111".into(), Some("lk-mom".into())),
            )
            .unwrap();
        state
    }

    #[test]
    fn begin_applies_allow_list_and_policy() {
        let mut engine = FocusEngine::new(device());
        let mut state = state_with_boss();

        let report = engine.begin(&mut state, "tpl_work").unwrap();
        assert!(report.snapshot_captured);
        assert_eq!(report.failure_count(), 0);
        assert_eq!(state.applied_template_id(), Some("tpl_work"));

        let d = engine.platform();
        assert_eq!(d.starred_set(), keys(&["lk-boss"]));
        assert_eq!(d.interruption_filter, InterruptionFilter::PRIORITY);
        assert_eq!(d.policy, Some(NotificationPolicy::starred_calls_only(false)));
    }

    #[test]
    fn begin_then_end_restores_everything() {
        let mut engine = FocusEngine::new(device());
        let mut state = state_with_boss();
        let before_policy = engine.platform().policy;

        engine.begin(&mut state, "tpl_work").unwrap();
        engine.platform_mut().contacts.get_mut("lk-boss").unwrap().starred = false;
        engine.platform_mut().add_contact("lk-new", "New", &["444"], true);

        let outcome = engine.end(&mut state, "tpl_work").unwrap();
        assert!(matches!(outcome, EndOutcome::Restored(ref r) if r.stars_restored));

        let d = engine.platform();
        assert_eq!(d.starred_set(), keys(&["lk-mom", "lk-dentist"]));
        assert_eq!(d.interruption_filter, InterruptionFilter::ALL);
        assert_eq!(d.policy, before_policy);
        assert!(state.session().is_idle());
        assert!(!state.has_snapshot());
    }

    #[test]
    fn second_begin_keeps_original_snapshot() {
        let mut engine = FocusEngine::new(device());
        let mut state = state_with_boss();

        engine.begin(&mut state, "tpl_work").unwrap();
        let snapshot = state.snapshot();
        let again = engine.begin(&mut state, "tpl_work").unwrap();

        assert!(!again.snapshot_captured);
        assert_eq!(state.snapshot(), snapshot);

        engine.end(&mut state, "tpl_work").unwrap();
        assert_eq!(engine.platform().starred_set(), keys(&["lk-mom", "lk-dentist"]));
    }

    #[test]
    fn hand_off_restores_previous_before_capturing() {
        let mut engine = FocusEngine::new(device());
        let mut state = state_with_boss();

        engine.begin(&mut state, "tpl_work").unwrap();
        let report = engine.begin(&mut state, "tpl_family").unwrap();

        let handed = report.handed_off_from.unwrap();
        assert_eq!(handed.template_id, "tpl_work");
        assert_eq!(state.applied_template_id(), Some("tpl_family"));
        assert_eq!(
            state.snapshot().unwrap().starred_keys.into_iter().collect::<BTreeSet<_>>(),
            keys(&["lk-mom", "lk-dentist"])
        );
        assert_eq!(engine.platform().starred_set(), keys(&["lk-mom"]));

        engine.end(&mut state, "tpl_family").unwrap();
        assert_eq!(engine.platform().starred_set(), keys(&["lk-mom", "lk-dentist"]));
    }

    #[test]
    fn end_of_other_template_is_a_no_op() {
        let mut engine = FocusEngine::new(device());
        let mut state = state_with_boss();
        engine.begin(&mut state, "tpl_work").unwrap();

        assert_eq!(engine.end(&mut state, "tpl_gym").unwrap(), EndOutcome::NotApplied);
        assert_eq!(state.applied_template_id(), Some("tpl_work"));
    }

    #[test]
    fn restore_stars_disabled_leaves_stars_alone() {
        let mut engine = FocusEngine::new(device());
        let mut state = state_with_boss();
        state.templates[0].settings.restore_stars_enabled = false;

        engine.begin(&mut state, "tpl_work").unwrap();
        let outcome = engine.end(&mut state, "tpl_work").unwrap();

        assert!(matches!(outcome, EndOutcome::Restored(ref r) if !r.stars_restored));
        assert_eq!(engine.platform().starred_set(), keys(&["lk-boss"]));
        assert_eq!(engine.platform().interruption_filter, InterruptionFilter::ALL);
    }

    #[test]
    fn missing_permission_aborts_without_mutation() {
        let mut d = device();
        d.contacts_granted = false;
        let mut engine = FocusEngine::new(d);
        let mut state = state_with_boss();

        let err = engine.begin(&mut state, "tpl_work").unwrap_err();
        assert_eq!(err, FocusError::PermissionMissing);
        assert!(state.session().is_idle());
        assert!(!state.has_snapshot());
        assert_eq!(engine.platform().interruption_filter, InterruptionFilter::ALL);
        assert_eq!(engine.platform().notifications.len(), 1);
    }

    #[test]
    fn revoked_policy_access_blocks_end() {
        let mut engine = FocusEngine::new(device()).with_notifications(false);
        let mut state = state_with_boss();
        engine.begin(&mut state, "tpl_work").unwrap();

        engine.platform_mut().policy_access_granted = false;
        assert_eq!(engine.end(&mut state, "tpl_work").unwrap_err(), FocusError::PolicyAccessRevoked);
        assert_eq!(state.applied_template_id(), Some("tpl_work"));
        assert!(state.has_snapshot());
        assert!(engine.platform().notifications.is_empty());
    }

    #[test]
    fn snapshot_failure_aborts_before_mutation() {
        let mut d = device();
        d.fail_reads = true;
        let mut engine = FocusEngine::new(d);
        let mut state = state_with_boss();

        let err = engine.begin(&mut state, "tpl_work").unwrap_err();
        assert!(matches!(err, FocusError::SnapshotCapture(_)));
        assert!(state.session().is_idle());
        assert_eq!(engine.platform().starred_set(), keys(&["lk-mom", "lk-dentist"]));
    }

    #[test]
    fn unsaved_snapshot_aborts_before_mutation() {
        let mut engine = FocusEngine::new(device());
        let mut state = state_with_boss();
        let mut checkpointed = None;

        let err = engine
            .begin_with(&mut state, "tpl_work", |s| {
                checkpointed = s.applied_template_id().map(str::to_string);
                Err(StoreError::Io {
                    path: "state.json".into(),
                    source: std::io::Error::other("disk full"),
                })
            })
            .unwrap_err();

        assert!(matches!(err, FocusError::SnapshotPersist(_)));
        assert_eq!(checkpointed.as_deref(), Some("tpl_work"));
        assert!(state.session().is_idle());
        assert!(!state.has_snapshot());
        assert_eq!(engine.platform().starred_set(), keys(&["lk-mom", "lk-dentist"]));
        assert_eq!(engine.platform().interruption_filter, InterruptionFilter::ALL);
    }

    #[test]
    fn refresh_skips_the_checkpoint() {
        let mut engine = FocusEngine::new(device());
        let mut state = state_with_boss();
        engine.begin(&mut state, "tpl_work").unwrap();

        let report = engine
            .begin_with(&mut state, "tpl_work", |_| panic!("no new snapshot to save"))
            .unwrap();
        assert!(!report.snapshot_captured);
        assert_eq!(state.applied_template_id(), Some("tpl_work"));
    }

    #[test]
    fn per_item_failures_do_not_stop_the_rest() {
        let mut d = device();
        d.failing_keys.insert("lk-mom".into());
        let mut engine = FocusEngine::new(d);
        let mut state = state_with_boss();
        state
            .add_allowed_contact("tpl_work", AllowedContact::new("Ghost".into(), "999".into(), Some("lk-gone".into())))
            .unwrap();
        state
            .add_allowed_contact("tpl_work", AllowedContact::new("Typed".into(), "888".into(), None))
            .unwrap();

        let report = engine.begin(&mut state, "tpl_work").unwrap();
        assert_eq!(report.failure_count(), 2); // unstar lk-mom, star lk-gone
        assert_eq!(report.skipped_count(), 1);
        assert_eq!(state.applied_template_id(), Some("tpl_work"));
        assert_eq!(engine.platform().starred_set(), keys(&["lk-mom", "lk-boss"]));
        assert_eq!(engine.platform().interruption_filter, InterruptionFilter::PRIORITY);
    }

    #[test]
    fn absent_policy_is_not_restored() {
        let mut d = device();
        d.policy = None;
        let mut engine = FocusEngine::new(d);
        let mut state = state_with_boss();

        engine.begin(&mut state, "tpl_work").unwrap();
        let EndOutcome::Restored(report) = engine.end(&mut state, "tpl_work").unwrap() else {
            panic!("expected restore");
        };
        let policy_item = report.items.iter().find(|i| i.operation == ItemOperation::SetPolicy).unwrap();
        assert!(matches!(policy_item.status, ItemStatus::Skipped { .. }));
        assert_eq!(engine.platform().policy, Some(NotificationPolicy::starred_calls_only(false)));
    }

    #[test]
    fn repeat_callers_adds_category() {
        let mut engine = FocusEngine::new(device());
        let mut state = state_with_boss();
        state.templates[0].settings.repeat_callers_enabled = true;

        engine.begin(&mut state, "tpl_work").unwrap();
        let policy = engine.platform().policy.unwrap();
        assert_eq!(
            policy.priority_categories,
            NotificationPolicy::CATEGORY_CALLS | NotificationPolicy::CATEGORY_REPEAT_CALLERS
        );
    }

    #[test]
    fn empty_allow_list_silences_every_caller() {
        let mut engine = FocusEngine::new(device());
        let mut state = AppState::initial();

        let report = engine.begin(&mut state, "tpl_gym").unwrap();
        assert_eq!(report.failure_count(), 0);
        assert!(engine.platform().starred_set().is_empty());
        assert_eq!(engine.platform().interruption_filter, InterruptionFilter::PRIORITY);

        engine.end(&mut state, "tpl_gym").unwrap();
        assert_eq!(engine.platform().starred_set(), keys(&["lk-mom", "lk-dentist"]));
    }

    #[test]
    fn unknown_template_is_rejected() {
        let mut engine = FocusEngine::new(device());
        let mut state = AppState::initial();
        assert_eq!(
            engine.begin(&mut state, "tpl_nope").unwrap_err(),
            FocusError::TemplateNotFound("tpl_nope".into())
        );
    }
}
