//! Versioned JSON blob holding templates, session state and snapshot.
//!
//! ```text
//! {"version":2,"state":{"templates":[...],"activeTemplateId":...,
//!   "appliedTemplateId":...,"dndSnapshot":...,"starredSnapshot":...,
//!   "settings":{"themeMode":"system"}}}
//! ```
//!
//! Version-1 blobs held a single flat allow-list; they are migrated into the
//! four starter templates on load.

use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};

use super::{data_dir, write_atomic, StoreLock};
use crate::error::StoreError;
use crate::session::DndSnapshot;
use crate::state::{AppState, ThemeMode};
use crate::template::{starter_templates, AllowedContact, TemplateSettings};

pub const STATE_VERSION: u64 = 2;

#[derive(Serialize)]
struct Persisted<'a> {
    version: u64,
    state: &'a AppState,
}

/// File-backed store for [`AppState`].
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store at `<data_dir>/state.json`.
    pub fn open() -> Result<Self, StoreError> {
        Ok(Self {
            path: data_dir()?.join("state.json"),
        })
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the cross-process lock guarding this store.
    pub fn lock(&self) -> Result<StoreLock, StoreError> {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        StoreLock::acquire(&self.path.with_file_name(name))
    }

    /// Load the state, migrating older versions. A missing file yields
    /// [`AppState::initial`].
    pub fn load(&self) -> Result<AppState, StoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(AppState::initial()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        decode(&raw)
    }

    pub fn save(&self, state: &AppState) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(&Persisted {
            version: STATE_VERSION,
            state,
        })?;
        write_atomic(&self.path, content.as_bytes())
    }
}

/// Decode any supported blob version.
pub fn decode(raw: &str) -> Result<AppState, StoreError> {
    let mut blob: Value = serde_json::from_str(raw)?;
    let version = blob.get("version").and_then(Value::as_u64).unwrap_or(0);
    let state = blob.get_mut("state").map(Value::take).unwrap_or(Value::Null);

    match version {
        2 => Ok(serde_json::from_value(state)?),
        1 => {
            tracing::info!("migrating version-1 state blob");
            migrate_v1(&state)
        }
        other => Err(StoreError::UnsupportedVersion(other)),
    }
}

/// Translate the flat version-1 state into version 2.
///
/// The old allow-list lands in "Work"; the three other starters are empty.
/// Template settings come from the old global settings, defaulting to
/// restore-stars on and repeat-callers off.
pub fn migrate_v1(legacy: &Value) -> Result<AppState, StoreError> {
    let Some(obj) = legacy.as_object() else {
        return Err(StoreError::Migration("legacy state is not an object".into()));
    };
    let old_settings = obj.get("settings");
    let flag = |key: &str, default: bool| {
        old_settings
            .and_then(|s| s.get(key))
            .and_then(Value::as_bool)
            .unwrap_or(default)
    };

    let theme_mode = match old_settings.and_then(|s| s.get("themeMode")).and_then(Value::as_str) {
        Some("light") => ThemeMode::Light,
        Some("dark") => ThemeMode::Dark,
        _ => ThemeMode::System,
    };
    let settings = TemplateSettings {
        restore_stars_enabled: flag("restoreStarsEnabled", true),
        repeat_callers_enabled: flag("repeatCallersEnabled", false),
    };

    let allowed_contacts: Vec<AllowedContact> = obj
        .get("allowedContacts")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match serde_json::from_value(item.clone()) {
                    Ok(contact) => Some(contact),
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping unreadable legacy contact");
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    let mut templates = starter_templates(settings);
    templates[0].allowed_contacts = allowed_contacts;

    let mut state = AppState::from_templates(templates);
    state.set_theme_mode(theme_mode);

    let dnd_snapshot: Option<DndSnapshot> = obj
        .get("dndSnapshot")
        .and_then(|v| serde_json::from_value(v.clone()).ok());
    if let Some(dnd) = dnd_snapshot {
        let starred_keys: Vec<String> = obj
            .get("starredSnapshot")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        state.store_snapshot(crate::session::SystemSnapshot { dnd, starred_keys });
    }

    let focus_enabled = obj.get("focusEnabled").and_then(Value::as_bool).unwrap_or(false);
    if focus_enabled {
        state.set_applied("tpl_work");
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::InterruptionFilter;
    use crate::schedule::Schedule;

    #[test]
    fn missing_file_is_initial_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::with_path(dir.path().join("state.json"));
        assert_eq!(store.load().unwrap(), AppState::initial());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::with_path(dir.path().join("state.json"));
        let mut state = AppState::initial();
        state.templates[1].schedule = Some(Schedule::new([5], 1320, 420));
        store.save(&state).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"version\": 2"));
        assert_eq!(store.load().unwrap(), state);
    }

    #[test]
    fn unknown_version_is_rejected() {
        let err = decode(r#"{"version":9,"state":{}}"#).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedVersion(9)));
    }

    #[test]
    fn v1_migrates_into_four_templates() {
        let raw = r#"{
            "version": 1,
            "state": {
                "focusEnabled": true,
                "allowedContacts": [
                    {"id":"c1","displayName":"Mom","phoneNumberNormalized":"5551234567","contactLookupKey":"lk-mom","createdAt":1}
                ],
                "settings": {"themeMode":"dark","repeatCallersEnabled":true},
                "dndSnapshot": {"interruptionFilter":1,"policy":null},
                "starredSnapshot": ["lk-dad"]
            }
        }"#;
        let state = decode(raw).unwrap();

        assert_eq!(state.templates.len(), 4);
        let work = state.template("tpl_work").unwrap();
        assert_eq!(work.allowed_contacts.len(), 1);
        assert!(work.settings.restore_stars_enabled);
        assert!(work.settings.repeat_callers_enabled);
        assert!(state.template("tpl_gym").unwrap().allowed_contacts.is_empty());

        assert_eq!(state.settings.theme_mode, ThemeMode::Dark);
        assert_eq!(state.active_template_id.as_deref(), Some("tpl_work"));
        assert_eq!(state.applied_template_id(), Some("tpl_work"));

        let snap = state.snapshot().unwrap();
        assert_eq!(snap.dnd.interruption_filter, InterruptionFilter::ALL);
        assert_eq!(snap.starred_keys, vec!["lk-dad".to_string()]);
    }

    #[test]
    fn v1_defaults_unset_fields() {
        let state = decode(r#"{"version":1,"state":{}}"#).unwrap();
        assert_eq!(state.settings.theme_mode, ThemeMode::System);
        for t in &state.templates {
            assert_eq!(t.settings, TemplateSettings::default());
            assert!(t.schedule.is_none());
        }
        assert!(state.session().is_idle());
        assert!(!state.has_snapshot());
    }

    #[test]
    fn v1_non_object_state_fails_migration() {
        assert!(matches!(
            decode(r#"{"version":1,"state":42}"#),
            Err(StoreError::Migration(_))
        ));
    }
}
