//! Integration tests for the persisted state blob.
//!
//! These tests write legacy and current blobs to disk and load them through
//! `StateStore`, the way a fresh process does after an upgrade.

use focuscontacts_core::{InterruptionFilter, StateStore, ThemeMode};

const LEGACY_BLOB: &str = r#"{
    "version": 1,
    "state": {
        "focusEnabled": true,
        "allowedContacts": [
            {"id": "c1", "displayName": "Mom", "phoneNumberNormalized": "+15550100001",
             "contactLookupKey": "lk-mom", "createdAt": 1700000000000},
            {"id": "c2", "displayName": "Desk", "phoneNumberNormalized": "5550100002",
             "createdAt": 1700000001000}
        ],
        "settings": {"themeMode": "dark", "repeatCallersEnabled": true},
        "dndSnapshot": {"interruptionFilter": 4, "policy": null},
        "starredSnapshot": ["lk-dad"]
    }
}"#;

#[test]
fn test_legacy_blob_migrates_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, LEGACY_BLOB).unwrap();

    let store = StateStore::with_path(&path);
    let state = store.load().unwrap();

    let ids: Vec<_> = state.templates.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["tpl_work", "tpl_family", "tpl_college", "tpl_gym"]);

    let work = state.template("tpl_work").unwrap();
    assert_eq!(work.allowed_contacts.len(), 2);
    assert_eq!(work.allowed_contacts[0].contact_lookup_key.as_deref(), Some("lk-mom"));
    assert!(work.allowed_contacts[1].contact_lookup_key.is_none());
    assert!(work.settings.restore_stars_enabled);
    assert!(work.settings.repeat_callers_enabled);
    assert!(state.template("tpl_gym").unwrap().allowed_contacts.is_empty());

    assert_eq!(state.settings.theme_mode, ThemeMode::Dark);
    assert_eq!(state.applied_template_id(), Some("tpl_work"));
    let snapshot = state.snapshot().unwrap();
    assert_eq!(snapshot.dnd.interruption_filter, InterruptionFilter::ALARMS);
    assert!(snapshot.dnd.policy.is_none());
    assert_eq!(snapshot.starred_keys, vec!["lk-dad".to_string()]);
}

#[test]
fn test_migrated_state_is_saved_as_version_two() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, LEGACY_BLOB).unwrap();

    let store = StateStore::with_path(&path);
    let state = store.load().unwrap();
    store.save(&state).unwrap();

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["version"], 2);
    assert_eq!(raw["state"]["appliedTemplateId"], "tpl_work");
    assert_eq!(raw["state"]["settings"]["themeMode"], "dark");
    assert_eq!(store.load().unwrap(), state);
}
