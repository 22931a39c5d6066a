//! In-process device implementing every platform collaborator.
//!
//! Holds permissions, the interruption filter, the notification policy and an
//! address book with starred flags. Individual lookup keys can be made to
//! fail, and reads can be switched off, to exercise partial-failure paths.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use super::{
    ContactPicker, InterruptionFilter, NotificationPolicy, NotificationPolicyAccess, PermissionProbe,
    PickedContact, PlatformSync, StarControl, UserNotifier,
};
use crate::error::{PlatformError, StoreError};
use crate::storage::write_atomic;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceContact {
    pub display_name: String,
    #[serde(default)]
    pub phone_numbers: Vec<String>,
    #[serde(default)]
    pub starred: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaisedNotification {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedDevice {
    pub contacts_granted: bool,
    pub policy_access_granted: bool,
    pub interruption_filter: InterruptionFilter,
    pub policy: Option<NotificationPolicy>,
    /// Address book keyed by lookup key.
    #[serde(default)]
    pub contacts: BTreeMap<String, DeviceContact>,
    #[serde(default)]
    pub notifications: Vec<RaisedNotification>,
    /// Lookup keys whose star updates fail.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub failing_keys: BTreeSet<String>,
    /// Make every read fail.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub fail_reads: bool,
    /// File this device is synced with, if any.
    #[serde(skip)]
    backing: Option<PathBuf>,
}

impl Default for SimulatedDevice {
    fn default() -> Self {
        Self {
            contacts_granted: true,
            policy_access_granted: true,
            interruption_filter: InterruptionFilter::ALL,
            policy: Some(NotificationPolicy {
                priority_categories: 0,
                priority_call_senders: NotificationPolicy::SENDERS_ANY,
                priority_message_senders: NotificationPolicy::SENDERS_ANY,
            }),
            contacts: BTreeMap::new(),
            notifications: Vec::new(),
            failing_keys: BTreeSet::new(),
            fail_reads: false,
            backing: None,
        }
    }
}

impl SimulatedDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`, or a fresh device if the file does not exist.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Load from `path` and keep the device synced with that file.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let mut device = Self::load(path)?;
        device.backing = Some(path.to_path_buf());
        Ok(device)
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let content = serde_json::to_string_pretty(self)?;
        write_atomic(path, content.as_bytes())
    }

    pub fn add_contact(&mut self, lookup_key: &str, display_name: &str, phone_numbers: &[&str], starred: bool) {
        self.contacts.insert(
            lookup_key.to_string(),
            DeviceContact {
                display_name: display_name.to_string(),
                phone_numbers: phone_numbers.iter().map(|n| n.to_string()).collect(),
                starred,
            },
        );
    }

    pub fn remove_contact(&mut self, lookup_key: &str) -> bool {
        self.contacts.remove(lookup_key).is_some()
    }

    pub fn starred_set(&self) -> BTreeSet<String> {
        self.contacts
            .iter()
            .filter(|(_, c)| c.starred)
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn check_readable(&self) -> Result<(), PlatformError> {
        if self.fail_reads {
            return Err(PlatformError::Unavailable("device read failed".into()));
        }
        Ok(())
    }

    fn check_policy_access(&self) -> Result<(), PlatformError> {
        if !self.policy_access_granted {
            return Err(PlatformError::AccessDenied("notification policy".into()));
        }
        Ok(())
    }
}

impl PlatformSync for SimulatedDevice {
    fn reload(&mut self) -> Result<(), StoreError> {
        if let Some(path) = self.backing.take() {
            let loaded = Self::load(&path);
            self.backing = Some(path.clone());
            *self = Self {
                backing: Some(path),
                ..loaded?
            };
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        match &self.backing {
            Some(path) => self.save(path),
            None => Ok(()),
        }
    }
}

impl PermissionProbe for SimulatedDevice {
    fn has_contact_permissions(&self) -> bool {
        self.contacts_granted
    }
}

impl NotificationPolicyAccess for SimulatedDevice {
    fn is_policy_access_granted(&self) -> bool {
        self.policy_access_granted
    }

    fn interruption_filter(&self) -> Result<InterruptionFilter, PlatformError> {
        self.check_readable()?;
        Ok(self.interruption_filter)
    }

    fn set_interruption_filter(&mut self, filter: InterruptionFilter) -> Result<(), PlatformError> {
        self.check_policy_access()?;
        self.interruption_filter = filter;
        Ok(())
    }

    fn policy(&self) -> Result<Option<NotificationPolicy>, PlatformError> {
        self.check_readable()?;
        Ok(self.policy)
    }

    fn set_policy(&mut self, policy: NotificationPolicy) -> Result<(), PlatformError> {
        self.check_policy_access()?;
        self.policy = Some(policy);
        Ok(())
    }
}

impl StarControl for SimulatedDevice {
    fn starred_keys(&self) -> Result<Vec<String>, PlatformError> {
        self.check_readable()?;
        if !self.contacts_granted {
            return Err(PlatformError::AccessDenied("contacts".into()));
        }
        Ok(self.starred_set().into_iter().collect())
    }

    fn set_starred(&mut self, lookup_key: &str, starred: bool) -> Result<(), PlatformError> {
        if !self.contacts_granted {
            return Err(PlatformError::AccessDenied("contacts".into()));
        }
        if self.failing_keys.contains(lookup_key) {
            return Err(PlatformError::Unavailable(format!("update of {lookup_key} failed")));
        }
        let contact = self
            .contacts
            .get_mut(lookup_key)
            .ok_or_else(|| PlatformError::ContactNotFound(lookup_key.to_string()))?;
        contact.starred = starred;
        Ok(())
    }
}

impl UserNotifier for SimulatedDevice {
    fn notify_permission_needed(&mut self, title: &str, body: &str) {
        self.notifications.push(RaisedNotification {
            title: title.to_string(),
            body: body.to_string(),
        });
    }
}

impl ContactPicker for SimulatedDevice {
    /// Picks the contact whose lookup key equals `query`, else the first
    /// whose display name contains it (case-insensitive).
    fn pick_contact(&mut self, query: &str) -> Result<Option<PickedContact>, PlatformError> {
        self.check_readable()?;
        if !self.contacts_granted {
            return Err(PlatformError::AccessDenied("contacts".into()));
        }

        let needle = query.trim().to_lowercase();
        let found = self.contacts.get_key_value(query.trim()).or_else(|| {
            self.contacts
                .iter()
                .find(|(_, c)| c.display_name.to_lowercase().contains(&needle))
        });

        Ok(found.map(|(key, c)| PickedContact {
            lookup_key: key.clone(),
            display_name: Some(c.display_name.clone()),
            phone_numbers: c.phone_numbers.clone(),
        }))
    }
}
