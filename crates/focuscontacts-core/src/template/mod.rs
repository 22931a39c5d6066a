//! Focus templates: named bundles of an allow-list, behavior settings and an
//! optional recurring schedule.

mod rules;

pub use rules::{can_add_allowed_contact, AddContactRejection, MAX_ALLOWED_CONTACTS};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::ValidationError;
use crate::phone::normalize_phone_number;
use crate::platform::PickedContact;
use crate::schedule::Schedule;

/// Unique, stable identifier of a template.
pub type TemplateId = String;

/// A contact permitted to ring through while the template is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllowedContact {
    pub id: String,
    pub display_name: String,
    pub phone_number_normalized: String,
    /// Stable reference into the host address book. Contacts without one
    /// cannot be starred and are skipped when a template is applied.
    #[serde(default)]
    pub contact_lookup_key: Option<String>,
    #[serde(with = "chrono::serde::ts_milliseconds", default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl AllowedContact {
    pub fn new(display_name: String, phone_number_normalized: String, contact_lookup_key: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            display_name,
            phone_number_normalized,
            contact_lookup_key,
            created_at: Utc::now(),
        }
    }

    /// Build an allowed contact from a picker result.
    ///
    /// `number` selects one of the picked numbers, compared after
    /// normalization; the first one is used when `None`. The chosen number
    /// is normalized and checked against `existing`.
    pub fn from_pick(
        existing: &[AllowedContact],
        picked: &PickedContact,
        number: Option<&str>,
    ) -> Result<Self, AddContactRejection> {
        let numbers: Vec<&str> = picked
            .phone_numbers
            .iter()
            .map(|n| n.trim())
            .filter(|n| !n.is_empty())
            .collect();
        if numbers.is_empty() {
            return Err(AddContactRejection::NoNumber);
        }

        let chosen = match number {
            Some(wanted) => {
                let wanted = normalize_phone_number(wanted);
                numbers
                    .iter()
                    .copied()
                    .find(|n| normalize_phone_number(n) == wanted)
                    .ok_or(AddContactRejection::NumberNotPicked)?
            }
            None => numbers[0],
        };
        let normalized = normalize_phone_number(chosen);
        can_add_allowed_contact(existing, &normalized)?;

        let display_name = picked
            .display_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| chosen.to_string());
        Ok(Self::new(display_name, normalized, Some(picked.lookup_key.clone())))
    }

    /// Lookup key usable for starring, if the contact carries one.
    pub fn resolvable_lookup_key(&self) -> Option<&str> {
        self.contact_lookup_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

/// Per-template behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSettings {
    /// Put the pre-automation starred set back when the template ends.
    /// Off means the user manages stars manually.
    #[serde(default = "default_true")]
    pub restore_stars_enabled: bool,
    /// Let a second call from the same number within minutes ring through.
    #[serde(default)]
    pub repeat_callers_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for TemplateSettings {
    fn default() -> Self {
        Self {
            restore_stars_enabled: true,
            repeat_callers_enabled: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: TemplateId,
    pub name: String,
    #[serde(default)]
    pub allowed_contacts: Vec<AllowedContact>,
    #[serde(default)]
    pub settings: TemplateSettings,
    #[serde(default)]
    pub schedule: Option<Schedule>,
}

impl Template {
    /// A fresh template with a generated id and default settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(format!("tpl_{}", uuid::Uuid::new_v4().simple()), name)
    }

    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            allowed_contacts: Vec::new(),
            settings: TemplateSettings::default(),
            schedule: None,
        }
    }

    /// The enabled, well-formed schedule, if any.
    pub fn effective_schedule(&self) -> Option<&Schedule> {
        self.schedule.as_ref().filter(|s| s.is_effective())
    }

    /// Apply a field-level patch. Nothing changes if the patch is invalid.
    pub fn apply_patch(&mut self, patch: TemplatePatch) -> Result<(), ValidationError> {
        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(ValidationError::InvalidValue {
                    field: "name".into(),
                    message: "must not be empty".into(),
                });
            }
        }
        if let Some(contacts) = &patch.allowed_contacts {
            validate_allow_list(contacts)?;
        }

        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(contacts) = patch.allowed_contacts {
            self.allowed_contacts = contacts;
        }
        if let Some(settings) = patch.settings {
            self.settings = settings;
        }
        if let Some(schedule) = patch.schedule {
            self.schedule = schedule;
        }
        Ok(())
    }
}

fn validate_allow_list(contacts: &[AllowedContact]) -> Result<(), ValidationError> {
    if contacts.len() > MAX_ALLOWED_CONTACTS {
        return Err(ValidationError::ContactRejected(AddContactRejection::CapReached));
    }
    let mut seen = HashSet::new();
    for c in contacts {
        if c.phone_number_normalized.is_empty() {
            return Err(ValidationError::ContactRejected(AddContactRejection::InvalidNumber));
        }
        if !seen.insert(c.phone_number_normalized.as_str()) {
            return Err(ValidationError::ContactRejected(AddContactRejection::Duplicate));
        }
    }
    Ok(())
}

/// Field-level update of a [`Template`]. `None` leaves a field untouched;
/// `schedule: Some(None)` removes the schedule.
#[derive(Debug, Clone, Default)]
pub struct TemplatePatch {
    pub name: Option<String>,
    pub allowed_contacts: Option<Vec<AllowedContact>>,
    pub settings: Option<TemplateSettings>,
    pub schedule: Option<Option<Schedule>>,
}

/// The four templates every fresh install starts with.
pub fn starter_templates(settings: TemplateSettings) -> Vec<Template> {
    [
        ("tpl_work", "Work"),
        ("tpl_family", "Family"),
        ("tpl_college", "College"),
        ("tpl_gym", "Gym"),
    ]
    .into_iter()
    .map(|(id, name)| {
        let mut t = Template::with_id(id, name);
        t.settings = settings;
        t
    })
    .collect()
}
