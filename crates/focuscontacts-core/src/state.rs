//! Persisted application state and the template-editing operations on it.
//!
//! Operations here are pure state transitions. Persisting, re-deriving
//! timers and running End before a delete are the caller's job (see
//! [`crate::automation::Automation`]).

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::session::{DndSnapshot, SessionState, SystemSnapshot};
use crate::template::{
    can_add_allowed_contact, starter_templates, AllowedContact, Template, TemplateId, TemplatePatch,
    TemplateSettings,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeMode {
    #[default]
    System,
    Light,
    Dark,
}

impl std::str::FromStr for ThemeMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "system" => Ok(Self::System),
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            other => Err(ValidationError::InvalidValue {
                field: "themeMode".into(),
                message: format!("'{other}' is not one of system, light, dark"),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    #[serde(default)]
    pub theme_mode: ThemeMode,
}

/// The `state` object of the version-2 blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    #[serde(default)]
    pub templates: Vec<Template>,
    /// Template selected for editing; unrelated to what is applied.
    #[serde(default)]
    pub active_template_id: Option<TemplateId>,
    #[serde(default)]
    applied_template_id: Option<TemplateId>,
    #[serde(default)]
    dnd_snapshot: Option<DndSnapshot>,
    #[serde(default)]
    starred_snapshot: Option<Vec<String>>,
    #[serde(default)]
    pub settings: AppSettings,
}

impl Default for AppState {
    fn default() -> Self {
        Self::initial()
    }
}

impl AppState {
    /// Fresh install: the four starter templates, "Work" selected.
    pub fn initial() -> Self {
        Self::from_templates(starter_templates(TemplateSettings::default()))
    }

    pub fn from_templates(templates: Vec<Template>) -> Self {
        let active_template_id = templates.first().map(|t| t.id.clone());
        Self {
            templates,
            active_template_id,
            applied_template_id: None,
            dnd_snapshot: None,
            starred_snapshot: None,
            settings: AppSettings::default(),
        }
    }

    // ── Session ──────────────────────────────────────────────────────

    pub fn session(&self) -> SessionState {
        SessionState {
            applied_template_id: self.applied_template_id.clone(),
        }
    }

    pub fn applied_template_id(&self) -> Option<&str> {
        self.applied_template_id.as_deref()
    }

    pub fn snapshot(&self) -> Option<SystemSnapshot> {
        self.dnd_snapshot.map(|dnd| SystemSnapshot {
            dnd,
            starred_keys: self.starred_snapshot.clone().unwrap_or_default(),
        })
    }

    pub fn has_snapshot(&self) -> bool {
        self.dnd_snapshot.is_some()
    }

    pub(crate) fn store_snapshot(&mut self, snapshot: SystemSnapshot) {
        self.dnd_snapshot = Some(snapshot.dnd);
        self.starred_snapshot = Some(snapshot.starred_keys);
    }

    pub(crate) fn set_applied(&mut self, template_id: &str) {
        self.applied_template_id = Some(template_id.to_string());
    }

    /// Drop the applied pointer and the snapshot together.
    pub(crate) fn clear_session(&mut self) {
        self.applied_template_id = None;
        self.dnd_snapshot = None;
        self.starred_snapshot = None;
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn template(&self, template_id: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.id == template_id)
    }

    fn template_mut(&mut self, template_id: &str) -> Result<&mut Template, ValidationError> {
        self.templates
            .iter_mut()
            .find(|t| t.id == template_id)
            .ok_or_else(|| ValidationError::TemplateNotFound(template_id.to_string()))
    }

    /// Selected template, falling back to the first one.
    pub fn active_template(&self) -> Option<&Template> {
        self.active_template_id
            .as_deref()
            .and_then(|id| self.template(id))
            .or_else(|| self.templates.first())
    }

    pub fn applied_template(&self) -> Option<&Template> {
        self.applied_template_id().and_then(|id| self.template(id))
    }

    // ── Template editing ─────────────────────────────────────────────

    /// Insert a new template first and select it.
    pub fn create_template(&mut self, name: &str) -> Result<&Template, ValidationError> {
        if name.trim().is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "name".into(),
                message: "must not be empty".into(),
            });
        }
        let template = Template::new(name.trim());
        self.active_template_id = Some(template.id.clone());
        self.templates.insert(0, template);
        Ok(&self.templates[0])
    }

    pub fn update_template(&mut self, template_id: &str, patch: TemplatePatch) -> Result<(), ValidationError> {
        self.template_mut(template_id)?.apply_patch(patch)
    }

    /// Remove a template. Clears the session if it pointed at it and moves
    /// the selection to the first remaining template.
    pub fn remove_template(&mut self, template_id: &str) -> Result<Template, ValidationError> {
        let idx = self
            .templates
            .iter()
            .position(|t| t.id == template_id)
            .ok_or_else(|| ValidationError::TemplateNotFound(template_id.to_string()))?;
        let removed = self.templates.remove(idx);

        if self.active_template_id.as_deref() == Some(template_id) {
            self.active_template_id = self.templates.first().map(|t| t.id.clone());
        }
        if self.applied_template_id.as_deref() == Some(template_id) {
            self.clear_session();
        }
        Ok(removed)
    }

    pub fn set_active_template(&mut self, template_id: &str) -> Result<(), ValidationError> {
        if self.template(template_id).is_none() {
            return Err(ValidationError::TemplateNotFound(template_id.to_string()));
        }
        self.active_template_id = Some(template_id.to_string());
        Ok(())
    }

    /// Prepend a contact to a template's allow-list after validating it.
    pub fn add_allowed_contact(&mut self, template_id: &str, contact: AllowedContact) -> Result<(), ValidationError> {
        let template = self.template_mut(template_id)?;
        can_add_allowed_contact(&template.allowed_contacts, &contact.phone_number_normalized)
            .map_err(ValidationError::ContactRejected)?;
        template.allowed_contacts.insert(0, contact);
        Ok(())
    }

    pub fn remove_allowed_contact(&mut self, template_id: &str, contact_id: &str) -> Result<AllowedContact, ValidationError> {
        let template = self.template_mut(template_id)?;
        let idx = template
            .allowed_contacts
            .iter()
            .position(|c| c.id == contact_id)
            .ok_or_else(|| ValidationError::ContactNotFound(contact_id.to_string()))?;
        Ok(template.allowed_contacts.remove(idx))
    }

    pub fn clear_allowed_contacts(&mut self, template_id: &str) -> Result<usize, ValidationError> {
        let template = self.template_mut(template_id)?;
        let n = template.allowed_contacts.len();
        template.allowed_contacts.clear();
        Ok(n)
    }

    pub fn set_theme_mode(&mut self, theme_mode: ThemeMode) {
        self.settings.theme_mode = theme_mode;
    }
}
