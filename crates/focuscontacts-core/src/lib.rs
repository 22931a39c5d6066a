//! # FocusContacts Core Library
//!
//! This library provides the automation behind FocusContacts: a focus mode
//! that restricts incoming calls to a short allow-list of starred contacts,
//! optionally on a recurring weekly schedule. It follows a CLI-first
//! philosophy: every operation is available through the standalone
//! `focuscontacts` binary, which is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Templates**: named allow-lists with behavior settings and an optional
//!   schedule, persisted as one versioned JSON blob
//! - **Schedule Calculator**: pure next-start / next-end / window-membership
//!   functions over local wall-clock time, overnight windows included
//! - **Alarm Scheduler**: two timers per effective schedule, re-derived after
//!   every change
//! - **Focus Engine**: snapshot before apply, restore on end, hand-off
//!   between templates
//! - **Reconciliation**: re-derives timers and self-heals missed starts
//!
//! ## Key Components
//!
//! - [`Automation`]: state, engine and scheduler behind one `&mut self` API
//! - [`AutomationService`]: single-writer tokio task owning an `Automation`
//! - [`FocusEngine`]: Begin/End against a [`Platform`]
//! - [`StateStore`]: versioned state blob with v1 migration
//! - [`Config`]: Application configuration management

pub mod alarm;
pub mod automation;
pub mod engine;
pub mod error;
pub mod events;
pub mod phone;
pub mod platform;
pub mod reconcile;
pub mod schedule;
pub mod service;
pub mod session;
pub mod state;
pub mod storage;
pub mod template;
pub mod watch;

pub use alarm::{
    AlarmBackend, AlarmEdge, AlarmFired, AlarmKey, AlarmScheduler, NoopAlarmBackend, TokioAlarmBackend,
};
pub use automation::Automation;
pub use engine::{ApplyReport, EndOutcome, FocusEngine, ItemStatus, RestoreReport};
pub use error::{ConfigError, CoreError, FocusError, PlatformError, StoreError, ValidationError};
pub use events::Event;
pub use phone::normalize_phone_number;
pub use platform::{InterruptionFilter, NotificationPolicy, PickedContact, Platform, PlatformSync, SimulatedDevice};
pub use reconcile::{find_active_template, ReconcileReport};
pub use schedule::{format_hhmm, parse_hhmm, Schedule};
pub use service::{AutomationHandle, AutomationService, ServiceStatus};
pub use session::{SessionState, SystemSnapshot};
pub use state::{AppState, ThemeMode};
pub use watch::{watch_state, StateWatcher};
pub use storage::{Config, StateStore, StoreLock};
pub use template::{
    can_add_allowed_contact, AddContactRejection, AllowedContact, Template, TemplatePatch, TemplateSettings,
    MAX_ALLOWED_CONTACTS,
};
