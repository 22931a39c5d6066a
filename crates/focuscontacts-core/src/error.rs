//! Core error types for focuscontacts-core.
//!
//! This module defines the error hierarchy using thiserror. Begin/End
//! failures that must abort before any mutation are [`FocusError`]; failures
//! reported by external collaborators are [`PlatformError`] and are absorbed
//! per item once a snapshot has been captured.

use std::path::PathBuf;
use thiserror::Error;

use crate::template::AddContactRejection;

/// Core error type for focuscontacts-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Persisted state errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Begin/End aborted before mutating anything
    #[error("Focus error: {0}")]
    Focus(#[from] FocusError),

    /// Collaborator failure outside the per-item apply/restore path
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The state file watcher could not be started
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    /// The single-writer service is no longer running
    #[error("Automation service stopped")]
    ServiceStopped,
}

/// Errors loading or saving the persisted state blob.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to read or write the state file
    #[error("Failed to access state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The blob is not valid JSON or does not match the schema
    #[error("Failed to parse state blob: {0}")]
    Parse(#[from] serde_json::Error),

    /// The blob carries a version this build does not understand
    #[error("Unsupported state version: {0}")]
    UnsupportedVersion(u64),

    /// A version-1 blob could not be migrated
    #[error("Legacy state could not be migrated: {0}")]
    Migration(String),

    /// The data directory could not be resolved or created
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// The data directory holding the config file is unavailable
    #[error("Configuration directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors raised by template editing.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// No template with that id
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// No allowed contact with that id in the template
    #[error("Allowed contact not found: {0}")]
    ContactNotFound(String),

    /// The allow-list refused the contact
    #[error("Contact rejected: {0}")]
    ContactRejected(AddContactRejection),

    /// Clock text is not HH:MM
    #[error("Invalid time '{0}', expected HH:MM")]
    InvalidClock(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

/// Reasons Begin/End refuse to run. Nothing has been mutated when one of
/// these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FocusError {
    /// Contacts read/write permission is not granted
    #[error("Contacts permission missing")]
    PermissionMissing,

    /// Notification policy access is not (or no longer) granted
    #[error("Notification policy access revoked")]
    PolicyAccessRevoked,

    /// Reading the pre-automation state failed
    #[error("Failed to capture system snapshot: {0}")]
    SnapshotCapture(PlatformError),

    /// The captured snapshot could not be saved; nothing was applied
    #[error("Failed to save system snapshot: {0}")]
    SnapshotPersist(String),

    /// No template with that id
    #[error("Template not found: {0}")]
    TemplateNotFound(String),
}

impl FocusError {
    /// Whether the user has to grant something before retrying.
    pub fn needs_user_action(&self) -> bool {
        matches!(self, Self::PermissionMissing | Self::PolicyAccessRevoked)
    }
}

/// Failures reported by the host platform collaborators.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The contact reference no longer resolves
    #[error("Contact not found: {0}")]
    ContactNotFound(String),

    /// The capability was denied by the host
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Any other collaborator failure
    #[error("Platform unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
