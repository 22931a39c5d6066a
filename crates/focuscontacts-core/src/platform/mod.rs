//! Host platform collaborators.
//!
//! The engine never talks to the operating system directly. It consumes the
//! narrow capabilities below: permission probing, the notification policy,
//! starred-contact control, contact picking and user-facing notifications,
//! plus [`PlatformSync`] for state shared between processes.
//! [`SimulatedDevice`] implements all of them in-process.

mod simulated;

pub use simulated::SimulatedDevice;

use serde::{Deserialize, Serialize};

use crate::error::{PlatformError, StoreError};

/// Platform interruption filter, an integer enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterruptionFilter(pub i32);

impl InterruptionFilter {
    pub const UNKNOWN: Self = Self(0);
    /// Normal: all notifications
    pub const ALL: Self = Self(1);
    /// Only priority interruptions
    pub const PRIORITY: Self = Self(2);
    /// Total silence
    pub const NONE: Self = Self(3);
    /// Alarms only
    pub const ALARMS: Self = Self(4);

    pub fn label(self) -> &'static str {
        match self {
            Self::ALL => "all",
            Self::PRIORITY => "priority",
            Self::NONE => "none",
            Self::ALARMS => "alarms",
            _ => "unknown",
        }
    }
}

/// The three bitmasks of the platform notification policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPolicy {
    pub priority_categories: i32,
    pub priority_call_senders: i32,
    pub priority_message_senders: i32,
}

impl NotificationPolicy {
    pub const CATEGORY_CALLS: i32 = 1 << 3;
    pub const CATEGORY_REPEAT_CALLERS: i32 = 1 << 4;

    pub const SENDERS_ANY: i32 = 0;
    pub const SENDERS_CONTACTS: i32 = 1;
    pub const SENDERS_STARRED: i32 = 2;

    /// Calls only (plus repeat callers when asked), from starred contacts.
    pub fn starred_calls_only(repeat_callers: bool) -> Self {
        let mut categories = Self::CATEGORY_CALLS;
        if repeat_callers {
            categories |= Self::CATEGORY_REPEAT_CALLERS;
        }
        Self {
            priority_categories: categories,
            priority_call_senders: Self::SENDERS_STARRED,
            priority_message_senders: Self::SENDERS_STARRED,
        }
    }
}

/// Result of the contact-selection collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PickedContact {
    pub lookup_key: String,
    pub display_name: Option<String>,
    pub phone_numbers: Vec<String>,
}

/// Runtime permissions Begin/End depend on.
pub trait PermissionProbe {
    /// Read and write access to the address book.
    fn has_contact_permissions(&self) -> bool;
}

/// Read/write access to the interruption filter and notification policy.
pub trait NotificationPolicyAccess {
    fn is_policy_access_granted(&self) -> bool;
    fn interruption_filter(&self) -> Result<InterruptionFilter, PlatformError>;
    fn set_interruption_filter(&mut self, filter: InterruptionFilter) -> Result<(), PlatformError>;
    /// `Ok(None)` when the platform reports no policy at all.
    fn policy(&self) -> Result<Option<NotificationPolicy>, PlatformError>;
    fn set_policy(&mut self, policy: NotificationPolicy) -> Result<(), PlatformError>;
}

/// Starred-contact state, addressed by stable lookup key.
pub trait StarControl {
    fn starred_keys(&self) -> Result<Vec<String>, PlatformError>;
    fn set_starred(&mut self, lookup_key: &str, starred: bool) -> Result<(), PlatformError>;
}

/// Raises notifications for the user; Begin/End may run with no UI present.
pub trait UserNotifier {
    fn notify_permission_needed(&mut self, title: &str, body: &str);
}

/// Lets the user pick one address-book entry. `Ok(None)` means cancelled.
pub trait ContactPicker {
    fn pick_contact(&mut self, query: &str) -> Result<Option<PickedContact>, PlatformError>;
}

/// Host state that other processes may change between operations.
///
/// The automation calls [`reload`](Self::reload) before and
/// [`flush`](Self::flush) after each operation while holding the store lock.
/// A live host needs neither.
pub trait PlatformSync {
    fn reload(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Everything the apply/restore engine needs from the host.
pub trait Platform: PermissionProbe + NotificationPolicyAccess + StarControl + UserNotifier + PlatformSync {}

impl<T> Platform for T where
    T: PermissionProbe + NotificationPolicyAccess + StarControl + UserNotifier + PlatformSync
{
}
