//! Which template is applied, and the system state captured before it was.

use serde::{Deserialize, Serialize};

use crate::error::PlatformError;
use crate::platform::{InterruptionFilter, NotificationPolicy, NotificationPolicyAccess, StarControl};
use crate::template::TemplateId;

/// The single applied-template pointer.
///
/// Exclusivity is not enforced here: Begin hands off from any other applied
/// template before setting it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub applied_template_id: Option<TemplateId>,
}

impl SessionState {
    pub fn is_applied(&self, template_id: &str) -> bool {
        self.applied_template_id.as_deref() == Some(template_id)
    }

    pub fn is_idle(&self) -> bool {
        self.applied_template_id.is_none()
    }
}

/// Interruption filter and policy as they were before automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DndSnapshot {
    pub interruption_filter: InterruptionFilter,
    /// `None` when the platform reported no policy; restore then leaves the
    /// policy alone.
    pub policy: Option<NotificationPolicy>,
}

/// Everything Begin captures and End puts back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemSnapshot {
    pub dnd: DndSnapshot,
    pub starred_keys: Vec<String>,
}

impl SystemSnapshot {
    /// Read the current filter, policy and starred set.
    ///
    /// A policy read failure is recorded as an absent policy; filter or
    /// starred-set read failures fail the capture.
    pub fn capture<P>(platform: &P) -> Result<Self, PlatformError>
    where
        P: NotificationPolicyAccess + StarControl + ?Sized,
    {
        let interruption_filter = platform.interruption_filter()?;
        let policy = match platform.policy() {
            Ok(policy) => policy,
            Err(e) => {
                tracing::warn!(error = %e, "notification policy unreadable, snapshot marks it absent");
                None
            }
        };
        let starred_keys = platform
            .starred_keys()?
            .into_iter()
            .filter(|k| !k.trim().is_empty())
            .collect();

        Ok(Self {
            dnd: DndSnapshot {
                interruption_filter,
                policy,
            },
            starred_keys,
        })
    }

    /// Filter to restore; falls back to "all" for unknown values.
    pub fn restore_filter(&self) -> InterruptionFilter {
        if self.dnd.interruption_filter == InterruptionFilter::UNKNOWN {
            InterruptionFilter::ALL
        } else {
            self.dnd.interruption_filter
        }
    }
}
