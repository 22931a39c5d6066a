//! Notice writes to the state file made by other processes.
//!
//! The watcher covers the directory holding the state file, since saves
//! replace the file by rename. Every create, modify or remove touching the
//! state file name becomes a [`Command::StateChanged`](crate::service::Command)
//! on the service queue.

use std::ffi::OsString;
use std::path::Path;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

use crate::error::Result;
use crate::service::AutomationHandle;

/// Keeps the underlying watcher alive; dropping it stops delivery.
pub struct StateWatcher {
    _watcher: RecommendedWatcher,
}

impl std::fmt::Debug for StateWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateWatcher").finish_non_exhaustive()
    }
}

fn touches(event: &Event, file_name: &OsString) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(file_name.as_os_str()))
}

/// Forward changes of the file at `state_path` to `handle`.
pub fn watch_state(state_path: &Path, handle: AutomationHandle) -> Result<StateWatcher> {
    let file_name = state_path.file_name().unwrap_or_default().to_os_string();
    let dir = match state_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir()?,
    };

    let mut watcher = notify::recommended_watcher(move |res: std::result::Result<Event, notify::Error>| match res {
        Ok(event) if touches(&event, &file_name) => {
            tracing::debug!(kind = ?event.kind, "state file changed");
            if !handle.notify_state_changed() {
                tracing::debug!("service stopped, dropping state change");
            }
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "state watcher error"),
    })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    tracing::info!(dir = %dir.display(), "watching state file");

    Ok(StateWatcher { _watcher: watcher })
}
