pub mod alarms;
pub mod config;
pub mod contact;
pub mod daemon;
pub mod device;
pub mod focus;
pub mod reconcile;
pub mod template;

use std::path::PathBuf;

use focuscontacts_core::storage::data_dir;
use focuscontacts_core::{AppState, Automation, Config, NoopAlarmBackend, SimulatedDevice, StateStore, Template};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

pub type CliAutomation = Automation<SimulatedDevice, NoopAlarmBackend>;

pub fn device_path() -> Result<PathBuf, Box<dyn std::error::Error>> {
    Ok(data_dir()?.join("device.json"))
}

/// The simulated device, synced with its file on every operation.
pub fn open_device() -> Result<SimulatedDevice, Box<dyn std::error::Error>> {
    Ok(SimulatedDevice::open(&device_path()?)?)
}

/// Automation over the persisted state and simulated device, without live
/// timers.
pub fn open_automation() -> Result<CliAutomation, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let store = StateStore::open()?;
    Ok(Automation::open(store, open_device()?, NoopAlarmBackend, config)?)
}

/// Resolve a template by id or case-insensitive name; the active template
/// when no selector is given.
pub fn resolve_template<'a>(state: &'a AppState, selector: Option<&str>) -> Result<&'a Template, String> {
    let Some(selector) = selector else {
        return state.active_template().ok_or_else(|| "no templates".to_string());
    };
    state
        .template(selector)
        .or_else(|| {
            state
                .templates
                .iter()
                .find(|t| t.name.eq_ignore_ascii_case(selector))
        })
        .ok_or_else(|| format!("template not found: {selector}"))
}

pub fn print_json<T: serde::Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
