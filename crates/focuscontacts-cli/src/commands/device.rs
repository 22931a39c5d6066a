//! Inspect and edit the simulated device stored in `device.json`.

use clap::{Subcommand, ValueEnum};
use focuscontacts_core::{SimulatedDevice, StateStore};
use serde_json::json;

use super::{device_path, print_json, CliResult};

#[derive(Clone, Copy, ValueEnum)]
pub enum Permission {
    /// Address book read/write
    Contacts,
    /// Notification policy access
    Policy,
    /// Both
    All,
}

#[derive(Subcommand)]
pub enum DeviceAction {
    /// Show permissions, filter, policy and the address book
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Grant a permission
    Grant { permission: Permission },
    /// Revoke a permission
    Revoke { permission: Permission },
    /// Add or replace an address-book entry
    AddContact {
        /// Stable lookup key
        key: String,
        /// Display name
        name: String,
        /// Phone number (repeatable)
        #[arg(long = "phone")]
        phones: Vec<String>,
        /// Mark as starred
        #[arg(long)]
        starred: bool,
    },
    /// Remove an address-book entry
    RemoveContact { key: String },
    /// Star a contact
    Star { key: String },
    /// Unstar a contact
    Unstar { key: String },
}

fn set_permission(device: &mut SimulatedDevice, permission: Permission, granted: bool) {
    match permission {
        Permission::Contacts => device.contacts_granted = granted,
        Permission::Policy => device.policy_access_granted = granted,
        Permission::All => {
            device.contacts_granted = granted;
            device.policy_access_granted = granted;
        }
    }
}

fn set_starred(device: &mut SimulatedDevice, key: &str, starred: bool) -> CliResult {
    let contact = device
        .contacts
        .get_mut(key)
        .ok_or_else(|| format!("no contact with lookup key '{key}'"))?;
    contact.starred = starred;
    Ok(())
}

pub fn run(action: DeviceAction) -> CliResult {
    let _lock = StateStore::open()?.lock()?;
    let path = device_path()?;
    let mut device = SimulatedDevice::load(&path)?;

    match action {
        DeviceAction::Show { json } => {
            if json {
                return print_json(&device);
            }
            println!("Contacts permission: {}", yes_no(device.contacts_granted));
            println!("Policy access:       {}", yes_no(device.policy_access_granted));
            println!("Interruption filter: {}", device.interruption_filter.label());
            match device.policy {
                Some(p) => println!(
                    "Policy:              {}",
                    json!({
                        "categories": p.priority_categories,
                        "callSenders": p.priority_call_senders,
                        "messageSenders": p.priority_message_senders,
                    })
                ),
                None => println!("Policy:              none"),
            }
            for (key, c) in &device.contacts {
                println!(
                    "{} {:<16} {:<20} {}",
                    if c.starred { "*" } else { " " },
                    key,
                    c.display_name,
                    c.phone_numbers.join(", ")
                );
            }
            for n in &device.notifications {
                println!("! {}: {}", n.title, n.body);
            }
            return Ok(());
        }
        DeviceAction::Grant { permission } => set_permission(&mut device, permission, true),
        DeviceAction::Revoke { permission } => set_permission(&mut device, permission, false),
        DeviceAction::AddContact {
            key,
            name,
            phones,
            starred,
        } => {
            let phones: Vec<&str> = phones.iter().map(String::as_str).collect();
            device.add_contact(&key, &name, &phones, starred);
        }
        DeviceAction::RemoveContact { key } => {
            if !device.remove_contact(&key) {
                return Err(format!("no contact with lookup key '{key}'").into());
            }
        }
        DeviceAction::Star { key } => set_starred(&mut device, &key, true)?,
        DeviceAction::Unstar { key } => set_starred(&mut device, &key, false)?,
    }

    device.save(&path)?;
    println!("ok");
    Ok(())
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "granted"
    } else {
        "denied"
    }
}
