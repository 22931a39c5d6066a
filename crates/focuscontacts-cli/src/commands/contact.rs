//! Allow-list management commands for CLI.

use clap::Subcommand;
use focuscontacts_core::platform::ContactPicker;
use focuscontacts_core::{normalize_phone_number, AllowedContact, MAX_ALLOWED_CONTACTS};

use super::{open_automation, print_json, resolve_template, CliResult};

#[derive(Subcommand)]
pub enum ContactAction {
    /// List the allowed contacts of a template
    List {
        /// Template id or name (selected template by default)
        #[arg(long, short)]
        template: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add an allowed contact
    Add {
        /// Display name (ignored with --pick)
        name: Option<String>,
        /// Template id or name (selected template by default)
        #[arg(long, short)]
        template: Option<String>,
        /// Phone number
        #[arg(long)]
        phone: Option<String>,
        /// Address-book lookup key, needed for starring
        #[arg(long)]
        lookup_key: Option<String>,
        /// Pick from the device address book by name or lookup key
        #[arg(long, conflicts_with_all = ["phone", "lookup_key"])]
        pick: Option<String>,
        /// Which of the picked contact's numbers to use
        #[arg(long, requires = "pick")]
        number: Option<String>,
    },
    /// Remove an allowed contact by id, name or number
    Remove {
        contact: String,
        /// Template id or name (selected template by default)
        #[arg(long, short)]
        template: Option<String>,
    },
    /// Remove every allowed contact of a template
    Clear {
        /// Template id or name (selected template by default)
        #[arg(long, short)]
        template: Option<String>,
    },
}

pub fn run(action: ContactAction) -> CliResult {
    let mut automation = open_automation()?;

    match action {
        ContactAction::List { template, json } => {
            let t = resolve_template(automation.state(), template.as_deref())?;
            if json {
                return print_json(&t.allowed_contacts);
            }
            println!("{} ({}/{MAX_ALLOWED_CONTACTS})", t.name, t.allowed_contacts.len());
            for c in &t.allowed_contacts {
                println!(
                    "  {}  {:<20} {:<16} {}",
                    c.id,
                    c.display_name,
                    c.phone_number_normalized,
                    c.contact_lookup_key.as_deref().unwrap_or("-")
                );
            }
        }
        ContactAction::Add {
            name,
            template,
            phone,
            lookup_key,
            pick,
            number,
        } => {
            let id = resolve_template(automation.state(), template.as_deref())?.id.clone();
            let added = match pick {
                Some(query) => {
                    let picked = automation
                        .platform_mut()
                        .pick_contact(&query)?
                        .ok_or_else(|| format!("no contact matches '{query}'"))?;
                    automation.add_picked_contact(&id, &picked, number.as_deref())?
                }
                None => {
                    let phone = phone.ok_or("--phone or --pick is required")?;
                    let normalized = normalize_phone_number(&phone);
                    let name = name
                        .filter(|n| !n.trim().is_empty())
                        .unwrap_or_else(|| phone.trim().to_string());
                    let contact = AllowedContact::new(name, normalized, lookup_key.filter(|k| !k.trim().is_empty()));
                    automation.add_allowed_contact(&id, contact)?
                }
            };
            println!(
                "Added {} ({}) to {}",
                added.display_name, added.phone_number_normalized, id
            );
        }
        ContactAction::Remove { contact, template } => {
            let t = resolve_template(automation.state(), template.as_deref())?;
            let id = t.id.clone();
            let normalized = normalize_phone_number(&contact);
            let contact_id = t
                .allowed_contacts
                .iter()
                .find(|c| {
                    c.id == contact
                        || c.display_name.eq_ignore_ascii_case(&contact)
                        || (!normalized.is_empty() && c.phone_number_normalized == normalized)
                })
                .map(|c| c.id.clone())
                .ok_or_else(|| format!("no allowed contact matches '{contact}'"))?;
            let removed = automation.remove_allowed_contact(&id, &contact_id)?;
            println!("Removed {}", removed.display_name);
        }
        ContactAction::Clear { template } => {
            let id = resolve_template(automation.state(), template.as_deref())?.id.clone();
            let n = automation.clear_allowed_contacts(&id)?;
            println!("Removed {n} contact(s)");
        }
    }
    Ok(())
}
