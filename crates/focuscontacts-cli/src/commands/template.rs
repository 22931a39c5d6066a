//! Template management commands for CLI.

use clap::Subcommand;
use focuscontacts_core::schedule::WORKWEEK;
use focuscontacts_core::{parse_hhmm, Schedule, Template, TemplatePatch};

use super::{open_automation, print_json, resolve_template, CliResult};

#[derive(Subcommand)]
pub enum TemplateAction {
    /// List all templates
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one template (the selected one by default)
    Show {
        /// Template id or name
        template: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a template and select it
    Create {
        /// Template name
        name: String,
    },
    /// Rename a template
    Rename {
        /// Template id or name
        template: String,
        /// New name
        name: String,
    },
    /// Delete a template, ending it first if it is applied
    Delete {
        /// Template id or name
        template: String,
    },
    /// Select a template for editing
    Select {
        /// Template id or name
        template: String,
    },
    /// Set a recurring weekly schedule
    Schedule {
        /// Template id or name
        template: String,
        /// Days: "mon,wed,fri", "0,6", "weekdays", "weekends" or "daily"
        #[arg(long, default_value = "weekdays")]
        days: String,
        /// Start time (HH:MM)
        #[arg(long, default_value = "09:00")]
        start: String,
        /// End time (HH:MM); earlier than start means overnight
        #[arg(long, default_value = "18:00")]
        end: String,
        /// Store the schedule switched off
        #[arg(long)]
        disabled: bool,
    },
    /// Remove the schedule of a template
    Unschedule {
        /// Template id or name
        template: String,
    },
    /// Change behavior settings
    Settings {
        /// Template id or name
        template: String,
        /// Restore starred contacts when the template ends
        #[arg(long)]
        restore_stars: Option<bool>,
        /// Let repeat callers ring through
        #[arg(long)]
        repeat_callers: Option<bool>,
    },
}

const DAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Parse a weekday list into indices, 0=Sunday.
pub fn parse_days(input: &str) -> Result<Vec<i32>, String> {
    match input.trim().to_lowercase().as_str() {
        "weekdays" => return Ok(WORKWEEK.to_vec()),
        "weekends" => return Ok(vec![0, 6]),
        "daily" => return Ok((0..7).collect()),
        _ => {}
    }

    let mut days = Vec::new();
    for part in input.split(',').map(|p| p.trim().to_lowercase()).filter(|p| !p.is_empty()) {
        let day = match part.parse::<i32>() {
            Ok(n) if (0..7).contains(&n) => n,
            Ok(n) => return Err(format!("day {n} is outside 0..=6")),
            Err(_) => DAY_NAMES
                .iter()
                .position(|name| part.starts_with(name))
                .map(|i| i as i32)
                .ok_or_else(|| format!("unknown day '{part}'"))?,
        };
        if !days.contains(&day) {
            days.push(day);
        }
    }
    if days.is_empty() {
        return Err("no days given".into());
    }
    days.sort_unstable();
    Ok(days)
}

fn print_template(t: &Template) {
    println!("{} ({})", t.name, t.id);
    println!(
        "  schedule:       {}",
        t.schedule.as_ref().map_or_else(|| "none".to_string(), Schedule::describe)
    );
    println!("  restore stars:  {}", t.settings.restore_stars_enabled);
    println!("  repeat callers: {}", t.settings.repeat_callers_enabled);
    println!("  contacts:       {}", t.allowed_contacts.len());
    for c in &t.allowed_contacts {
        println!(
            "    {}  {}  {}",
            c.display_name,
            c.phone_number_normalized,
            c.contact_lookup_key.as_deref().unwrap_or("-")
        );
    }
}

pub fn run(action: TemplateAction) -> CliResult {
    let mut automation = open_automation()?;

    match action {
        TemplateAction::List { json } => {
            let state = automation.state();
            if json {
                return print_json(&state.templates);
            }
            let active = state.active_template().map(|t| t.id.as_str());
            for t in &state.templates {
                let marker = if state.applied_template_id() == Some(t.id.as_str()) {
                    "●"
                } else if active == Some(t.id.as_str()) {
                    "*"
                } else {
                    " "
                };
                let schedule = t.schedule.as_ref().map_or_else(|| "-".to_string(), Schedule::describe);
                println!(
                    "{marker} {:<24} {:<12} {} contact(s)  {schedule}",
                    t.id,
                    t.name,
                    t.allowed_contacts.len()
                );
            }
        }
        TemplateAction::Show { template, json } => {
            let t = resolve_template(automation.state(), template.as_deref())?;
            if json {
                return print_json(t);
            }
            print_template(t);
        }
        TemplateAction::Create { name } => {
            let t = automation.create_template(&name)?;
            println!("Template created: {} ({})", t.name, t.id);
        }
        TemplateAction::Rename { template, name } => {
            let id = resolve_template(automation.state(), Some(&template))?.id.clone();
            automation.update_template(
                &id,
                TemplatePatch {
                    name: Some(name.trim().to_string()),
                    ..Default::default()
                },
            )?;
            println!("Template renamed.");
        }
        TemplateAction::Delete { template } => {
            let id = resolve_template(automation.state(), Some(&template))?.id.clone();
            let (removed, restored) = automation.delete_template(&id)?;
            if restored.is_some() {
                println!("Focus ended and restored before deleting.");
            }
            println!("Template deleted: {}", removed.name);
        }
        TemplateAction::Select { template } => {
            let id = resolve_template(automation.state(), Some(&template))?.id.clone();
            automation.set_active_template(&id)?;
            println!("Selected: {id}");
        }
        TemplateAction::Schedule {
            template,
            days,
            start,
            end,
            disabled,
        } => {
            let id = resolve_template(automation.state(), Some(&template))?.id.clone();
            let start = parse_hhmm(&start)?;
            let end = parse_hhmm(&end)?;
            let mut schedule = Schedule::new(parse_days(&days)?, start as i32, end as i32);
            schedule.enabled = !disabled;
            let describe = schedule.describe();

            let summary = automation.update_template(
                &id,
                TemplatePatch {
                    schedule: Some(Some(schedule)),
                    ..Default::default()
                },
            )?;
            println!("Schedule set: {describe}");
            if let Some(next) = summary.next {
                println!("Next alarm: {}", next.format("%a %Y-%m-%d %H:%M"));
            }
        }
        TemplateAction::Unschedule { template } => {
            let id = resolve_template(automation.state(), Some(&template))?.id.clone();
            automation.update_template(
                &id,
                TemplatePatch {
                    schedule: Some(None),
                    ..Default::default()
                },
            )?;
            println!("Schedule removed.");
        }
        TemplateAction::Settings {
            template,
            restore_stars,
            repeat_callers,
        } => {
            let t = resolve_template(automation.state(), Some(&template))?;
            let id = t.id.clone();
            let mut settings = t.settings;
            if let Some(v) = restore_stars {
                settings.restore_stars_enabled = v;
            }
            if let Some(v) = repeat_callers {
                settings.repeat_callers_enabled = v;
            }
            automation.update_template(
                &id,
                TemplatePatch {
                    settings: Some(settings),
                    ..Default::default()
                },
            )?;
            println!(
                "restore stars: {}, repeat callers: {}",
                settings.restore_stars_enabled, settings.repeat_callers_enabled
            );
        }
    }
    Ok(())
}
