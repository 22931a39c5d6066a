//! Manual Begin/End commands for CLI.

use clap::Subcommand;
use focuscontacts_core::automation::{events_for_begin, events_for_end};
use focuscontacts_core::{EndOutcome, ItemStatus};
use serde_json::json;

use super::{open_automation, print_json, resolve_template, CliResult};

#[derive(Subcommand)]
pub enum FocusAction {
    /// Apply a template now (the selected one by default)
    Begin {
        /// Template id or name
        template: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// End the applied template and restore the previous state
    End {
        /// Only end if this template is the applied one
        template: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show what is applied
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn print_failures<'a>(items: impl IntoIterator<Item = &'a focuscontacts_core::engine::ItemResult>) {
    for item in items {
        if let ItemStatus::Failed { reason } = &item.status {
            eprintln!("  warning: {:?} {} failed: {reason}", item.operation, item.target);
        }
    }
}

pub fn run(action: FocusAction) -> CliResult {
    let mut automation = open_automation()?;

    match action {
        FocusAction::Begin { template, json } => {
            let t = resolve_template(automation.state(), template.as_deref())?;
            if t.allowed_contacts.is_empty() {
                return Err(format!("template '{}' has no allowed contacts", t.name).into());
            }
            let id = t.id.clone();

            let report = automation.begin(&id)?;

            if json {
                return print_json(&events_for_begin(&report));
            }
            if let Some(previous) = &report.handed_off_from {
                println!("Ended {} first.", previous.template_id);
                print_failures(&previous.items);
            }
            println!(
                "Focus on: {} ({} ok, {} failed, {} skipped)",
                id,
                report.success_count(),
                report.failure_count(),
                report.skipped_count()
            );
            print_failures(&report.items);
        }
        FocusAction::End { template, json } => {
            let outcome = match template {
                Some(selector) => {
                    let id = resolve_template(automation.state(), Some(&selector))?.id.clone();
                    automation.end(&id)?
                }
                None => automation.end_applied()?,
            };

            if json {
                return print_json(&events_for_end(&outcome));
            }
            match outcome {
                EndOutcome::NotApplied => println!("Nothing to end."),
                EndOutcome::Restored(report) => {
                    println!(
                        "Focus off: {} (stars {})",
                        report.template_id,
                        if report.stars_restored { "restored" } else { "left as is" }
                    );
                    print_failures(&report.items);
                }
            }
        }
        FocusAction::Status { json } => {
            let state = automation.state();
            let device = automation.platform();
            if json {
                return print_json(&json!({
                    "appliedTemplateId": state.applied_template_id(),
                    "activeTemplateId": state.active_template().map(|t| &t.id),
                    "snapshotHeld": state.has_snapshot(),
                    "interruptionFilter": device.interruption_filter,
                }));
            }
            match state.applied_template() {
                Some(t) => println!("Applied: {} ({})", t.name, t.id),
                None => match state.applied_template_id() {
                    Some(id) => println!("Applied: {id} (template no longer exists)"),
                    None => println!("Applied: none"),
                },
            }
            if let Some(t) = state.active_template() {
                println!("Selected: {} ({})", t.name, t.id);
            }
            println!("Interruption filter: {}", device.interruption_filter.label());
        }
    }
    Ok(())
}
