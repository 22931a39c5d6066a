//! Shows the timer set the daemon would register right now.

use clap::Args;
use serde::Serialize;

use super::{open_automation, print_json, CliResult};

#[derive(Args)]
pub struct AlarmsArgs {
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct AlarmRow {
    template_id: String,
    template_name: String,
    edge: String,
    at: chrono::NaiveDateTime,
}

pub fn run(args: AlarmsArgs) -> CliResult {
    let mut automation = open_automation()?;
    automation.reschedule();

    let rows: Vec<AlarmRow> = automation
        .alarms()
        .into_iter()
        .map(|(key, at)| AlarmRow {
            template_name: automation
                .state()
                .template(&key.template_id)
                .map(|t| t.name.clone())
                .unwrap_or_default(),
            template_id: key.template_id,
            edge: key.edge.to_string(),
            at,
        })
        .collect();

    if args.json {
        return print_json(&rows);
    }
    if rows.is_empty() {
        println!("No scheduled templates.");
        return Ok(());
    }
    for row in &rows {
        println!(
            "{:<5} {:<12} {}  ({})",
            row.edge,
            row.template_name,
            row.at.format("%a %Y-%m-%d %H:%M"),
            row.template_id
        );
    }
    Ok(())
}
