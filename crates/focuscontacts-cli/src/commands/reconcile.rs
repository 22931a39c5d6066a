//! One reconciliation pass: re-derive timers and self-heal a missed start.

use clap::Args;
use focuscontacts_core::automation::report_events;

use super::{open_automation, print_json, CliResult};

#[derive(Args)]
pub struct ReconcileArgs {
    /// Output events as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: ReconcileArgs) -> CliResult {
    let mut automation = open_automation()?;
    let report = automation.reconcile()?;

    if args.json {
        return print_json(&report_events(&report));
    }

    println!(
        "Alarms: {} registered, {} cancelled",
        report.alarms.registered, report.alarms.cancelled
    );
    if let Some(next) = report.alarms.next {
        println!("Next alarm: {}", next.format("%a %Y-%m-%d %H:%M"));
    }
    match (&report.in_window, &report.self_healed, &report.begin_error) {
        (None, _, _) => println!("No window active now."),
        (Some(id), Some(_), _) => println!("Window active: began {id}."),
        (Some(id), None, Some(e)) => println!("Window active for {id}, but focus could not begin: {e}"),
        (Some(id), None, None) => println!("Window active for {id}; nothing to do."),
    }
    Ok(())
}
