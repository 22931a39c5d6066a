//! Long-running process owning the timers and the single-writer queue.

use clap::Args;
use focuscontacts_core::{watch_state, Automation, AutomationService, Config, StateStore, TokioAlarmBackend};
use tokio::sync::mpsc;

use super::{open_device, CliResult};

#[derive(Args)]
pub struct DaemonArgs {
    /// Print every event as a JSON line on stdout
    #[arg(long)]
    json: bool,
}

pub fn run(args: DaemonArgs) -> CliResult {
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(serve(args))
}

async fn serve(args: DaemonArgs) -> CliResult {
    let config = Config::load()?;
    let store = StateStore::open()?;
    let state_path = store.path().to_path_buf();

    let (backend, alarms) = TokioAlarmBackend::channel();
    let automation = Automation::open(store, open_device()?, backend, config)?;

    let (event_tx, mut events) = mpsc::unbounded_channel();
    let (handle, task) = AutomationService::new(automation)
        .with_events(event_tx)
        .spawn(alarms);
    let watcher = watch_state(&state_path, handle.clone())?;

    let status = handle.status().await?;
    tracing::info!(alarms = status.alarms.len(), next = ?status.next_due, "daemon running");
    if !args.json {
        println!("Daemon running; {} alarm(s) armed. Ctrl-C to stop.", status.alarms.len());
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(event) if args.json => println!("{}", serde_json::to_string(&event)?),
                Some(event) => println!("{}", describe(&event)),
                None => break,
            },
        }
    }

    tracing::info!("shutting down");
    drop(watcher);
    handle.shutdown().await?;
    task.await?;
    Ok(())
}

fn describe(event: &focuscontacts_core::Event) -> String {
    use focuscontacts_core::Event;
    match event {
        Event::FocusBegan { template_id, failed_items, .. } => {
            format!("focus began: {template_id} ({failed_items} failed item(s))")
        }
        Event::FocusEnded { template_id, stars_restored, .. } => {
            format!("focus ended: {template_id} (stars restored: {stars_restored})")
        }
        Event::HandOff { from, to, .. } => format!("hand-off: {from} -> {to}"),
        Event::PermissionNeeded { template_id, reason, .. } => {
            format!("permission needed for {template_id}: {reason}")
        }
        Event::AlarmFired { template_id, edge, .. } => format!("alarm: {template_id} {edge}"),
        Event::AlarmsRescheduled { registered, cancelled, next, .. } => match next {
            Some(next) => format!("alarms: +{registered} -{cancelled}, next {}", next.format("%a %H:%M")),
            None => format!("alarms: +{registered} -{cancelled}, none pending"),
        },
        Event::SelfHealed { template_id, .. } => format!("self-heal: {template_id} window is active"),
    }
}
