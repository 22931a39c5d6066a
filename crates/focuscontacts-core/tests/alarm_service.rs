//! Integration test for timer-driven Begin/End through the service.
//!
//! Runs on a paused tokio clock; the wall clock handed to the automation is
//! derived from tokio time so both advance together.

use std::sync::OnceLock;

use chrono::{NaiveDate, NaiveDateTime};
use focuscontacts_core::{
    AlarmEdge, Automation, AutomationService, Config, Event, InterruptionFilter, Schedule,
    SimulatedDevice, StateStore, TemplatePatch, TokioAlarmBackend,
};
use tokio::sync::mpsc;

static START: OnceLock<tokio::time::Instant> = OnceLock::new();

/// Monday 2026-10-19 08:59, advancing with tokio time.
fn clock() -> NaiveDateTime {
    let base = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap().and_hms_opt(8, 59, 0).unwrap();
    let start = *START.get_or_init(tokio::time::Instant::now);
    base + chrono::Duration::from_std(start.elapsed()).unwrap()
}

async fn next_matching(rx: &mut mpsc::UnboundedReceiver<Event>, pred: impl Fn(&Event) -> bool) -> Event {
    loop {
        let event = rx.recv().await.expect("event stream closed");
        if pred(&event) {
            return event;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_window_begins_and_ends_on_timers() {
    clock();
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::with_path(dir.path().join("state.json"));

    let mut state = store.load().unwrap();
    state
        .update_template(
            "tpl_work",
            TemplatePatch {
                schedule: Some(Some(Schedule::new([1], 9 * 60, 9 * 60 + 30))),
                ..Default::default()
            },
        )
        .unwrap();
    store.save(&state).unwrap();

    let (alarm_tx, alarm_rx) = mpsc::unbounded_channel();
    let backend = TokioAlarmBackend::with_clock(alarm_tx, clock);
    let automation = Automation::open(store, SimulatedDevice::new(), backend, Config::default())
        .unwrap()
        .with_clock(clock);

    let (event_tx, mut events) = mpsc::unbounded_channel();
    let (handle, task) = AutomationService::new(automation)
        .with_events(event_tx)
        .spawn(alarm_rx);

    let status = handle.status().await.unwrap();
    assert_eq!(status.alarms.len(), 2);
    assert!(status.applied_template_id.is_none());

    next_matching(&mut events, |e| matches!(e, Event::FocusBegan { .. })).await;
    let status = handle.status().await.unwrap();
    assert_eq!(status.applied_template_id.as_deref(), Some("tpl_work"));
    assert!(clock() >= NaiveDate::from_ymd_opt(2026, 10, 19).unwrap().and_hms_opt(9, 0, 0).unwrap());

    let fired = next_matching(&mut events, |e| matches!(e, Event::AlarmFired { edge: AlarmEdge::End, .. })).await;
    assert!(matches!(fired, Event::AlarmFired { ref template_id, .. } if template_id == "tpl_work"));
    next_matching(&mut events, |e| matches!(e, Event::FocusEnded { .. })).await;

    let status = handle.status().await.unwrap();
    assert!(status.applied_template_id.is_none());
    assert_eq!(
        status.next_due,
        Some(NaiveDate::from_ymd_opt(2026, 10, 26).unwrap().and_hms_opt(9, 0, 0).unwrap())
    );

    handle.shutdown().await.unwrap();
    let device = task.await.unwrap();
    assert_eq!(device.interruption_filter, InterruptionFilter::ALL);
}
