//! Single-writer service.
//!
//! One tokio task owns the [`Automation`]. User commands arrive over an mpsc
//! queue and timer firings over the alarm channel; both are handled one at a
//! time on that task, so Begin and End can never interleave in-process.
//! Other processes are kept out by the store lock each operation takes, and
//! their writes arrive as [`Command::StateChanged`].

use chrono::NaiveDateTime;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::alarm::{AlarmBackend, AlarmFired, AlarmKey};
use crate::automation::{events_for_begin, events_for_end, report_events, rescheduled_event, Automation};
use crate::engine::{ApplyReport, EndOutcome};
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::platform::Platform;
use crate::reconcile::ReconcileReport;
use crate::template::TemplateId;

const COMMAND_QUEUE_DEPTH: usize = 32;

/// Requests accepted by the service.
#[derive(Debug)]
pub enum Command {
    Begin {
        template_id: TemplateId,
        reply: oneshot::Sender<Result<ApplyReport>>,
    },
    /// End the given template, or whatever is applied when `None`.
    End {
        template_id: Option<TemplateId>,
        reply: oneshot::Sender<Result<EndOutcome>>,
    },
    Reconcile {
        reply: oneshot::Sender<Result<ReconcileReport>>,
    },
    /// Handle a timer firing as if it came from the backend.
    Alarm(AlarmFired),
    /// The state file was written outside this service; re-arm timers.
    StateChanged,
    Status {
        reply: oneshot::Sender<ServiceStatus>,
    },
    Shutdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub applied_template_id: Option<TemplateId>,
    pub alarms: Vec<(AlarmKey, NaiveDateTime)>,
    pub next_due: Option<NaiveDateTime>,
}

/// Cloneable sender side of the service.
#[derive(Debug, Clone)]
pub struct AutomationHandle {
    tx: mpsc::Sender<Command>,
}

impl AutomationHandle {
    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| CoreError::ServiceStopped)?;
        rx.await.map_err(|_| CoreError::ServiceStopped)
    }

    pub async fn begin(&self, template_id: &str) -> Result<ApplyReport> {
        let template_id = template_id.to_string();
        self.request(|reply| Command::Begin { template_id, reply }).await?
    }

    pub async fn end(&self, template_id: Option<&str>) -> Result<EndOutcome> {
        let template_id = template_id.map(str::to_string);
        self.request(|reply| Command::End { template_id, reply }).await?
    }

    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        self.request(|reply| Command::Reconcile { reply }).await?
    }

    pub async fn status(&self) -> Result<ServiceStatus> {
        self.request(|reply| Command::Status { reply }).await
    }

    pub async fn fire(&self, fired: AlarmFired) -> Result<()> {
        self.tx
            .send(Command::Alarm(fired))
            .await
            .map_err(|_| CoreError::ServiceStopped)
    }

    pub async fn state_changed(&self) -> Result<()> {
        self.tx
            .send(Command::StateChanged)
            .await
            .map_err(|_| CoreError::ServiceStopped)
    }

    /// Blocking form of [`state_changed`](Self::state_changed) for watcher
    /// threads. Returns `false` once the service has stopped. Must not be
    /// called from async code.
    pub fn notify_state_changed(&self) -> bool {
        self.tx.blocking_send(Command::StateChanged).is_ok()
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(Command::Shutdown)
            .await
            .map_err(|_| CoreError::ServiceStopped)
    }
}

pub struct AutomationService<P, B> {
    automation: Automation<P, B>,
    events: Option<mpsc::UnboundedSender<Event>>,
}

impl<P, B> AutomationService<P, B>
where
    P: Platform + Send + 'static,
    B: AlarmBackend + Send + 'static,
{
    pub fn new(automation: Automation<P, B>) -> Self {
        Self {
            automation,
            events: None,
        }
    }

    /// Forward every produced event to `tx`.
    pub fn with_events(mut self, tx: mpsc::UnboundedSender<Event>) -> Self {
        self.events = Some(tx);
        self
    }

    /// Start the service task. It stops on [`Command::Shutdown`] or when
    /// every handle is dropped, and yields the platform back.
    pub fn spawn(self, alarms: mpsc::UnboundedReceiver<AlarmFired>) -> (AutomationHandle, JoinHandle<P>) {
        let (tx, commands) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let task = tokio::spawn(self.run(commands, alarms));
        (AutomationHandle { tx }, task)
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut alarms: mpsc::UnboundedReceiver<AlarmFired>,
    ) -> P {
        self.startup();

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle(cmd),
                },
                Some(fired) = alarms.recv() => {
                    let events = self.automation.handle_alarm(&fired);
                    self.emit(events);
                }
            }
        }

        tracing::info!("automation service stopped");
        self.automation.into_platform()
    }

    fn startup(&mut self) {
        if self.automation.config().automation.reconcile_on_start {
            match self.automation.reconcile() {
                Ok(report) => {
                    let events = report_events(&report);
                    self.emit(events);
                }
                Err(e) => tracing::error!(error = %e, "startup reconcile failed"),
            }
        } else {
            let summary = self.automation.reschedule();
            tracing::info!(registered = summary.registered, "alarms registered");
        }
    }

    fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Begin { template_id, reply } => {
                let result = self.automation.begin(&template_id);
                if let Ok(report) = &result {
                    self.emit(events_for_begin(report));
                }
                let _ = reply.send(result);
            }
            Command::End { template_id, reply } => {
                let result = match template_id {
                    Some(id) => self.automation.end(&id),
                    None => self.automation.end_applied(),
                };
                if let Ok(outcome) = &result {
                    self.emit(events_for_end(outcome));
                }
                let _ = reply.send(result);
            }
            Command::Reconcile { reply } => {
                let result = self.automation.reconcile();
                if let Ok(report) = &result {
                    self.emit(report_events(report));
                }
                let _ = reply.send(result);
            }
            Command::Alarm(fired) => {
                let events = self.automation.handle_alarm(&fired);
                self.emit(events);
            }
            Command::StateChanged => match self.automation.resync() {
                Ok(summary) => self.emit(vec![rescheduled_event(&summary)]),
                Err(e) => tracing::warn!(error = %e, "resync after state change failed"),
            },
            Command::Status { reply } => {
                let alarms = self.automation.alarms();
                let next_due = alarms.iter().map(|(_, at)| *at).min();
                let _ = reply.send(ServiceStatus {
                    applied_template_id: self.automation.state().applied_template_id().map(str::to_string),
                    alarms,
                    next_due,
                });
            }
            Command::Shutdown => {}
        }
    }

    fn emit(&mut self, events: Vec<Event>) {
        for event in events {
            tracing::info!(?event, "automation event");
            if let Some(tx) = &self.events {
                let _ = tx.send(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::{AlarmEdge, NoopAlarmBackend};
    use crate::platform::SimulatedDevice;
    use crate::schedule::Schedule;
    use crate::storage::{Config, StateStore};
    use crate::template::TemplatePatch;
    use std::time::Duration;

    fn automation(dir: &tempfile::TempDir) -> Automation<SimulatedDevice, NoopAlarmBackend> {
        let mut config = Config::default();
        config.automation.reconcile_on_start = false;
        Automation::open(
            StateStore::with_path(dir.path().join("state.json")),
            SimulatedDevice::new(),
            NoopAlarmBackend,
            config,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn begin_end_through_the_queue() {
        let dir = tempfile::tempdir().unwrap();
        let (_alarm_tx, alarm_rx) = mpsc::unbounded_channel();
        let (handle, task) = AutomationService::new(automation(&dir)).spawn(alarm_rx);

        let report = handle.begin("tpl_work").await.unwrap();
        assert!(report.snapshot_captured);
        assert_eq!(
            handle.status().await.unwrap().applied_template_id.as_deref(),
            Some("tpl_work")
        );

        let outcome = handle.end(None).await.unwrap();
        assert!(matches!(outcome, EndOutcome::Restored(_)));

        handle.shutdown().await.unwrap();
        let device = task.await.unwrap();
        assert_eq!(device.interruption_filter, crate::platform::InterruptionFilter::ALL);
    }

    #[tokio::test]
    async fn concurrent_begins_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let (_alarm_tx, alarm_rx) = mpsc::unbounded_channel();
        let (handle, task) = AutomationService::new(automation(&dir)).spawn(alarm_rx);

        let (a, b) = tokio::join!(handle.begin("tpl_work"), handle.begin("tpl_gym"));
        a.unwrap();
        b.unwrap();

        // Whichever ran second handed off from the first; one snapshot survives.
        handle.end(None).await.unwrap();
        handle.shutdown().await.unwrap();
        let device = task.await.unwrap();
        assert_eq!(device.interruption_filter, crate::platform::InterruptionFilter::ALL);
        assert!(StateStore::with_path(dir.path().join("state.json"))
            .load()
            .unwrap()
            .session()
            .is_idle());
    }

    #[tokio::test]
    async fn alarms_and_events_flow() {
        let dir = tempfile::tempdir().unwrap();
        let (alarm_tx, alarm_rx) = mpsc::unbounded_channel();
        let (event_tx, mut event_rx) = mpsc::unbounded_channel();

        let (handle, task) = AutomationService::new(automation(&dir))
            .with_events(event_tx)
            .spawn(alarm_rx);

        alarm_tx
            .send(AlarmFired {
                template_id: "tpl_family".into(),
                edge: AlarmEdge::Start,
            })
            .unwrap();

        let first = event_rx.recv().await.unwrap();
        assert!(matches!(first, Event::AlarmFired { ref template_id, .. } if template_id == "tpl_family"));

        let status = handle.status().await.unwrap();
        assert_eq!(status.applied_template_id.as_deref(), Some("tpl_family"));
        assert!(event_rx.try_recv().is_ok());

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn outside_write_rearms_timers_through_the_watcher() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("state.json");
        let (_alarm_tx, alarm_rx) = mpsc::unbounded_channel();
        let (handle, task) = AutomationService::new(automation(&dir)).spawn(alarm_rx);
        let _watcher = crate::watch::watch_state(&state_path, handle.clone()).unwrap();
        assert!(handle.status().await.unwrap().alarms.is_empty());

        let other = StateStore::with_path(&state_path);
        let mut state = other.load().unwrap();
        state
            .update_template(
                "tpl_gym",
                TemplatePatch {
                    schedule: Some(Some(Schedule::new([1], 540, 570))),
                    ..Default::default()
                },
            )
            .unwrap();
        other.save(&state).unwrap();

        let armed = tokio::time::timeout(Duration::from_secs(10), async {
            loop {
                let status = handle.status().await.unwrap();
                if status.alarms.len() == 2 {
                    return status;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .expect("watcher never delivered the change");
        assert!(armed.alarms.iter().all(|(k, _)| k.template_id == "tpl_gym"));

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn stopped_service_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let (_alarm_tx, alarm_rx) = mpsc::unbounded_channel();
        let (handle, task) = AutomationService::new(automation(&dir)).spawn(alarm_rx);
        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert!(matches!(handle.begin("tpl_work").await, Err(CoreError::ServiceStopped)));
    }
}
