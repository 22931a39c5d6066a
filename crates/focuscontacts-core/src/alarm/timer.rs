//! Timer delivery on the tokio runtime.
//!
//! Each armed key owns one sleeping task. Expiry sends an [`AlarmFired`] into
//! an unbounded channel; nothing ever waits for a timer. Sleeps run on the
//! monotonic clock, so a host suspend can delay or skip a firing.

use chrono::NaiveDateTime;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{AlarmBackend, AlarmFired, AlarmKey};
use crate::schedule::now_local;

/// Must be used from inside a tokio runtime.
pub struct TokioAlarmBackend {
    tx: mpsc::UnboundedSender<AlarmFired>,
    tasks: HashMap<AlarmKey, JoinHandle<()>>,
    clock: fn() -> NaiveDateTime,
}

impl TokioAlarmBackend {
    pub fn new(tx: mpsc::UnboundedSender<AlarmFired>) -> Self {
        Self::with_clock(tx, now_local)
    }

    pub fn with_clock(tx: mpsc::UnboundedSender<AlarmFired>, clock: fn() -> NaiveDateTime) -> Self {
        Self {
            tx,
            tasks: HashMap::new(),
            clock,
        }
    }

    /// Backend plus the receiving end of its firings.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AlarmFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl AlarmBackend for TokioAlarmBackend {
    fn register(&mut self, key: &AlarmKey, at: NaiveDateTime) {
        if let Some(previous) = self.tasks.remove(key) {
            previous.abort();
        }

        let delay = (at - (self.clock)()).to_std().unwrap_or_default();
        let tx = self.tx.clone();
        let fired = AlarmFired::from(key);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if tx.send(fired).is_err() {
                tracing::debug!("alarm receiver dropped");
            }
        });
        self.tasks.insert(key.clone(), handle);
    }

    fn cancel(&mut self, key: &AlarmKey) {
        if let Some(handle) = self.tasks.remove(key) {
            handle.abort();
        }
    }
}

impl Drop for TokioAlarmBackend {
    fn drop(&mut self) {
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::AlarmEdge;
    use chrono::NaiveDate;
    use std::time::Duration;

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap().and_hms_opt(8, 0, 0).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut backend = TokioAlarmBackend::with_clock(tx, fixed_now);
        let key = AlarmKey::new("a", AlarmEdge::Start);
        backend.register(&key, fixed_now() + chrono::Duration::hours(1));

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired, AlarmFired::from(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn past_time_fires_immediately() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut backend = TokioAlarmBackend::with_clock(tx, fixed_now);
        let key = AlarmKey::new("a", AlarmEdge::End);
        backend.register(&key, fixed_now() - chrono::Duration::minutes(5));

        assert_eq!(rx.recv().await.unwrap().edge, AlarmEdge::End);
    }

    #[tokio::test(start_paused = true)]
    async fn re_registering_replaces_the_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut backend = TokioAlarmBackend::with_clock(tx, fixed_now);
        let key = AlarmKey::new("a", AlarmEdge::Start);
        backend.register(&key, fixed_now() + chrono::Duration::minutes(10));
        backend.register(&key, fixed_now() + chrono::Duration::minutes(20));
        assert_eq!(backend.tasks.len(), 1);

        let first = tokio::time::timeout(Duration::from_secs(15 * 60), rx.recv()).await;
        assert!(first.is_err(), "replaced timer must not fire");
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut backend = TokioAlarmBackend::with_clock(tx, fixed_now);
        let key = AlarmKey::new("a", AlarmEdge::Start);
        backend.register(&key, fixed_now() + chrono::Duration::minutes(1));
        backend.cancel(&key);

        let got = tokio::time::timeout(Duration::from_secs(3600), rx.recv()).await;
        assert!(got.is_err());
        assert!(backend.tasks.is_empty());
    }
}
