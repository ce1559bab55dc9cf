//! Cancellable one-shot and repeating timers
//!
//! Timers never run coordinator code themselves. Each firing is sent back to
//! the coordination task as a [`TimerFired`] message and handled there like
//! any other input. Every timer has an id. Cancelling aborts its task and
//! forgets the id, and [`Timers::accept`] rejects firings whose id is no
//! longer active. A firing that was already queued when the timer was
//! cancelled is therefore discarded.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::trace;

/// What a timer is for; decides how the coordinator reacts to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Hotspot came up; enumerate its addresses
    HotspotDebounce,
    /// Re-run reconciliation after hotspot addresses were added
    HotspotFollowUp,
    /// Restart a non-looping ringtone that stopped
    RingtoneRestart,
    /// Pulse the vibrator while ringing
    Vibrate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub id: TimerId,
    pub kind: TimerKind,
}

struct ActiveTimer {
    kind: TimerKind,
    repeating: bool,
    task: JoinHandle<()>,
}

pub struct Timers {
    next_id: u64,
    active: HashMap<TimerId, ActiveTimer>,
    tx: mpsc::UnboundedSender<TimerFired>,
}

impl Timers {
    /// Create the timer set and the receiver its firings arrive on
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let timers = Self {
            next_id: 1,
            active: HashMap::new(),
            tx,
        };
        (timers, rx)
    }

    pub fn schedule_once(&mut self, kind: TimerKind, delay: Duration) -> TimerId {
        let id = self.allocate_id();
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            time::sleep(delay).await;
            let _ = tx.send(TimerFired { id, kind });
        });
        trace!(%id, ?kind, ?delay, "Scheduled one-shot timer");
        self.active.insert(id, ActiveTimer { kind, repeating: false, task });
        id
    }

    pub fn schedule_repeating(&mut self, kind: TimerKind, initial: Duration, period: Duration) -> TimerId {
        let id = self.allocate_id();
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            let mut ticks = time::interval_at(Instant::now() + initial, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if tx.send(TimerFired { id, kind }).is_err() {
                    break;
                }
            }
        });
        trace!(%id, ?kind, ?initial, ?period, "Scheduled repeating timer");
        self.active.insert(id, ActiveTimer { kind, repeating: true, task });
        id
    }

    /// Cancel one timer; `false` if it was not active
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.active.remove(&id) {
            Some(timer) => {
                timer.task.abort();
                trace!(%id, kind = ?timer.kind, "Cancelled timer");
                true
            }
            None => false,
        }
    }

    /// Cancel every timer of a kind, returning how many were active
    pub fn cancel_kind(&mut self, kind: TimerKind) -> usize {
        let ids: Vec<TimerId> = self
            .active
            .iter()
            .filter(|(_, t)| t.kind == kind)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            self.cancel(*id);
        }
        ids.len()
    }

    pub fn cancel_all(&mut self) {
        for (_, timer) in self.active.drain() {
            timer.task.abort();
        }
    }

    /// Check a firing against the active set
    ///
    /// Returns `false` for firings of cancelled timers. One-shot timers are
    /// retired on their first accepted firing.
    pub fn accept(&mut self, fired: &TimerFired) -> bool {
        match self.active.get(&fired.id) {
            Some(timer) if timer.kind == fired.kind => {
                if !timer.repeating {
                    self.active.remove(&fired.id);
                }
                true
            }
            _ => {
                trace!(id = %fired.id, "Discarding stale timer firing");
                false
            }
        }
    }

    pub fn is_active(&self, kind: TimerKind) -> bool {
        self.active.values().any(|t| t.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    fn allocate_id(&mut self) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        id
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

impl fmt::Debug for Timers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timers")
            .field("active", &self.active.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_one_shot_fires_once() {
        let (mut timers, mut rx) = Timers::new();
        let id = timers.schedule_once(TimerKind::HotspotDebounce, Duration::from_millis(1000));

        time::advance(Duration::from_millis(999)).await;
        assert!(rx.try_recv().is_err());

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.id, id);
        assert!(timers.accept(&fired));
        assert!(!timers.accept(&fired));
        assert!(timers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeating_honours_initial_delay() {
        let (mut timers, mut rx) = Timers::new();
        let start = Instant::now();
        timers.schedule_repeating(
            TimerKind::Vibrate,
            Duration::from_millis(500),
            Duration::from_millis(2000),
        );

        let first = rx.recv().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(500));
        assert!(timers.accept(&first));

        let second = rx.recv().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_millis(2500));
        assert!(timers.accept(&second));
        assert!(timers.is_active(TimerKind::Vibrate));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_firing_is_discarded() {
        let (mut timers, mut rx) = Timers::new();
        timers.schedule_repeating(TimerKind::RingtoneRestart, Duration::ZERO, Duration::from_secs(1));

        // Let it fire, then cancel before the firing is handled
        let queued = rx.recv().await.unwrap();
        assert_eq!(timers.cancel_kind(TimerKind::RingtoneRestart), 1);
        assert!(!timers.accept(&queued));

        time::advance(Duration::from_secs(5)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all() {
        let (mut timers, mut rx) = Timers::new();
        timers.schedule_once(TimerKind::HotspotFollowUp, Duration::from_secs(2));
        timers.schedule_repeating(TimerKind::Vibrate, Duration::from_millis(500), Duration::from_secs(2));
        timers.cancel_all();
        assert!(timers.is_empty());

        time::advance(Duration::from_secs(10)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }
}
