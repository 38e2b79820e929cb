//! Background recovery: crediting wall-clock time that passed while the
//! process could not tick.
//!
//! When the app goes to the background with a running timer, the current
//! time is written to a [`TimestampStore`]. When it comes back (or starts up
//! again after a restart), the slot is read and cleared in one step and the
//! whole seconds in between are handed to the engine as a bulk advance.

use chrono::{DateTime, Duration, Utc};
use std::sync::mpsc::{self, Receiver, Sender};
#[cfg(test)]
use std::sync::Mutex;
use tracing::{debug, info};

/// Atomic read-and-clear slot for the moment the app went to the background.
pub trait TimestampStore {
    fn save_background_time(&self, at: DateTime<Utc>);

    /// Returns the saved time and clears the slot. Failures read as `None`.
    fn get_and_clear_background_time(&self) -> Option<DateTime<Utc>>;
}

/// In-process timestamp slot used by tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryTimestampStore {
    slot: Mutex<Option<DateTime<Utc>>>,
}

#[cfg(test)]
impl TimestampStore for MemoryTimestampStore {
    fn save_background_time(&self, at: DateTime<Utc>) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(at);
        }
    }

    fn get_and_clear_background_time(&self) -> Option<DateTime<Utc>> {
        self.slot.lock().ok().and_then(|mut slot| slot.take())
    }
}

/// Visibility change reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Hidden { at: DateTime<Utc> },
    Visible { at: DateTime<Utc> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Receiving end of a lifecycle subscription.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriptionId,
    events: Receiver<LifecycleEvent>,
}

/// Source of visibility changes with explicit subscribe/unsubscribe.
pub trait LifecycleSignal {
    fn subscribe(&mut self) -> Subscription;
    fn unsubscribe(&mut self, id: SubscriptionId);
}

/// Fan-out of lifecycle events to every live subscription.
#[derive(Debug, Default)]
pub struct SignalHub {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Sender<LifecycleEvent>)>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `event` to all subscribers, dropping those that hung up.
    pub fn emit(&mut self, event: LifecycleEvent) {
        self.subscribers.retain(|(_, tx)| tx.send(event).is_ok());
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl LifecycleSignal for SignalHub {
    fn subscribe(&mut self) -> Subscription {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        let (tx, rx) = mpsc::channel();
        self.subscribers.push((id, tx));
        Subscription { id, events: rx }
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscribers.retain(|(sub, _)| *sub != id);
    }
}

/// Whole seconds between `since` and `now`, or `None` below one second.
pub fn elapsed_seconds(since: DateTime<Utc>, now: DateTime<Utc>) -> Option<u64> {
    let secs = (now - since).num_milliseconds().div_euclid(1000);
    if secs < 1 {
        None
    } else {
        Some(secs as u64)
    }
}

/// Turns lifecycle events into elapsed-time credits for the engine.
#[derive(Debug, Default)]
pub struct BackgroundSync {
    subscription: Option<Subscription>,
}

impl BackgroundSync {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers with the host signal. A second call replaces the first
    /// registration.
    pub fn attach(&mut self, signal: &mut impl LifecycleSignal) {
        self.detach(signal);
        self.subscription = Some(signal.subscribe());
    }

    pub fn detach(&mut self, signal: &mut impl LifecycleSignal) {
        if let Some(sub) = self.subscription.take() {
            signal.unsubscribe(sub.id);
        }
    }

    #[cfg(test)]
    pub fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }

    /// Events received since the last call, in arrival order.
    pub fn pending(&self) -> Vec<LifecycleEvent> {
        self.subscription
            .as_ref()
            .map(|sub| sub.events.try_iter().collect())
            .unwrap_or_default()
    }

    /// Handles one event. Returns the seconds to credit on a resume.
    pub fn handle(
        &self,
        event: LifecycleEvent,
        store: &impl TimestampStore,
        is_running: bool,
    ) -> Option<u64> {
        match event {
            LifecycleEvent::Hidden { at } => {
                if is_running {
                    debug!(%at, "saving background time");
                    store.save_background_time(at);
                }
                None
            }
            LifecycleEvent::Visible { at } => Self::resume(store, at),
        }
    }

    /// Start-up check for a restart that happened while backgrounded.
    pub fn check_on_start(store: &impl TimestampStore, now: DateTime<Utc>) -> Option<u64> {
        Self::resume(store, now)
    }

    fn resume(store: &impl TimestampStore, now: DateTime<Utc>) -> Option<u64> {
        let saved = store.get_and_clear_background_time()?;
        let elapsed = elapsed_seconds(saved, now);
        if let Some(secs) = elapsed {
            info!(elapsed_secs = secs, "resuming after background");
        }
        elapsed
    }
}

/// Detects that the process was suspended by watching for gaps between
/// consecutive wake-ups of the tick driver.
#[derive(Debug, Clone)]
pub struct SuspendDetector {
    last_wake: DateTime<Utc>,
    threshold: Duration,
}

impl SuspendDetector {
    pub fn new(now: DateTime<Utc>, threshold: Duration) -> Self {
        Self {
            last_wake: now,
            threshold,
        }
    }

    /// Records a wake-up. A gap above the threshold yields the hidden/visible
    /// pair that brackets it.
    pub fn observe(&mut self, now: DateTime<Utc>) -> Option<[LifecycleEvent; 2]> {
        let last = std::mem::replace(&mut self.last_wake, now);
        if now - last > self.threshold {
            Some([
                LifecycleEvent::Hidden { at: last },
                LifecycleEvent::Visible { at: now },
            ])
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_elapsed_seconds_floors() {
        let now = t0() + Duration::milliseconds(30_999);
        assert_eq!(elapsed_seconds(t0(), now), Some(30));
    }

    #[test]
    fn test_elapsed_seconds_ignores_sub_second_and_backwards() {
        assert_eq!(elapsed_seconds(t0(), t0() + Duration::milliseconds(999)), None);
        assert_eq!(elapsed_seconds(t0(), t0()), None);
        assert_eq!(elapsed_seconds(t0(), t0() - Duration::seconds(5)), None);
    }

    #[test]
    fn test_memory_store_read_clears() {
        let store = MemoryTimestampStore::default();
        store.save_background_time(t0());
        assert_eq!(store.get_and_clear_background_time(), Some(t0()));
        assert_eq!(store.get_and_clear_background_time(), None);
    }

    #[test]
    fn test_hidden_saves_only_when_running() {
        let sync = BackgroundSync::new();
        let store = MemoryTimestampStore::default();

        sync.handle(LifecycleEvent::Hidden { at: t0() }, &store, false);
        assert_eq!(store.get_and_clear_background_time(), None);

        sync.handle(LifecycleEvent::Hidden { at: t0() }, &store, true);
        assert_eq!(store.get_and_clear_background_time(), Some(t0()));
    }

    #[test]
    fn test_visible_credits_elapsed_seconds() {
        let sync = BackgroundSync::new();
        let store = MemoryTimestampStore::default();
        sync.handle(LifecycleEvent::Hidden { at: t0() }, &store, true);

        let credit = sync.handle(
            LifecycleEvent::Visible {
                at: t0() + Duration::seconds(30),
            },
            &store,
            true,
        );
        assert_eq!(credit, Some(30));

        // slot was cleared by the first resume
        let again = sync.handle(
            LifecycleEvent::Visible {
                at: t0() + Duration::seconds(60),
            },
            &store,
            true,
        );
        assert_eq!(again, None);
    }

    #[test]
    fn test_visible_without_saved_time_does_nothing() {
        let sync = BackgroundSync::new();
        let store = MemoryTimestampStore::default();
        let credit = sync.handle(LifecycleEvent::Visible { at: t0() }, &store, true);
        assert_eq!(credit, None);
    }

    #[test]
    fn test_sub_second_resume_is_dropped_and_cleared() {
        let sync = BackgroundSync::new();
        let store = MemoryTimestampStore::default();
        sync.handle(LifecycleEvent::Hidden { at: t0() }, &store, true);
        let credit = sync.handle(
            LifecycleEvent::Visible {
                at: t0() + Duration::milliseconds(400),
            },
            &store,
            true,
        );
        assert_eq!(credit, None);
        assert_eq!(store.get_and_clear_background_time(), None);
    }

    #[test]
    fn test_check_on_start() {
        let store = MemoryTimestampStore::default();
        store.save_background_time(t0());
        let credit = BackgroundSync::check_on_start(&store, t0() + Duration::seconds(90));
        assert_eq!(credit, Some(90));
        assert_eq!(BackgroundSync::check_on_start(&store, t0()), None);
    }

    #[test]
    fn test_attach_receives_and_detach_stops() {
        let mut hub = SignalHub::new();
        let mut sync = BackgroundSync::new();
        sync.attach(&mut hub);
        assert!(sync.is_attached());
        assert_eq!(hub.subscriber_count(), 1);

        hub.emit(LifecycleEvent::Hidden { at: t0() });
        hub.emit(LifecycleEvent::Visible { at: t0() });
        assert_eq!(
            sync.pending(),
            vec![
                LifecycleEvent::Hidden { at: t0() },
                LifecycleEvent::Visible { at: t0() }
            ]
        );
        assert!(sync.pending().is_empty());

        sync.detach(&mut hub);
        assert!(!sync.is_attached());
        assert_eq!(hub.subscriber_count(), 0);
        hub.emit(LifecycleEvent::Hidden { at: t0() });
        assert!(sync.pending().is_empty());
    }

    #[test]
    fn test_reattach_keeps_single_registration() {
        let mut hub = SignalHub::new();
        let mut sync = BackgroundSync::new();
        sync.attach(&mut hub);
        sync.attach(&mut hub);
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn test_hub_drops_closed_subscribers() {
        let mut hub = SignalHub::new();
        let sub = hub.subscribe();
        drop(sub);
        hub.emit(LifecycleEvent::Visible { at: t0() });
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn test_suspend_detector() {
        let mut detector = SuspendDetector::new(t0(), Duration::seconds(2));
        assert_eq!(detector.observe(t0() + Duration::seconds(1)), None);
        assert_eq!(detector.observe(t0() + Duration::seconds(2)), None);

        let resumed = t0() + Duration::seconds(62);
        assert_eq!(
            detector.observe(resumed),
            Some([
                LifecycleEvent::Hidden {
                    at: t0() + Duration::seconds(2)
                },
                LifecycleEvent::Visible { at: resumed }
            ])
        );
        assert_eq!(detector.observe(resumed + Duration::seconds(1)), None);
    }
}
