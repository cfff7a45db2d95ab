use std::collections::HashSet;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use super::domain::alert::Alert;
use super::domain::alert_sink::AlertSink;
use super::domain::cooldown_ledger::CooldownLedger;

type CooldownKey = (String, String);
pub type SharedClock = Arc<dyn Fn() -> Instant + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handed to the delivery worker.
    Queued,
    /// Sent too recently for this species and recipient, or a delivery is
    /// already in flight.
    CoolingDown,
    /// The delivery worker is gone.
    Unavailable,
}

#[derive(Default)]
struct Pending {
    queued: usize,
    in_flight: HashSet<CooldownKey>,
}

struct Shared {
    ledger: Mutex<CooldownLedger<CooldownKey>>,
    pending: Mutex<Pending>,
    idle: Condvar,
    clock: SharedClock,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ledger(&self) -> MutexGuard<'_, CooldownLedger<CooldownKey>> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Fire-and-forget alert delivery with a per-species, per-recipient cooldown.
///
/// The cooldown starts only when a delivery succeeds; a failed delivery
/// leaves the key ready for the next attempt.
pub struct AlertDispatcher {
    sender: Option<Sender<Alert>>,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl AlertDispatcher {
    pub fn new(sink: Arc<dyn AlertSink>, cooldown: Duration) -> Self {
        Self::with_clock(sink, cooldown, Arc::new(Instant::now))
    }

    pub fn with_clock(sink: Arc<dyn AlertSink>, cooldown: Duration, clock: SharedClock) -> Self {
        let shared = Arc::new(Shared {
            ledger: Mutex::new(CooldownLedger::new(cooldown)),
            pending: Mutex::new(Pending::default()),
            idle: Condvar::new(),
            clock,
        });
        let (sender, receiver) = crossbeam_channel::unbounded::<Alert>();
        let worker = spawn_worker(sink, receiver, shared.clone());
        Self {
            sender: Some(sender),
            shared,
            worker: Some(worker),
        }
    }

    pub fn send_if_ready(&self, alert: Alert) -> DispatchOutcome {
        let key = alert.cooldown_key();
        let now = (self.shared.clock)();
        let Some(sender) = &self.sender else {
            return DispatchOutcome::Unavailable;
        };

        let mut pending = self.shared.pending();
        if pending.in_flight.contains(&key) || !self.shared.ledger().is_ready(&key, now) {
            log::debug!("Alert for {} to {} is cooling down", key.0, key.1);
            return DispatchOutcome::CoolingDown;
        }
        if sender.send(alert).is_err() {
            log::warn!("Alert worker stopped, dropping alert for {}", key.0);
            return DispatchOutcome::Unavailable;
        }
        pending.queued += 1;
        pending.in_flight.insert(key);
        DispatchOutcome::Queued
    }

    /// Blocks until every queued alert has been attempted.
    pub fn flush(&self) {
        let mut pending = self.shared.pending();
        while pending.queued > 0 {
            pending = self
                .shared
                .idle
                .wait(pending)
                .unwrap_or_else(|e| e.into_inner());
        }
    }
}

impl Drop for AlertDispatcher {
    fn drop(&mut self) {
        self.sender = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("Alert worker panicked");
            }
        }
    }
}

fn spawn_worker(
    sink: Arc<dyn AlertSink>,
    receiver: Receiver<Alert>,
    shared: Arc<Shared>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for alert in receiver {
            let key = alert.cooldown_key();
            match sink.deliver(&alert) {
                Ok(()) => {
                    shared.ledger().record(key.clone(), (shared.clock)());
                    log::info!("Alert sent for {} to {}", alert.species, alert.recipient);
                }
                Err(e) => log::warn!("Alert for {} not delivered: {e}", alert.species),
            }

            let mut pending = shared.pending();
            pending.in_flight.remove(&key);
            pending.queued -= 1;
            if pending.queued == 0 {
                shared.idle.notify_all();
            }
        }
    })
}
