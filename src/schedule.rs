//! Fixed-interval scheduling with single-flight protection.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Guarantees that at most one execution of a routine is active at a time.
///
/// Cloning shares the same flag.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    in_flight: Arc<AtomicBool>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the flight. Returns `None` while another holder is active.
    pub fn try_acquire(&self) -> Option<FlightGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard {
                in_flight: Arc::clone(&self.in_flight),
            })
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }
}

/// Releases the flight when dropped, including on panic unwind.
#[derive(Debug)]
pub struct FlightGuard {
    in_flight: Arc<AtomicBool>,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.in_flight.store(false, Ordering::Release);
    }
}

/// Run `job` every `interval` until `shutdown` flips to true.
///
/// Triggers that arrive while the previous run is still active are skipped.
/// A job already running when shutdown is signalled is allowed to finish.
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    interval: Duration,
    flight: SingleFlight,
    mut shutdown: watch::Receiver<bool>,
    mut job: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    debug!(task = name, interval_ms = interval.as_millis() as u64, "Periodic task started");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }

        match flight.try_acquire() {
            Some(_guard) => job().await,
            None => debug!(task = name, "Previous run still in flight, skipping trigger"),
        }
    }

    info!(task = name, "Periodic task stopped");
}
