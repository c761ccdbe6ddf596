use super::periodic::{FailureSink, spawn_periodic};
use crate::domain::clock::ClockRef;
use crate::domain::ports::ReservationStoreRef;
use crate::error::Result;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Removes reservations whose interval has fully elapsed, on a fixed period.
#[derive(Clone)]
pub struct ExpirySweeper {
    store: ReservationStoreRef,
    clock: ClockRef,
    period: Duration,
}

impl ExpirySweeper {
    pub fn new(store: ReservationStoreRef, clock: ClockRef, period: Duration) -> Self {
        Self {
            store,
            clock,
            period,
        }
    }

    pub async fn sweep_once(&self) -> Result<usize> {
        let now = self.clock.now();
        let swept = self.store.sweep_expired(now).await?;
        if swept > 0 {
            info!(swept, %now, "expired bookings removed");
        } else {
            debug!(%now, "no expired bookings");
        }
        Ok(swept)
    }

    /// Starts the sweep loop. It lives until `shutdown` fires; failed sweeps go to `failures`.
    pub fn spawn(self, shutdown: CancellationToken, failures: FailureSink) -> JoinHandle<()> {
        let period = self.period;
        spawn_periodic("expiry-sweeper", period, shutdown, failures, move || {
            let sweeper = self.clone();
            async move { sweeper.sweep_once().await.map(|_| ()) }
        })
    }
}
