use crate::error::{BookingError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// A failed run of a background task, as seen by the operator.
#[derive(Debug)]
pub struct TaskFailure {
    pub task: &'static str,
    pub error: BookingError,
}

/// Sending half of the failure channel shared by background tasks.
pub type FailureSink = mpsc::Sender<TaskFailure>;

pub fn failure_channel(capacity: usize) -> (FailureSink, mpsc::Receiver<TaskFailure>) {
    mpsc::channel(capacity)
}

/// Runs `job` every `period` until `shutdown` fires.
///
/// A failed run is reported on `failures` and the loop carries on with the next
/// tick. Reports are dropped (and logged) rather than blocking the loop when the
/// channel is full or its receiver is gone.
pub fn spawn_periodic<F, Fut>(
    task: &'static str,
    period: Duration,
    shutdown: CancellationToken,
    failures: FailureSink,
    mut job: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(error) = job().await {
                if let Err(dropped) = failures.try_send(TaskFailure { task, error }) {
                    warn!(task, error = %dropped.into_inner().error, "failure report dropped");
                }
            }
        }
        debug!(task, "background task stopped");
    })
}
