use crate::error::{Result, VaultError};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Summary of one polling pass over a batch of vaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// Vaults the tick started work on
    pub processed: usize,
    /// Vaults whose check completed without error
    pub checked: usize,
    /// Vaults whose status was written
    pub transitioned: usize,
    pub first_error: Option<VaultError>,
}

impl TickReport {
    /// Keeps only the first error; later ones are logged by the caller.
    pub fn record_error(&mut self, err: VaultError) {
        if self.first_error.is_none() {
            self.first_error = Some(err);
        }
    }
}

/// One pass of a background loop.
#[async_trait]
pub trait PollingJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn run_tick(&self, token: &CancellationToken) -> TickReport;
}

struct RunningTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns at most one running loop for a job.
///
/// `start` and `stop` may be called from any thread; a second `start` while
/// the loop is alive is rejected instead of spawning another loop.
pub struct PollingTask {
    period: Duration,
    running: Mutex<Option<RunningTask>>,
}

impl PollingTask {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            running: Mutex::new(None),
        }
    }

    pub fn start<J: PollingJob>(&self, job: Arc<J>, parent: &CancellationToken) -> bool {
        if parent.is_cancelled() {
            warn!(job = job.name(), "Shutdown already requested, ignoring start");
            return false;
        }

        let mut running = self.running.lock();
        if let Some(task) = running.as_ref() {
            if !task.handle.is_finished() && !task.token.is_cancelled() {
                warn!(job = job.name(), "Polling loop already running, ignoring start");
                return false;
            }
        }

        let token = parent.child_token();
        let loop_token = token.clone();
        let period = self.period;

        let handle = tokio::spawn(async move {
            info!(job = job.name(), period_secs = period.as_secs(), "Polling loop started");
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let report = job.run_tick(&loop_token).await;
                match &report.first_error {
                    Some(VaultError::Cancelled) => debug!(job = job.name(), "Tick interrupted by stop"),
                    Some(e) => warn!(
                        job = job.name(),
                        processed = report.processed,
                        checked = report.checked,
                        "Tick finished with errors: {}", e
                    ),
                    None => debug!(
                        job = job.name(),
                        processed = report.processed,
                        transitioned = report.transitioned,
                        "Tick finished"
                    ),
                }
            }

            info!(job = job.name(), "Polling loop stopped");
        });

        *running = Some(RunningTask { token, handle });
        true
    }

    /// Cancels the loop and waits for it to exit. Safe to call repeatedly.
    pub async fn stop(&self) {
        let task = self.running.lock().take();
        if let Some(task) = task {
            task.token.cancel();
            if let Err(e) = task.handle.await {
                if e.is_panic() {
                    error!("Polling loop panicked: {}", e);
                }
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .map(|task| !task.handle.is_finished() && !task.token.is_cancelled())
            .unwrap_or(false)
    }
}

/// Races `fut` against the token so a stop interrupts blocked I/O.
pub async fn cancellable<T, F>(token: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(VaultError::Cancelled),
        result = fut => result,
    }
}
