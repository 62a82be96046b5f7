use std::sync::Arc;
use std::time::Duration;
use log::{debug, info, warn};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use df_core::JobEvent;
use crate::backend::JobApi;
use crate::config::Config;
use crate::events::EventProxy;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Option<Duration>,
}

impl From<&Config> for PollSettings {
    fn from(config: &Config) -> Self {
        Self {
            interval: config.poll_interval,
            timeout: config.poll_timeout,
        }
    }
}

/// Owns the poll task for one job. Dropping the handle stops polling.
pub struct PollerHandle {
    job_id: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn spawn(api: Arc<dyn JobApi>, job_id: String, settings: PollSettings, proxy: EventProxy) -> Self {
        let cancel = CancellationToken::new();
        let span = tracing::info_span!("poller", job_id = %job_id);
        let task = tokio::spawn(
            poll_job(api, job_id.clone(), settings, proxy, cancel.clone()).instrument(span),
        );

        Self { job_id, cancel, task }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Polls `GET /status/{job_id}` on a fixed period until a terminal result,
/// the optional timeout, or cancellation. Each request completes before the
/// next tick is taken, so results for one job arrive in request order.
/// Failed requests are logged and retried on the next tick.
async fn poll_job(
    api: Arc<dyn JobApi>,
    job_id: String,
    settings: PollSettings,
    proxy: EventProxy,
    cancel: CancellationToken,
) {
    let started = Instant::now();
    let mut ticker = interval_at(started + settings.interval, settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Polling cancelled");
                return;
            }
            _ = ticker.tick() => {}
        }

        if let Some(limit) = settings.timeout {
            if started.elapsed() >= limit {
                warn!("Giving up on job {} after {:?}", job_id, limit);
                proxy.send_job(JobEvent::TimedOut { job_id });
                return;
            }
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Polling cancelled mid-request");
                return;
            }
            result = api.status(&job_id) => result,
        };

        let update = match result {
            Ok(update) => update,
            Err(e) => {
                warn!("Status poll for job {} failed: {}", job_id, e);
                continue;
            }
        };

        let event = update.into_event(&job_id, |id| api.result_url(id));
        let terminal = !matches!(event, JobEvent::Progress { .. });
        if !proxy.send_job(event) {
            return;
        }

        if terminal {
            info!("Job {} reached a terminal status, polling stopped", job_id);
            return;
        }
    }
}
