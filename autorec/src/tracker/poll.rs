//! Per-adapter polling driver.

use std::sync::Arc;

use sites::{ProbeOutcome, SiteAdapter};
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::tracker::Shared;

/// Drive one adapter: an immediate pass on startup, then a pass per tick
/// and whenever the check-now signal fires. The tick length is re-read
/// before every wait so config changes take effect within one period.
/// Passes run to completion before the next one starts.
pub(crate) async fn run(shared: Arc<Shared>, adapter: Arc<dyn SiteAdapter>, check_now: Arc<Notify>) {
    let hostname = adapter.hostname().to_string();
    debug!("{hostname}: poller started");

    pass(&shared, &adapter).await;

    loop {
        let tick = shared.cfg.get().check_every();
        tokio::select! {
            _ = shared.shutdown.cancelled() => {
                debug!("{hostname}: poller done");
                return;
            }
            _ = tokio::time::sleep(tick) => {}
            _ = check_now.notified() => debug!("{hostname}: check now"),
        }
        pass(&shared, &adapter).await;
    }
}

/// One `check_upcoming` pass, re-attempted with backoff while the adapter
/// reports a retryable failure. The adapter decides when to give up by
/// returning `Fail`.
async fn pass(shared: &Arc<Shared>, adapter: &Arc<dyn SiteAdapter>) {
    let hostname = adapter.hostname();
    let mut attempt = 0;
    loop {
        let targets = shared.registry.targets_for_host(hostname);
        let delay = match adapter.check_upcoming(&targets).await {
            ProbeOutcome::Found(()) => {
                debug!("{hostname}: poll ok");
                return;
            }
            ProbeOutcome::RetryNow(reason) => {
                warn!("{hostname}: {reason}");
                std::time::Duration::ZERO
            }
            ProbeOutcome::Retry(reason) => {
                warn!("{hostname}: {reason}");
                shared.policy.delay(attempt)
            }
            ProbeOutcome::Fail(reason) => {
                warn!("{hostname}: poll pass failed: {reason}");
                return;
            }
        };
        attempt += 1;

        tokio::select! {
            _ = shared.shutdown.cancelled() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
