//! The sniper: waits for a scheduled broadcast to start, then probes for
//! its stream URL and hands off to the saver.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sites::backoff::Policy;
use sites::{ProbeOutcome, Target};
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::tracker::tasks::SnipeKey;
use crate::tracker::{Shared, save};

/// Why a snipe (or a recovery probe) stopped without a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(crate) enum SnipeError {
    #[error("timeout")]
    Timeout,
    #[error("did not find a stream url")]
    NotFound,
    #[error("cancelled")]
    Cancelled,
}

/// Run one snipe for `(link, at)`. The caller has already registered the
/// snipe task; this removes it again on every exit path.
pub(crate) async fn run(shared: Arc<Shared>, tracked: Arc<crate::tracker::Tracked>, at: DateTime<Utc>) {
    let key = SnipeKey::new(tracked.link(), at);
    let name = tracked.name().to_string();

    let result = snipe(&shared, &tracked, at).await;
    shared.snipes.remove(&key);

    match result {
        Ok(()) => {}
        Err(SnipeError::Timeout) => info!("{name}: timeout"),
        Err(SnipeError::NotFound) => info!("{name}: did not find url"),
        Err(SnipeError::Cancelled) => debug!("{name}: cancelled"),
    }
}

async fn snipe(
    shared: &Arc<Shared>,
    tracked: &Arc<crate::tracker::Tracked>,
    at: DateTime<Utc>,
) -> Result<(), SnipeError> {
    let name = tracked.name().to_string();
    let link = tracked.link().to_string();

    tracked.target().on_snipe().await;
    shared.hooks.run(
        "begin-snipe",
        serde_json::json!({"Name": name, "Link": link}),
    );

    let cancel = tracked.cancel_token();

    // Wait until we expect the target to stream. The cancel token is a
    // child of the shutdown token, so one arm covers both.
    let wait = (at - Utc::now()).to_std().unwrap_or_default();
    tokio::select! {
        _ = cancel.cancelled() => return Err(SnipeError::Cancelled),
        _ = tokio::time::sleep(wait) => {}
    }

    let deadline = Instant::now() + shared.cfg.get().snipe_timeout();

    wait_for_live(tracked.target().as_ref(), &shared.policy, deadline, &cancel).await?;
    info!("{name} is online");

    let stream_url =
        wait_for_stream(tracked.target().as_ref(), &shared.policy, deadline, &cancel).await?;
    info!("{name}: found url");

    if shared.saves.has(&link) {
        // Another session is already recording this target.
        debug!("{name}: already saving");
        return Ok(());
    }

    let tasks = shared.tasks.clone();
    let shared = shared.clone();
    let tracked = tracked.clone();
    tasks.spawn(async move { save::run(shared, tracked, stream_url).await });

    Ok(())
}

/// Poll `check_live` with backoff until the target is live.
pub(crate) async fn wait_for_live(
    target: &dyn Target,
    policy: &Policy,
    deadline: Instant,
    cancel: &CancellationToken,
) -> Result<(), SnipeError> {
    let mut attempt = 0;
    loop {
        let delay = match target.check_live().await {
            ProbeOutcome::Found(true) => return Ok(()),
            ProbeOutcome::Found(false) => policy.delay(attempt),
            ProbeOutcome::Retry(reason) => {
                debug!("{reason}");
                policy.delay(attempt)
            }
            ProbeOutcome::RetryNow(reason) => {
                debug!("{reason}");
                std::time::Duration::ZERO
            }
            ProbeOutcome::Fail(reason) => {
                debug!("{reason}");
                return Err(SnipeError::NotFound);
            }
        };
        attempt += 1;

        if Instant::now() + delay >= deadline {
            tokio::select! {
                _ = cancel.cancelled() => return Err(SnipeError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => return Err(SnipeError::Timeout),
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => return Err(SnipeError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Poll `check_stream` with backoff until a non-empty stream URL appears.
pub(crate) async fn wait_for_stream(
    target: &dyn Target,
    policy: &Policy,
    deadline: Instant,
    cancel: &CancellationToken,
) -> Result<String, SnipeError> {
    let mut attempt = 0;
    loop {
        let delay = match target.check_stream().await {
            ProbeOutcome::Found(url) if !url.is_empty() => return Ok(url),
            ProbeOutcome::Found(_) => policy.delay(attempt),
            ProbeOutcome::Retry(reason) => {
                debug!("{reason}");
                policy.delay(attempt)
            }
            ProbeOutcome::RetryNow(reason) => {
                debug!("{reason}");
                std::time::Duration::ZERO
            }
            ProbeOutcome::Fail(reason) => {
                debug!("{reason}");
                return Err(SnipeError::NotFound);
            }
        };
        attempt += 1;

        if Instant::now() + delay >= deadline {
            tokio::select! {
                _ = cancel.cancelled() => return Err(SnipeError::Cancelled),
                _ = tokio::time::sleep_until(deadline) => return Err(SnipeError::Timeout),
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => return Err(SnipeError::Cancelled),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Target whose probes walk through a script of outcomes.
    struct Scripted {
        live: Vec<ProbeOutcome<bool>>,
        stream: Vec<ProbeOutcome<String>>,
        live_calls: AtomicUsize,
        stream_calls: AtomicUsize,
    }

    impl Scripted {
        fn new(live: Vec<ProbeOutcome<bool>>, stream: Vec<ProbeOutcome<String>>) -> Self {
            Self {
                live,
                stream,
                live_calls: AtomicUsize::new(0),
                stream_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Target for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        fn display(&self) -> &str {
            "scripted"
        }
        fn link(&self) -> &str {
            "https://example.com/scripted"
        }
        fn save_subpath(&self) -> String {
            "scripted".into()
        }
        async fn check_live(&self) -> ProbeOutcome<bool> {
            let i = self.live_calls.fetch_add(1, Ordering::SeqCst);
            self.live[i.min(self.live.len() - 1)].clone()
        }
        async fn check_stream(&self) -> ProbeOutcome<String> {
            let i = self.stream_calls.fetch_add(1, Ordering::SeqCst);
            self.stream[i.min(self.stream.len() - 1)].clone()
        }
    }

    fn fast_policy() -> Policy {
        Policy::with_steps(vec![0, 1, 1])
    }

    #[tokio::test]
    async fn live_after_retries() {
        let target = Scripted::new(
            vec![
                ProbeOutcome::Retry("not yet".into()),
                ProbeOutcome::RetryNow("hiccup".into()),
                ProbeOutcome::Found(true),
            ],
            vec![],
        );
        let deadline = Instant::now() + Duration::from_secs(5);
        let cancel = CancellationToken::new();
        wait_for_live(&target, &fast_policy(), deadline, &cancel)
            .await
            .unwrap();
        assert_eq!(target.live_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn live_deadline_gives_timeout() {
        let target = Scripted::new(vec![ProbeOutcome::Retry("never".into())], vec![]);
        let deadline = Instant::now() + Duration::from_millis(30);
        let cancel = CancellationToken::new();
        let err = wait_for_live(&target, &fast_policy(), deadline, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, SnipeError::Timeout);
    }

    #[tokio::test]
    async fn stream_fail_stops_probing() {
        let target = Scripted::new(
            vec![],
            vec![
                ProbeOutcome::Retry("no stream yet".into()),
                ProbeOutcome::Fail("new upcoming time set".into()),
            ],
        );
        let deadline = Instant::now() + Duration::from_secs(5);
        let cancel = CancellationToken::new();
        let err = wait_for_stream(&target, &fast_policy(), deadline, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, SnipeError::NotFound);
        assert_eq!(target.stream_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stream_found_returns_url() {
        let target = Scripted::new(
            vec![],
            vec![
                ProbeOutcome::Retry("no stream yet".into()),
                ProbeOutcome::Found("https://hls/x.m3u8".into()),
            ],
        );
        let deadline = Instant::now() + Duration::from_secs(5);
        let cancel = CancellationToken::new();
        let url = wait_for_stream(&target, &fast_policy(), deadline, &cancel)
            .await
            .unwrap();
        assert_eq!(url, "https://hls/x.m3u8");
    }

    #[tokio::test]
    async fn cancellation_interrupts_wait() {
        let target = Scripted::new(vec![ProbeOutcome::Retry("never".into())], vec![]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let deadline = Instant::now() + Duration::from_secs(5);
        let err = wait_for_live(&target, &Policy::default(), deadline, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, SnipeError::Cancelled);
    }
}
