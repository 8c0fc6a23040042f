//! The engine's per-URL record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sites::Target;
use tokio_util::sync::CancellationToken;

/// A streamer URL under active observation: the adapter's target handle
/// plus the engine-side bookkeeping around it.
///
/// The cancel token is a child of the engine's shutdown token, so a task
/// waiting on it observes both per-target cancellation and engine
/// shutdown. Cancelling re-arms the token immediately; in-flight work dies
/// while later snipes for the same URL start fresh.
pub struct Tracked {
    target: Arc<dyn Target>,
    hostname: String,
    shutdown: CancellationToken,
    state: Mutex<State>,
}

struct State {
    finished_at: Option<DateTime<Utc>>,
    cancel: CancellationToken,
}

impl Tracked {
    pub fn new(target: Arc<dyn Target>, hostname: String, shutdown: CancellationToken) -> Self {
        let cancel = shutdown.child_token();
        Self {
            target,
            hostname,
            shutdown,
            state: Mutex::new(State {
                finished_at: None,
                cancel,
            }),
        }
    }

    pub fn target(&self) -> &Arc<dyn Target> {
        &self.target
    }

    pub fn name(&self) -> &str {
        self.target.name()
    }

    pub fn display(&self) -> &str {
        self.target.display()
    }

    pub fn link(&self) -> &str {
        self.target.link()
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    /// When the last recording session concluded, if any.
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().finished_at
    }

    pub fn set_finished_at(&self, at: DateTime<Utc>) {
        self.state.lock().finished_at = Some(at);
    }

    /// The cancel token current work for this target should watch.
    pub fn cancel_token(&self) -> CancellationToken {
        self.state.lock().cancel.clone()
    }

    /// Cut short any in-flight snipe or save, then re-arm.
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        state.cancel.cancel();
        state.cancel = self.shutdown.child_token();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sites::ProbeOutcome;

    struct StubTarget;

    #[async_trait]
    impl Target for StubTarget {
        fn name(&self) -> &str {
            "stub"
        }
        fn display(&self) -> &str {
            "stub"
        }
        fn link(&self) -> &str {
            "https://example.com/stub"
        }
        fn save_subpath(&self) -> String {
            "stub".into()
        }
        async fn check_live(&self) -> ProbeOutcome<bool> {
            ProbeOutcome::Retry("offline".into())
        }
        async fn check_stream(&self) -> ProbeOutcome<String> {
            ProbeOutcome::Retry("offline".into())
        }
    }

    fn tracked() -> Tracked {
        Tracked::new(
            Arc::new(StubTarget),
            "example.com".into(),
            CancellationToken::new(),
        )
    }

    #[test]
    fn cancel_rearms_the_token() {
        let t = tracked();
        let before = t.cancel_token();
        assert!(!before.is_cancelled());

        t.cancel();
        assert!(before.is_cancelled());
        assert!(!t.cancel_token().is_cancelled());
    }

    #[test]
    fn shutdown_reaches_child_tokens() {
        let shutdown = CancellationToken::new();
        let t = Tracked::new(Arc::new(StubTarget), "example.com".into(), shutdown.clone());
        let token = t.cancel_token();
        shutdown.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn finished_at_roundtrip() {
        let t = tracked();
        assert!(t.finished_at().is_none());
        let now = Utc::now();
        t.set_finished_at(now);
        assert_eq!(t.finished_at(), Some(now));
    }
}
