//! Site adapter interface for the autorec tracking engine.
//!
//! A site adapter owns everything that is specific to one streaming site:
//! how to validate a streamer page URL, how to probe liveness, and how to
//! find the raw stream URL once a broadcast starts. The engine talks to
//! adapters only through the traits in this crate, so adding support for a
//! new site means implementing [`SiteAdapter`] and [`Target`] and
//! registering the adapter under its hostname.

pub mod backoff;
pub mod showroom;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors produced by site adapters outside of the probe cycle.
#[derive(Debug, Error)]
pub enum SiteError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("link was not accepted: {0}")]
    Rejected(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed page: {0}")]
    MalformedPage(String),

    #[error("{0}")]
    Other(String),
}

/// Outcome of a single liveness or stream-URL probe.
///
/// Probes never carry retry closures; the engine's retry loops consume the
/// variant and re-invoke the same probe method on the same target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome<T> {
    /// The probe produced a definitive value.
    Found(T),
    /// Not yet; ask again immediately.
    RetryNow(String),
    /// Not yet; ask again after a backoff delay.
    Retry(String),
    /// Definitive failure; further probing is pointless.
    Fail(String),
}

impl<T> ProbeOutcome<T> {
    /// True for [`ProbeOutcome::Found`].
    pub fn is_found(&self) -> bool {
        matches!(self, ProbeOutcome::Found(_))
    }

    /// The reason attached to a non-`Found` outcome.
    pub fn reason(&self) -> Option<&str> {
        match self {
            ProbeOutcome::Found(_) => None,
            ProbeOutcome::RetryNow(r) | ProbeOutcome::Retry(r) | ProbeOutcome::Fail(r) => {
                Some(r.as_str())
            }
        }
    }
}

/// Handle the engine hands to adapters at construction time.
///
/// Adapters use it to request a snipe for a link they were asked about,
/// either because the site reports the streamer live right now (`at = now`)
/// or because the site published an upcoming broadcast time. Adapters must
/// not schedule links they do not own.
pub trait Scheduler: Send + Sync {
    fn schedule_snipe(&self, link: &str, at: DateTime<Utc>);
}

/// One streamer page under observation, as seen by its site adapter.
#[async_trait]
pub trait Target: Send + Sync {
    /// Real name of the streamer.
    fn name(&self) -> &str;

    /// Name formatted for dashboard display.
    fn display(&self) -> &str;

    /// Canonical page URL this target was created from.
    fn link(&self) -> &str;

    /// Subdirectory (below the configured save root) recordings go into.
    fn save_subpath(&self) -> String;

    /// Probe whether the streamer is broadcasting right now.
    async fn check_live(&self) -> ProbeOutcome<bool>;

    /// Probe for the raw stream URL of an active broadcast.
    ///
    /// `Retry` means the broadcast has not surfaced a stream URL yet.
    /// `Fail` means probing should stop, e.g. because the site published a
    /// new upcoming time instead (in which case the adapter reschedules
    /// through its [`Scheduler`] before failing).
    async fn check_stream(&self) -> ProbeOutcome<String>;

    /// Called when a snipe for this target begins.
    async fn on_snipe(&self) {}

    /// Called each time a recorder process is spawned for this target.
    async fn on_save_start(&self) {}

    /// Called once when a recording session concludes.
    async fn on_save_end(&self) {}
}

/// A pluggable module implementing the probes for one hostname.
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    /// Hostname this adapter owns, e.g. `www.showroom-live.com`.
    fn hostname(&self) -> &str;

    /// Validate a link and return a target handle for it.
    async fn add_target(&self, link: &str) -> Result<Arc<dyn Target>, SiteError>;

    /// Poller tick: refresh upcoming schedules for the given targets.
    ///
    /// The adapter is free to iterate the targets and call
    /// [`Scheduler::schedule_snipe`] for any of them. A `Retry` outcome
    /// makes the poller re-attempt the pass with backoff.
    async fn check_upcoming(&self, targets: &[Arc<dyn Target>]) -> ProbeOutcome<()>;
}
