//! The tracking engine.
//!
//! One [`Engine`] supervises every tracked URL: it reconciles the registry
//! against the list file, drives a poller per adapter, runs snipe tasks
//! for scheduled broadcasts, and records live streams through the saver.
//! Adapters reach back into the engine only through the scheduler handle,
//! a channel sender, which keeps the adapter → engine dependency acyclic.

mod display;
mod hooks;
mod poll;
mod reconcile;
mod registry;
mod save;
mod snipe;
mod tasks;
mod tracked;

pub use display::{DisplayRow, DisplayTable};
pub use registry::Registry;
pub use tasks::{SaveTasks, SnipeKey, SnipeTasks};
pub use tracked::Tracked;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use sites::Scheduler;
use sites::backoff::Policy;
use tokio::sync::Notify;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::config::ConfigStore;
use crate::tracker::hooks::HookRunner;
use crate::{Error, Result};

/// How long tasks get to drain on shutdown before the process gives up on
/// them.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// State shared by every engine task.
pub(crate) struct Shared {
    pub(crate) cfg: Arc<ConfigStore>,
    pub(crate) registry: Registry,
    pub(crate) snipes: SnipeTasks,
    pub(crate) saves: SaveTasks,
    pub(crate) hooks: HookRunner,
    pub(crate) policy: Policy,
    pub(crate) shutdown: CancellationToken,
    pub(crate) tasks: TaskTracker,
    pub(crate) scheduler: Arc<SnipeScheduler>,
}

struct SnipeRequest {
    link: String,
    at: DateTime<Utc>,
}

/// The handle adapters (and the registry) use to request snipes. Requests
/// travel over a channel into the engine's scheduling loop.
pub struct SnipeScheduler {
    tx: UnboundedSender<SnipeRequest>,
}

impl Scheduler for SnipeScheduler {
    fn schedule_snipe(&self, link: &str, at: DateTime<Utc>) {
        let _ = self.tx.send(SnipeRequest {
            link: link.to_string(),
            at,
        });
    }
}

/// The tracking engine.
pub struct Engine {
    shared: Arc<Shared>,
    check_now: Arc<Notify>,
    snipe_rx: Mutex<Option<UnboundedReceiver<SnipeRequest>>>,
}

impl Engine {
    pub fn new(cfg: Arc<ConfigStore>) -> Self {
        let shutdown = CancellationToken::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            registry: Registry::new(shutdown.clone()),
            snipes: SnipeTasks::default(),
            saves: SaveTasks::default(),
            hooks: HookRunner::new(cfg.hooks_dir()),
            policy: Policy::default(),
            shutdown,
            tasks: TaskTracker::new(),
            scheduler: Arc::new(SnipeScheduler { tx }),
            cfg,
        });
        Self {
            shared,
            check_now: Arc::new(Notify::new()),
            snipe_rx: Mutex::new(Some(rx)),
        }
    }

    /// The scheduler handle to construct adapters with.
    pub fn scheduler(&self) -> Arc<dyn Scheduler> {
        self.shared.scheduler.clone()
    }

    /// Register a site adapter. Must happen before [`Engine::start`].
    pub fn register_adapter(&self, adapter: Arc<dyn sites::SiteAdapter>) -> Result<()> {
        self.shared.registry.register_adapter(adapter)
    }

    /// Read the track list and launch the long-lived engine tasks:
    /// the scheduling loop, one poller per adapter, and the file watcher.
    pub async fn start(&self) -> Result<()> {
        let rx = self
            .snipe_rx
            .lock()
            .take()
            .ok_or_else(|| Error::Other("engine already started".into()))?;

        self.shared
            .tasks
            .spawn(run_scheduler(self.shared.clone(), rx));

        reconcile::reconcile(&self.shared, false).await?;

        for adapter in self.shared.registry.adapters() {
            self.shared.tasks.spawn(poll::run(
                self.shared.clone(),
                adapter,
                self.check_now.clone(),
            ));
        }

        let shared = self.shared.clone();
        self.shared.tasks.spawn(async move {
            if let Err(e) = reconcile::watch(shared).await {
                warn!("file watcher failed: {e}");
            }
        });

        Ok(())
    }

    /// Ask every poller to run a pass right now.
    pub fn check_now(&self) {
        self.check_now.notify_waiters();
    }

    /// Begin tracking a URL. Gives true if it was newly added.
    pub async fn add(&self, link: &str) -> Result<bool> {
        Ok(self
            .shared
            .registry
            .add(link, self.shared.scheduler.as_ref())
            .await?
            .is_some())
    }

    /// Stop tracking a URL, cancelling any in-flight work.
    pub fn remove(&self, link: &str) -> bool {
        self.shared.registry.remove(link).is_some()
    }

    /// Abort the current save for a URL without untracking it.
    pub fn cancel(&self, link: &str) -> bool {
        self.shared.registry.cancel(link)
    }

    /// Request a snipe directly (the same path adapters use).
    pub fn schedule_snipe(&self, link: &str, at: DateTime<Utc>) {
        self.shared.scheduler.schedule_snipe(link, at);
    }

    /// Snapshot of tracking state for display, sorted by urgency.
    pub fn display(&self) -> DisplayTable {
        display::project(
            &self.shared.registry,
            &self.shared.snipes,
            &self.shared.saves,
            self.shared.cfg.get().snipe_timeout(),
            Utc::now(),
        )
    }

    /// Whether a recording is active for the link.
    pub fn is_saving(&self, link: &str) -> bool {
        self.shared.saves.has(link)
    }

    /// Earliest scheduled snipe for the link, if any.
    pub fn upcoming_at(&self, link: &str) -> Option<DateTime<Utc>> {
        self.shared.snipes.soonest_for(link)
    }

    /// When the link's last recording session concluded.
    pub fn finished_at(&self, link: &str) -> Option<DateTime<Utc>> {
        self.shared.registry.get(link).and_then(|t| t.finished_at())
    }

    pub fn is_tracking(&self, link: &str) -> bool {
        self.shared.registry.get(link).is_some()
    }

    /// Cancel everything and wait up to `grace` for tasks to drain. The
    /// shutdown token reaches every child token, so saves kill and reap
    /// their downloaders on the way out.
    pub async fn shutdown(&self, grace: Duration) {
        info!("finishing...");
        self.shared.shutdown.cancel();
        self.shared.tasks.close();
        match tokio::time::timeout(grace, self.shared.tasks.wait()).await {
            Ok(()) => info!("done"),
            Err(_) => warn!("force shutdown"),
        }
    }
}

/// Receive snipe requests and launch a snipe task per new `(link, at)`.
async fn run_scheduler(shared: Arc<Shared>, mut rx: UnboundedReceiver<SnipeRequest>) {
    loop {
        let request = tokio::select! {
            _ = shared.shutdown.cancelled() => return,
            request = rx.recv() => match request {
                Some(request) => request,
                None => return,
            },
        };

        let Some(tracked) = shared.registry.get(&request.link) else {
            debug!("ignoring snipe for untracked {}", request.link);
            continue;
        };
        if shared.saves.has(&request.link) {
            debug!("{}: already saving", tracked.name());
            continue;
        }
        let key = SnipeKey::new(request.link.clone(), request.at);
        if !shared.snipes.add(key) {
            debug!("{}: already sniping at {}", tracked.name(), request.at);
            continue;
        }

        info!("sniping {} at {}", tracked.name(), request.at);
        shared
            .tasks
            .spawn(snipe::run(shared.clone(), tracked, request.at));
    }
}
