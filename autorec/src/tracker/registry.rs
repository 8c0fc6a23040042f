//! URL → tracked-entity registry and adapter resolution.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use sites::{ProbeOutcome, Scheduler, SiteAdapter, Target};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::tracker::tracked::Tracked;
use crate::{Error, Result};

/// Owns the set of tracked URLs and the adapters that serve them.
pub struct Registry {
    adapters: RwLock<HashMap<String, Arc<dyn SiteAdapter>>>,
    tracking: RwLock<HashMap<String, Arc<Tracked>>>,
    shutdown: CancellationToken,
}

impl Registry {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            adapters: RwLock::new(HashMap::new()),
            tracking: RwLock::new(HashMap::new()),
            shutdown,
        }
    }

    /// Register an adapter under its hostname. Registration happens before
    /// tracking begins; duplicate hostnames are a wiring mistake.
    pub fn register_adapter(&self, adapter: Arc<dyn SiteAdapter>) -> Result<()> {
        let hostname = adapter.hostname().to_string();
        let mut adapters = self.adapters.write();
        if adapters.contains_key(&hostname) {
            return Err(Error::Other(format!(
                "adapter already registered for {hostname}"
            )));
        }
        adapters.insert(hostname, adapter);
        Ok(())
    }

    pub fn adapters(&self) -> Vec<Arc<dyn SiteAdapter>> {
        self.adapters.read().values().cloned().collect()
    }

    fn adapter_for(&self, hostname: &str) -> Option<Arc<dyn SiteAdapter>> {
        self.adapters.read().get(hostname).cloned()
    }

    /// Begin tracking a URL.
    ///
    /// Resolves the adapter by hostname, asks it to accept the link, and
    /// probes for a stream right away so a target that is already live is
    /// sniped now instead of on the next poll. Adding a link twice is a
    /// silent no-op.
    pub async fn add(
        &self,
        link: &str,
        scheduler: &dyn Scheduler,
    ) -> Result<Option<Arc<Tracked>>> {
        if self.get(link).is_some() {
            return Ok(None);
        }

        let url =
            url::Url::parse(link).map_err(|e| Error::InvalidUrl(format!("{link}: {e}")))?;
        let hostname = url
            .host_str()
            .ok_or_else(|| Error::InvalidUrl(format!("{link}: no host")))?
            .to_string();
        let adapter = self
            .adapter_for(&hostname)
            .ok_or_else(|| Error::UnknownHost(hostname.clone()))?;

        let target = adapter.add_target(link).await?;
        let tracked = Arc::new(Tracked::new(target.clone(), hostname.clone(), self.shutdown.clone()));

        {
            let mut tracking = self.tracking.write();
            if tracking.contains_key(link) {
                // Concurrent adds of the same link race here; first wins.
                return Ok(None);
            }
            tracking.insert(link.to_string(), tracked.clone());
        }
        info!("{hostname} added {link}");

        // Check the target right away.
        if let ProbeOutcome::Found(stream_url) = target.check_stream().await {
            info!("{} is live now! {stream_url}", target.name());
            scheduler.schedule_snipe(link, Utc::now());
        }

        Ok(Some(tracked))
    }

    /// Stop tracking a URL, cancelling any in-flight work first.
    pub fn remove(&self, link: &str) -> Option<Arc<Tracked>> {
        let removed = self.tracking.write().remove(link);
        if let Some(tracked) = &removed {
            tracked.cancel();
            info!("{} removed {link}", tracked.hostname());
        } else {
            debug!("not tracking {link}");
        }
        removed
    }

    /// Cancel in-flight work for a URL without removing it.
    pub fn cancel(&self, link: &str) -> bool {
        match self.get(link) {
            Some(tracked) => {
                tracked.cancel();
                true
            }
            None => false,
        }
    }

    pub fn get(&self, link: &str) -> Option<Arc<Tracked>> {
        self.tracking.read().get(link).cloned()
    }

    pub fn links(&self) -> HashSet<String> {
        self.tracking.read().keys().cloned().collect()
    }

    /// Copy of every tracked entity, taken under the read lock.
    pub fn snapshot(&self) -> Vec<Arc<Tracked>> {
        self.tracking.read().values().cloned().collect()
    }

    /// Target handles owned by one adapter, for its poll pass.
    pub fn targets_for_host(&self, hostname: &str) -> Vec<Arc<dyn Target>> {
        self.tracking
            .read()
            .values()
            .filter(|t| t.hostname() == hostname)
            .map(|t| t.target().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tracking.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracking.read().is_empty()
    }

    /// Insert a prebuilt entity, bypassing adapter resolution.
    #[cfg(test)]
    pub(crate) fn insert_for_test(&self, tracked: Arc<Tracked>) {
        self.tracking
            .write()
            .insert(tracked.link().to_string(), tracked);
    }
}
