//! Reference adapter for `www.showroom-live.com`.
//!
//! Room pages embed their full state as JSON, so probes are one GET plus a
//! little extraction. Liveness has a dedicated JSON endpoint, and the
//! onlives listing lets a poll pass catch every live target with a single
//! request before falling back to per-room pages.

mod api;
mod model;
mod page;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info};

use crate::{ProbeOutcome, Scheduler, SiteAdapter, SiteError, Target};

/// Per-target budget during a poll pass. A pass is driven by the poller,
/// so each room only gets a short look.
const CHECK_UPCOMING_BUDGET: Duration = Duration::from_secs(7);

/// Longest display name we hand to the dashboard.
const MAX_DISPLAY_LEN: usize = 75;

/// Site adapter for Showroom.
pub struct Showroom {
    inner: Arc<Inner>,
}

struct Inner {
    client: reqwest::Client,
    scheduler: Arc<dyn Scheduler>,
    /// link → room id, for matching targets against the onlives listing.
    rooms: RwLock<HashMap<String, i64>>,
}

impl Showroom {
    pub const HOSTNAME: &'static str = api::HOSTNAME;

    /// Build the adapter with the engine's scheduler handle.
    pub fn new(scheduler: Arc<dyn Scheduler>, user_agent: &str) -> Result<Self, SiteError> {
        Ok(Self {
            inner: Arc::new(Inner {
                client: api::build_client(user_agent)?,
                scheduler,
                rooms: RwLock::new(HashMap::new()),
            }),
        })
    }
}

#[async_trait]
impl SiteAdapter for Showroom {
    fn hostname(&self) -> &str {
        api::HOSTNAME
    }

    async fn add_target(&self, link: &str) -> Result<Arc<dyn Target>, SiteError> {
        let parsed = url::Url::parse(link).map_err(|e| SiteError::InvalidUrl(format!("{link}: {e}")))?;

        let status = api::fetch_room(&self.inner.client, link).await?;
        let name = status.room_name.trim().to_string();
        let name = if name.is_empty() {
            // Fall back to the last path segment so the target stays usable.
            parsed
                .path_segments()
                .and_then(|mut s| s.next_back())
                .unwrap_or_default()
                .to_string()
        } else {
            name
        };
        if name.is_empty() {
            return Err(SiteError::Rejected(link.to_string()));
        }

        if let Ok(mut rooms) = self.inner.rooms.write() {
            rooms.insert(link.to_string(), status.room_id);
        }

        Ok(Arc::new(ShowroomTarget {
            display: display_name(&name),
            name,
            link: link.to_string(),
            room_id: status.room_id,
            inner: self.inner.clone(),
        }))
    }

    async fn check_upcoming(&self, targets: &[Arc<dyn Target>]) -> ProbeOutcome<()> {
        if targets.is_empty() {
            debug!("no targets");
            return ProbeOutcome::Found(());
        }
        debug!("checking {} targets", targets.len());

        // One listing request catches everyone who is already live.
        let live_rooms = match api::fetch_onlive_rooms(&self.inner.client).await {
            Ok(rooms) => rooms,
            Err(e) => return ProbeOutcome::Retry(format!("onlives listing failed: {e}")),
        };

        let known = match self.inner.rooms.read() {
            Ok(rooms) => rooms.clone(),
            Err(_) => HashMap::new(),
        };

        let mut page_checks = Vec::new();
        for target in targets {
            let link = target.link().to_string();
            if known
                .get(&link)
                .is_some_and(|id| live_rooms.contains(id))
            {
                info!("{} is live now!", target.name());
                self.inner.scheduler.schedule_snipe(&link, Utc::now());
                continue;
            }

            // Not in the listing; the room page still knows about streams
            // the listing misses and about upcoming times.
            let inner = self.inner.clone();
            let target = target.clone();
            page_checks.push(async move {
                let check = check_room_schedule(&inner, &target);
                if tokio::time::timeout(CHECK_UPCOMING_BUDGET, check)
                    .await
                    .is_err()
                {
                    debug!("{} timed out", target.name());
                }
            });
        }

        join_all(page_checks).await;
        debug!("done");
        ProbeOutcome::Found(())
    }
}

/// Look at one room page and schedule a snipe if it announces anything.
async fn check_room_schedule(inner: &Inner, target: &Arc<dyn Target>) {
    let status = match api::fetch_room(&inner.client, target.link()).await {
        Ok(status) => status,
        Err(e) => {
            debug!("{}: {e}", target.name());
            return;
        }
    };

    if !status.stream_url.is_empty() {
        info!("{} is live now!", target.name());
        inner.scheduler.schedule_snipe(target.link(), Utc::now());
        return;
    }

    let next = status.live_room.next_live.trim();
    if !next.is_empty() && next != "TBD" {
        let at = page::parse_upcoming_date(next, Utc::now());
        debug!("{} upcoming at {at}", target.name());
        inner.scheduler.schedule_snipe(target.link(), at);
    }
}

struct ShowroomTarget {
    name: String,
    display: String,
    link: String,
    room_id: i64,
    inner: Arc<Inner>,
}

#[async_trait]
impl Target for ShowroomTarget {
    fn name(&self) -> &str {
        &self.name
    }

    fn display(&self) -> &str {
        &self.display
    }

    fn link(&self) -> &str {
        &self.link
    }

    fn save_subpath(&self) -> String {
        self.name.clone()
    }

    async fn check_live(&self) -> ProbeOutcome<bool> {
        match api::is_live(&self.inner.client, self.room_id).await {
            Ok(true) => ProbeOutcome::Found(true),
            Ok(false) => ProbeOutcome::Retry(format!("{} is not live yet", self.name)),
            Err(SiteError::Http(e)) if e.is_decode() => {
                // The endpoint occasionally serves an interstitial page;
                // asking again straight away usually clears it.
                ProbeOutcome::RetryNow(format!("{}: undecodable is_live body", self.name))
            }
            Err(e) => ProbeOutcome::Retry(format!("{}: {e}", self.name)),
        }
    }

    async fn check_stream(&self) -> ProbeOutcome<String> {
        let status = match api::fetch_room(&self.inner.client, &self.link).await {
            Ok(status) => status,
            Err(e) => return ProbeOutcome::Retry(format!("{}: {e}", self.name)),
        };

        if !status.stream_url.is_empty() {
            return ProbeOutcome::Found(status.stream_url);
        }

        let next = status.live_room.next_live.trim();
        if !next.is_empty() && next != "TBD" {
            let at = page::parse_upcoming_date(next, Utc::now());
            self.inner.scheduler.schedule_snipe(&self.link, at);
            return ProbeOutcome::Fail(format!("{} has a new upcoming time set", self.name));
        }

        ProbeOutcome::Retry(format!("{} has no stream yet", self.name))
    }

    async fn on_snipe(&self) {
        info!("sniping {}", self.name);
    }

    async fn on_save_start(&self) {
        info!("saving {}", self.name);
    }

    async fn on_save_end(&self) {
        info!("finished saving {}", self.name);
    }
}

/// Space the name out for terminal rendering and cap its length.
///
/// Wide glyphs packed together render badly in the dashboard's cells, so a
/// space is inserted after every rune except plain spacing characters.
fn display_name(name: &str) -> String {
    let mut out = String::new();
    for c in name.chars() {
        out.push(c);
        if out.len() > MAX_DISPLAY_LEN {
            break;
        }
        if c != ' ' && c != '(' && c != ')' {
            out.push(' ');
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_spaces_runes() {
        assert_eq!(display_name("まの"), "ま の");
        assert_eq!(display_name("A B"), "A B");
        assert_eq!(display_name("(A)"), "(A )");
    }

    #[test]
    fn display_name_is_capped() {
        let long: String = "あ".repeat(100);
        let display = display_name(&long);
        assert!(display.len() <= MAX_DISPLAY_LEN + 4);
    }
}
