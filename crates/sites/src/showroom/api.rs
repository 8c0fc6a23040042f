//! HTTP requests against Showroom endpoints.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;
use reqwest::header;

use crate::SiteError;
use crate::showroom::model::{IsLiveResponse, OnLivesResponse, RoomStatus};
use crate::showroom::page::parse_room_page;

pub(crate) const HOSTNAME: &str = "www.showroom-live.com";

/// Shared client for one adapter instance: cookie jar enabled so genre and
/// session cookies persist across probes, per-request deadline of 60 s.
pub(crate) fn build_client(user_agent: &str) -> Result<Client, SiteError> {
    Client::builder()
        .user_agent(user_agent)
        .cookie_store(true)
        .timeout(Duration::from_secs(60))
        .build()
        .map_err(SiteError::from)
}

/// Fetch a room page and parse the embedded room state.
pub(crate) async fn fetch_room(client: &Client, link: &str) -> Result<RoomStatus, SiteError> {
    let body = client
        .get(link)
        .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.8")
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    parse_room_page(&body)
}

/// Ask the is_live endpoint whether a room is broadcasting.
pub(crate) async fn is_live(client: &Client, room_id: i64) -> Result<bool, SiteError> {
    let url = format!("https://{HOSTNAME}/room/is_live?room_id={room_id}");
    let res: IsLiveResponse = client
        .get(&url)
        .header(header::REFERER, format!("https://{HOSTNAME}"))
        .header(header::ACCEPT, "application/json")
        .header("X-Requested-With", "XMLHttpRequest")
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(res.ok == 1)
}

/// Fetch the room ids that are live right now from the onlives listing.
pub(crate) async fn fetch_onlive_rooms(client: &Client) -> Result<HashSet<i64>, SiteError> {
    // The cache-busting timestamp query mirrors what the site's own
    // frontend sends.
    let url = format!(
        "https://{HOSTNAME}/api/live/onlives?_={}",
        Utc::now().timestamp()
    );
    let res: OnLivesResponse = client
        .get(&url)
        .header(header::REFERER, format!("https://{HOSTNAME}/onlive"))
        .header(header::ACCEPT, "application/json")
        .header("X-Requested-With", "XMLHttpRequest")
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    Ok(res
        .onlives
        .into_iter()
        .flat_map(|genre| genre.lives)
        .map(|room| room.room_id)
        .collect())
}
