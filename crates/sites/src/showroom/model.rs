//! Serde models for Showroom API payloads and embedded page data.

use serde::Deserialize;

/// Room state assembled from the `js-initial-data` and `js-live-data`
/// blobs embedded in a room page.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RoomStatus {
    #[serde(default, rename = "isLive")]
    pub is_live: bool,
    #[serde(default, rename = "streamingUrlHls")]
    pub stream_url: String,
    #[serde(default, rename = "roomId")]
    pub room_id: i64,
    #[serde(default, rename = "roomName")]
    pub room_name: String,
    #[serde(default, rename = "room")]
    pub live_room: LiveRoomInfo,
}

/// The `room` section of [`RoomStatus`].
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct LiveRoomInfo {
    #[serde(default, rename = "room_url_key")]
    pub url_key: String,
    /// Upcoming broadcast time as "month/day hour:minute", or "TBD".
    #[serde(default)]
    pub next_live: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IsLiveResponse {
    #[serde(default)]
    pub ok: i64,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct OnLivesResponse {
    #[serde(default)]
    pub onlives: Vec<GenreLives>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct GenreLives {
    #[serde(default)]
    pub lives: Vec<OnLiveRoom>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct OnLiveRoom {
    #[serde(default)]
    pub room_id: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_status_from_initial_data() {
        let json = r#"{
            "isLive": true,
            "streamingUrlHls": "https://hls.example/live.m3u8",
            "roomId": 104555,
            "roomName": " Mano Chan ",
            "room": {"room_url_key": "mano_chan", "next_live": "TBD"}
        }"#;
        let status: RoomStatus = serde_json::from_str(json).unwrap();
        assert!(status.is_live);
        assert_eq!(status.stream_url, "https://hls.example/live.m3u8");
        assert_eq!(status.room_id, 104555);
        assert_eq!(status.live_room.url_key, "mano_chan");
        assert_eq!(status.live_room.next_live, "TBD");
    }

    #[test]
    fn room_status_tolerates_missing_fields() {
        let status: RoomStatus = serde_json::from_str("{}").unwrap();
        assert!(!status.is_live);
        assert!(status.stream_url.is_empty());
        assert!(status.live_room.next_live.is_empty());
    }

    #[test]
    fn is_live_response() {
        let live: IsLiveResponse = serde_json::from_str(r#"{"ok": 1}"#).unwrap();
        assert_eq!(live.ok, 1);
        let offline: IsLiveResponse = serde_json::from_str(r#"{"ok": 0}"#).unwrap();
        assert_eq!(offline.ok, 0);
    }

    #[test]
    fn onlives_rooms() {
        let json = r#"{"onlives": [{"genre_id": 102, "lives": [
            {"room_id": 1}, {"room_id": 2}
        ]}]}"#;
        let parsed: OnLivesResponse = serde_json::from_str(json).unwrap();
        let ids: Vec<i64> = parsed.onlives[0].lives.iter().map(|r| r.room_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
