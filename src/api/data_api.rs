use super::client::YouTubeClient;
use crate::error::PulseError;
use crate::types::{DiscoveredVideo, VideoType, parse_iso8601_duration, thumbnail_url};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, warn};

/// Provider limit on ids per `videos.list` call and items per page.
const MAX_IDS_PER_CALL: usize = 50;

/// Result of walking a channel's uploads.
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub videos: Vec<DiscoveredVideo>,
    /// One entry per detail batch that failed and was skipped.
    pub batch_failures: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelItem {
    content_details: ChannelContentDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelContentDetails {
    related_playlists: RelatedPlaylists,
}

#[derive(Debug, Deserialize)]
struct RelatedPlaylists {
    uploads: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItem {
    content_details: PlaylistItemDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemDetails {
    video_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VideoItem {
    id: String,
    #[serde(default)]
    snippet: VideoSnippet,
    #[serde(default)]
    statistics: VideoStatistics,
    #[serde(default)]
    content_details: VideoContentDetails,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoSnippet {
    #[serde(default)]
    title: String,
    published_at: Option<DateTime<Utc>>,
}

/// The Data API encodes counters as decimal strings.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    view_count: Option<String>,
    like_count: Option<String>,
    comment_count: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct VideoContentDetails {
    #[serde(default)]
    duration: String,
}

fn parse_count(raw: Option<&str>) -> i64 {
    raw.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0)
}

pub(crate) fn normalize_video(item: VideoItem) -> DiscoveredVideo {
    let duration_seconds = parse_iso8601_duration(&item.content_details.duration);
    DiscoveredVideo {
        thumbnail_url: thumbnail_url(&item.id),
        title: item.snippet.title,
        published_at: item.snippet.published_at,
        view_count: parse_count(item.statistics.view_count.as_deref()),
        like_count: parse_count(item.statistics.like_count.as_deref()),
        comment_count: parse_count(item.statistics.comment_count.as_deref()),
        duration_seconds,
        video_type: VideoType::from_duration(duration_seconds),
        video_id: item.id,
    }
}

async fn uploads_playlist(
    client: &YouTubeClient,
    access_token: &str,
    channel_id: &str,
) -> Result<String, PulseError> {
    let url = client.data_api_base.join("channels")?;
    let resp: ListResponse<ChannelItem> = client
        .get_json(
            "channels.list",
            &url,
            access_token,
            &[
                ("part", "contentDetails".to_string()),
                ("id", channel_id.to_string()),
            ],
        )
        .await?;
    resp.items
        .into_iter()
        .next()
        .and_then(|c| c.content_details.related_playlists.uploads)
        .ok_or_else(|| PulseError::NotFound(format!("uploads playlist for channel {channel_id}")))
}

async fn upload_ids(
    client: &YouTubeClient,
    access_token: &str,
    playlist_id: &str,
) -> Result<Vec<String>, PulseError> {
    let url = client.data_api_base.join("playlistItems")?;
    let limits = client.limits;
    let mut ids = Vec::new();
    let mut page_token: Option<String> = None;

    for page in 0..limits.max_pages {
        let remaining = limits.max_items.saturating_sub(ids.len());
        if remaining == 0 {
            break;
        }
        let mut query = vec![
            ("part", "contentDetails".to_string()),
            ("playlistId", playlist_id.to_string()),
            ("maxResults", remaining.min(MAX_IDS_PER_CALL).to_string()),
        ];
        if let Some(token) = page_token.take() {
            query.push(("pageToken", token));
        }
        let resp: ListResponse<PlaylistItem> = client
            .get_json("playlistItems.list", &url, access_token, &query)
            .await?;
        ids.extend(
            resp.items
                .into_iter()
                .map(|i| i.content_details.video_id)
                .take(remaining),
        );
        debug!(page, collected = ids.len(), "uploads page fetched");
        match resp.next_page_token {
            Some(token) => page_token = Some(token),
            None => break,
        }
    }
    Ok(ids)
}

async fn video_details(
    client: &YouTubeClient,
    access_token: &str,
    ids: &[String],
) -> Result<Vec<DiscoveredVideo>, PulseError> {
    let url = client.data_api_base.join("videos")?;
    let resp: ListResponse<VideoItem> = client
        .get_json(
            "videos.list",
            &url,
            access_token,
            &[
                ("part", "snippet,statistics,contentDetails".to_string()),
                ("id", ids.join(",")),
                ("maxResults", MAX_IDS_PER_CALL.to_string()),
            ],
        )
        .await?;
    Ok(resp.items.into_iter().map(normalize_video).collect())
}

/// Resolve the uploads playlist, page it within the configured bounds, then
/// fetch details in batches. A failed detail batch is logged and skipped.
pub async fn discover_videos(
    client: &YouTubeClient,
    access_token: &str,
    channel_id: &str,
) -> Result<Discovery, PulseError> {
    let playlist_id = uploads_playlist(client, access_token, channel_id).await?;
    let ids = upload_ids(client, access_token, &playlist_id).await?;

    let mut discovery = Discovery::default();
    for (batch_no, batch) in ids.chunks(client.limits.batch_size).enumerate() {
        match video_details(client, access_token, batch).await {
            Ok(videos) => discovery.videos.extend(videos),
            Err(e) => {
                warn!(
                    channel_id,
                    batch = batch_no,
                    size = batch.len(),
                    error = %e,
                    "video detail batch failed, skipping"
                );
                discovery
                    .batch_failures
                    .push(format!("video batch {batch_no}: {e}"));
            }
        }
    }
    debug!(
        channel_id,
        ids = ids.len(),
        videos = discovery.videos.len(),
        "discovery finished"
    );
    Ok(discovery)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_video_item() {
        let raw = r#"{
            "id": "abc123",
            "snippet": {"title": "Launch day", "publishedAt": "2026-09-01T12:00:00Z"},
            "statistics": {"viewCount": "1520", "likeCount": "88"},
            "contentDetails": {"duration": "PT4M13S"}
        }"#;
        let item: VideoItem = serde_json::from_str(raw).unwrap();
        let video = normalize_video(item);

        assert_eq!(video.video_id, "abc123");
        assert_eq!(video.title, "Launch day");
        assert_eq!(video.view_count, 1520);
        assert_eq!(video.like_count, 88);
        // hidden counters come back absent
        assert_eq!(video.comment_count, 0);
        assert_eq!(video.duration_seconds, 253);
        assert_eq!(video.video_type, VideoType::Long);
        assert_eq!(
            video.thumbnail_url,
            "https://i.ytimg.com/vi/abc123/mqdefault.jpg"
        );
        assert!(video.published_at.is_some());
    }

    #[test]
    fn short_when_duration_missing() {
        let item: VideoItem = serde_json::from_str(r#"{"id": "s1"}"#).unwrap();
        let video = normalize_video(item);
        assert_eq!(video.duration_seconds, 0);
        assert_eq!(video.video_type, VideoType::Short);
    }

    #[test]
    fn list_response_without_items_is_empty() {
        let resp: ListResponse<PlaylistItem> = serde_json::from_str("{}").unwrap();
        assert!(resp.items.is_empty());
        assert!(resp.next_page_token.is_none());
    }
}
