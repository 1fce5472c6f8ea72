//! YouTube Data API discovery.
//!
//! Lists the latest uploads of every channel the account is subscribed
//! to: subscriptions → channels (uploads playlist) → playlist items.
//! Authentication uses a stored OAuth refresh token; an access token is
//! requested at the start of every discovery.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use crate::config::YouTubeConfig;
use crate::core::PipelineError;
use crate::domain::{Item, ItemId, Quality};

use super::Discovery;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const API_BASE: &str = "https://www.googleapis.com/youtube/v3";

/// Maximum ids accepted by `channels.list` in one request
const CHANNELS_PER_REQUEST: usize = 50;

/// Discovery over the subscriptions of one YouTube account
pub struct YouTubeDiscovery {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    uploads_per_channel: u32,
    quality: Quality,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Subscription {
    snippet: SubscriptionSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionSnippet {
    resource_id: ResourceId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    channel_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelResource {
    content_details: ChannelDetails,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelDetails {
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

impl YouTubeDiscovery {
    /// Create from config; fails when OAuth credentials are missing
    pub fn from_config(config: &YouTubeConfig, quality: Quality) -> Result<Self> {
        let required = |value: &Option<String>, key: &str| {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .with_context(|| format!("youtube.{} is not configured", key))
        };

        Ok(Self {
            client: reqwest::Client::new(),
            client_id: required(&config.client_id, "client_id")?,
            client_secret: required(&config.client_secret, "client_secret")?,
            refresh_token: required(&config.refresh_token, "refresh_token")?,
            uploads_per_channel: config.uploads_per_channel,
            quality,
        })
    }

    /// Exchange the refresh token for an access token
    async fn access_token(&self) -> Result<String> {
        let response: TokenResponse = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", self.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .context("Failed to reach OAuth token endpoint")?
            .error_for_status()
            .context("OAuth token refresh rejected")?
            .json()
            .await
            .context("Failed to parse OAuth token response")?;

        Ok(response.access_token)
    }

    async fn get<T: DeserializeOwned>(
        &self,
        token: &str,
        resource: &str,
        query: &[(&str, String)],
    ) -> Result<ListResponse<T>> {
        self.client
            .get(format!("{}/{}", API_BASE, resource))
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .with_context(|| format!("Failed to call {}.list", resource))?
            .error_for_status()
            .with_context(|| format!("{}.list returned an error", resource))?
            .json()
            .await
            .with_context(|| format!("Failed to parse {}.list response", resource))
    }

    /// Follow `nextPageToken` until the listing is exhausted
    async fn paginate<T: DeserializeOwned>(
        &self,
        token: &str,
        resource: &str,
        query: Vec<(&str, String)>,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut page_query = query.clone();
            if let Some(ref page) = page_token {
                page_query.push(("pageToken", page.clone()));
            }

            let page: ListResponse<T> = self.get(token, resource, &page_query).await?;
            items.extend(page.items);

            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }

        Ok(items)
    }

    async fn subscribed_channels(&self, token: &str) -> Result<Vec<String>> {
        let subscriptions: Vec<Subscription> = self
            .paginate(
                token,
                "subscriptions",
                vec![
                    ("part", "snippet".to_string()),
                    ("mine", "true".to_string()),
                    ("maxResults", "50".to_string()),
                ],
            )
            .await?;

        Ok(subscriptions
            .into_iter()
            .filter_map(|s| s.snippet.resource_id.channel_id)
            .collect())
    }

    async fn uploads_playlists(&self, token: &str, channels: &[String]) -> Result<Vec<String>> {
        let mut playlists = Vec::new();

        for batch in channel_batches(channels) {
            let resources: Vec<ChannelResource> = self
                .paginate(
                    token,
                    "channels",
                    vec![
                        ("part", "contentDetails".to_string()),
                        ("id", batch),
                        ("maxResults", "50".to_string()),
                    ],
                )
                .await?;

            playlists.extend(
                resources
                    .into_iter()
                    .filter_map(|c| c.content_details.related_playlists.uploads),
            );
        }

        Ok(playlists)
    }

    async fn playlist_videos(&self, token: &str, playlist_id: &str) -> Result<Vec<String>> {
        let page: ListResponse<PlaylistItem> = self
            .get(
                token,
                "playlistItems",
                &[
                    ("part", "contentDetails".to_string()),
                    ("playlistId", playlist_id.to_string()),
                    ("maxResults", self.uploads_per_channel.to_string()),
                ],
            )
            .await?;

        Ok(page
            .items
            .into_iter()
            .map(|item| item.content_details.video_id)
            .collect())
    }

    async fn discover_ids(&self) -> Result<Vec<ItemId>> {
        let token = self.access_token().await?;

        let channels = self.subscribed_channels(&token).await?;
        debug!(channels = channels.len(), "Subscriptions listed");

        let playlists = self.uploads_playlists(&token, &channels).await?;
        debug!(playlists = playlists.len(), "Uploads playlists resolved");

        let videos = try_join_all(
            playlists
                .iter()
                .map(|playlist| self.playlist_videos(&token, playlist)),
        )
        .await?;

        Ok(videos.into_iter().flatten().map(ItemId::new).collect())
    }
}

/// Comma-joined channel ids, at most [`CHANNELS_PER_REQUEST`] per batch
fn channel_batches(channels: &[String]) -> Vec<String> {
    channels
        .chunks(CHANNELS_PER_REQUEST)
        .map(|chunk| chunk.join(","))
        .collect()
}

#[async_trait]
impl Discovery for YouTubeDiscovery {
    #[instrument(skip(self))]
    async fn discover(&self) -> Result<Vec<Item>, PipelineError> {
        let ids = self
            .discover_ids()
            .await
            .map_err(|e| PipelineError::Discovery(format!("{:#}", e)))?;

        info!(videos = ids.len(), "Discovery finished");
        Ok(ids
            .into_iter()
            .map(|id| Item::from_id(id, self.quality))
            .collect())
    }
}
