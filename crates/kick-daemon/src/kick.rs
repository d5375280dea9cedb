use async_trait::async_trait;
use kick_proto::config::ApiConfig;
use kick_proto::fetcher::{ChannelSource, FetchError};
use kick_proto::model::ChannelStatus;
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Channel status client for the platform's public API.
pub struct KickClient {
    client: reqwest::Client,
    base_url: String,
    videos_relay: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelResponse {
    user: Option<UserInfo>,
    #[serde(default)]
    livestream: Option<Livestream>,
    #[serde(default)]
    followers_count: Option<u64>,
    #[serde(default)]
    banner_image: Option<Image>,
    #[serde(default)]
    previous_livestreams: Vec<PreviousLivestream>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(default)]
    profile_pic: Option<String>,
    #[serde(default)]
    bio: Option<String>,
    #[serde(default)]
    twitter: Option<String>,
    #[serde(default)]
    youtube: Option<String>,
    #[serde(default)]
    instagram: Option<String>,
    #[serde(default)]
    discord: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Livestream {
    #[serde(default)]
    session_title: Option<String>,
    #[serde(default)]
    viewer_count: Option<u64>,
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    category: Option<Category>,
}

#[derive(Debug, Deserialize)]
struct Category {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Image {
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PreviousLivestream {
    #[serde(default)]
    start_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Video {
    #[serde(default)]
    created_at: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl KickClient {
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self::with_client(
            client,
            &config.base_url,
            config.videos_relay.clone(),
        ))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str, videos_relay: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            videos_relay: videos_relay.filter(|r| !r.is_empty()),
        }
    }

    fn channel_url(&self, username: &str) -> String {
        format!("{}/api/v1/channels/{}", self.base_url, username)
    }

    fn videos_url(&self, username: &str) -> String {
        let target = format!("{}/api/v2/channels/{}/videos", self.base_url, username);
        match &self.videos_relay {
            Some(relay) => format!("{}{}", relay, urlencoding::encode(&target)),
            None => target,
        }
    }

    /// Start time of the most recent video. Any failure is logged and
    /// treated as "unknown".
    async fn latest_video_start(&self, username: &str) -> Option<String> {
        let url = self.videos_url(username);
        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!("[kick] videos request for {} failed: {}", username, e);
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(
                "[kick] videos request for {} returned {}",
                username,
                response.status()
            );
            return None;
        }
        match response.json::<Vec<Video>>().await {
            Ok(videos) => videos.into_iter().next().and_then(|v| non_empty(v.created_at)),
            Err(e) => {
                warn!("[kick] videos for {} unreadable: {}", username, e);
                None
            }
        }
    }
}

#[async_trait]
impl ChannelSource for KickClient {
    async fn fetch_channel(&self, username: &str) -> Result<ChannelStatus, FetchError> {
        let response = self
            .client
            .get(self.channel_url(username))
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(username.to_string()));
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                username: username.to_string(),
                status: status.as_u16(),
            });
        }

        let data: ChannelResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?;
        let user = data
            .user
            .ok_or_else(|| FetchError::MissingUser(username.to_string()))?;

        let is_live = data.livestream.is_some();
        let mut last_stream_start_time = None;
        if !is_live {
            last_stream_start_time = self.latest_video_start(username).await;
            if last_stream_start_time.is_none() {
                last_stream_start_time = data
                    .previous_livestreams
                    .into_iter()
                    .next()
                    .and_then(|p| non_empty(p.start_time));
            }
        }

        let mut social_links = BTreeMap::new();
        for (key, value) in [
            ("twitter", user.twitter),
            ("youtube", user.youtube),
            ("instagram", user.instagram),
            ("discord", user.discord),
        ] {
            if let Some(v) = non_empty(value) {
                social_links.insert(key.to_string(), v);
            }
        }

        let live = data.livestream;
        debug!("[kick] {} live={}", username, is_live);
        Ok(ChannelStatus {
            profile_pic: non_empty(user.profile_pic),
            is_live,
            live_title: live.as_ref().and_then(|l| non_empty(l.session_title.clone())),
            viewer_count: live.as_ref().and_then(|l| l.viewer_count),
            live_since: live.as_ref().and_then(|l| non_empty(l.start_time.clone())),
            last_stream_start_time,
            bio: non_empty(user.bio),
            followers_count: data.followers_count,
            banner_image: data.banner_image.and_then(|b| non_empty(b.url)),
            live_category: live
                .and_then(|l| l.category)
                .and_then(|c| non_empty(c.name)),
            social_links,
        })
    }
}
