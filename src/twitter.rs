//! Source reader: incremental fetch of a user's original posts from the
//! Twitter/X API v2, with attached media resolved in the same call.
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::SourcePost;
use crate::normalize::normalize;

const TWITTER_API_BASE: &str = "https://api.twitter.com";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("source user '{0}' not found")]
    UserNotFound(String),
    #[error("failed to reach source platform: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("source platform error {status}: {body}")]
    Api { status: StatusCode, body: String },
}

/// Anything the orchestrator can pull new posts from.
#[async_trait]
pub trait SourceFeed: Send + Sync {
    /// Posts strictly newer than `cursor`, newest-first (platform order).
    async fn fetch_new(&self, cursor: Option<u64>) -> Result<Vec<SourcePost>, FetchError>;
}

#[derive(Clone)]
pub struct TwitterClient {
    http: Client,
    base_url: String,
    bearer_token: String,
    username: String,
}

impl fmt::Debug for TwitterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwitterClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl TwitterClient {
    pub fn new(bearer_token: String, username: String) -> Self {
        Self::with_base_url(bearer_token, username, TWITTER_API_BASE.to_string())
    }

    pub fn with_base_url(bearer_token: String, username: String, base_url: String) -> Self {
        let http = Client::builder()
            .user_agent("skymirror/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            bearer_token,
            username,
        }
    }

    /// Resolve the configured handle to a platform user id.
    pub async fn resolve_user(&self) -> Result<String, FetchError> {
        let url = format!("{}/2/users/by/username/{}", self.base_url, self.username);
        let res = self
            .http
            .get(url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(FetchError::Api { status, body });
        }
        let payload: UserLookupResp = res.json().await?;
        match payload.data {
            Some(user) => Ok(user.id),
            None => Err(FetchError::UserNotFound(self.username.clone())),
        }
    }

    /// Fetch the user's recent original posts newer than `cursor`.
    ///
    /// Reshares and replies are excluded server-side; media metadata is
    /// expanded in the same request. An access-forbidden response degrades
    /// to an empty batch so one revoked token cannot crash the run.
    pub async fn fetch_new(&self, cursor: Option<u64>) -> Result<Vec<SourcePost>, FetchError> {
        let user_id = self.resolve_user().await?;
        let url = format!("{}/2/users/{}/tweets", self.base_url, user_id);
        let res = self
            .http
            .get(url)
            .bearer_auth(&self.bearer_token)
            .query(&[
                ("exclude", "retweets,replies"),
                ("tweet.fields", "created_at,text,referenced_tweets,attachments"),
                ("expansions", "attachments.media_keys"),
                ("media.fields", "url,preview_image_url,type"),
            ])
            .send()
            .await?;
        if res.status() == StatusCode::FORBIDDEN {
            let body = res.text().await.unwrap_or_default();
            warn!(username = %self.username, %body, "source access forbidden; skipping this run");
            return Ok(Vec::new());
        }
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(FetchError::Api { status, body });
        }
        let payload: TimelineResp = res.json().await?;
        Ok(collect_new_posts(payload, cursor))
    }
}

#[async_trait]
impl SourceFeed for TwitterClient {
    async fn fetch_new(&self, cursor: Option<u64>) -> Result<Vec<SourcePost>, FetchError> {
        TwitterClient::fetch_new(self, cursor).await
    }
}

/// Turn a timeline payload into `SourcePost`s newer than `cursor`,
/// preserving the platform's newest-first order.
///
/// Skipped here, never surfaced to the orchestrator: posts at or below the
/// cursor, posts referencing another post (replies, quotes, reshares), and
/// posts whose text is empty after normalization. Media keys that do not
/// resolve against the expansion index are dropped silently so a post with
/// broken media degrades to text-only instead of failing.
pub(crate) fn collect_new_posts(payload: TimelineResp, cursor: Option<u64>) -> Vec<SourcePost> {
    let media_index: HashMap<&str, &str> = payload
        .includes
        .as_ref()
        .and_then(|inc| inc.media.as_deref())
        .unwrap_or_default()
        .iter()
        .filter_map(|m| Some((m.media_key.as_deref()?, m.url.as_deref()?)))
        .collect();

    let mut posts = Vec::new();
    for tweet in payload.data.unwrap_or_default() {
        let id = match tweet.id.parse::<u64>() {
            Ok(id) => id,
            Err(err) => {
                warn!(id = %tweet.id, %err, "non-numeric post id; skipping");
                continue;
            }
        };
        if let Some(cursor) = cursor {
            if id <= cursor {
                debug!(id, cursor, "already mirrored");
                continue;
            }
        }
        // Original posts only: any outbound reference means reply or quote.
        if tweet.referenced_tweets.as_ref().is_some_and(|refs| !refs.is_empty()) {
            debug!(id, "skipping reply/reshare");
            continue;
        }
        let text = normalize(&tweet.text);
        if text.is_empty() {
            info!(id, "post is empty after normalization; skipping");
            continue;
        }
        let media_urls = tweet
            .attachments
            .as_ref()
            .and_then(|a| a.media_keys.as_deref())
            .unwrap_or_default()
            .iter()
            .filter_map(|key| media_index.get(key.as_str()).map(|url| url.to_string()))
            .collect();
        posts.push(SourcePost {
            id,
            text,
            created_at: tweet.created_at.unwrap_or_else(Utc::now),
            media_urls,
        });
    }
    posts
}

#[derive(Debug, Deserialize)]
struct UserLookupResp {
    #[serde(default)]
    data: Option<UserObject>,
}

#[derive(Debug, Deserialize)]
struct UserObject {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct TimelineResp {
    #[serde(default)]
    data: Option<Vec<Tweet>>,
    #[serde(default)]
    includes: Option<Includes>,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: String,
    text: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    // Only the presence of outbound references matters.
    #[serde(default)]
    referenced_tweets: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    attachments: Option<Attachments>,
}

#[derive(Debug, Default, Deserialize)]
struct Attachments {
    #[serde(default)]
    media_keys: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct Includes {
    #[serde(default)]
    media: Option<Vec<Media>>,
}

#[derive(Debug, Deserialize)]
struct Media {
    #[serde(default)]
    media_key: Option<String>,
    #[serde(default)]
    url: Option<String>,
}
