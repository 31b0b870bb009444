//! Destination publisher: Bluesky (AT Protocol) session, blob upload, and
//! post record creation over XRPC.
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::media::{self, MediaAsset};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("destination login rejected: {0}")]
    Auth(String),
    #[error("failed to reach destination platform: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("destination platform error {status}: {body}")]
    Api { status: StatusCode, body: String },
}

#[derive(Debug, Error)]
pub enum MediaUploadError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to read scratch file: {0}")]
    Io(#[from] std::io::Error),
    #[error("blob store error {status}: {body}")]
    Api { status: StatusCode, body: String },
}

/// Anything the orchestrator can publish a post through.
#[async_trait]
pub trait PostPublisher: Send + Sync {
    async fn publish(&self, text: &str, media_urls: &[String]) -> Result<(), PublishError>;
}

/// Opaque blob handle returned by the destination's blob store. Embedded
/// verbatim in the post record; never outlives a single publish call.
#[derive(Debug, Clone)]
pub struct UploadedBlob(pub Value);

#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub blob: UploadedBlob,
    pub alt: String,
}

/// Media attachment for a destination post, serialized to the wire format
/// only by [`build_post_record`].
#[derive(Debug, Clone)]
pub enum PostEmbed {
    None,
    Images(Vec<UploadedImage>),
}

/// Authenticated XRPC session.
#[derive(Clone)]
pub struct Session {
    pub access_jwt: String,
    pub did: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("did", &self.did).finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct BlueskyClient {
    http: Client,
    service: String,
}

impl fmt::Debug for BlueskyClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlueskyClient")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl BlueskyClient {
    pub fn new(service: impl Into<String>) -> Self {
        let http = Client::builder()
            .user_agent("skymirror/0.1")
            .build()
            .expect("reqwest client");
        Self {
            http,
            service: service.into().trim_end_matches('/').to_string(),
        }
    }

    fn xrpc_url(&self, method: &str) -> String {
        format!("{}/xrpc/{}", self.service, method)
    }

    /// `com.atproto.server.createSession`. Any rejection is an auth
    /// failure, fatal for the run before anything is fetched or published.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<Session, PublishError> {
        let res = self
            .http
            .post(self.xrpc_url("com.atproto.server.createSession"))
            .json(&json!({ "identifier": identifier, "password": password }))
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(PublishError::Auth(format!("{status}: {body}")));
        }
        let payload: CreateSessionResp = res.json().await?;
        info!(did = %payload.did, "logged in to destination");
        Ok(Session {
            access_jwt: payload.access_jwt,
            did: payload.did,
        })
    }

    /// `com.atproto.repo.uploadBlob` with the asset's raw bytes.
    pub async fn upload_blob(
        &self,
        session: &Session,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<UploadedBlob, MediaUploadError> {
        let res = self
            .http
            .post(self.xrpc_url("com.atproto.repo.uploadBlob"))
            .bearer_auth(&session.access_jwt)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(MediaUploadError::Api { status, body });
        }
        let payload: UploadBlobResp = res.json().await?;
        Ok(UploadedBlob(payload.blob))
    }

    /// `com.atproto.repo.createRecord` for an `app.bsky.feed.post` record.
    pub async fn create_post(&self, session: &Session, record: &Value) -> Result<(), PublishError> {
        let res = self
            .http
            .post(self.xrpc_url("com.atproto.repo.createRecord"))
            .bearer_auth(&session.access_jwt)
            .json(&json!({
                "repo": session.did,
                "collection": "app.bsky.feed.post",
                "record": record,
            }))
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(PublishError::Api { status, body });
        }
        Ok(())
    }
}

/// Build an `app.bsky.feed.post` record. Pure; the only place the embed
/// variant meets the wire format.
pub fn build_post_record(text: &str, created_at: DateTime<Utc>, embed: &PostEmbed) -> Value {
    let mut record = json!({
        "$type": "app.bsky.feed.post",
        "text": text,
        "createdAt": created_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    });
    if let PostEmbed::Images(images) = embed {
        if !images.is_empty() {
            let images: Vec<Value> = images
                .iter()
                .map(|img| json!({ "alt": img.alt, "image": img.blob.0 }))
                .collect();
            record["embed"] = json!({
                "$type": "app.bsky.embed.images",
                "images": images,
            });
        }
    }
    record
}

/// Publishes composed posts: downloads each attached media URL, re-uploads
/// the blobs, and creates the post record.
#[derive(Debug)]
pub struct BlueskyPublisher {
    client: BlueskyClient,
    session: Session,
    media_http: Client,
    scratch_dir: PathBuf,
}

impl BlueskyPublisher {
    pub fn new(client: BlueskyClient, session: Session, scratch_dir: impl Into<PathBuf>) -> Self {
        let media_http = Client::builder()
            .user_agent("skymirror/0.1")
            .build()
            .expect("reqwest client");
        Self {
            client,
            session,
            media_http,
            scratch_dir: scratch_dir.into(),
        }
    }

    /// Log in and construct a publisher in one step.
    pub async fn login(
        client: BlueskyClient,
        identifier: &str,
        password: &str,
        scratch_dir: impl Into<PathBuf>,
    ) -> Result<Self, PublishError> {
        let session = client.login(identifier, password).await?;
        Ok(Self::new(client, session, scratch_dir))
    }

    /// Publish one post, embedding whichever attached media survive the
    /// download+upload round trip.
    ///
    /// A failed download or upload drops that one asset and the post still
    /// goes out (possibly text-only); only a failed final create counts as
    /// failure. Every scratch file is removed immediately after its upload
    /// attempt, whatever the outcome.
    #[instrument(skip_all, fields(media = media_urls.len()))]
    pub async fn publish(&self, text: &str, media_urls: &[String]) -> Result<(), PublishError> {
        let mut images = Vec::new();
        for url in media_urls {
            let asset = match media::download(&self.media_http, url, &self.scratch_dir).await {
                Ok(asset) => asset,
                Err(err) => {
                    warn!(%url, %err, "media download failed; publishing without this asset");
                    continue;
                }
            };
            let uploaded = self.upload_asset(&asset).await;
            asset.remove().await;
            match uploaded {
                Ok(blob) => images.push(UploadedImage {
                    blob,
                    alt: "Image".to_string(),
                }),
                Err(err) => {
                    warn!(%url, %err, "media upload failed; publishing without this asset");
                }
            }
        }

        let embed = if images.is_empty() {
            PostEmbed::None
        } else {
            PostEmbed::Images(images)
        };
        let record = build_post_record(text, Utc::now(), &embed);
        self.client.create_post(&self.session, &record).await
    }

    async fn upload_asset(&self, asset: &MediaAsset) -> Result<UploadedBlob, MediaUploadError> {
        let bytes = tokio::fs::read(&asset.path).await?;
        self.client
            .upload_blob(&self.session, bytes, asset.content_type)
            .await
    }
}

#[async_trait]
impl PostPublisher for BlueskyPublisher {
    async fn publish(&self, text: &str, media_urls: &[String]) -> Result<(), PublishError> {
        BlueskyPublisher::publish(self, text, media_urls).await
    }
}

#[derive(Deserialize)]
struct CreateSessionResp {
    #[serde(rename = "accessJwt")]
    access_jwt: String,
    did: String,
}

#[derive(Deserialize)]
struct UploadBlobResp {
    blob: Value,
}
