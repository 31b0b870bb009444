use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One original post from the source platform, ready to mirror.
///
/// Built only by the source reader; `text` is already normalized and
/// `media_urls` holds only URLs that resolved against the platform's
/// media index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourcePost {
    pub id: u64,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub media_urls: Vec<String>,
}
