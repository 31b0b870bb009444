//! Orchestrates one mirror pass: read cursor, fetch, publish
//! oldest-to-newest, advance cursor per success.
use anyhow::Result;
use tracing::{info, instrument, warn};

use crate::bluesky::PostPublisher;
use crate::cursor::CursorStore;
use crate::twitter::{FetchError, SourceFeed};

/// What one pass did, for logging and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub fetched: usize,
    pub published: usize,
    pub cursor: Option<u64>,
}

/// Run a single mirror pass.
///
/// Posts are dispatched oldest-to-newest (the reverse of the source's
/// newest-first order) and the cursor is written after each successful
/// publish, so an interrupted pass always leaves the cursor on a
/// contiguous prefix of chronological successes. The first publish
/// failure stops the pass: later posts are not attempted out of order,
/// and the next invocation retries from the same cursor.
///
/// A transient fetch failure degrades to "no new posts"; only an
/// unresolvable source user is fatal.
#[instrument(skip_all)]
pub async fn run(
    source: &dyn SourceFeed,
    publisher: &dyn PostPublisher,
    store: &CursorStore,
) -> Result<RunSummary> {
    let cursor = store.read();
    info!(?cursor, "starting mirror pass");

    let posts = match source.fetch_new(cursor).await {
        Ok(posts) => posts,
        Err(err @ FetchError::UserNotFound(_)) => return Err(err.into()),
        Err(err) => {
            warn!(%err, "source fetch failed; treating as no new posts");
            Vec::new()
        }
    };
    let fetched = posts.len();
    info!(fetched, "fetched posts newer than cursor");

    let mut published = 0;
    let mut latest = cursor;
    for post in posts.into_iter().rev() {
        match publisher.publish(&post.text, &post.media_urls).await {
            Ok(()) => {
                store.write(post.id)?;
                latest = Some(post.id);
                published += 1;
                info!(id = post.id, media = post.media_urls.len(), "mirrored post");
            }
            Err(err) => {
                warn!(id = post.id, %err, "publish failed; stopping this pass");
                break;
            }
        }
    }

    Ok(RunSummary {
        fetched,
        published,
        cursor: latest,
    })
}
