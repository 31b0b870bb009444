use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

use skymirror::bluesky::{BlueskyClient, BlueskyPublisher};
use skymirror::config;
use skymirror::cursor::CursorStore;
use skymirror::pipeline;
use skymirror::twitter::TwitterClient;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to the persisted cursor file
    #[arg(long, default_value = "last_post_id.txt")]
    cursor_file: PathBuf,
    /// Directory for scratch media downloads (defaults to the OS temp dir)
    #[arg(long)]
    scratch_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::from_env()?;
    let scratch_dir = args.scratch_dir.unwrap_or_else(std::env::temp_dir);

    let store = CursorStore::new(&args.cursor_file);
    let source = TwitterClient::new(cfg.source.bearer_token.clone(), cfg.source.username.clone());
    let client = BlueskyClient::new(cfg.dest.service.clone());
    let publisher =
        BlueskyPublisher::login(client, &cfg.dest.email, &cfg.dest.password, scratch_dir).await?;

    let summary = pipeline::run(&source, &publisher, &store).await?;
    info!(
        fetched = summary.fetched,
        published = summary.published,
        cursor = ?summary.cursor,
        "mirror pass complete"
    );
    Ok(())
}
