// Patitas — batch entrypoint
// Glue only: config, store, and the two batch loops. Inbound records are
// read from JSON drop files; fetching them from the source platforms is an
// upstream concern.

use log::{error, info};
use patitas::{BatchRunner, Config, HttpMediaSource, OpenAiVision, Post, SqliteStore, StoredFile};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

fn inbox_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".patitas")
        .join("inbox")
}

/// A missing drop file is an empty batch, not an error.
fn read_inbox<T: DeserializeOwned>(path: &Path) -> patitas::RescueResult<Vec<T>> {
    if !path.exists() {
        info!("[main] no drop file at {}, nothing to do", path.display());
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

async fn run() -> patitas::RescueResult<()> {
    let config = Config::load()?;
    let store = SqliteStore::open(&config.db_path)?;
    let model = OpenAiVision::new(&config)?;
    let rules = config.name_rules();
    let media = HttpMediaSource::new();
    let runner = BatchRunner::new(&model, &rules, &store, &media);

    let posts: Vec<Post> = read_inbox(&inbox_dir().join("posts.json"))?;
    if !posts.is_empty() {
        runner.run_posts(posts).await;
    }

    let files: Vec<StoredFile> = read_inbox(&inbox_dir().join("receipts.json"))?;
    if !files.is_empty() {
        runner.run_receipts(&files).await;
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("[main] fatal: {e}");
            ExitCode::FAILURE
        }
    }
}
