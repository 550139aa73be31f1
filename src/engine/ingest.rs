// Patitas Engine — Batch Driver
// Sequential ingestion over social posts and stored receipt scans. One
// record fails alone: every per-record error is logged and counted, never
// propagated past the loop. Config problems abort before the loop starts.

use crate::atoms::error::RescueResult;
use crate::atoms::types::{Decoded, Post, StoredFile};
use crate::engine::codec::{normalize_name, NameRules};
use crate::engine::expenses;
use crate::engine::extraction::{Extractor, VisionModel};
use crate::engine::reconcile;
use crate::engine::store::{Table, TabularStore};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use log::{error, info};
use reqwest::Client;

// ── Media fetching ─────────────────────────────────────────────────────────

/// Fetches raw media bytes by URL. Tests implement it with canned bytes.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn fetch(&self, url: &str) -> RescueResult<Vec<u8>>;
}

pub struct HttpMediaSource {
    client: Client,
}

impl HttpMediaSource {
    pub fn new() -> Self {
        HttpMediaSource { client: Client::new() }
    }
}

impl Default for HttpMediaSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaSource for HttpMediaSource {
    async fn fetch(&self, url: &str) -> RescueResult<Vec<u8>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Direct-download URL for a stored receipt scan.
fn file_url(file: &StoredFile) -> String {
    format!("https://drive.google.com/uc?id={}", file.id)
}

// ── Batch summary ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

// ── Runner ─────────────────────────────────────────────────────────────────

pub struct BatchRunner<'a, M: VisionModel, S: TabularStore, F: MediaSource> {
    extractor: Extractor<'a, M>,
    rules: &'a NameRules,
    store: &'a S,
    media: &'a F,
}

impl<'a, M: VisionModel, S: TabularStore, F: MediaSource> BatchRunner<'a, M, S, F> {
    pub fn new(model: &'a M, rules: &'a NameRules, store: &'a S, media: &'a F) -> Self {
        BatchRunner {
            extractor: Extractor::new(model, rules),
            rules,
            store,
            media,
        }
    }

    /// Process posts oldest-first so identifier assignment and event history
    /// follow publication order across the batch.
    pub async fn run_posts(&self, mut posts: Vec<Post>) -> BatchSummary {
        posts.sort_by_key(|p| p.published_at().unwrap_or(NaiveDateTime::MIN));
        info!("[ingest] processing {} posts", posts.len());

        let mut summary = BatchSummary::default();
        for post in &posts {
            match self.process_post(post).await {
                Ok(true) => summary.processed += 1,
                Ok(false) => summary.skipped += 1,
                Err(e) => {
                    error!("[ingest] post {} failed: {e}", post.id);
                    summary.failed += 1;
                }
            }
        }
        info!(
            "[ingest] posts done: {} processed, {} skipped, {} failed",
            summary.processed, summary.skipped, summary.failed
        );
        summary
    }

    /// Returns Ok(true) when the post produced store writes, Ok(false) when
    /// it was a duplicate or carried no animals.
    async fn process_post(&self, post: &Post) -> RescueResult<bool> {
        if reconcile::already_processed(self.store, post)? {
            info!("[ingest] post {} already recorded, skipping", post.id);
            return Ok(false);
        }

        let published = post.published_at().ok_or_else(|| {
            crate::atoms::error::RescueError::malformed(format!(
                "post {} has unparseable timestamp {:?}",
                post.id, post.timestamp
            ))
        })?;

        let decoded = self.extractor.extract_events(&post.caption, published).await?;
        let names = match &decoded {
            Decoded::NoAnimals => {
                info!("[ingest] post {} carries no animals", post.id);
                return Ok(false);
            }
            Decoded::Animals { names, .. } => names.clone(),
        };

        // Attribute extraction runs only for animals not yet in the store.
        let missing: Vec<String> = {
            let mut out: Vec<String> = Vec::new();
            for name in &names {
                if out.contains(name) {
                    continue;
                }
                if self.store.find_by_column(Table::Animal, "nombre", name)?.is_none() {
                    out.push(name.clone());
                }
            }
            out
        };
        let profiles = if missing.is_empty() {
            Vec::new()
        } else {
            let images = self.fetch_post_images(post, &names).await?;
            self.extractor.extract_profiles(&images, &post.caption, &missing).await?
        };

        let plan = reconcile::plan_post(self.store, post, &decoded, &profiles)?;
        if plan.is_empty() {
            return Ok(false);
        }
        self.store.append_batch(&plan)?;
        Ok(true)
    }

    /// Image evidence for the profile call: child media item i for animal i
    /// in carousels, the parent media otherwise. Missing URLs are skipped.
    async fn fetch_post_images(&self, post: &Post, names: &[String]) -> RescueResult<Vec<Vec<u8>>> {
        let mut urls = Vec::new();
        if names.len() > 1 {
            for i in 0..names.len() {
                if let Some(child) = post.child(i) {
                    urls.push(child.media_url().to_string());
                }
            }
        }
        if urls.is_empty() {
            urls.push(post.media_url().to_string());
        }

        let mut images = Vec::new();
        for url in urls.iter().filter(|u| !u.is_empty()) {
            images.push(self.media.fetch(url).await?);
        }
        Ok(images)
    }

    /// Process stored receipt scans. Same isolation shape as `run_posts`.
    pub async fn run_receipts(&self, files: &[StoredFile]) -> BatchSummary {
        info!("[ingest] processing {} receipt files", files.len());

        let mut summary = BatchSummary::default();
        for file in files {
            match self.process_receipt(file).await {
                Ok(true) => summary.processed += 1,
                Ok(false) => summary.skipped += 1,
                Err(e) => {
                    error!("[ingest] receipt {} failed: {e}", file.name);
                    summary.failed += 1;
                }
            }
        }
        info!(
            "[ingest] receipts done: {} processed, {} skipped, {} failed",
            summary.processed, summary.skipped, summary.failed
        );
        summary
    }

    async fn process_receipt(&self, file: &StoredFile) -> RescueResult<bool> {
        if expenses::already_recorded(self.store, &file.id)? {
            info!("[ingest] receipt {} already recorded, skipping", file.name);
            return Ok(false);
        }

        let url = file_url(file);
        let image = self.media.fetch(&url).await?;
        let fields = self.extractor.extract_receipt(&image).await?;
        let mut record = match expenses::build_record(&fields, &file.id, &url, &file.id) {
            Some(record) => record,
            None => return Ok(false),
        };
        // Pet names on receipts go through the same normalization as posts.
        if !record.pet.trim().is_empty() {
            record.pet = normalize_name(&record.pet, self.rules);
        }
        self.store.append_row(Table::Expense, &record.fields())?;
        Ok(true)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────
