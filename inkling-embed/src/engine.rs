//! The embedding engine: job submission, the rebuild controller and the
//! synchronous single-item boundary.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use crate::collect::{collect_items, estimate_items};
use crate::errors::{EmbedError, EmbedResult};
use crate::jobs::{JobTracker, JobView};
use crate::provider::{EmbeddingProvider, OllamaEmbedder};
use crate::rebuild::{ItemKind, RebuildAccepted, RebuildRequest, SingleEmbedReport};
use crate::storage::ContentStore;
use crate::vectorize::{embed_insight, embed_note, embed_source};
use inkling_core::EmbedSettings;

#[derive(Clone)]
pub struct EmbedEngine {
    settings: EmbedSettings,
    store: ContentStore,
    provider: Arc<dyn EmbeddingProvider>,
    jobs: JobTracker,
}

impl EmbedEngine {
    /// Open an engine backed by the configured (or default) database path
    /// and the HTTP embedding backend.
    pub async fn open(settings: EmbedSettings) -> EmbedResult<Self> {
        let db_path = match &settings.db_path_override {
            Some(path) => path.clone(),
            None => ContentStore::default_db_path()?,
        };
        let store = ContentStore::open(&db_path).await?;
        let provider = Arc::new(OllamaEmbedder::new(&settings)?);
        Ok(Self::with_provider(settings, store, provider))
    }

    /// Build an engine around an existing store and an injected provider.
    /// This is the seam tests (and alternative backends) use.
    pub fn with_provider(
        settings: EmbedSettings,
        store: ContentStore,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            settings,
            store,
            provider,
            jobs: JobTracker::new(),
        }
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    /// Accept a rebuild request: validate it, record a queued job, spawn the
    /// run, and return immediately with the job id and a cheap estimate.
    pub async fn submit_rebuild(&self, request: RebuildRequest) -> EmbedResult<RebuildAccepted> {
        if request.selects_nothing() {
            return Err(EmbedError::InvalidRequest);
        }

        let estimated_items = estimate_items(&self.store, &request).await?;
        let job_id = self.jobs.create().await;

        info!(
            "rebuild {job_id} accepted: mode={:?} sources={} notes={} insights={} (~{estimated_items} items)",
            request.mode, request.include_sources, request.include_notes, request.include_insights
        );

        let engine = self.clone();
        let task_job_id = job_id.clone();
        tokio::spawn(async move {
            engine.run_rebuild(&task_job_id, request).await;
        });

        Ok(RebuildAccepted {
            job_id,
            estimated_items,
        })
    }

    /// Snapshot a job for polling clients.
    pub async fn job_status(&self, job_id: &str) -> Option<JobView> {
        self.jobs.get(job_id).await
    }

    /// Drive one rebuild run to its terminal state. Per-item failures are
    /// counted and swallowed; only pre-flight and enumeration errors fail
    /// the job itself.
    async fn run_rebuild(&self, job_id: &str, request: RebuildRequest) {
        if !self.provider.is_configured() {
            warn!("rebuild {job_id} aborted: no embedding model configured");
            self.jobs
                .update(job_id, |job| job.fail(EmbedError::NoEmbeddingModel.to_string()))
                .await;
            return;
        }

        self.jobs.update(job_id, |job| job.mark_running()).await;

        let items = match collect_items(&self.store, &request).await {
            Ok(items) => items,
            Err(e) => {
                error!("rebuild {job_id} enumeration failed: {e}");
                self.jobs
                    .update(job_id, |job| job.fail(format!("enumeration failed: {e}")))
                    .await;
                return;
            }
        };

        let total = items.total();
        self.jobs
            .update(job_id, |job| job.total_items = total)
            .await;
        info!("rebuild {job_id}: {total} items to process");

        if total == 0 {
            self.jobs.update(job_id, |job| job.complete()).await;
            return;
        }

        self.process_list(job_id, ItemKind::Source, &items.sources).await;
        self.process_list(job_id, ItemKind::Note, &items.notes).await;
        self.process_list(job_id, ItemKind::Insight, &items.insights).await;

        self.jobs.update(job_id, |job| job.complete()).await;

        if let Some(view) = self.jobs.get(job_id).await {
            info!(
                "rebuild {job_id} complete: {}/{} processed, {} failed in {:.2}s",
                view.processed_items, view.total_items, view.failed_items, view.elapsed_seconds
            );
        }
    }

    /// Process one content type's id list sequentially, each item inside
    /// its own failure boundary.
    async fn process_list(&self, job_id: &str, kind: ItemKind, ids: &[String]) {
        if ids.is_empty() {
            return;
        }
        info!("rebuild {job_id}: processing {} {}s", ids.len(), kind);

        for (idx, id) in ids.iter().enumerate() {
            let result = match kind {
                ItemKind::Source => {
                    embed_source(&self.store, self.provider.as_ref(), &self.settings, id)
                        .await
                        .map(|_| ())
                }
                ItemKind::Note => {
                    embed_note(&self.store, self.provider.as_ref(), &self.settings, id).await
                }
                ItemKind::Insight => {
                    embed_insight(&self.store, self.provider.as_ref(), &self.settings, id).await
                }
            };

            match result {
                Ok(()) => {
                    self.jobs
                        .update(job_id, |job| {
                            match kind {
                                ItemKind::Source => job.sources_processed += 1,
                                ItemKind::Note => job.notes_processed += 1,
                                ItemKind::Insight => job.insights_processed += 1,
                            }
                            job.processed_items += 1;
                        })
                        .await;
                }
                Err(e) => {
                    warn!("failed to re-embed {kind} {id}: {e}");
                    self.jobs
                        .update(job_id, |job| job.failed_items += 1)
                        .await;
                }
            }

            let done = idx + 1;
            if done % 10 == 0 || done == ids.len() {
                info!("rebuild {job_id}: {done}/{} {}s processed", ids.len(), kind);
            }
        }
    }

    /// Embed a single item synchronously. Failures come back in the report,
    /// never as an `Err`: one invocation, one outcome.
    pub async fn embed_single(&self, item_id: &str, item_kind: ItemKind) -> SingleEmbedReport {
        let start = Instant::now();
        info!("embedding {item_kind} {item_id}");

        let outcome = if !self.provider.is_configured() {
            Err(EmbedError::NoEmbeddingModel)
        } else {
            match item_kind {
                ItemKind::Source => {
                    embed_source(&self.store, self.provider.as_ref(), &self.settings, item_id).await
                }
                ItemKind::Note => {
                    embed_note(&self.store, self.provider.as_ref(), &self.settings, item_id)
                        .await
                        .map(|_| 0)
                }
                ItemKind::Insight => {
                    embed_insight(&self.store, self.provider.as_ref(), &self.settings, item_id)
                        .await
                        .map(|_| 0)
                }
            }
        };

        let elapsed = start.elapsed();
        match outcome {
            Ok(chunks_created) => {
                info!(
                    "embedded {item_kind} {item_id} in {:.2}s",
                    elapsed.as_secs_f64()
                );
                SingleEmbedReport {
                    success: true,
                    item_id: item_id.to_string(),
                    item_kind,
                    chunks_created,
                    elapsed,
                    error_message: None,
                }
            }
            Err(e) => {
                warn!("embedding failed for {item_kind} {item_id}: {e}");
                SingleEmbedReport {
                    success: false,
                    item_id: item_id.to_string(),
                    item_kind,
                    chunks_created: 0,
                    elapsed,
                    error_message: Some(e.to_string()),
                }
            }
        }
    }
}
