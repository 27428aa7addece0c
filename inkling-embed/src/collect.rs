//! Enumerates the items a rebuild run must process.

use tracing::info;

use crate::errors::EmbedResult;
use crate::rebuild::{RebuildMode, RebuildRequest};
use crate::storage::ContentStore;

/// Item ids collected for one rebuild run, deduplicated per list.
#[derive(Debug, Clone, Default)]
pub struct CollectedItems {
    pub sources: Vec<String>,
    pub notes: Vec<String>,
    pub insights: Vec<String>,
}

impl CollectedItems {
    pub fn total(&self) -> usize {
        self.sources.len() + self.notes.len() + self.insights.len()
    }
}

/// Collect the ids to (re)process for the given request.
///
/// `existing` selects items that already carry an embedding (any embedded
/// chunk qualifies a source, even a partially embedded one); `all` selects
/// every item with non-empty primary content. Read-only; any store failure
/// is fatal to the whole rebuild.
pub async fn collect_items(
    store: &ContentStore,
    request: &RebuildRequest,
) -> EmbedResult<CollectedItems> {
    let mut items = CollectedItems::default();

    if request.include_sources {
        items.sources = match request.mode {
            RebuildMode::Existing => embedded_source_ids(store).await?,
            RebuildMode::All => {
                fetch_ids(
                    store,
                    "SELECT id FROM sources WHERE full_text IS NOT NULL AND full_text != '' ORDER BY id",
                )
                .await?
            }
        };
        info!("collected {} sources for rebuild", items.sources.len());
    }

    if request.include_notes {
        items.notes = match request.mode {
            RebuildMode::Existing => {
                fetch_ids(
                    store,
                    "SELECT id FROM notes WHERE embedding IS NOT NULL AND json_array_length(embedding) > 0 ORDER BY id",
                )
                .await?
            }
            RebuildMode::All => {
                fetch_ids(
                    store,
                    "SELECT id FROM notes WHERE content IS NOT NULL AND content != '' ORDER BY id",
                )
                .await?
            }
        };
        info!("collected {} notes for rebuild", items.notes.len());
    }

    if request.include_insights {
        items.insights = match request.mode {
            RebuildMode::Existing => {
                fetch_ids(
                    store,
                    "SELECT id FROM insights WHERE embedding IS NOT NULL AND json_array_length(embedding) > 0 ORDER BY id",
                )
                .await?
            }
            RebuildMode::All => fetch_ids(store, "SELECT id FROM insights ORDER BY id").await?,
        };
        info!("collected {} insights for rebuild", items.insights.len());
    }

    Ok(items)
}

/// Cheap COUNT-based estimate reported to the caller at submission time.
/// The spawned job re-collects; the estimate is advisory only.
pub async fn estimate_items(store: &ContentStore, request: &RebuildRequest) -> EmbedResult<usize> {
    let mut estimate = 0;

    if request.include_sources {
        estimate += match request.mode {
            RebuildMode::Existing => {
                if store.has_vec_table().await? {
                    fetch_count(
                        store,
                        "SELECT COUNT(DISTINCT sc.source_id) FROM source_chunks sc JOIN chunk_vec v ON v.rowid = sc.id",
                    )
                    .await?
                } else {
                    0
                }
            }
            RebuildMode::All => {
                fetch_count(
                    store,
                    "SELECT COUNT(*) FROM sources WHERE full_text IS NOT NULL AND full_text != ''",
                )
                .await?
            }
        };
    }

    if request.include_notes {
        estimate += match request.mode {
            RebuildMode::Existing => {
                fetch_count(
                    store,
                    "SELECT COUNT(*) FROM notes WHERE embedding IS NOT NULL AND json_array_length(embedding) > 0",
                )
                .await?
            }
            RebuildMode::All => {
                fetch_count(
                    store,
                    "SELECT COUNT(*) FROM notes WHERE content IS NOT NULL AND content != ''",
                )
                .await?
            }
        };
    }

    if request.include_insights {
        estimate += match request.mode {
            RebuildMode::Existing => {
                fetch_count(
                    store,
                    "SELECT COUNT(*) FROM insights WHERE embedding IS NOT NULL AND json_array_length(embedding) > 0",
                )
                .await?
            }
            RebuildMode::All => fetch_count(store, "SELECT COUNT(*) FROM insights").await?,
        };
    }

    Ok(estimate)
}

/// Sources whose chunk set holds at least one vector. The join against the
/// vec table is what makes a partially embedded source count as embedded.
async fn embedded_source_ids(store: &ContentStore) -> EmbedResult<Vec<String>> {
    if !store.has_vec_table().await? {
        return Ok(Vec::new());
    }

    fetch_ids(
        store,
        "SELECT DISTINCT sc.source_id FROM source_chunks sc JOIN chunk_vec v ON v.rowid = sc.id ORDER BY sc.source_id",
    )
    .await
}

async fn fetch_ids(store: &ContentStore, sql: &str) -> EmbedResult<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(sql).fetch_all(store.pool()).await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

async fn fetch_count(store: &ContentStore, sql: &str) -> EmbedResult<usize> {
    let (count,): (i64,) = sqlx::query_as(sql).fetch_one(store.pool()).await?;
    Ok(count as usize)
}
