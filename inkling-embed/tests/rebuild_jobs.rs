//! End-to-end rebuild job tests: submission, pre-flight failures, item
//! collection, partial-failure containment and counter consistency.
//!
//! These run entirely against an in-memory store and stub providers; no
//! live embedding backend is needed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use inkling_embed::{
    ContentStore, EmbedEngine, EmbedError, EmbedResult, EmbedSettings, EmbeddingProvider,
    ItemKind, JobStatus, JobView, RebuildMode, RebuildRequest,
};

// -- Stub providers ----------------------------------------------------------

/// Deterministic provider: the vector depends only on the input length.
struct StaticProvider {
    dim: usize,
}

#[async_trait]
impl EmbeddingProvider for StaticProvider {
    fn is_configured(&self) -> bool {
        true
    }

    async fn embed_batch(&self, inputs: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
        Ok(inputs
            .iter()
            .map(|text| {
                let seed = text.len() as f32;
                (0..self.dim).map(|i| seed + i as f32).collect()
            })
            .collect())
    }
}

/// Provider with no model configured; every call is rejected.
struct UnconfiguredProvider;

#[async_trait]
impl EmbeddingProvider for UnconfiguredProvider {
    fn is_configured(&self) -> bool {
        false
    }

    async fn embed_batch(&self, _inputs: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
        Err(EmbedError::NoEmbeddingModel)
    }
}

/// Provider that fails any batch containing the marker text, to exercise
/// per-item isolation.
struct FailingProvider {
    marker: &'static str,
    dim: usize,
}

#[async_trait]
impl EmbeddingProvider for FailingProvider {
    fn is_configured(&self) -> bool {
        true
    }

    async fn embed_batch(&self, inputs: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
        if inputs.iter().any(|text| text.contains(self.marker)) {
            return Err(EmbedError::Embedding("transient provider error".to_string()));
        }
        Ok(inputs
            .iter()
            .map(|_| (0..self.dim).map(|i| i as f32).collect())
            .collect())
    }
}

/// Provider that parks the pre-flight model check until the test releases
/// it, leaving a window to alter the store between submission and
/// enumeration.
struct GatedProvider {
    released: Arc<AtomicBool>,
    dim: usize,
}

#[async_trait]
impl EmbeddingProvider for GatedProvider {
    fn is_configured(&self) -> bool {
        while !self.released.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(1));
        }
        true
    }

    async fn embed_batch(&self, inputs: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
        Ok(inputs
            .iter()
            .map(|_| (0..self.dim).map(|i| i as f32).collect())
            .collect())
    }
}

// -- Fixture -----------------------------------------------------------------

async fn engine_with(provider: Arc<dyn EmbeddingProvider>) -> EmbedEngine {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("inkling_embed=debug,warn")
        .with_test_writer()
        .try_init();

    let store = ContentStore::open_in_memory().await.expect("open store");
    let settings = EmbedSettings {
        embedding_batch: 2,
        ..Default::default()
    };
    EmbedEngine::with_provider(settings, store, provider)
}

fn all_types(mode: RebuildMode) -> RebuildRequest {
    RebuildRequest {
        mode,
        include_sources: true,
        include_notes: true,
        include_insights: true,
    }
}

async fn wait_terminal(engine: &EmbedEngine, job_id: &str) -> JobView {
    for _ in 0..500 {
        if let Some(view) = engine.job_status(job_id).await
            && view.status.is_terminal()
        {
            return view;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not reach a terminal state");
}

// -- Test cases --------------------------------------------------------------

#[tokio::test]
async fn rejects_request_with_no_selected_types() {
    let engine = engine_with(Arc::new(StaticProvider { dim: 4 })).await;

    let request = RebuildRequest {
        mode: RebuildMode::All,
        include_sources: false,
        include_notes: false,
        include_insights: false,
    };
    let err = engine.submit_rebuild(request).await.unwrap_err();
    assert!(matches!(err, EmbedError::InvalidRequest));
}

#[tokio::test]
async fn unconfigured_provider_fails_job_before_any_work() {
    let engine = engine_with(Arc::new(UnconfiguredProvider)).await;
    engine
        .store()
        .upsert_note("note:1", "A note", Some("some body text"))
        .await
        .unwrap();

    let accepted = engine
        .submit_rebuild(all_types(RebuildMode::All))
        .await
        .unwrap();
    let view = wait_terminal(&engine, &accepted.job_id).await;

    assert_eq!(view.status, JobStatus::Failed);
    assert!(
        view.error_message
            .as_deref()
            .unwrap_or_default()
            .contains("no embedding model"),
        "error should name the missing model: {:?}",
        view.error_message
    );
    assert_eq!(view.processed_items, 0);
    assert_eq!(view.total_items, 0);
}

#[tokio::test]
async fn empty_store_completes_with_zero_counters() {
    let engine = engine_with(Arc::new(StaticProvider { dim: 4 })).await;

    let accepted = engine
        .submit_rebuild(all_types(RebuildMode::All))
        .await
        .unwrap();
    assert_eq!(accepted.estimated_items, 0);

    let view = wait_terminal(&engine, &accepted.job_id).await;
    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.total_items, 0);
    assert_eq!(view.processed_items, 0);
    assert_eq!(view.failed_items, 0);
    assert!(view.error_message.is_none());
}

#[tokio::test]
async fn existing_mode_selects_only_embedded_sources() {
    let engine = engine_with(Arc::new(StaticProvider { dim: 4 })).await;
    let store = engine.store();

    for idx in 1..=5 {
        store
            .upsert_source(
                &format!("source:{idx}"),
                &format!("Doc {idx}"),
                Some("# Heading\nA body paragraph long enough to chunk."),
            )
            .await
            .unwrap();
    }
    // Only three of the five get embeddings before the rebuild.
    for idx in 1..=3 {
        let report = engine
            .embed_single(&format!("source:{idx}"), ItemKind::Source)
            .await;
        assert!(report.success, "seed embed failed: {:?}", report.error_message);
    }

    let request = RebuildRequest {
        mode: RebuildMode::Existing,
        include_sources: true,
        include_notes: false,
        include_insights: false,
    };
    let accepted = engine.submit_rebuild(request).await.unwrap();
    assert_eq!(accepted.estimated_items, 3);

    let view = wait_terminal(&engine, &accepted.job_id).await;
    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.total_items, 3);
    assert_eq!(view.processed_items, 3);
    assert_eq!(view.sources_processed, 3);
    assert_eq!(view.failed_items, 0);
    assert_eq!(view.notes_processed, 0);
    assert_eq!(view.insights_processed, 0);
}

#[tokio::test]
async fn all_mode_processes_every_content_type() {
    let engine = engine_with(Arc::new(StaticProvider { dim: 4 })).await;
    let store = engine.store();

    store
        .upsert_source("source:1", "Doc 1", Some("# One\nfirst source body"))
        .await
        .unwrap();
    store
        .upsert_source("source:2", "Doc 2", Some("# Two\nsecond source body"))
        .await
        .unwrap();
    store
        .upsert_note("note:1", "Note 1", Some("note body"))
        .await
        .unwrap();
    // A note without content must not be collected in `all` mode.
    store.upsert_note("note:2", "Note 2", None).await.unwrap();
    store
        .upsert_insight("insight:1", Some("source:1"), "summary", "insight body")
        .await
        .unwrap();

    let accepted = engine
        .submit_rebuild(all_types(RebuildMode::All))
        .await
        .unwrap();
    assert_eq!(accepted.estimated_items, 4);

    let view = wait_terminal(&engine, &accepted.job_id).await;
    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.total_items, 4);
    assert_eq!(view.processed_items, 4);
    assert_eq!(view.failed_items, 0);
    assert_eq!(view.sources_processed, 2);
    assert_eq!(view.notes_processed, 1);
    assert_eq!(view.insights_processed, 1);
    assert!(view.error_message.is_none());
    assert!(view.completed_at.is_some());

    // Embeddings actually landed in the store.
    assert!(store.note_embedding("note:1").await.unwrap().is_some());
    assert!(store.insight_embedding("insight:1").await.unwrap().is_some());
    assert!(store.source_chunk_count("source:1").await.unwrap() > 0);
}

#[tokio::test]
async fn one_failing_item_does_not_abort_the_run() {
    let engine = engine_with(Arc::new(FailingProvider {
        marker: "POISON",
        dim: 4,
    }))
    .await;
    let store = engine.store();

    store
        .upsert_note("note:1", "Note 1", Some("first note body"))
        .await
        .unwrap();
    store
        .upsert_note("note:2", "Note 2", Some("POISON body that breaks the provider"))
        .await
        .unwrap();
    store
        .upsert_note("note:3", "Note 3", Some("third note body"))
        .await
        .unwrap();
    store
        .upsert_note("note:4", "Note 4", Some("fourth note body"))
        .await
        .unwrap();

    let request = RebuildRequest {
        mode: RebuildMode::All,
        include_sources: false,
        include_notes: true,
        include_insights: false,
    };
    let accepted = engine.submit_rebuild(request).await.unwrap();
    let view = wait_terminal(&engine, &accepted.job_id).await;

    // The failure is contained: the run completes and later items were
    // still attempted.
    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.total_items, 4);
    assert_eq!(view.processed_items, 3);
    assert_eq!(view.failed_items, 1);
    assert_eq!(view.processed_items + view.failed_items, view.total_items);
    assert!(view.error_message.is_none());

    assert!(store.note_embedding("note:2").await.unwrap().is_none());
    assert!(store.note_embedding("note:4").await.unwrap().is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn store_error_during_enumeration_fails_the_job() {
    let released = Arc::new(AtomicBool::new(false));
    let engine = engine_with(Arc::new(GatedProvider {
        released: released.clone(),
        dim: 4,
    }))
    .await;
    let store = engine.store();

    store
        .upsert_note("note:1", "Note", Some("note body"))
        .await
        .unwrap();

    let request = RebuildRequest {
        mode: RebuildMode::Existing,
        include_sources: false,
        include_notes: true,
        include_insights: false,
    };
    let accepted = engine.submit_rebuild(request).await.unwrap();

    // With the pre-flight check parked, write a value `json_array_length`
    // rejects so the collection query errors once the run is released.
    sqlx::query("UPDATE notes SET embedding = 'not-json' WHERE id = ?")
        .bind("note:1")
        .execute(store.pool())
        .await
        .unwrap();
    released.store(true, Ordering::SeqCst);

    let view = wait_terminal(&engine, &accepted.job_id).await;
    assert_eq!(view.status, JobStatus::Failed);
    assert!(
        view.error_message
            .as_deref()
            .unwrap_or_default()
            .contains("enumeration failed"),
        "error should name the enumeration stage: {:?}",
        view.error_message
    );
    assert_eq!(view.total_items, 0);
    assert_eq!(view.processed_items, 0);
    assert_eq!(view.failed_items, 0);
}

#[tokio::test]
async fn existing_mode_reembeds_notes_with_vectors_only() {
    let engine = engine_with(Arc::new(StaticProvider { dim: 4 })).await;
    let store = engine.store();

    store
        .upsert_note("note:embedded", "Embedded", Some("embedded body"))
        .await
        .unwrap();
    store
        .upsert_note("note:bare", "Bare", Some("bare body"))
        .await
        .unwrap();
    let report = engine.embed_single("note:embedded", ItemKind::Note).await;
    assert!(report.success);

    let request = RebuildRequest {
        mode: RebuildMode::Existing,
        include_sources: false,
        include_notes: true,
        include_insights: false,
    };
    let accepted = engine.submit_rebuild(request).await.unwrap();
    let view = wait_terminal(&engine, &accepted.job_id).await;

    assert_eq!(view.status, JobStatus::Completed);
    assert_eq!(view.total_items, 1);
    assert_eq!(view.notes_processed, 1);
    assert!(store.note_embedding("note:bare").await.unwrap().is_none());
}

#[tokio::test]
async fn each_submission_creates_a_fresh_job() {
    let engine = engine_with(Arc::new(StaticProvider { dim: 4 })).await;
    engine
        .store()
        .upsert_note("note:1", "Note", Some("body"))
        .await
        .unwrap();

    let first = engine
        .submit_rebuild(all_types(RebuildMode::All))
        .await
        .unwrap();
    let first_view = wait_terminal(&engine, &first.job_id).await;

    let second = engine
        .submit_rebuild(all_types(RebuildMode::All))
        .await
        .unwrap();
    let second_view = wait_terminal(&engine, &second.job_id).await;

    assert_ne!(first.job_id, second.job_id);
    assert_eq!(first_view.status, JobStatus::Completed);
    assert_eq!(second_view.status, JobStatus::Completed);
    // The completed first job is still observable after the second run.
    let replay = engine.job_status(&first.job_id).await.unwrap();
    assert_eq!(replay.processed_items, first_view.processed_items);
}
