//! Per-item embedding: fetch, embed, persist, one item at a time.
//!
//! Every function here is atomic with respect to its item: either the new
//! vectors fully replace the old ones, or the stored state is untouched.
//! A returned error is scoped to that one item.

use tracing::info;

use crate::chunker::chunk_text;
use crate::errors::{EmbedError, EmbedResult};
use crate::provider::EmbeddingProvider;
use crate::storage::ContentStore;
use inkling_core::EmbedSettings;

/// Re-embed one source: chunk its full text, embed every chunk, and replace
/// the prior chunk set in a single transaction. Returns the chunk count.
pub async fn embed_source(
    store: &ContentStore,
    provider: &dyn EmbeddingProvider,
    settings: &EmbedSettings,
    id: &str,
) -> EmbedResult<usize> {
    let source = store
        .get_source(id)
        .await?
        .ok_or_else(|| EmbedError::NotFound(id.to_string()))?;

    let text = source.full_text.unwrap_or_default();
    let chunks = chunk_text(&text);
    if chunks.is_empty() {
        // A source with no embeddable text ends up with an empty chunk set.
        store.replace_source_chunks(id, &[], &[]).await?;
        return Ok(0);
    }

    let inputs = chunks
        .iter()
        .map(|chunk| chunk.content.clone())
        .collect::<Vec<_>>();
    let vectors = embed_in_batches(provider, settings, &inputs).await?;

    store.ensure_vec_table_dim(vectors[0].len()).await?;
    let written = store.replace_source_chunks(id, &chunks, &vectors).await?;

    info!("source {id} vectorized: {written} chunks");
    Ok(written)
}

/// Re-embed one note's body, overwriting any prior vector.
pub async fn embed_note(
    store: &ContentStore,
    provider: &dyn EmbeddingProvider,
    settings: &EmbedSettings,
    id: &str,
) -> EmbedResult<()> {
    let note = store
        .get_note(id)
        .await?
        .ok_or_else(|| EmbedError::NotFound(id.to_string()))?;

    let content = note
        .content
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| EmbedError::EmptyContent(id.to_string()))?;

    let vectors = embed_in_batches(provider, settings, std::slice::from_ref(&content)).await?;
    store.write_note_embedding(id, &vectors[0]).await?;

    info!("note {id} embedded");
    Ok(())
}

/// Re-embed one insight's content, overwriting any prior vector.
pub async fn embed_insight(
    store: &ContentStore,
    provider: &dyn EmbeddingProvider,
    settings: &EmbedSettings,
    id: &str,
) -> EmbedResult<()> {
    let insight = store
        .get_insight(id)
        .await?
        .ok_or_else(|| EmbedError::NotFound(id.to_string()))?;

    if insight.content.trim().is_empty() {
        return Err(EmbedError::EmptyContent(id.to_string()));
    }

    let vectors =
        embed_in_batches(provider, settings, std::slice::from_ref(&insight.content)).await?;
    store.write_insight_embedding(id, &vectors[0]).await?;

    info!("insight {id} embedded");
    Ok(())
}

/// Drive the provider in batches of `embedding_batch`, checking that every
/// input comes back with a vector of a consistent dimension.
async fn embed_in_batches(
    provider: &dyn EmbeddingProvider,
    settings: &EmbedSettings,
    inputs: &[String],
) -> EmbedResult<Vec<Vec<f32>>> {
    let batch_size = settings.embedding_batch.max(1);
    let mut vectors = Vec::with_capacity(inputs.len());

    let mut offset = 0;
    while offset < inputs.len() {
        let end = (offset + batch_size).min(inputs.len());
        let batch = provider.embed_batch(&inputs[offset..end]).await?;

        if batch.len() != end - offset {
            return Err(EmbedError::Embedding(format!(
                "provider returned {} vectors for {} inputs",
                batch.len(),
                end - offset
            )));
        }

        for vector in batch {
            if vector.is_empty() {
                return Err(EmbedError::Embedding("provider returned empty vector".to_string()));
            }
            if let Some(expected) = settings.embedding_dim
                && expected != vector.len()
            {
                return Err(EmbedError::EmbeddingDimMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            if let Some(first) = vectors.first().map(|v: &Vec<f32>| v.len())
                && first != vector.len()
            {
                return Err(EmbedError::EmbeddingDimMismatch {
                    expected: first,
                    actual: vector.len(),
                });
            }
            vectors.push(vector);
        }

        offset = end;
    }

    Ok(vectors)
}
