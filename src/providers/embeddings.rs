use futures::{stream, StreamExt};

use crate::providers::EmbeddingProvider;

/// Embeds `texts` with at most `concurrency` requests in flight. The output
/// is index-aligned with the input; a failed embedding becomes `None`.
pub async fn generate_embeddings_with_concurrency(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    concurrency: usize,
) -> Vec<Option<Vec<f32>>> {
    stream::iter(texts.iter().enumerate())
        .map(|(idx, text)| async move {
            match provider.embed(text).await {
                Ok(vector) => Some(vector),
                Err(err) => {
                    tracing::warn!(index = idx, error = %err, "embedding failed, storing finding without vector");
                    None
                }
            }
        })
        .buffered(concurrency.max(1))
        .collect()
        .await
}
