use crate::traits::VectorIndex;
use crate::{MetadataFilter, RagError, VectorMatch, VectorRecord};
use async_trait::async_trait;
use tokio::sync::RwLock;

const BACKEND: &str = "memory";

/// Brute-force cosine index kept in process memory. Records keep insertion
/// order, so equal scores rank in the order they were written.
#[derive(Default)]
pub struct InMemoryVectorIndex {
    state: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    dimensions: Option<usize>,
    records: Vec<VectorRecord>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_created(&self) -> bool {
        self.state.read().await.dimensions.is_some()
    }

    pub async fn count(&self, filter: Option<&MetadataFilter>) -> usize {
        let state = self.state.read().await;
        match filter {
            Some(filter) => state
                .records
                .iter()
                .filter(|record| filter.matches(&record.metadata))
                .count(),
            None => state.records.len(),
        }
    }
}

fn require_dimensions(state: &MemoryState) -> Result<usize, RagError> {
    state
        .dimensions
        .ok_or_else(|| RagError::index(BACKEND, "index has not been created"))
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn ensure_index(&self, dimensions: usize) -> Result<(), RagError> {
        let mut state = self.state.write().await;
        match state.dimensions {
            Some(existing) if existing != dimensions => Err(RagError::index(
                BACKEND,
                format!("index has dimension {existing}, requested {dimensions}"),
            )),
            Some(_) => Ok(()),
            None => {
                state.dimensions = Some(dimensions);
                Ok(())
            }
        }
    }

    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), RagError> {
        let mut state = self.state.write().await;
        let dimensions = require_dimensions(&state)?;

        if let Some(bad) = records
            .iter()
            .find(|record| record.embedding.len() != dimensions)
        {
            return Err(RagError::index(
                BACKEND,
                format!(
                    "record {} has dimension {}, index expects {dimensions}",
                    bad.id,
                    bad.embedding.len()
                ),
            ));
        }

        for record in records {
            match state.records.iter().position(|existing| existing.id == record.id) {
                Some(position) => state.records[position] = record.clone(),
                None => state.records.push(record.clone()),
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<VectorMatch>, RagError> {
        let state = self.state.read().await;
        let dimensions = require_dimensions(&state)?;
        if vector.len() != dimensions {
            return Err(RagError::index(
                BACKEND,
                format!("query vector dim {} is not {dimensions}", vector.len()),
            ));
        }

        let mut matches: Vec<VectorMatch> = state
            .records
            .iter()
            .filter(|record| filter.matches(&record.metadata))
            .map(|record| VectorMatch {
                id: record.id.clone(),
                score: cosine_similarity(vector, &record.embedding),
                metadata: record.metadata.clone(),
            })
            .collect();

        // Stable sort keeps insertion order among ties.
        matches.sort_by(|left, right| right.score.total_cmp(&left.score));
        matches.truncate(top_k);
        Ok(matches)
    }

    async fn delete(&self, filter: &MetadataFilter) -> Result<(), RagError> {
        let mut state = self.state.write().await;
        state.records.retain(|record| !filter.matches(&record.metadata));
        Ok(())
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();
    let denom = left_norm * right_norm;
    if denom <= f32::EPSILON {
        return 0.0;
    }
    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ChunkMetadata;

    fn record(id: &str, doc_id: &str, embedding: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            embedding,
            metadata: ChunkMetadata {
                doc_id: doc_id.to_string(),
                chunk_index: 0,
                text: format!("text of {id}"),
            },
        }
    }

    #[tokio::test]
    async fn ensure_index_is_idempotent() -> Result<(), RagError> {
        let index = InMemoryVectorIndex::new();
        assert!(!index.is_created().await);
        index.ensure_index(2).await?;
        index.ensure_index(2).await?;
        assert!(index.is_created().await);
        assert!(index.ensure_index(3).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn query_respects_doc_filter_and_ranking() -> Result<(), RagError> {
        let index = InMemoryVectorIndex::new();
        index.ensure_index(2).await?;
        index
            .upsert(&[
                record("a1", "doc-a", vec![1.0, 0.0]),
                record("b1", "doc-b", vec![1.0, 0.0]),
                record("a2", "doc-a", vec![0.6, 0.8]),
            ])
            .await?;

        let matches = index
            .query(&[1.0, 0.0], 5, &MetadataFilter::doc_id("doc-a"))
            .await?;

        let ids: Vec<&str> = matches.iter().map(|hit| hit.id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2"]);
        assert!(matches[0].score > matches[1].score);
        Ok(())
    }

    #[tokio::test]
    async fn ties_keep_insertion_order() -> Result<(), RagError> {
        let index = InMemoryVectorIndex::new();
        index.ensure_index(2).await?;
        index
            .upsert(&[
                record("first", "doc-a", vec![0.0, 1.0]),
                record("second", "doc-a", vec![0.0, 2.0]),
            ])
            .await?;

        let matches = index
            .query(&[0.0, 1.0], 2, &MetadataFilter::doc_id("doc-a"))
            .await?;
        assert_eq!(matches[0].id, "first");
        assert_eq!(matches[1].id, "second");
        Ok(())
    }

    #[tokio::test]
    async fn delete_removes_only_matching_doc() -> Result<(), RagError> {
        let index = InMemoryVectorIndex::new();
        index.ensure_index(2).await?;
        index
            .upsert(&[
                record("a1", "doc-a", vec![1.0, 0.0]),
                record("b1", "doc-b", vec![0.0, 1.0]),
            ])
            .await?;

        index.delete(&MetadataFilter::doc_id("doc-a")).await?;

        assert_eq!(index.count(Some(&MetadataFilter::doc_id("doc-a"))).await, 0);
        assert_eq!(index.count(Some(&MetadataFilter::doc_id("doc-b"))).await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn upsert_before_create_fails() {
        let index = InMemoryVectorIndex::new();
        let result = index.upsert(&[record("a1", "doc-a", vec![1.0])]).await;
        assert!(matches!(result, Err(RagError::Index { .. })));
    }

    #[test]
    fn zero_vectors_have_zero_similarity() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }
}
