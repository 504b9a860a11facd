use crate::{GenerationOptions, MetadataFilter, RagError, VectorMatch, VectorRecord};
use async_trait::async_trait;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Creates the backing index if it does not exist yet. Calling it against an
    /// existing index with the same dimensionality is a no-op.
    async fn ensure_index(&self, dimensions: usize) -> Result<(), RagError>;

    async fn upsert(&self, records: &[VectorRecord]) -> Result<(), RagError>;

    /// Nearest records to `vector` restricted to `filter`, highest score first.
    async fn query(
        &self,
        vector: &[f32],
        top_k: usize,
        filter: &MetadataFilter,
    ) -> Result<Vec<VectorMatch>, RagError>;

    async fn delete(&self, filter: &MetadataFilter) -> Result<(), RagError>;
}

#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, options: &GenerationOptions) -> Result<String, RagError>;
}
