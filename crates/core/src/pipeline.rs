use crate::chunking::build_chunks;
use crate::embeddings::Embedder;
use crate::extractor::extract_text;
use crate::traits::{AnswerGenerator, VectorIndex};
use crate::{
    Chunk, GenerationOptions, IngestionOptions, MetadataFilter, QueryAnswer, RagError,
    RetrievalOptions, VectorRecord,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Ingest and query over a shared vector index. Cloning is cheap: clones share
/// the same service clients.
#[derive(Clone)]
pub struct RagPipeline {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn AnswerGenerator>,
    ingestion: IngestionOptions,
    retrieval: RetrievalOptions,
    generation: GenerationOptions,
}

impl RagPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn AnswerGenerator>,
    ) -> Self {
        Self {
            embedder,
            index,
            generator,
            ingestion: IngestionOptions::default(),
            retrieval: RetrievalOptions::default(),
            generation: GenerationOptions::default(),
        }
    }

    pub fn with_ingestion_options(mut self, options: IngestionOptions) -> Self {
        self.ingestion = options;
        self
    }

    pub fn with_retrieval_options(mut self, options: RetrievalOptions) -> Self {
        self.retrieval = options;
        self
    }

    pub fn with_generation_options(mut self, options: GenerationOptions) -> Self {
        self.generation = options;
        self
    }

    pub fn retrieval_options(&self) -> &RetrievalOptions {
        &self.retrieval
    }

    /// Creates the shared index sized for this pipeline's embedder, if missing.
    pub async fn ensure_index(&self) -> Result<(), RagError> {
        self.index.ensure_index(self.embedder.dimensions()).await
    }

    /// Removes every vector tagged with `doc_id`.
    pub async fn remove_document_vectors(&self, doc_id: &str) -> Result<(), RagError> {
        self.index.delete(&MetadataFilter::doc_id(doc_id)).await
    }

    pub async fn ingest(&self, path: &Path, doc_id: &str) -> Result<Vec<Chunk>, RagError> {
        let owned = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || extract_text(&owned))
            .await
            .map_err(|error| RagError::Extraction(format!("extraction task failed: {error}")))??;
        debug!(path = %path.display(), characters = text.len(), "extracted text");

        self.ingest_text(&text, doc_id).await
    }

    /// Chunks, embeds in one batch, and upserts one record per chunk.
    pub async fn ingest_text(&self, text: &str, doc_id: &str) -> Result<Vec<Chunk>, RagError> {
        let chunks = build_chunks(doc_id, text, &self.ingestion)?;
        if chunks.is_empty() {
            return Err(RagError::EmptyDocument(doc_id.to_string()));
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(RagError::Embedding(format!(
                "embedding count {} doesn't match chunk count {}",
                embeddings.len(),
                chunks.len()
            )));
        }

        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| VectorRecord {
                id: Uuid::new_v4().to_string(),
                embedding,
                metadata: chunk.into(),
            })
            .collect();

        self.index.upsert(&records).await?;
        info!(doc_id, chunk_count = chunks.len(), "indexed document");
        Ok(chunks)
    }

    pub async fn query(&self, question: &str, doc_id: &str) -> Result<QueryAnswer, RagError> {
        self.query_top_k(question, doc_id, self.retrieval.top_k).await
    }

    pub async fn query_top_k(
        &self,
        question: &str,
        doc_id: &str,
        top_k: usize,
    ) -> Result<QueryAnswer, RagError> {
        if question.trim().is_empty() {
            return Err(RagError::InvalidArgument("question is empty".to_string()));
        }
        if top_k == 0 {
            return Err(RagError::InvalidArgument("top_k must be at least 1".to_string()));
        }

        let query_vector = self.embedder.embed(question).await?;
        let filter = MetadataFilter::doc_id(doc_id);
        let matches = self.index.query(&query_vector, top_k, &filter).await?;

        let retrieved = matches.len();
        let contexts: Vec<String> = matches
            .into_iter()
            .filter(|hit| {
                let owned = filter.matches(&hit.metadata);
                if !owned {
                    warn!(doc_id, foreign = %hit.metadata.doc_id, "index returned a match outside the filter");
                }
                owned
            })
            .filter(|hit| self.retrieval.min_score.map_or(true, |floor| hit.score >= floor))
            // Not every backend honors the search limit.
            .take(top_k)
            .map(|hit| hit.metadata.text)
            .collect();

        debug!(doc_id, retrieved, kept = contexts.len(), "retrieved contexts");
        if contexts.is_empty() {
            return Ok(QueryAnswer::no_content());
        }

        let prompt = build_prompt(question, &contexts);
        let answer = self.generator.generate(&prompt, &self.generation).await?;

        Ok(QueryAnswer {
            answer,
            sources: contexts,
        })
    }
}

pub fn build_prompt(question: &str, contexts: &[String]) -> String {
    let context_block = contexts
        .iter()
        .enumerate()
        .map(|(rank, context)| format!("[Context {}]: {context}", rank + 1))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "You are a helpful AI assistant. Answer the question based ONLY on the context below.\n\n\
         Context:\n{context_block}\n\n\
         Question: {question}\n\n\
         Answer (be specific and cite which context you used):"
    )
}
