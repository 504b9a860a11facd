use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Answer returned when retrieval finds nothing for the requested document.
pub const NO_CONTENT_ANSWER: &str = "No relevant content found in this document.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub doc_id: String,
    pub filename: String,
    pub chunk_count: usize,
}

/// One registry row as persisted on disk, keyed by `doc_id` in the registry map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentEntry {
    pub filename: String,
    pub chunk_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

impl DocumentEntry {
    pub fn to_document(&self, doc_id: &str) -> Document {
        Document {
            doc_id: doc_id.to_string(),
            filename: self.filename.clone(),
            chunk_count: self.chunk_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub doc_id: String,
    pub chunk_index: u64,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub doc_id: String,
    pub chunk_index: u64,
    pub text: String,
}

impl From<&Chunk> for ChunkMetadata {
    fn from(chunk: &Chunk) -> Self {
        Self {
            doc_id: chunk.doc_id.clone(),
            chunk_index: chunk.chunk_index,
            text: chunk.text.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: ChunkMetadata,
}

/// Equality predicate on `doc_id`, the only filter the pipeline issues.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MetadataFilter {
    pub doc_id: String,
}

impl MetadataFilter {
    pub fn doc_id(doc_id: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
        }
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        metadata.doc_id == self.doc_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryAnswer {
    pub answer: String,
    pub sources: Vec<String>,
}

impl QueryAnswer {
    pub fn no_content() -> Self {
        Self {
            answer: NO_CONTENT_ANSWER.to_string(),
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GenerationOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: 700,
            temperature: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RetrievalOptions {
    pub top_k: usize,
    /// Matches scoring below this are treated as absent.
    pub min_score: Option<f32>,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k: 3,
            min_score: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct IngestionOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 0,
        }
    }
}
