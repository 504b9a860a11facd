pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generator;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod store;
pub mod stores;
pub mod traits;

pub use chunking::{build_chunks, chunk_words, ChunkingConfig};
pub use config::RagConfig;
pub use embeddings::{CharacterNgramEmbedder, Embedder, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{ErrorKind, RagError};
pub use extractor::{extract_text, DocumentFormat, TextExtractor};
pub use generator::ChatCompletionsGenerator;
pub use ingest::{discover_documents, ingest_path, IngestionReport, SkippedFile};
pub use models::{
    Chunk, ChunkMetadata, Document, DocumentEntry, GenerationOptions, IngestionOptions,
    MetadataFilter, QueryAnswer, RetrievalOptions, VectorMatch, VectorRecord, NO_CONTENT_ANSWER,
};
pub use pipeline::{build_prompt, RagPipeline};
pub use registry::{InMemoryRegistry, JsonFileRegistry, Registry, RegistryRepository};
pub use store::DocumentStore;
pub use stores::{InMemoryVectorIndex, QdrantStore};
pub use traits::{AnswerGenerator, VectorIndex};
