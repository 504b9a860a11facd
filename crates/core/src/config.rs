//! Service configuration.
//!
//! Layers, lowest to highest: built-in defaults, an optional TOML file,
//! `GROQ_API_KEY` as the generation key, then `RAG_`-prefixed environment
//! variables using `__` between section and field (`RAG_INDEX__URL`).

use crate::embeddings::{CharacterNgramEmbedder, Embedder, HttpEmbedder};
use crate::generator::{ChatCompletionsGenerator, DEFAULT_GENERATION_MODEL, DEFAULT_GENERATION_URL};
use crate::registry::{InMemoryRegistry, JsonFileRegistry, RegistryRepository};
use crate::stores::{InMemoryVectorIndex, QdrantStore};
use crate::traits::{AnswerGenerator, VectorIndex};
use crate::{DocumentStore, GenerationOptions, IngestionOptions, RagError, RagPipeline, RetrievalOptions};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub generation: GenerationConfig,
    pub ingestion: IngestionOptions,
    pub retrieval: RetrievalOptions,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RegistryBackend {
    Json,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    pub uploads_dir: PathBuf,
    pub registry_file: PathBuf,
    pub registry: RegistryBackend,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_dir: PathBuf::from("uploads"),
            registry_file: PathBuf::from("uploads/documents.json"),
            registry: RegistryBackend::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    Http,
    Ngram,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub dimensions: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Http,
            base_url: "http://localhost:8080/v1".to_string(),
            model: "BAAI/bge-small-en-v1.5".to_string(),
            api_key: None,
            dimensions: 384,
        }
    }
}

impl EmbeddingConfig {
    fn build(&self) -> Arc<dyn Embedder> {
        match self.backend {
            EmbeddingBackend::Http => Arc::new(HttpEmbedder::new(
                &self.base_url,
                &self.model,
                self.api_key.clone(),
                self.dimensions,
            )),
            EmbeddingBackend::Ngram => Arc::new(CharacterNgramEmbedder::new(self.dimensions)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Qdrant,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IndexConfig {
    pub backend: IndexBackend,
    pub url: String,
    pub collection: String,
    pub api_key: Option<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: IndexBackend::Qdrant,
            url: "http://localhost:6333".to_string(),
            collection: "rag-documents".to_string(),
            api_key: None,
        }
    }
}

impl IndexConfig {
    fn build(&self) -> Arc<dyn VectorIndex> {
        match self.backend {
            IndexBackend::Qdrant => Arc::new(
                QdrantStore::new(&self.url, &self.collection).with_api_key(self.api_key.clone()),
            ),
            IndexBackend::Memory => Arc::new(InMemoryVectorIndex::new()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let options = GenerationOptions::default();
        Self {
            base_url: DEFAULT_GENERATION_URL.to_string(),
            model: DEFAULT_GENERATION_MODEL.to_string(),
            api_key: None,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        }
    }
}

impl GenerationConfig {
    pub fn options(&self) -> GenerationOptions {
        GenerationOptions {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }

    fn build(&self) -> Arc<dyn AnswerGenerator> {
        Arc::new(ChatCompletionsGenerator::new(
            &self.base_url,
            &self.model,
            self.api_key.clone(),
        ))
    }
}

impl RagConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, RagError> {
        let mut figment = Figment::from(Serialized::defaults(RagConfig::default()));
        if let Some(path) = path {
            if !path.exists() {
                return Err(RagError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }
        figment = figment
            .merge(
                Env::raw()
                    .only(&["GROQ_API_KEY"])
                    .map(|_| "generation.api_key".into()),
            )
            .merge(Env::prefixed("RAG_").split("__"));

        let config: RagConfig = figment
            .extract()
            .map_err(|error| RagError::Config(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RagError> {
        crate::chunking::ChunkingConfig::from(self.ingestion).validate()?;

        if self.embedding.dimensions == 0 {
            return Err(RagError::Config("embedding.dimensions must be at least 1".to_string()));
        }
        if self.retrieval.top_k == 0 {
            return Err(RagError::Config("retrieval.top_k must be at least 1".to_string()));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(RagError::Config(format!(
                "generation.temperature {} is outside 0..=2",
                self.generation.temperature
            )));
        }
        if self.generation.max_tokens == 0 {
            return Err(RagError::Config("generation.max_tokens must be at least 1".to_string()));
        }

        if self.embedding.backend == EmbeddingBackend::Http {
            Url::parse(&self.embedding.base_url)?;
        }
        if self.index.backend == IndexBackend::Qdrant {
            Url::parse(&self.index.url)?;
        }
        Url::parse(&self.generation.base_url)?;
        Ok(())
    }

    pub fn build_pipeline(&self) -> RagPipeline {
        RagPipeline::new(
            self.embedding.build(),
            self.index.build(),
            self.generation.build(),
        )
        .with_ingestion_options(self.ingestion)
        .with_retrieval_options(self.retrieval)
        .with_generation_options(self.generation.options())
    }

    /// Builds every service client once and opens the document store over them.
    pub async fn open_store(&self) -> Result<DocumentStore, RagError> {
        self.validate()?;

        let repository: Arc<dyn RegistryRepository> = match self.storage.registry {
            RegistryBackend::Json => Arc::new(JsonFileRegistry::new(&self.storage.registry_file)),
            RegistryBackend::Memory => Arc::new(InMemoryRegistry::default()),
        };

        DocumentStore::open(self.build_pipeline(), repository, &self.storage.uploads_dir).await
    }
}
