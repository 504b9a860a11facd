use crate::extractor::DocumentFormat;
use crate::ingest::digest_bytes;
use crate::registry::{Registry, RegistryRepository};
use crate::{Document, DocumentEntry, QueryAnswer, RagError, RagPipeline};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{info, warn};
use uuid::Uuid;

/// Owns the document registry and the shared vector index.
///
/// Registry mutations are serialized by one lock held across the whole
/// read-modify-write, including the persist call. A document is registered
/// only after its vectors are written, and a failed upload removes whatever it
/// stored before the error is returned.
pub struct DocumentStore {
    pipeline: RagPipeline,
    repository: Arc<dyn RegistryRepository>,
    documents: Mutex<Registry>,
    uploads_dir: PathBuf,
    index_ready: OnceCell<()>,
}

impl DocumentStore {
    pub async fn open(
        pipeline: RagPipeline,
        repository: Arc<dyn RegistryRepository>,
        uploads_dir: impl Into<PathBuf>,
    ) -> Result<Self, RagError> {
        let uploads_dir = uploads_dir.into();
        tokio::fs::create_dir_all(&uploads_dir).await?;
        let documents = repository.load().await?;
        info!(
            uploads_dir = %uploads_dir.display(),
            document_count = documents.len(),
            "document registry loaded"
        );

        Ok(Self {
            pipeline,
            repository,
            documents: Mutex::new(documents),
            uploads_dir,
            index_ready: OnceCell::new(),
        })
    }

    async fn shared_index(&self) -> Result<(), RagError> {
        self.index_ready
            .get_or_try_init(|| async { self.pipeline.ensure_index().await })
            .await
            .map(|_| ())
    }

    pub async fn add_document(&self, filename: &str, bytes: &[u8]) -> Result<Document, RagError> {
        let filename = sanitize_filename(filename)?;
        DocumentFormat::from_path(Path::new(&filename))?;

        let doc_id = Uuid::new_v4().to_string();
        let doc_dir = self.uploads_dir.join(&doc_id);

        match self.ingest_new(&doc_id, &doc_dir, &filename, bytes).await {
            Ok(document) => Ok(document),
            Err(error) => {
                warn!(%doc_id, %filename, %error, "ingest failed, rolling back");
                self.rollback(&doc_id, &doc_dir).await;
                Err(RagError::ingest(filename, error))
            }
        }
    }

    async fn ingest_new(
        &self,
        doc_id: &str,
        doc_dir: &Path,
        filename: &str,
        bytes: &[u8],
    ) -> Result<Document, RagError> {
        tokio::fs::create_dir_all(doc_dir).await?;
        let stored_path = doc_dir.join(filename);
        tokio::fs::write(&stored_path, bytes).await?;

        self.shared_index().await?;
        let chunks = self.pipeline.ingest(&stored_path, doc_id).await?;

        let entry = DocumentEntry {
            filename: filename.to_string(),
            chunk_count: chunks.len(),
            uploaded_at: Some(Utc::now()),
            checksum: Some(digest_bytes(bytes)),
        };

        let mut documents = self.documents.lock().await;
        documents.insert(doc_id.to_string(), entry.clone());
        if let Err(error) = self.repository.save(&documents).await {
            documents.remove(doc_id);
            return Err(error);
        }

        info!(doc_id, filename, chunk_count = entry.chunk_count, "document registered");
        Ok(entry.to_document(doc_id))
    }

    async fn rollback(&self, doc_id: &str, doc_dir: &Path) {
        if self.index_ready.initialized() {
            if let Err(error) = self.pipeline.remove_document_vectors(doc_id).await {
                warn!(doc_id, %error, "failed to remove vectors of rejected document");
            }
        }
        if let Err(error) = remove_dir_if_present(doc_dir).await {
            warn!(doc_id, %error, "failed to remove stored upload");
        }
    }

    pub async fn list_documents(&self) -> Vec<Document> {
        self.documents
            .lock()
            .await
            .iter()
            .map(|(doc_id, entry)| entry.to_document(doc_id))
            .collect()
    }

    pub async fn get_document(&self, doc_id: &str) -> Option<Document> {
        self.documents
            .lock()
            .await
            .get(doc_id)
            .map(|entry| entry.to_document(doc_id))
    }

    pub async fn document_count(&self) -> usize {
        self.documents.lock().await.len()
    }

    /// A pipeline bound to the shared index, for a registered document only.
    pub async fn get_pipeline(&self, doc_id: &str) -> Result<RagPipeline, RagError> {
        if !self.documents.lock().await.contains_key(doc_id) {
            return Err(RagError::DocumentNotFound(doc_id.to_string()));
        }
        self.shared_index().await?;
        Ok(self.pipeline.clone())
    }

    pub async fn query(
        &self,
        question: &str,
        doc_id: &str,
        top_k: Option<usize>,
    ) -> Result<QueryAnswer, RagError> {
        let pipeline = self.get_pipeline(doc_id).await?;
        let top_k = top_k.unwrap_or(pipeline.retrieval_options().top_k);
        pipeline.query_top_k(question, doc_id, top_k).await
    }

    /// Unregisters the document, then removes its vectors and stored file.
    /// Unknown ids are a no-op reported as `false`.
    ///
    /// The registry is persisted before anything else is touched, so a failed
    /// save leaves the document fully intact. Vectors or files left behind by a
    /// later failure are unreachable, since every read goes through the registry.
    pub async fn delete_document(&self, doc_id: &str) -> Result<bool, RagError> {
        let mut documents = self.documents.lock().await;
        let Some(entry) = documents.remove(doc_id) else {
            return Ok(false);
        };
        if let Err(error) = self.repository.save(&documents).await {
            documents.insert(doc_id.to_string(), entry);
            return Err(error);
        }
        drop(documents);

        self.shared_index().await?;
        self.pipeline.remove_document_vectors(doc_id).await?;
        remove_dir_if_present(&self.uploads_dir.join(doc_id)).await?;

        info!(doc_id, "document deleted");
        Ok(true)
    }
}

/// Keeps only the final path component so uploads cannot escape their directory.
fn sanitize_filename(filename: &str) -> Result<String, RagError> {
    Path::new(filename.trim())
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| RagError::InvalidArgument(format!("invalid file name: {filename:?}")))
}

async fn remove_dir_if_present(path: &Path) -> Result<(), RagError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error.into()),
    }
}
