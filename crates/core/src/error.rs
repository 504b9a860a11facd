use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("unsupported file type: {0}")]
    InvalidFileType(String),

    #[error("text extraction failed: {0}")]
    Extraction(String),

    #[error("document has no extractable text: {0}")]
    EmptyDocument(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("vector index error from {backend}: {details}")]
    Index { backend: String, details: String },

    #[error("answer generation failed: {0}")]
    Generation(String),

    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("ingest of {filename} failed: {source}")]
    Ingest {
        filename: String,
        #[source]
        source: Box<RagError>,
    },

    #[error("registry error: {0}")]
    Registry(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

/// Coarse classification used by transport layers to pick a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidInput,
    Internal,
}

impl RagError {
    pub fn index(backend: impl Into<String>, details: impl ToString) -> Self {
        Self::Index {
            backend: backend.into(),
            details: details.to_string(),
        }
    }

    pub fn ingest(filename: impl Into<String>, source: RagError) -> Self {
        Self::Ingest {
            filename: filename.into(),
            source: Box::new(source),
        }
    }

    /// The innermost error once ingest wrappers are peeled off.
    pub fn root_cause(&self) -> &RagError {
        match self {
            Self::Ingest { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.root_cause() {
            Self::DocumentNotFound(_) => ErrorKind::NotFound,
            Self::InvalidFileType(_) | Self::InvalidArgument(_) => ErrorKind::InvalidInput,
            _ => ErrorKind::Internal,
        }
    }
}
