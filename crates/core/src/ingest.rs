use crate::extractor::DocumentFormat;
use crate::{Document, DocumentStore, RagError};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Recursively lists files with a supported document extension, sorted.
pub fn discover_documents(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if entry.file_type().is_file() && DocumentFormat::is_supported(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

pub struct IngestionReport {
    pub added: Vec<Document>,
    pub skipped_files: Vec<SkippedFile>,
}

/// Uploads one file, or every supported file under a folder. Per-file
/// failures are collected in the report instead of aborting the run.
pub async fn ingest_path(store: &DocumentStore, path: &Path) -> Result<IngestionReport, RagError> {
    let files = if path.is_dir() {
        discover_documents(path)
    } else {
        vec![path.to_path_buf()]
    };

    if files.is_empty() {
        return Err(RagError::InvalidArgument(format!(
            "no supported documents found in {}",
            path.display()
        )));
    }

    let mut added = Vec::new();
    let mut skipped_files = Vec::new();

    for file in files {
        match add_file(store, &file).await {
            Ok(document) => added.push(document),
            Err(error) => {
                warn!(path = %file.display(), %error, "skipped document");
                skipped_files.push(SkippedFile {
                    path: file,
                    reason: error.to_string(),
                })
            }
        }
    }

    Ok(IngestionReport {
        added,
        skipped_files,
    })
}

async fn add_file(store: &DocumentStore, path: &Path) -> Result<Document, RagError> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| RagError::InvalidArgument(format!("path has no file name: {}", path.display())))?;
    let bytes = tokio::fs::read(path).await?;
    store.add_document(filename, &bytes).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn discovery_is_recursive_and_filters_extensions() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        fs::write(base.join("a.pdf"), b"%PDF-1.4\n%fake")?;
        fs::write(nested.join("b.txt"), b"text")?;
        fs::write(nested.join("c.png"), b"image")?;

        let files = discover_documents(base);
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|file| DocumentFormat::is_supported(file)));
        Ok(())
    }

    #[test]
    fn checksum_is_reproducible() {
        assert_eq!(digest_bytes(b"abc"), digest_bytes(b"abc"));
        assert_ne!(digest_bytes(b"abc"), digest_bytes(b"abd"));
    }
}
