use crate::error::RagError;
use crate::models::{Chunk, IngestionOptions};

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    /// Maximum whitespace-delimited tokens per chunk.
    pub chunk_size: usize,
    /// Tokens repeated from the end of the previous chunk.
    pub overlap: usize,
}

impl From<IngestionOptions> for ChunkingConfig {
    fn from(value: IngestionOptions) -> Self {
        Self {
            chunk_size: value.chunk_size,
            overlap: value.chunk_overlap,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), RagError> {
        if self.chunk_size == 0 {
            return Err(RagError::Config("chunk_size must be at least 1".to_string()));
        }
        if self.overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Groups whitespace-delimited tokens into passages of at most `chunk_size`
/// tokens, joined by single spaces. Empty or blank input yields no passages.
pub fn chunk_words(text: &str, config: ChunkingConfig) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() || config.chunk_size == 0 {
        return Vec::new();
    }

    let step = config.chunk_size.saturating_sub(config.overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < words.len() {
        let end = (start + config.chunk_size).min(words.len());
        chunks.push(words[start..end].join(" "));
        if end == words.len() {
            break;
        }
        start += step;
    }

    chunks
}

pub fn build_chunks(doc_id: &str, text: &str, options: &IngestionOptions) -> Result<Vec<Chunk>, RagError> {
    let config = ChunkingConfig::from(*options);
    config.validate()?;

    Ok(chunk_words(text, config)
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk {
            doc_id: doc_id.to_string(),
            chunk_index: index as u64,
            text,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(count: usize) -> String {
        (0..count)
            .map(|index| format!("w{index}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn config(chunk_size: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size,
            overlap: 0,
        }
    }

    #[test]
    fn twelve_hundred_words_make_three_chunks() {
        let chunks = chunk_words(&words(1200), config(500));
        let sizes: Vec<usize> = chunks
            .iter()
            .map(|chunk| chunk.split_whitespace().count())
            .collect();
        assert_eq!(sizes, vec![500, 500, 200]);
    }

    #[test]
    fn chunk_count_is_ceiling_and_tokens_are_preserved() {
        for token_count in [1usize, 2, 7, 10, 11, 99, 100, 101] {
            for chunk_size in [1usize, 3, 10, 100] {
                let text = words(token_count);
                let chunks = chunk_words(&text, config(chunk_size));

                assert_eq!(chunks.len(), token_count.div_ceil(chunk_size));
                assert!(chunks
                    .iter()
                    .all(|chunk| chunk.split_whitespace().count() <= chunk_size));

                let rejoined: Vec<&str> = chunks
                    .iter()
                    .flat_map(|chunk| chunk.split_whitespace())
                    .collect();
                let original: Vec<&str> = text.split_whitespace().collect();
                assert_eq!(rejoined, original);
            }
        }
    }

    #[test]
    fn blank_text_yields_no_chunks() {
        assert!(chunk_words("", config(5)).is_empty());
        assert!(chunk_words(" \n\t ", config(5)).is_empty());
    }

    #[test]
    fn overlap_repeats_trailing_tokens() {
        let chunks = chunk_words(
            "a b c d e f g",
            ChunkingConfig {
                chunk_size: 4,
                overlap: 1,
            },
        );
        assert_eq!(chunks, vec!["a b c d", "d e f g"]);
    }

    #[test]
    fn build_chunks_indexes_contiguously() -> Result<(), RagError> {
        let options = IngestionOptions {
            chunk_size: 2,
            chunk_overlap: 0,
        };
        let chunks = build_chunks("doc-1", "one two three four five", &options)?;

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|chunk| chunk.doc_id == "doc-1"));
        let indices: Vec<u64> = chunks.iter().map(|chunk| chunk.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(chunks[2].text, "five");
        Ok(())
    }

    #[test]
    fn invalid_config_is_rejected() {
        let options = IngestionOptions {
            chunk_size: 4,
            chunk_overlap: 4,
        };
        assert!(matches!(
            build_chunks("doc-1", "text", &options),
            Err(RagError::Config(_))
        ));
    }
}
