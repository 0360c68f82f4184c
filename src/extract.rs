//! Document-text-extraction boundary.
//!
//! The real extraction pipeline (PDF, slides, word formats) lives outside
//! this crate; the engine only composes with it through
//! [`DocumentExtractor`]. The bundled [`PlainTextExtractor`] covers
//! plain-text artifacts so the composition works standalone.

use std::path::Path;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ExtractError;

/// Extracted text plus chunk boundaries.
#[derive(Debug, Clone, Serialize)]
pub struct Extraction {
    pub text: String,
    pub chunks: Vec<String>,
}

/// Boundary to the document-text-extraction service: given a resolved
/// file path, return extracted text and its chunking.
#[async_trait]
pub trait DocumentExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<Extraction, ExtractError>;
}

/// Extractor for plain-text artifact types.
#[derive(Debug, Clone)]
pub struct PlainTextExtractor {
    /// Upper bound on characters per chunk.
    chunk_size: usize,
}

impl PlainTextExtractor {
    pub fn new() -> Self {
        Self { chunk_size: 2000 }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl Default for PlainTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentExtractor for PlainTextExtractor {
    async fn extract(&self, path: &Path) -> Result<Extraction, ExtractError> {
        let kind = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !matches!(kind.as_str(), "txt" | "md" | "csv" | "log") {
            return Err(ExtractError::Unsupported {
                path: path.display().to_string(),
            });
        }

        let text = tokio::fs::read_to_string(path).await?;
        let chunks = chunk_text(&text, self.chunk_size);
        Ok(Extraction { text, chunks })
    }
}

/// Pack paragraphs into chunks of at most `size` characters; paragraphs
/// longer than `size` are hard-split.
fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for paragraph in text.split("\n\n").filter(|p| !p.trim().is_empty()) {
        for piece in split_long(paragraph, size) {
            if current.is_empty() {
                current = piece.to_string();
            } else if current.chars().count() + piece.chars().count() + 2 <= size {
                current.push_str("\n\n");
                current.push_str(piece);
            } else {
                chunks.push(std::mem::take(&mut current));
                current = piece.to_string();
            }
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn split_long(paragraph: &str, size: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = paragraph;
    while rest.chars().count() > size {
        let split_at = rest
            .char_indices()
            .nth(size)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let (head, tail) = rest.split_at(split_at);
        pieces.push(head);
        rest = tail;
    }
    pieces.push(rest);
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn extracts_text_with_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "first paragraph\n\nsecond paragraph").unwrap();

        let extraction = PlainTextExtractor::new().extract(&path).await.unwrap();
        assert!(extraction.text.contains("second paragraph"));
        assert_eq!(extraction.chunks.len(), 1);
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deck.pptx");
        std::fs::write(&path, b"binary").unwrap();

        let err = PlainTextExtractor::new().extract(&path).await.unwrap_err();
        assert!(matches!(err, ExtractError::Unsupported { .. }));
    }

    #[test]
    fn chunking_packs_paragraphs() {
        let text = "aaaa\n\nbbbb\n\ncccc";
        let chunks = chunk_text(text, 12);
        assert_eq!(chunks, vec!["aaaa\n\nbbbb".to_string(), "cccc".to_string()]);
    }

    #[test]
    fn long_paragraphs_are_hard_split() {
        let text = "x".repeat(25);
        let chunks = chunk_text(&text, 10);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.chars().count() <= 10));
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(chunk_text("", 100).is_empty());
        assert!(chunk_text("\n\n\n\n", 100).is_empty());
    }
}
