//! Chunkers
//!
//! A chunker splits a document's text into ordered pieces. The registry
//! picks one by file extension and falls back to the plain-text chunker.

mod markdown;
mod plain;
mod python;

pub use markdown::MarkdownChunker;
pub use plain::PlainChunker;
pub use python::PythonChunker;

use crate::config::IngestConfig;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// One piece of a document, ready to be stored as a chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub title: Option<String>,
    pub text: String,
}

pub trait Chunker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Raw pieces in document order. May contain blank pieces; callers use
    /// [`Chunker::chunk`].
    fn split(&self, text: &str) -> Vec<String>;

    /// Title shown for a piece. Defaults to its first Markdown header.
    fn title(&self, piece: &str) -> Option<String> {
        markdown::first_header(piece)
    }

    fn chunk(&self, text: &str) -> Vec<TextChunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        self.split(text)
            .into_iter()
            .filter(|piece| !piece.trim().is_empty())
            .map(|text| TextChunk {
                title: self.title(&text),
                text,
            })
            .collect()
    }
}

/// Chunkers keyed by lower-case file extension (without the dot).
pub struct ChunkerRegistry {
    by_extension: HashMap<String, Arc<dyn Chunker>>,
    fallback: Arc<dyn Chunker>,
}

impl ChunkerRegistry {
    pub fn new(fallback: Arc<dyn Chunker>) -> Self {
        Self {
            by_extension: HashMap::new(),
            fallback,
        }
    }

    /// Plain text for unknown types, Markdown for `.md`/`.markdown`,
    /// Python for `.py`.
    pub fn with_defaults(config: &IngestConfig) -> Self {
        let mut registry = Self::new(Arc::new(PlainChunker::new(config.chunk_size)));
        registry.register(
            &["md", "markdown"],
            Arc::new(MarkdownChunker::new(
                config.markdown_max_chunk,
                config.chunk_size,
            )),
        );
        registry.register(&["py"], Arc::new(PythonChunker::new(config.chunk_size)));
        registry
    }

    pub fn register(&mut self, extensions: &[&str], chunker: Arc<dyn Chunker>) {
        for extension in extensions {
            self.by_extension.insert(
                extension.trim_start_matches('.').to_ascii_lowercase(),
                Arc::clone(&chunker),
            );
        }
    }

    pub fn for_filename(&self, filename: &str) -> &dyn Chunker {
        extension(filename)
            .and_then(|ext| self.by_extension.get(&ext))
            .unwrap_or(&self.fallback)
            .as_ref()
    }

    pub fn chunk(&self, filename: &str, text: &str) -> Vec<TextChunk> {
        self.for_filename(filename).chunk(text)
    }
}

fn extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

pub(crate) fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split `text` into pieces of at most `max` characters.
pub(crate) fn split_chars(text: &str, max: usize) -> Vec<&str> {
    let max = max.max(1);
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (index, _) in text.char_indices() {
        if count == max {
            pieces.push(&text[start..index]);
            start = index;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

/// Accumulates text into chunks of bounded size.
pub(crate) struct Packer {
    max: usize,
    current: String,
    current_chars: usize,
    out: Vec<String>,
}

impl Packer {
    pub(crate) fn new(max: usize) -> Self {
        Self {
            max: max.max(1),
            current: String::new(),
            current_chars: 0,
            out: Vec::new(),
        }
    }

    pub(crate) fn fits(&self, text: &str) -> bool {
        self.current_chars + char_len(text) <= self.max
    }

    pub(crate) fn push(&mut self, text: &str) {
        self.current.push_str(text);
        self.current_chars += char_len(text);
    }

    pub(crate) fn flush(&mut self) {
        let trimmed = self.current.trim();
        if !trimmed.is_empty() {
            self.out.push(trimmed.to_string());
        }
        self.current.clear();
        self.current_chars = 0;
    }

    /// Emit `text` as hard-split pieces of the maximum size.
    pub(crate) fn push_oversized(&mut self, text: &str) {
        self.flush();
        for piece in split_chars(text, self.max) {
            self.push(piece);
            self.flush();
        }
    }

    pub(crate) fn finish(mut self) -> Vec<String> {
        self.flush();
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn registry_picks_by_extension() {
        let registry = ChunkerRegistry::with_defaults(&IngestConfig::default());
        assert_eq!(registry.for_filename("notes.md").name(), "markdown");
        assert_eq!(registry.for_filename("NOTES.Markdown").name(), "markdown");
        assert_eq!(registry.for_filename("tool.py").name(), "python");
        assert_eq!(registry.for_filename("report.txt").name(), "plain");
        assert_eq!(registry.for_filename("README").name(), "plain");
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let registry = ChunkerRegistry::with_defaults(&IngestConfig::default());
        for name in ["a.md", "a.py", "a.txt"] {
            assert!(registry.chunk(name, "  \n\n ").is_empty(), "{name}");
        }
    }

    #[test]
    fn split_chars_respects_char_boundaries() {
        assert_eq!(split_chars("ééééé", 2), vec!["éé", "éé", "é"]);
        assert_eq!(split_chars("abc", 5), vec!["abc"]);
        assert!(split_chars("", 3).is_empty());
    }

    #[test]
    fn titles_come_from_the_first_header() {
        let chunker = PlainChunker::new(2000);
        let chunks = chunker.chunk("intro text\n\n## Budget\n\nnumbers");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].title.as_deref(), Some("Budget"));
        assert_eq!(chunker.chunk("no headers here")[0].title, None);
    }
}
