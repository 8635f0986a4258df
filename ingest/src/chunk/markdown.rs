use super::plain::pack_paragraphs;
use super::{Chunker, char_len};
use regex_lite::Regex;
use std::sync::OnceLock;

/// Header-aware chunking for Markdown.
///
/// A new chunk starts at a header of the same or a higher level than the
/// one that opened the current chunk, and at every `#` header. A chunk that
/// grows past `max_chars` is closed after the line that crossed the limit.
/// Text without any header is packed by paragraph instead.
pub struct MarkdownChunker {
    max_chars: usize,
    fallback_chars: usize,
}

impl MarkdownChunker {
    pub fn new(max_chars: usize, fallback_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
            fallback_chars: fallback_chars.max(1),
        }
    }
}

fn header_regex() -> Option<&'static Regex> {
    static HEADER: OnceLock<Option<Regex>> = OnceLock::new();
    HEADER
        .get_or_init(|| Regex::new(r"^(#{1,6})\s+(\S.*)$").ok())
        .as_ref()
}

/// Level and text of a Markdown ATX header line.
pub(crate) fn header(line: &str) -> Option<(usize, &str)> {
    let caps = header_regex()?.captures(line.trim_end())?;
    let level = caps.get(1)?.as_str().len();
    let text = caps.get(2)?.as_str().trim();
    Some((level, text))
}

pub(crate) fn first_header(text: &str) -> Option<String> {
    text.lines()
        .find_map(|line| header(line.trim_start()))
        .map(|(_, title)| title.trim_end_matches('#').trim().to_string())
        .filter(|title| !title.is_empty())
}

impl Chunker for MarkdownChunker {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn split(&self, text: &str) -> Vec<String> {
        if !text.lines().any(|line| header(line).is_some()) {
            return pack_paragraphs(text, self.fallback_chars);
        }

        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_level = 0usize;
        let mut flush = |current: &mut String| {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                chunks.push(trimmed.to_string());
            }
            current.clear();
        };

        for line in text.lines() {
            match header(line) {
                Some((level, _)) => {
                    let has_body = !current.trim().is_empty();
                    if has_body && (level <= current_level || level == 1) {
                        flush(&mut current);
                        current_level = level;
                    } else if current_level == 0 {
                        current_level = level;
                    }
                    current.push_str(line);
                    current.push('\n');
                }
                None => {
                    current.push_str(line);
                    current.push('\n');
                    if char_len(&current) > self.max_chars {
                        flush(&mut current);
                        current_level = 0;
                    }
                }
            }
        }
        flush(&mut current);
        chunks
    }
}
