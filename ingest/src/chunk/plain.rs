use super::{Chunker, Packer, char_len};

/// Paragraphs packed up to `max_chars`; long paragraphs split at sentence
/// boundaries, long sentences split hard.
pub struct PlainChunker {
    max_chars: usize,
}

impl PlainChunker {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }
}

impl Chunker for PlainChunker {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn split(&self, text: &str) -> Vec<String> {
        pack_paragraphs(text, self.max_chars)
    }
}

pub(crate) fn pack_paragraphs(text: &str, max: usize) -> Vec<String> {
    let mut packer = Packer::new(max);
    for paragraph in text.split("\n\n") {
        if packer.fits(paragraph) {
            packer.push(paragraph);
            packer.push("\n\n");
            continue;
        }
        packer.flush();
        if char_len(paragraph) <= max {
            packer.push(paragraph);
            packer.push("\n\n");
            continue;
        }

        for sentence in paragraph.split_inclusive(". ") {
            if !packer.fits(sentence) {
                packer.flush();
            }
            if char_len(sentence) > max {
                packer.push_oversized(sentence);
            } else {
                packer.push(sentence);
            }
        }
        packer.push("\n\n");
    }
    packer.finish()
}
