//! Prompt builders for the chat-backed capability
//!
//! Candidates are labelled `[1]..[n]` so the model can answer with short
//! ids; [`crate::parse::resolve_id`] maps the labels back.

use crate::capability::{ChunkCandidate, DirectoryCandidate, DocumentCandidate, RankCandidate};
use std::fmt::Write as _;

const SCORING_RULES: &str = r#"Rules:
- Score every candidate exactly once, using its label as "id".
- Scores are numbers between 0.0 and 1.0 (1.0 = certainly relevant).
- Judge only from the text shown; do not invent candidates.
- Answer with the JSON array inside a ```json fence and nothing else."#;

/// Keep prompts bounded when evidence is long.
fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(max_chars).collect();
    clipped.push('…');
    clipped
}

pub fn analyze_directories_prompt(query: &str, candidates: &[DirectoryCandidate]) -> String {
    let mut listing = String::new();
    for (index, dir) in candidates.iter().enumerate() {
        let _ = writeln!(
            listing,
            "[{}] {} ({}): {}",
            index + 1,
            dir.path,
            dir.name,
            clip(&dir.summary, 600)
        );
    }

    format!(
        r#"You are navigating a hierarchy of directories to find information for a query.

QUERY: "{query}"

Candidate directories:
{listing}
For each directory, judge how likely it is to contain information that answers the query,
and whether it is worth looking inside its subdirectories.

Respond in this format:
```json
[
  {{"id": 1, "relevance": 0.85, "should_expand": true, "reasoning": "short explanation"}}
]
```

{SCORING_RULES}
- "should_expand" is false when the directory itself is the right place to look."#
    )
}

pub fn select_documents_prompt(query: &str, candidates: &[DocumentCandidate]) -> String {
    let mut listing = String::new();
    for (index, doc) in candidates.iter().enumerate() {
        let _ = writeln!(
            listing,
            "[{}] {} (v{}, in {}): {}",
            index + 1,
            doc.name,
            doc.version,
            doc.directory_path,
            clip(&doc.summary, 800)
        );
    }

    format!(
        r#"You are selecting documents that may answer a query.

QUERY: "{query}"

Candidate documents:
{listing}
Respond in this format:
```json
[
  {{"id": 1, "relevance": 0.7, "reasoning": "short explanation"}}
]
```

{SCORING_RULES}"#
    )
}

pub fn identify_chunks_prompt(query: &str, candidates: &[ChunkCandidate]) -> String {
    let mut listing = String::new();
    for (index, chunk) in candidates.iter().enumerate() {
        let title = chunk.title.as_deref().unwrap_or("untitled");
        let _ = writeln!(
            listing,
            "[{}] {} #{} \"{}\":\n{}\n",
            index + 1,
            chunk.document_name,
            chunk.ordinal,
            title,
            clip(&chunk.evidence, 1_500)
        );
    }

    format!(
        r#"You are identifying the passages of a document that answer a query.

QUERY: "{query}"

Candidate chunks:
{listing}
Respond in this format:
```json
[
  {{"id": 1, "relevance": 0.9, "matched_span": "quoted phrase that answers the query", "reasoning": "short explanation"}}
]
```

{SCORING_RULES}
- "matched_span" is optional; quote at most one sentence."#
    )
}

pub fn rank_and_explain_prompt(query: &str, candidates: &[RankCandidate]) -> String {
    let mut listing = String::new();
    for (index, chunk) in candidates.iter().enumerate() {
        let title = chunk.title.as_deref().unwrap_or("untitled");
        let _ = writeln!(
            listing,
            "[{}] {} / {} \"{}\"",
            index + 1,
            chunk.directory_path,
            chunk.document_name,
            title
        );
        if let Some(summary) = &chunk.summary {
            let _ = writeln!(listing, "Summary: {}", clip(summary, 600));
        }
        if let Some(content) = &chunk.content {
            let _ = writeln!(listing, "Content:\n{}", clip(content, 2_000));
        }
        listing.push('\n');
    }

    format!(
        r#"You are ranking passages by how well they answer a query, and explaining why.

QUERY: "{query}"

Passages:
{listing}
Respond in this format:
```json
[
  {{"id": 1, "final_score": 0.92, "explanation": "one or two sentences on why this passage answers the query"}}
]
```

Rules:
- Rank every passage exactly once, using its label as "id".
- "final_score" is a number between 0.0 and 1.0; higher ranks first.
- Answer with the JSON array inside a ```json fence and nothing else."#
    )
}
