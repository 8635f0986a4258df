//! Human-facing views of a reasoning trace

use crate::trace::{QueryId, ReasoningTrace, Stage};
use serde::Serialize;
use std::fmt::Write as _;

const DEFAULT_REASON: &str = "Selected based on relevance analysis";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedDirectory {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedDocument {
    pub name: String,
    pub directory: String,
    pub reason: String,
}

/// Condensed account of how a query reached its results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExplainReport {
    pub query_id: QueryId,
    pub query: String,
    pub directories_analyzed: usize,
    pub directories_selected: Vec<SelectedDirectory>,
    pub documents_analyzed: usize,
    pub documents_selected: Vec<SelectedDocument>,
    pub chunks_identified: usize,
    pub final_results_count: usize,
    pub incomplete: bool,
    pub notes: Vec<String>,
}

impl ExplainReport {
    pub fn from_trace(trace: &ReasoningTrace) -> Self {
        let directory_stages: Vec<_> = trace.stages_of(Stage::DirectoryScan).collect();
        let document_stages: Vec<_> = trace.stages_of(Stage::DocumentScan).collect();

        Self {
            query_id: trace.query_id,
            query: trace.query.clone(),
            directories_analyzed: directory_stages.iter().map(|s| s.candidates.len()).sum(),
            directories_selected: directory_stages
                .iter()
                .flat_map(|s| s.kept())
                .map(|v| SelectedDirectory {
                    path: v.label.clone(),
                    reason: v.reasoning.clone().unwrap_or_else(|| DEFAULT_REASON.to_string()),
                })
                .collect(),
            documents_analyzed: document_stages.iter().map(|s| s.candidates.len()).sum(),
            documents_selected: document_stages
                .iter()
                .flat_map(|s| s.kept())
                .map(|v| SelectedDocument {
                    name: v.label.clone(),
                    directory: v.context.clone().unwrap_or_default(),
                    reason: v.reasoning.clone().unwrap_or_else(|| DEFAULT_REASON.to_string()),
                })
                .collect(),
            chunks_identified: trace
                .stages_of(Stage::ChunkScan)
                .map(|s| s.kept().count())
                .sum(),
            final_results_count: trace.result_count,
            incomplete: trace.incomplete,
            notes: trace.all_notes().map(ToString::to_string).collect(),
        }
    }
}

/// Markdown rendering of a full trace.
pub fn render_markdown(trace: &ReasoningTrace) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Retrieval trace `{}`", trace.query_id);
    let _ = writeln!(out);
    let _ = writeln!(out, "- **Query:** {}", trace.query);
    let _ = writeln!(out, "- **Scope:** {}", trace.scope);
    let _ = writeln!(out, "- **State:** {}", trace.state.as_str());
    let _ = writeln!(out, "- **Results:** {}", trace.result_count);
    let _ = writeln!(out, "- **Elapsed:** {} ms", trace.elapsed_ms);
    if trace.incomplete {
        let _ = writeln!(out, "- **Incomplete:** yes");
    }
    if let Some(error) = &trace.error {
        let _ = writeln!(out, "- **Error:** {error}");
    }

    for stage in &trace.stages {
        let _ = writeln!(out);
        match (stage.stage, stage.level) {
            (Stage::DirectoryScan, Some(level)) => {
                let _ = writeln!(out, "## {} (level {level})", stage.stage);
            }
            (Stage::Rank, Some(batches)) => {
                let _ = writeln!(out, "## {} ({batches} batch(es))", stage.stage);
            }
            _ => {
                let _ = writeln!(out, "## {}", stage.stage);
            }
        }
        let _ = writeln!(
            out,
            "{} candidate(s), {} call(s), {} failed, {} ms",
            stage.candidates.len(),
            stage.calls,
            stage.failed_calls,
            stage.elapsed_ms
        );

        if !stage.verdicts.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "| | candidate | score | reasoning |");
            let _ = writeln!(out, "|---|---|---|---|");
            for verdict in &stage.verdicts {
                let mark = if verdict.kept { "✓" } else { " " };
                let reasoning = verdict
                    .reasoning
                    .as_deref()
                    .unwrap_or("")
                    .replace('|', "\\|")
                    .replace('\n', " ");
                let _ = writeln!(
                    out,
                    "| {mark} | {} | {:.2} | {reasoning} |",
                    verdict.label, verdict.score
                );
            }
        }

        if !stage.notes.is_empty() {
            let _ = writeln!(out);
            for note in &stage.notes {
                let _ = writeln!(out, "- {note}");
            }
        }
    }

    if !trace.notes.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "## Notes");
        for note in &trace.notes {
            let _ = writeln!(out, "- {note}");
        }
    }
    out
}
