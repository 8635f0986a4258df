mod common;

use atlas_hierarchy::{Ownership, SubtenantId, TenantScope, VersionPolicy};
use atlas_reasoning::{
    Operation, RawDirectoryVerdict, ReasoningGateway, ScriptedCapability, ScriptedFailure,
};
use atlas_retrieval::{
    Budget, ChunkEvidence, Orchestrator, QueryState, RetrievalConfig, RetrievalRequest, Stage,
    TraceNote, UNRANKED_EXPLANATION,
};
use common::{Tree, config, summarized};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn titles(response: &atlas_retrieval::RetrievalResponse) -> Vec<String> {
    response
        .results
        .iter()
        .map(|r| r.title.clone().unwrap_or_default())
        .collect()
}

fn stage_sequence(trace: &atlas_retrieval::ReasoningTrace) -> Vec<(Stage, Option<u32>)> {
    trace.stages.iter().map(|s| (s.stage, s.level)).collect()
}

#[tokio::test]
async fn narrows_from_root_to_the_relevant_chunk() {
    let tree = Tree::memory();
    let a = tree.dir("/A", "annual budgets").await;
    let b = tree.dir("/B", "office trivia").await;
    tree.doc(
        &a,
        "D1",
        Some("budget plan"),
        &[summarized("C1"), summarized("C2")],
    )
    .await;
    tree.doc(&b, "D2", Some("party plans"), &[summarized("C3")])
        .await;

    let capability = Arc::new(
        ScriptedCapability::new()
            .directory("/A", 0.9, true)
            .directory("/B", 0.1, true)
            .document("D1", 0.8)
            .document("D2", 0.9)
            .chunk("C1", 0.9)
            .chunk("C2", 0.2)
            .rank("C1", 0.95, "C1 states the budget figure"),
    );
    let service = tree.service(
        &capability,
        RetrievalConfig {
            directory_width: 1,
            ..config()
        },
    );

    let response = service
        .retrieve(RetrievalRequest::new("what is the budget?"))
        .await
        .expect("retrieve");

    assert_eq!(response.results.len(), 1);
    let result = &response.results[0];
    assert_eq!(result.title.as_deref(), Some("C1"));
    assert_eq!(result.final_score, 0.95);
    assert_eq!(result.explanation, "C1 states the budget figure");
    assert_eq!(result.document_name, "D1");
    assert_eq!(result.directory_path, "/A");
    assert_eq!(result.directory_id, a.id);
    assert!(result.ranked);
    assert!(!response.incomplete);

    // B was never opened.
    assert_eq!(capability.calls(Operation::SelectDocuments), 1);
    assert_eq!(
        capability.call_log(),
        vec![
            (Operation::AnalyzeDirectories, vec!["/A".to_string(), "/B".to_string()]),
            (Operation::SelectDocuments, vec!["D1".to_string()]),
            (Operation::IdentifyChunks, vec!["C1".to_string(), "C2".to_string()]),
            (Operation::RankAndExplain, vec!["C1".to_string()]),
        ]
    );
    assert_eq!(
        stage_sequence(&response.trace),
        vec![
            (Stage::DirectoryScan, Some(1)),
            (Stage::DocumentScan, None),
            (Stage::ChunkScan, None),
            (Stage::Rank, Some(1)),
        ]
    );
    assert_eq!(response.trace.state, QueryState::Done);
}

#[tokio::test]
async fn sqlite_store_gives_the_same_answer() {
    let tree = Tree::sqlite();
    let a = tree.dir("/A", "annual budgets").await;
    tree.doc(
        &a,
        "D1",
        Some("budget plan"),
        &[summarized("C1"), summarized("C2")],
    )
    .await;

    let capability = Arc::new(
        ScriptedCapability::new()
            .directory("/A", 0.9, true)
            .document("D1", 0.8)
            .chunk("C1", 0.9)
            .chunk("C2", 0.2)
            .rank("C1", 0.95, "C1 states the budget figure"),
    );
    let service = tree.service(&capability, config());
    let response = service
        .retrieve(RetrievalRequest::new("budget"))
        .await
        .expect("retrieve");
    assert_eq!(titles(&response), vec!["C1"]);
}

#[tokio::test]
async fn current_version_wins_unless_pinned() {
    let tree = Tree::memory();
    let dir = tree.dir("/docs", "handbooks").await;
    let (v1, _) = tree
        .doc(
            &dir,
            "handbook",
            Some("handbook v1"),
            &[summarized("v1-c0"), summarized("v1-c1")],
        )
        .await;
    let (v2, _) = tree
        .reversion(
            &v1,
            Some("handbook v2"),
            &[summarized("v2-c0"), summarized("v2-c1"), summarized("v2-c2")],
        )
        .await;
    assert_eq!(v2.version, 2);

    let capability = Arc::new(ScriptedCapability::new().default_relevance(0.9));
    let service = tree.service(&capability, config());

    let latest = service
        .retrieve(RetrievalRequest::new("handbook"))
        .await
        .expect("latest");
    assert_eq!(titles(&latest), vec!["v2-c0", "v2-c1", "v2-c2"]);
    assert!(latest.results.iter().all(|r| r.version == 2));

    let pinned = service
        .retrieve(
            RetrievalRequest::new("handbook")
                .versions(VersionPolicy::Pinned(BTreeMap::from([(v1.lineage, 1)]))),
        )
        .await
        .expect("pinned");
    assert_eq!(titles(&pinned), vec!["v1-c0", "v1-c1"]);
    assert!(pinned.results.iter().all(|r| r.document_id == v1.id));
}

#[tokio::test]
async fn foreign_private_content_never_reaches_the_caller() {
    let tree = Tree::memory();
    let alice = SubtenantId::new();
    let bob = SubtenantId::new();

    let shared = tree.dir("/shared", "common knowledge").await;
    tree.doc(&shared, "common", Some("for everyone"), &[summarized("public")])
        .await;
    tree.doc_with(
        &shared,
        "bob-notes",
        Ownership::private(bob),
        Some("bob only"),
        &[summarized("bob-secret")],
    )
    .await;
    let vault = tree
        .dir_with("/vault", Ownership::private(bob), Some("bob's vault"))
        .await;
    tree.doc(&vault, "vault-doc", Some("bob only"), &[summarized("vault-secret")])
        .await;
    let mine = tree
        .dir_with("/mine", Ownership::private(alice), Some("alice's space"))
        .await;
    tree.doc(&mine, "alice-doc", Some("alice only"), &[summarized("alice-private")])
        .await;

    let capability = Arc::new(ScriptedCapability::new().default_relevance(0.9));
    let service = tree.service(&capability, config());

    let response = service
        .retrieve(RetrievalRequest::new("secrets").scope(TenantScope::Subtenant(alice)))
        .await
        .expect("retrieve");
    let mut seen = titles(&response);
    seen.sort();
    assert_eq!(seen, vec!["alice-private", "public"]);

    let shown: Vec<String> = capability
        .call_log()
        .into_iter()
        .flat_map(|(_, keys)| keys)
        .collect();
    for forbidden in ["/vault", "bob-notes", "vault-doc", "bob-secret", "vault-secret"] {
        assert!(
            !shown.iter().any(|key| key == forbidden),
            "{forbidden} was shown to the capability"
        );
    }

    let bob_view = service
        .retrieve(RetrievalRequest::new("secrets").scope(TenantScope::Subtenant(bob)))
        .await
        .expect("retrieve");
    let mut seen = titles(&bob_view);
    seen.sort();
    assert_eq!(seen, vec!["bob-secret", "public", "vault-secret"]);
}

#[tokio::test]
async fn depth_limit_degrades_instead_of_failing() {
    let tree = Tree::memory();
    tree.dir("/l1", "level one").await;
    let l2 = tree.dir("/l1/l2", "level two").await;
    tree.dir("/l1/l2/l3", "level three").await;
    tree.dir("/l1/l2/l3/l4", "level four").await;
    tree.doc(&l2, "mid", Some("middle doc"), &[summarized("mid-chunk")])
        .await;

    let capability = Arc::new(ScriptedCapability::new().default_relevance(0.9));
    let service = tree.service(
        &capability,
        RetrievalConfig {
            max_depth: 2,
            ..config()
        },
    );

    let response = service
        .retrieve(RetrievalRequest::new("deep"))
        .await
        .expect("budget hits are not errors");
    assert!(response.incomplete);
    assert_eq!(titles(&response), vec!["mid-chunk"]);
    assert_eq!(
        response.trace.stages_of(Stage::DirectoryScan).count(),
        2,
        "never scores below depth 2"
    );
    assert!(response.trace.all_notes().any(|note| matches!(
        note,
        TraceNote::BudgetExceeded {
            budget: Budget::Depth,
            ..
        }
    )));
}

#[tokio::test]
async fn node_budget_truncates_a_level_in_path_order() {
    let tree = Tree::memory();
    for name in ["a", "b", "c", "d", "e", "f"] {
        let dir = tree.dir(&format!("/{name}"), &format!("area {name}")).await;
        tree.doc(&dir, &format!("doc-{name}"), Some("notes"), &[summarized(&format!("chunk-{name}"))])
            .await;
    }

    let capability = Arc::new(ScriptedCapability::new().default_relevance(0.9));
    let service = tree.service(
        &capability,
        RetrievalConfig {
            max_directory_visits: 4,
            directory_width: 10,
            ..config()
        },
    );

    let response = service
        .retrieve(RetrievalRequest::new("anything"))
        .await
        .expect("budget hits are not errors");
    assert!(response.incomplete);
    assert_eq!(
        capability.call_log()[0],
        (
            Operation::AnalyzeDirectories,
            vec!["/a", "/b", "/c", "/d"]
                .into_iter()
                .map(String::from)
                .collect()
        )
    );
    let mut seen = titles(&response);
    seen.sort();
    assert_eq!(seen, vec!["chunk-a", "chunk-b", "chunk-c", "chunk-d"]);
    assert!(response.trace.all_notes().any(|note| matches!(
        note,
        TraceNote::BudgetExceeded {
            budget: Budget::Nodes,
            ..
        }
    )));
}

#[tokio::test]
async fn one_invalid_directory_verdict_spares_the_other_four() {
    let tree = Tree::memory();
    for name in ["a", "b", "c", "d", "e"] {
        let dir = tree.dir(&format!("/{name}"), &format!("area {name}")).await;
        tree.doc(&dir, &format!("doc-{name}"), Some("notes"), &[summarized(&format!("chunk-{name}"))])
            .await;
    }

    let capability = Arc::new(
        ScriptedCapability::new()
            .directory("/a", 0.9, false)
            .directory("/b", 0.8, false)
            .directory("/c", 1.7, false)
            .directory("/d", 0.7, false)
            .directory("/e", 0.6, false)
            .default_relevance(0.9),
    );
    let service = tree.service(&capability, config());

    let response = service
        .retrieve(RetrievalRequest::new("areas"))
        .await
        .expect("retrieve");
    assert_eq!(capability.calls(Operation::SelectDocuments), 4);
    let mut seen = titles(&response);
    seen.sort();
    assert_eq!(seen, vec!["chunk-a", "chunk-b", "chunk-d", "chunk-e"]);
    assert!(response
        .trace
        .all_notes()
        .any(|note| matches!(note, TraceNote::InvalidVerdict { .. })));
}

#[tokio::test]
async fn unknown_ids_from_the_capability_are_ignored() {
    let tree = Tree::memory();
    let dir = tree.dir("/a", "area a").await;
    tree.doc(&dir, "doc-a", Some("notes"), &[summarized("chunk-a")])
        .await;

    let capability = Arc::new(
        ScriptedCapability::new()
            .default_relevance(0.9)
            .extra_directory_entry(RawDirectoryVerdict {
                id: "not-a-directory".to_string(),
                relevance: 1.0,
                should_expand: true,
                reasoning: None,
            }),
    );
    let service = tree.service(&capability, config());
    let response = service
        .retrieve(RetrievalRequest::new("area"))
        .await
        .expect("retrieve");
    assert_eq!(titles(&response), vec!["chunk-a"]);
}

#[tokio::test]
async fn a_failed_call_drops_only_its_own_candidates() {
    let tree = Tree::memory();
    let good = tree.dir("/good", "works").await;
    let bad = tree.dir("/bad", "breaks").await;
    tree.doc(&good, "good.md", Some("fine"), &[summarized("good-chunk")])
        .await;
    tree.doc(&bad, "bad.md", Some("broken"), &[summarized("bad-chunk")])
        .await;

    let capability = Arc::new(
        ScriptedCapability::new()
            .default_relevance(0.9)
            .directory("/good", 0.9, false)
            .directory("/bad", 0.9, false)
            .fail_when_contains(Operation::SelectDocuments, "bad.md", ScriptedFailure::Unavailable),
    );
    let service = tree.service(&capability, config());
    let response = service
        .retrieve(RetrievalRequest::new("status"))
        .await
        .expect("partial failures are tolerated");
    assert_eq!(titles(&response), vec!["good-chunk"]);

    let documents = response
        .trace
        .stages_of(Stage::DocumentScan)
        .next()
        .expect("document stage");
    assert_eq!(documents.calls, 2);
    assert_eq!(documents.failed_calls, 1);
    assert!(documents
        .notes
        .iter()
        .any(|note| matches!(note, TraceNote::CallFailed { error, .. } if error == "unavailable")));
}

#[tokio::test]
async fn a_stage_that_loses_every_call_aborts_the_query() {
    let tree = Tree::memory();
    tree.dir("/a", "area a").await;
    let capability = Arc::new(
        ScriptedCapability::new().fail(Operation::AnalyzeDirectories, ScriptedFailure::Rejected),
    );
    let gateway = Arc::new(ReasoningGateway::new(capability.clone(), 4));
    let orchestrator = Orchestrator::new(tree.store.clone(), gateway);

    let outcome = orchestrator
        .run(&RetrievalRequest::new("anything"), &config())
        .await;
    let err = outcome.results.expect_err("aborted");
    assert_eq!(err.kind().as_str(), "QUERY_ABORTED");
    assert_eq!(err.query_id(), Some(outcome.trace.query_id));
    assert_eq!(outcome.trace.state, QueryState::Failed);
    assert!(outcome
        .trace
        .error
        .as_deref()
        .is_some_and(|e| e.starts_with("QUERY_ABORTED")));
    assert_eq!(capability.total_calls(), 1);
}

#[tokio::test]
async fn filtering_everything_out_is_an_empty_answer() {
    let tree = Tree::memory();
    let dir = tree.dir("/a", "area a").await;
    tree.doc(&dir, "doc-a", Some("notes"), &[summarized("chunk-a")])
        .await;

    let capability = Arc::new(ScriptedCapability::new().default_relevance(0.1));
    let service = tree.service(&capability, config());
    let response = service
        .retrieve(RetrievalRequest::new("nothing relevant"))
        .await
        .expect("empty answers are fine");
    assert!(response.results.is_empty());
    assert!(!response.incomplete);
}

#[tokio::test]
async fn identical_inputs_give_identical_answers() {
    let tree = Tree::memory();
    for (area, docs) in [("/x", ["x1", "x2"]), ("/y", ["y1", "y2"]), ("/z", ["z1", "z2"])] {
        let dir = tree.dir(area, "area").await;
        for doc in docs {
            tree.doc(
                &dir,
                doc,
                Some("doc"),
                &[summarized(&format!("{doc}-a")), summarized(&format!("{doc}-b"))],
            )
            .await;
        }
    }
    let capability = Arc::new(
        ScriptedCapability::new()
            .default_relevance(0.7)
            .rank("x1-a", 0.9, "best")
            .rank("z2-b", 0.9, "tied best")
            .delay(Operation::AnalyzeDirectories, Duration::from_millis(5)),
    );
    let service = tree.service(
        &capability,
        RetrievalConfig {
            rank_batch_size: 3,
            ..config()
        },
    );

    let first = service
        .retrieve(RetrievalRequest::new("areas"))
        .await
        .expect("first");
    let second = service
        .retrieve(RetrievalRequest::new("areas"))
        .await
        .expect("second");

    let ranked = |r: &atlas_retrieval::RetrievalResponse| {
        r.results
            .iter()
            .map(|x| (x.chunk_id, x.final_score))
            .collect::<Vec<_>>()
    };
    assert_eq!(ranked(&first), ranked(&second));
    assert_eq!(stage_sequence(&first.trace), stage_sequence(&second.trace));
    for (a, b) in first.trace.stages.iter().zip(&second.trace.stages) {
        assert_eq!(a.candidates, b.candidates);
        assert_eq!(a.verdicts, b.verdicts);
    }
    assert_eq!(titles(&first)[..2], ["x1-a", "z2-b"]);
}

#[tokio::test(start_paused = true)]
async fn deadline_returns_unranked_partial_results() {
    let tree = Tree::memory();
    let dir = tree.dir("/a", "area a").await;
    tree.doc(&dir, "doc-a", Some("notes"), &[summarized("chunk-1"), summarized("chunk-2")])
        .await;

    let capability = Arc::new(
        ScriptedCapability::new()
            .default_relevance(0.8)
            .chunk("chunk-2", 0.9)
            .delay(Operation::RankAndExplain, Duration::from_secs(30)),
    );
    let service = tree.service(
        &capability,
        RetrievalConfig {
            grace_period_ms: 50,
            ..config()
        },
    );

    let response = service
        .retrieve(RetrievalRequest::new("slow").deadline(Duration::from_millis(200)))
        .await
        .expect("deadline yields partial results");
    assert!(response.incomplete);
    assert_eq!(titles(&response), vec!["chunk-2", "chunk-1"]);
    assert!(response.results.iter().all(|r| !r.ranked));
    assert!(response
        .results
        .iter()
        .all(|r| r.explanation == UNRANKED_EXPLANATION));
    assert_eq!(response.results[0].final_score, 0.9);
}

#[tokio::test(start_paused = true)]
async fn deadline_during_the_directory_scan_leaves_an_empty_partial_answer() {
    let tree = Tree::memory();
    tree.dir("/a", "area a").await;
    let capability = Arc::new(
        ScriptedCapability::new()
            .default_relevance(0.8)
            .delay(Operation::AnalyzeDirectories, Duration::from_secs(30)),
    );
    let service = tree.service(&capability, config());

    let response = service
        .retrieve(RetrievalRequest::new("slow").deadline(Duration::from_millis(100)))
        .await
        .expect("partial");
    assert!(response.incomplete);
    assert!(response.results.is_empty());
    assert!(response
        .trace
        .all_notes()
        .any(|note| matches!(note, TraceNote::DeadlineReached { .. })));
}

#[tokio::test]
async fn malformed_queries_are_rejected_up_front() {
    let tree = Tree::memory();
    tree.dir("/a", "area a").await;
    let capability = Arc::new(ScriptedCapability::new().default_relevance(0.8));
    let service = tree.service(
        &capability,
        RetrievalConfig {
            max_query_chars: 10,
            ..config()
        },
    );

    for request in [
        RetrievalRequest::new("   "),
        RetrievalRequest::new("far too long for the limit"),
        RetrievalRequest::new("ok").top_k(0),
    ] {
        let err = service.retrieve(request).await.expect_err("invalid");
        assert_eq!(err.kind().as_str(), "INVALID_QUERY");
    }
    assert_eq!(capability.total_calls(), 0);
}

#[tokio::test]
async fn unsummarized_nodes_are_skipped_with_a_note() {
    let tree = Tree::memory();
    let dir = tree.dir("/a", "area a").await;
    tree.dir_with("/raw", Ownership::shared(), None).await;
    tree.doc(&dir, "draft", None, &[summarized("draft-chunk")])
        .await;
    tree.doc(&dir, "final", Some("final copy"), &[summarized("final-1"), ("final-2", None)])
        .await;

    let capability = Arc::new(ScriptedCapability::new().default_relevance(0.9));
    let service = tree.service(&capability, config());
    let response = service
        .retrieve(RetrievalRequest::new("copy"))
        .await
        .expect("retrieve");
    assert_eq!(titles(&response), vec!["final-1"]);

    let unsummarized: Vec<String> = response
        .trace
        .all_notes()
        .filter(|note| matches!(note, TraceNote::Unsummarized { .. }))
        .map(ToString::to_string)
        .collect();
    assert_eq!(
        unsummarized,
        vec![
            "directory /raw: unsummarized, excluded",
            "document draft: unsummarized, excluded",
            "chunk final / final-2: unsummarized, excluded",
        ]
    );
}

#[tokio::test]
async fn content_evidence_mode_judges_raw_chunks() {
    let tree = Tree::memory();
    let dir = tree.dir("/a", "area a").await;
    tree.doc(&dir, "doc", Some("doc"), &[("raw-chunk", None)])
        .await;

    let capability = Arc::new(ScriptedCapability::new().default_relevance(0.9));
    let service = tree.service(
        &capability,
        RetrievalConfig {
            chunk_evidence: ChunkEvidence::Content,
            ..config()
        },
    );
    let response = service
        .retrieve(RetrievalRequest::new("raw"))
        .await
        .expect("retrieve");
    assert_eq!(titles(&response), vec!["raw-chunk"]);
}

#[tokio::test]
async fn search_can_start_below_the_root() {
    let tree = Tree::memory();
    tree.dir("/a", "area a").await;
    let inner = tree.dir("/a/inner", "inner area").await;
    let other = tree.dir("/b", "area b").await;
    tree.doc(&inner, "inner-doc", Some("doc"), &[summarized("inner-chunk")])
        .await;
    tree.doc(&other, "other-doc", Some("doc"), &[summarized("other-chunk")])
        .await;

    let capability = Arc::new(ScriptedCapability::new().default_relevance(0.9));
    let service = tree.service(&capability, config());
    let response = service
        .retrieve(RetrievalRequest::new("inner").start_at("/a"))
        .await
        .expect("retrieve");
    assert_eq!(titles(&response), vec!["inner-chunk"]);
    assert_eq!(
        capability.call_log()[0],
        (Operation::AnalyzeDirectories, vec!["/a/inner".to_string()])
    );

    let err = service
        .retrieve(RetrievalRequest::new("inner").start_at("/missing"))
        .await
        .expect_err("unknown start");
    assert_eq!(err.kind().as_str(), "NOT_FOUND");
}

#[tokio::test(start_paused = true)]
async fn sibling_calls_share_the_gateway_cap() {
    let tree = Tree::memory();
    for name in ["a", "b", "c", "d", "e", "f"] {
        let dir = tree.dir(&format!("/{name}"), "area").await;
        tree.doc(&dir, &format!("doc-{name}"), Some("doc"), &[summarized(&format!("chunk-{name}"))])
            .await;
    }
    let capability = Arc::new(
        ScriptedCapability::new()
            .default_relevance(0.9)
            .directory("/a", 0.9, false)
            .directory("/b", 0.9, false)
            .directory("/c", 0.9, false)
            .directory("/d", 0.9, false)
            .directory("/e", 0.9, false)
            .directory("/f", 0.9, false)
            .delay(Operation::SelectDocuments, Duration::from_millis(50)),
    );
    let gateway = Arc::new(ReasoningGateway::new(capability.clone(), 2));
    let orchestrator = Orchestrator::new(tree.store.clone(), gateway);
    let config = RetrievalConfig {
        directory_width: 6,
        ..config()
    };

    let outcome = orchestrator.run(&RetrievalRequest::new("all"), &config).await;
    let results = outcome.results.expect("retrieve");
    assert_eq!(results.len(), 6);
    assert_eq!(capability.calls(Operation::SelectDocuments), 6);
    assert!(capability.max_in_flight() <= 2);
}
