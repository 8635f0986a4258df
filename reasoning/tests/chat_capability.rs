use atlas_hierarchy::{ChunkId, DirectoryId, DocumentId};
use atlas_reasoning::{
    CallOptions, ChatCapability, ChatClient, ChatConfig, ChunkCandidate, DirectoryCandidate,
    DocumentCandidate, GatewayError, GatewayPolicy, ReasoningGateway, RejectReason, RetryPolicy,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> ChatConfig {
    ChatConfig {
        base_url: server.uri(),
        auth_token: None,
        request_timeout_ms: 5_000,
    }
}

fn gateway_for(config: &ChatConfig) -> ReasoningGateway {
    let client = ChatClient::new(config).expect("client");
    ReasoningGateway::new(Arc::new(ChatCapability::new(client)), 4)
}

fn policy(max_attempts: u32) -> GatewayPolicy {
    GatewayPolicy {
        call_timeout_ms: 5_000,
        retry: RetryPolicy {
            max_attempts,
            initial_backoff_ms: 5,
            max_backoff_ms: 20,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        },
    }
}

async fn mount_chat(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/api/v1/chats"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "chat-1"})))
        .mount(server)
        .await;
}

fn reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "content": content }))
}

fn directories() -> Vec<DirectoryCandidate> {
    ["/finance", "/hr"]
        .into_iter()
        .map(|p| DirectoryCandidate {
            id: DirectoryId::new(),
            path: p.to_string(),
            name: p.trim_start_matches('/').to_string(),
            summary: format!("all about {p}"),
        })
        .collect()
}

fn one_document() -> Vec<DocumentCandidate> {
    vec![DocumentCandidate {
        id: DocumentId::new(),
        name: "plan.md".to_string(),
        version: 2,
        directory_path: "/finance".to_string(),
        summary: "Budget plan".to_string(),
    }]
}

#[tokio::test]
async fn labelled_reply_maps_back_to_candidate_ids() {
    let server = MockServer::start().await;
    mount_chat(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chats/chat-1/messages"))
        .and(body_string_contains("QUERY: \\\"budget\\\""))
        .respond_with(reply(
            "Here is my analysis.\n```json\n[\n  {\"id\": 2, \"relevance\": 0.1, \"should_expand\": false},\n  {\"id\": \"[1]\", \"relevance\": 0.95, \"reasoning\": \"budgets live here\"}\n]\n```",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(&config(&server));
    let candidates = directories();
    let policy = policy(1);
    let cancel = CancellationToken::new();
    let options = CallOptions {
        policy: &policy,
        deadline: None,
        cancel: &cancel,
    };

    let validated = gateway
        .analyze_directories("budget", &candidates, &options)
        .await
        .expect("call succeeds");

    assert_eq!(validated.accepted.len(), 2);
    assert_eq!(validated.accepted[0].id, candidates[0].id);
    assert_eq!(validated.accepted[0].relevance, 0.95);
    assert!(validated.accepted[0].should_expand);
    assert_eq!(
        validated.accepted[0].reasoning.as_deref(),
        Some("budgets live here")
    );
    assert_eq!(validated.accepted[1].id, candidates[1].id);
    assert!(!validated.accepted[1].should_expand);
}

#[tokio::test]
async fn entries_without_a_score_are_rejected() {
    let server = MockServer::start().await;
    mount_chat(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chats/chat-1/messages"))
        .respond_with(reply("```json\n[{\"id\": 1, \"reasoning\": \"no score given\"}]\n```"))
        .mount(&server)
        .await;

    let gateway = gateway_for(&config(&server));
    let candidates = vec![ChunkCandidate {
        id: ChunkId::new(),
        ordinal: 0,
        title: Some("Intro".to_string()),
        document_name: "plan.md".to_string(),
        evidence: "The budget grows 4%.".to_string(),
    }];
    let policy = policy(1);
    let cancel = CancellationToken::new();
    let options = CallOptions {
        policy: &policy,
        deadline: None,
        cancel: &cancel,
    };

    let validated = gateway
        .identify_chunks("budget", &candidates, &options)
        .await
        .expect("call succeeds");
    assert!(validated.accepted.is_empty());
    assert_eq!(validated.rejected.len(), 1);
    assert!(matches!(
        validated.rejected[0].reason,
        RejectReason::ScoreOutOfRange { .. }
    ));
}

#[tokio::test]
async fn server_errors_are_retried() {
    let server = MockServer::start().await;
    mount_chat(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chats/chat-1/messages"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chats/chat-1/messages"))
        .respond_with(reply("[{\"id\": 1, \"relevance\": 0.4}]"))
        .with_priority(2)
        .mount(&server)
        .await;

    let gateway = gateway_for(&config(&server));
    let policy = policy(3);
    let cancel = CancellationToken::new();
    let options = CallOptions {
        policy: &policy,
        deadline: None,
        cancel: &cancel,
    };

    let validated = gateway
        .select_documents("budget", &one_document(), &options)
        .await
        .expect("second attempt succeeds");
    assert_eq!(validated.accepted.len(), 1);
    assert_eq!(validated.accepted[0].relevance, 0.4);
}

#[tokio::test]
async fn rate_limits_carry_retry_after() {
    let server = MockServer::start().await;
    mount_chat(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chats/chat-1/messages"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("Retry-After", "7")
                .set_body_string("slow down"),
        )
        .mount(&server)
        .await;

    let gateway = gateway_for(&config(&server));
    let policy = policy(1);
    let cancel = CancellationToken::new();
    let options = CallOptions {
        policy: &policy,
        deadline: None,
        cancel: &cancel,
    };

    let err = gateway
        .select_documents("budget", &one_document(), &options)
        .await
        .expect_err("rate limited");
    match err {
        GatewayError::Unavailable {
            attempts,
            retry_after,
            ..
        } => {
            assert_eq!(attempts, 1);
            assert_eq!(retry_after, Some(Duration::from_secs(7)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let server = MockServer::start().await;
    mount_chat(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chats/chat-1/messages"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad prompt"))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = gateway_for(&config(&server));
    let policy = policy(3);
    let cancel = CancellationToken::new();
    let options = CallOptions {
        policy: &policy,
        deadline: None,
        cancel: &cancel,
    };

    let err = gateway
        .select_documents("budget", &one_document(), &options)
        .await
        .expect_err("rejected");
    assert!(matches!(err, GatewayError::Rejected { status: 400, .. }));
}

#[tokio::test]
async fn garbage_reply_is_an_invalid_response() {
    let server = MockServer::start().await;
    mount_chat(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chats/chat-1/messages"))
        .respond_with(reply("I am not sure which documents matter."))
        .mount(&server)
        .await;

    let gateway = gateway_for(&config(&server));
    let policy = policy(3);
    let cancel = CancellationToken::new();
    let options = CallOptions {
        policy: &policy,
        deadline: None,
        cancel: &cancel,
    };

    let err = gateway
        .select_documents("budget", &one_document(), &options)
        .await
        .expect_err("unparseable");
    assert!(matches!(err, GatewayError::InvalidResponse(_)));
}

#[tokio::test]
async fn bearer_token_is_sent_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chats"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "chat-9"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v1/chats/chat-9/messages"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(reply("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config(&server);
    config.auth_token = Some("s3cret".to_string());
    let client = ChatClient::new(&config).expect("client");

    let answer = client.ask("Ping", "hello").await.expect("ask succeeds");
    assert_eq!(answer, "ok");
}
