//! Session behavior against the loopback server: identity, capability
//! discovery, marshaling of remote references, failures and eviction.

use std::sync::Arc;
use std::time::Duration;

use ojremote_client::loopback::{self, LoopbackServer};
use ojremote_client::{
    Arg, CapabilityRegistry, CapabilityTag, Iconic, RemoteConnection, RemoteError,
    SessionConfig, Structural, TransportResponse,
};
use ojremote_types::{InvokeResponse, OperationType, RemoteId, names};
use serde_json::json;

// ============================================================================
// Shared test setup
// ============================================================================

fn id(n: u64) -> RemoteId {
    RemoteId::new(n)
}

fn connect_with(config: SessionConfig) -> (Arc<LoopbackServer>, RemoteConnection) {
    loopback::connect(CapabilityRegistry::with_defaults().unwrap(), config)
}

fn connect() -> (Arc<LoopbackServer>, RemoteConnection) {
    connect_with(SessionConfig::default())
}

// ============================================================================
// Identity
// ============================================================================

#[tokio::test]
async fn test_get_or_create_caches_proxy() {
    let (server, conn) = connect();
    server.add_object(id(1), &[names::ICONIC]);

    let first = conn.session().get_or_create(id(1)).await.unwrap();
    let second = conn.session().get_or_create(id(1)).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(server.describe_count(id(1)), 1);
    assert_eq!(conn.session().id_for(&first), Some(id(1)));
}

#[tokio::test]
async fn test_concurrent_get_or_create_shares_one_creation() {
    let (server, conn) = connect();
    server.add_object(id(5), &[names::STRUCTURAL]);
    let gate = server.hold(id(5), "serverInfo", None);

    let a = tokio::spawn({
        let session = conn.session().clone();
        async move { session.get_or_create(id(5)).await }
    });
    let b = tokio::spawn({
        let session = conn.session().clone();
        async move { session.get_or_create(id(5)).await }
    });

    // Both callers are parked on the held describe before it is released.
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;
    gate.release();

    let a = a.await.unwrap().unwrap();
    let b = b.await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(server.describe_count(id(5)), 1);
    assert_eq!(conn.session().len(), 1);
}

// ============================================================================
// Capability discovery
// ============================================================================

#[tokio::test]
async fn test_unknown_capabilities_are_skipped() {
    let (server, conn) = connect();
    server.add_object(id(2), &["org.oddjob.Forwards", names::ICONIC, "com.example.Later"]);

    let proxy = conn.session().get_or_create(id(2)).await.unwrap();

    assert_eq!(proxy.capabilities(), vec![CapabilityTag::Iconic]);
    assert!(proxy.is_a(CapabilityTag::Iconic));
    assert!(!proxy.is_a(CapabilityTag::Structural));
    assert!(proxy.as_capability::<Iconic>().is_some());
    assert!(proxy.as_capability::<Structural>().is_none());
}

#[tokio::test]
async fn test_registry_without_capabilities_binds_nothing() {
    let (server, inbound) = LoopbackServer::new();
    let conn = RemoteConnection::open(
        server.clone(),
        server.clone(),
        inbound,
        CapabilityRegistry::new().unwrap(),
        SessionConfig::default(),
    );
    server.add_object(id(3), &[names::ICONIC, names::STRUCTURAL]);

    let proxy = conn.session().get_or_create(id(3)).await.unwrap();
    assert!(proxy.capabilities().is_empty());
}

// ============================================================================
// Marshaling
// ============================================================================

#[tokio::test]
async fn test_transportable_result_resolves_to_existing_proxy() {
    let (server, conn) = connect();
    server.add_object(id(1), &[names::OBJECT]);
    server.add_object(id(9), &[names::OBJECT]);
    server.respond(
        id(1),
        "getParent",
        InvokeResponse::new(names::TRANSPORTABLE, Some(json!({"remoteId": 9}))),
    );
    let op = OperationType::new("getParent", names::OBJECT, Vec::<String>::new());
    let toolkit = conn.session().toolkit_for(id(1));

    let err = toolkit.invoke_for_proxy(&op, Vec::new()).await.unwrap_err();
    assert!(matches!(err, RemoteError::NoRemote(r) if r == id(9)));
    assert_eq!(err.to_string(), "No remote for 9");
    assert!(err.is_protocol_violation());

    let parent = conn.session().get_or_create(id(9)).await.unwrap();
    let resolved = toolkit.invoke_for_proxy(&op, Vec::new()).await.unwrap();
    assert!(Arc::ptr_eq(&parent, &resolved));
}

#[tokio::test]
async fn test_proxy_argument_sent_as_transportable() {
    let (server, conn) = connect();
    server.add_object(id(1), &[names::OBJECT]);
    server.add_object(id(4), &[names::OBJECT]);
    server.respond(id(1), "adopt", InvokeResponse::void());
    server.respond(id(1), "rename", InvokeResponse::void());

    let child = conn.session().get_or_create(id(4)).await.unwrap();
    let toolkit = conn.session().toolkit_for(id(1));

    let rename = OperationType::new("rename", names::VOID, [names::STRING]);
    toolkit.invoke::<()>(&rename, vec![Arg::from("new")]).await.unwrap();

    let adopt = OperationType::new("adopt", names::VOID, [names::STRING, "org.oddjob.Job"]);
    toolkit.invoke::<()>(&adopt, vec![Arg::from("child"), child.into()]).await.unwrap();

    let requests = server.requests();
    let renamed = requests.iter().find(|r| r.operation_type.name == "rename").unwrap();
    assert!(renamed.arg_types.is_none());

    let adopted = requests.iter().find(|r| r.operation_type.name == "adopt").unwrap();
    assert_eq!(adopted.args[1], json!({"remoteId": 4}));
    assert_eq!(
        adopted.arg_types.as_deref(),
        Some(&[names::STRING.to_string(), names::TRANSPORTABLE.to_string()][..])
    );
}

#[tokio::test]
async fn test_value_result_when_proxy_expected_is_protocol_error() {
    let (server, conn) = connect();
    server.add_object(id(1), &[names::OBJECT]);
    server.respond_value(id(1), "getParent", names::STRING, &"not a remote");

    let op = OperationType::new("getParent", names::OBJECT, Vec::<String>::new());
    let err = conn.session().toolkit_for(id(1)).invoke_for_proxy(&op, Vec::new()).await.unwrap_err();
    assert!(matches!(err, RemoteError::ProtocolViolation(_)));
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_http_failure_rejects_and_is_not_cached() {
    let (server, conn) = connect();
    server.add_object(id(1), &[names::ICONIC]);
    server.fail_next(TransportResponse { status: 503, body: "busy".into() });

    let err = conn.session().get_or_create(id(1)).await.unwrap_err();
    assert!(matches!(err, RemoteError::HttpStatus { status: 503, .. }));
    assert!(conn.session().is_empty());
    assert_eq!(conn.session().pending_len(), 0);

    let proxy = conn.session().get_or_create(id(1)).await.unwrap();
    assert!(proxy.is_a(CapabilityTag::Iconic));
}

#[tokio::test]
async fn test_unknown_object_is_http_error() {
    let (_server, conn) = connect();
    let err = conn.session().get_or_create(id(404)).await.unwrap_err();
    assert!(matches!(err, RemoteError::HttpStatus { status: 404, .. }));
    assert_eq!(conn.session().pending_len(), 0);
}

#[tokio::test]
async fn test_empty_and_malformed_bodies() {
    let (server, conn) = connect();
    server.add_object(id(1), &[]);

    server.fail_next(TransportResponse::ok(""));
    let err = conn.session().get_or_create(id(1)).await.unwrap_err();
    assert!(matches!(err, RemoteError::EmptyBody));

    server.fail_next(TransportResponse::ok(r#"{"value": 3}"#));
    let err = conn.session().get_or_create(id(1)).await.unwrap_err();
    assert!(matches!(err, RemoteError::MalformedResponse(_)));
}

#[tokio::test(start_paused = true)]
async fn test_configured_timeout_fails_held_call() {
    let config = SessionConfig::default().with_invoke_timeout(Duration::from_millis(50));
    let (server, conn) = connect_with(config);
    server.add_object(id(1), &[names::ICONIC]);
    let _gate = server.hold(id(1), "serverInfo", None);

    let err = conn.session().get_or_create(id(1)).await.unwrap_err();
    match err {
        RemoteError::Timeout { op, after } => {
            assert_eq!(op, "serverInfo");
            assert_eq!(after, Duration::from_millis(50));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_explicit_deadline_overrides_unbounded_default() {
    let (server, conn) = connect();
    server.add_object(id(1), &[names::OBJECT]);
    server.respond_value(id(1), "toString", names::STRING, &"slow");
    let _gate = server.hold(id(1), "toString", None);

    let op = OperationType::new("toString", names::STRING, Vec::<String>::new());
    let result = conn
        .session()
        .toolkit_for(id(1))
        .invoke_within(&op, Vec::new(), Duration::from_secs(1))
        .await;
    assert!(matches!(result, Err(RemoteError::Timeout { .. })));
}

// ============================================================================
// Eviction
// ============================================================================

#[tokio::test]
async fn test_destroy_evicts_and_recreates() {
    let (server, conn) = connect();
    server.add_object(id(1), &[names::ICONIC]);

    let first = conn.session().get_or_create(id(1)).await.unwrap();
    assert!(conn.session().destroy(id(1)));
    assert!(first.is_destroyed());
    assert!(conn.session().proxy(id(1)).is_none());
    assert!(!conn.session().destroy(id(1)));

    let second = conn.session().get_or_create(id(1)).await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(server.describe_count(id(1)), 2);
}

#[tokio::test]
async fn test_destroy_without_eviction_keeps_proxy() {
    let config = SessionConfig { evict_on_destroy: false, ..SessionConfig::default() };
    let (server, conn) = connect_with(config);
    server.add_object(id(1), &[names::ICONIC]);

    let first = conn.session().get_or_create(id(1)).await.unwrap();
    assert!(conn.session().destroy(id(1)));

    let again = conn.session().get_or_create(id(1)).await.unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert!(again.is_destroyed());
    assert_eq!(server.describe_count(id(1)), 1);
}
