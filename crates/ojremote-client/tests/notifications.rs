//! Notification-driven handlers against the loopback server.
//!
//! The icon tests pin down the race rule: which icon wins is decided by
//! notification sequence and by the most recently requested icon id, never by
//! the order in which fetches or the synchronize call happen to complete.

use std::sync::Arc;
use std::time::Duration;

use ojremote_client::loopback::{self, LoopbackServer};
use ojremote_client::{
    CapabilityRegistry, IconListener, Iconic, RemoteConnection, SessionConfig, StateListener,
    Stateful, Structural, StructuralListener, TransportResponse,
};
use ojremote_types::{
    ImageData, InvokeResponse, JobState, NotificationType, RemoteId, SubscriptionAction, names,
};
use parking_lot::Mutex;
use serde_json::json;

// ============================================================================
// Shared test setup
// ============================================================================

fn id(n: u64) -> RemoteId {
    RemoteId::new(n)
}

fn connect() -> (Arc<LoopbackServer>, RemoteConnection) {
    loopback::connect(CapabilityRegistry::with_defaults().unwrap(), SessionConfig::default())
}

fn icon_type() -> NotificationType {
    NotificationType::new(names::ICON_CHANGED, names::STRING)
}

fn image(name: &str) -> InvokeResponse {
    let data = ImageData::new("image/png", name.as_bytes().to_vec()).with_description(name);
    InvokeResponse::new(names::IMAGE_DATA, Some(json!(data)))
}

/// Serve images "foo" and "bar" for object 1.
fn serve_icons(server: &LoopbackServer) {
    server.add_object(id(1), &[names::ICONIC]);
    server.respond_to_arg(id(1), "iconForId", json!("foo"), image("foo"));
    server.respond_to_arg(id(1), "iconForId", json!("bar"), image("bar"));
}

fn recording_icon_listener() -> (IconListener, Arc<Mutex<Vec<String>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let listener: IconListener = Arc::new(move |event| sink.lock().push(event.icon_id.clone()));
    (listener, seen)
}

async fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let result = tokio::time::timeout(Duration::from_secs(2), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(result.is_ok(), "timed out waiting for {what}");
}

/// Let spawned fetches and the pump run to quiescence.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

// ============================================================================
// Subscription edges
// ============================================================================

#[tokio::test]
async fn test_one_add_and_one_remove_per_pair() {
    let (server, conn) = connect();
    serve_icons(&server);
    let iconic = conn.session().get_or_create(id(1)).await.unwrap().as_capability::<Iconic>().unwrap();

    let (a, _) = recording_icon_listener();
    let (b, _) = recording_icon_listener();
    iconic.add_icon_listener(a.clone()).await.unwrap();
    iconic.add_icon_listener(b.clone()).await.unwrap();

    let adds = server.subscriptions();
    assert_eq!(adds.len(), 1);
    assert_eq!(adds[0].action, SubscriptionAction::Add);
    assert_eq!(adds[0].notification_type.name, names::ICON_CHANGED);
    assert_eq!(server.request_count(id(1), "synchronize"), 1);

    iconic.remove_icon_listener(&a).unwrap();
    assert_eq!(server.subscriptions().len(), 1);
    iconic.remove_icon_listener(&b).unwrap();

    let all = server.subscriptions();
    assert_eq!(all.len(), 2);
    assert_eq!(all[1].action, SubscriptionAction::Remove);
    assert!(!server.is_subscribed(id(1), names::ICON_CHANGED));
}

#[tokio::test]
async fn test_destroy_unsubscribes() {
    let (server, conn) = connect();
    serve_icons(&server);
    let proxy = conn.session().get_or_create(id(1)).await.unwrap();
    let (listener, _) = recording_icon_listener();
    proxy.as_capability::<Iconic>().unwrap().add_icon_listener(listener).await.unwrap();
    assert!(server.is_subscribed(id(1), names::ICON_CHANGED));

    conn.session().destroy(id(1));
    assert!(!server.is_subscribed(id(1), names::ICON_CHANGED));
}

#[tokio::test]
async fn test_failed_synchronize_unsubscribes_and_next_listener_retries() {
    let (server, conn) = connect();
    serve_icons(&server);
    server.set_icon(id(1), "foo");
    let iconic = conn.session().get_or_create(id(1)).await.unwrap().as_capability::<Iconic>().unwrap();

    let (a, a_seen) = recording_icon_listener();
    server.fail_next(TransportResponse { status: 500, body: "boom".into() });
    assert!(iconic.add_icon_listener(a).await.is_err());
    assert_eq!(iconic.listener_count(), 0);
    assert!(!server.is_subscribed(id(1), names::ICON_CHANGED));

    let (b, b_seen) = recording_icon_listener();
    iconic.add_icon_listener(b).await.unwrap();
    assert_eq!(server.request_count(id(1), "synchronize"), 2);
    assert!(server.is_subscribed(id(1), names::ICON_CHANGED));
    wait_until("icon from synchronize", || b_seen.lock().as_slice() == ["foo"]).await;
    assert!(a_seen.lock().is_empty());
}

#[tokio::test]
async fn test_failed_structural_synchronize_drops_listener() {
    let (server, conn) = connect();
    server.add_object(id(1), &[names::STRUCTURAL]);
    server.set_children(id(1), &[2]);
    let structural =
        conn.session().get_or_create(id(1)).await.unwrap().as_capability::<Structural>().unwrap();

    let listener: StructuralListener = Arc::new(|_| {});
    server.fail_next(TransportResponse { status: 500, body: "boom".into() });
    assert!(structural.add_structural_listener(listener.clone()).await.is_err());
    assert_eq!(structural.listener_count(), 0);
    assert!(!server.is_subscribed(id(1), names::CHILDREN_CHANGED));

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let retry: StructuralListener = Arc::new(move |ids| sink.lock().push(ids.to_vec()));
    structural.add_structural_listener(retry).await.unwrap();
    assert_eq!(*seen.lock(), vec![vec![id(2)]]);
}

// ============================================================================
// Icon race
// ============================================================================

#[tokio::test]
async fn test_icon_synchronize_then_live_converges_on_live() {
    let (server, conn) = connect();
    serve_icons(&server);
    server.fire(id(1), icon_type(), 1000, json!("foo"));
    // The "foo" fetch stays in flight until after "bar" has been applied.
    let foo_fetch = server.hold(id(1), "iconForId", Some(json!("foo")));

    let iconic = conn.session().get_or_create(id(1)).await.unwrap().as_capability::<Iconic>().unwrap();
    let (listener, seen) = recording_icon_listener();
    iconic.add_icon_listener(listener).await.unwrap();

    server.fire(id(1), icon_type(), 1001, json!("bar"));
    wait_until("bar applied", || seen.lock().contains(&"bar".to_string())).await;

    foo_fetch.release();
    settle().await;

    assert_eq!(*seen.lock(), vec!["bar".to_string()]);
    assert_eq!(iconic.current_icon().unwrap().icon_id, "bar");
    assert_eq!(iconic.current_icon().unwrap().image.bytes, b"bar".to_vec());
}

#[tokio::test]
async fn test_icon_live_then_stale_synchronize_converges_on_live() {
    let (server, conn) = connect();
    serve_icons(&server);
    let older = server.fire(id(1), icon_type(), 1000, json!("foo"));
    // synchronize sampled before 1001 fired, and answers late.
    server.respond_to_arg(
        id(1),
        "synchronize",
        json!(names::ICON_CHANGED),
        InvokeResponse::new(names::NOTIFICATION, Some(json!(older))),
    );
    let sync = server.hold(id(1), "synchronize", None);

    let iconic = conn.session().get_or_create(id(1)).await.unwrap().as_capability::<Iconic>().unwrap();
    let (listener, seen) = recording_icon_listener();
    let adding = tokio::spawn({
        let iconic = iconic.clone();
        async move { iconic.add_icon_listener(listener).await }
    });

    wait_until("subscribed", || server.is_subscribed(id(1), names::ICON_CHANGED)).await;
    server.fire(id(1), icon_type(), 1001, json!("bar"));
    wait_until("bar applied", || seen.lock().contains(&"bar".to_string())).await;

    sync.release();
    adding.await.unwrap().unwrap();
    settle().await;

    assert_eq!(*seen.lock(), vec!["bar".to_string()]);
    assert_eq!(iconic.current_icon().unwrap().icon_id, "bar");
    assert_eq!(server.request_count(id(1), "iconForId"), 1);
}

#[tokio::test]
async fn test_late_icon_listener_gets_current_icon() {
    let (server, conn) = connect();
    serve_icons(&server);
    server.fire(id(1), icon_type(), 1, json!("foo"));

    let iconic = conn.session().get_or_create(id(1)).await.unwrap().as_capability::<Iconic>().unwrap();
    let (first, first_seen) = recording_icon_listener();
    iconic.add_icon_listener(first).await.unwrap();
    wait_until("foo applied", || !first_seen.lock().is_empty()).await;

    let (late, late_seen) = recording_icon_listener();
    iconic.add_icon_listener(late).await.unwrap();
    assert_eq!(*late_seen.lock(), vec!["foo".to_string()]);
}

#[tokio::test]
async fn test_cached_icon_applies_without_refetch() {
    let (server, conn) = connect();
    serve_icons(&server);

    let iconic = conn.session().get_or_create(id(1)).await.unwrap().as_capability::<Iconic>().unwrap();
    let (listener, seen) = recording_icon_listener();
    iconic.add_icon_listener(listener).await.unwrap();

    server.set_icon(id(1), "foo");
    wait_until("foo", || seen.lock().len() == 1).await;
    server.set_icon(id(1), "bar");
    wait_until("bar", || seen.lock().len() == 2).await;
    server.set_icon(id(1), "foo");
    wait_until("foo again", || seen.lock().len() == 3).await;

    assert_eq!(*seen.lock(), vec!["foo", "bar", "foo"]);
    assert_eq!(server.request_count(id(1), "iconForId"), 2);
}

// ============================================================================
// Structural and stateful
// ============================================================================

#[tokio::test]
async fn test_structural_synchronize_goes_to_new_listener_only() {
    let (server, conn) = connect();
    server.add_object(id(1), &[names::STRUCTURAL]);
    server.set_children(id(1), &[2, 3]);

    let structural =
        conn.session().get_or_create(id(1)).await.unwrap().as_capability::<Structural>().unwrap();

    let first_seen = Arc::new(Mutex::new(Vec::<Vec<RemoteId>>::new()));
    let sink = first_seen.clone();
    let first: StructuralListener = Arc::new(move |ids| sink.lock().push(ids.to_vec()));
    structural.add_structural_listener(first).await.unwrap();
    assert_eq!(*first_seen.lock(), vec![vec![id(2), id(3)]]);

    let second_seen = Arc::new(Mutex::new(Vec::<Vec<RemoteId>>::new()));
    let sink = second_seen.clone();
    let second: StructuralListener = Arc::new(move |ids| sink.lock().push(ids.to_vec()));
    structural.add_structural_listener(second).await.unwrap();

    assert_eq!(first_seen.lock().len(), 1);
    assert_eq!(*second_seen.lock(), vec![vec![id(2), id(3)]]);
    assert_eq!(server.subscriptions().len(), 1);

    server.set_children(id(1), &[3]);
    wait_until("both see [3]", || second_seen.lock().len() == 2 && first_seen.lock().len() == 2)
        .await;
    assert_eq!(first_seen.lock()[1], vec![id(3)]);
}

#[tokio::test]
async fn test_stateful_tracks_latest_state() {
    let (server, conn) = connect();
    server.add_object(id(7), &[names::STATEFUL]);
    server.set_state(id(7), JobState::Ready);

    let stateful = conn.session().get_or_create(id(7)).await.unwrap().as_capability::<Stateful>().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let listener: StateListener = Arc::new(move |data| sink.lock().push(data.state));
    stateful.add_state_listener(listener.clone()).await.unwrap();

    server.set_state(id(7), JobState::Executing);
    server.set_state(id(7), JobState::Complete);
    wait_until("complete", || seen.lock().last() == Some(&JobState::Complete)).await;

    assert_eq!(*seen.lock(), vec![JobState::Ready, JobState::Executing, JobState::Complete]);
    assert_eq!(stateful.current_state().unwrap().state, JobState::Complete);

    stateful.remove_state_listener(&listener).unwrap();
    assert!(stateful.current_state().is_none());
    assert!(!server.is_subscribed(id(7), names::STATE_CHANGED));
}

#[tokio::test]
async fn test_notification_for_unsubscribed_pair_is_dropped() {
    let (server, conn) = connect();
    serve_icons(&server);
    let _proxy = conn.session().get_or_create(id(1)).await.unwrap();

    // Nobody listens; the loopback does not deliver, and a stray message sent
    // anyway must not disturb the pump.
    server.set_icon(id(1), "foo");
    conn.session()
        .notifier()
        .dispatch_text(&serde_json::to_string(&server.set_icon(id(1), "bar")).unwrap())
        .unwrap();
    settle().await;
    assert!(conn.is_open());
}
