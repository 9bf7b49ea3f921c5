//! In-memory server for tests and the demo.
//!
//! [`LoopbackServer`] answers invoke requests from a script and plays the
//! server end of the notification channel: it records subscriptions, keeps
//! the last fired notification per `(remote id, type)` for `synchronize`, and
//! pushes notifications to subscribed clients.
//!
//! Resolution order for a request: a one-shot failure set with
//! [`LoopbackServer::fail_next`], then `serverInfo` for known objects, then a
//! response scripted for the first argument, then one scripted for the
//! operation, then the built-in `synchronize`. Unknown objects get 404 and
//! unscripted operations 500.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use ojremote_types::{
    Implementation, InvokeRequest, InvokeResponse, JobState, NotificationMessage,
    NotificationType, RemoteId, ServerInfo, StateData, StructuralData, SubscriptionAction,
    SubscriptionMessage, names,
};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Semaphore, mpsc};

use crate::config::SessionConfig;
use crate::connection::RemoteConnection;
use crate::constants::{DESCRIBE_OPERATION, SYNCHRONIZE_OPERATION};
use crate::error::{RemoteError, Result};
use crate::invoker::{Transport, TransportResponse};
use crate::notifier::Channel;
use crate::registry::CapabilityRegistry;

type OpKey = (RemoteId, String);

/// Holds matching requests until released.
#[derive(Clone)]
pub struct Gate {
    semaphore: Arc<Semaphore>,
}

impl Gate {
    fn new() -> Self {
        Self { semaphore: Arc::new(Semaphore::new(0)) }
    }

    /// Let every held and future matching request through.
    pub fn release(&self) {
        self.semaphore.close();
    }

    async fn pass(&self) {
        // Acquire only fails once the gate is closed.
        let _ = self.semaphore.acquire().await;
    }
}

#[derive(Default)]
struct ServerState {
    objects: HashMap<RemoteId, Vec<String>>,
    by_op: HashMap<OpKey, InvokeResponse>,
    by_arg: HashMap<OpKey, Vec<(Value, InvokeResponse)>>,
    gates: HashMap<OpKey, Vec<(Option<Value>, Gate)>>,
    fail_next: Option<TransportResponse>,
    requests: Vec<InvokeRequest>,
    describes: HashMap<RemoteId, usize>,
    subscriptions: Vec<SubscriptionMessage>,
    active: HashSet<OpKey>,
    last_fired: HashMap<OpKey, NotificationMessage>,
    sequence: u64,
}

impl ServerState {
    fn scripted(&self, request: &InvokeRequest) -> Option<InvokeResponse> {
        let key = (request.remote_id, request.operation_type.name.clone());
        let by_arg = request.args.first().and_then(|first| {
            self.by_arg
                .get(&key)?
                .iter()
                .find(|(arg, _)| arg == first)
                .map(|(_, response)| response.clone())
        });
        by_arg.or_else(|| self.by_op.get(&key).cloned())
    }

    fn gate(&self, request: &InvokeRequest) -> Option<Gate> {
        let key = (request.remote_id, request.operation_type.name.clone());
        self.gates.get(&key)?.iter().find_map(|(arg, gate)| match arg {
            None => Some(gate.clone()),
            Some(arg) => (request.args.first() == Some(arg)).then(|| gate.clone()),
        })
    }
}

pub struct LoopbackServer {
    state: Mutex<ServerState>,
    outbound: mpsc::UnboundedSender<String>,
}

impl LoopbackServer {
    /// A server plus the receiver a client reads notifications from.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (outbound, inbound) = mpsc::unbounded_channel();
        let server = Arc::new(Self { state: Mutex::new(ServerState::default()), outbound });
        (server, inbound)
    }

    // ── Scripting ────────────────────────────────────────────────────────

    /// Expose an object advertising `capabilities` (wire names).
    pub fn add_object(&self, remote_id: RemoteId, capabilities: &[&str]) {
        self.state
            .lock()
            .objects
            .insert(remote_id, capabilities.iter().map(|c| c.to_string()).collect());
    }

    pub fn remove_object(&self, remote_id: RemoteId) {
        self.state.lock().objects.remove(&remote_id);
    }

    pub fn respond(&self, remote_id: RemoteId, op: &str, response: InvokeResponse) {
        self.state.lock().by_op.insert((remote_id, op.to_string()), response);
    }

    /// Respond to `op` only when its first argument equals `arg`.
    pub fn respond_to_arg(&self, remote_id: RemoteId, op: &str, arg: Value, response: InvokeResponse) {
        let mut state = self.state.lock();
        let scripted = state.by_arg.entry((remote_id, op.to_string())).or_default();
        scripted.retain(|(a, _)| a != &arg);
        scripted.push((arg, response));
    }

    pub fn respond_value<T: Serialize>(&self, remote_id: RemoteId, op: &str, type_name: &str, value: &T) {
        let value = serde_json::to_value(value).ok();
        self.respond(remote_id, op, InvokeResponse::new(type_name, value));
    }

    /// Hold requests for `op` (and, if given, first argument `arg`) until the
    /// returned gate is released.
    pub fn hold(&self, remote_id: RemoteId, op: &str, arg: Option<Value>) -> Gate {
        let gate = Gate::new();
        self.state
            .lock()
            .gates
            .entry((remote_id, op.to_string()))
            .or_default()
            .push((arg, gate.clone()));
        gate
    }

    /// Answer the next request with this raw reply.
    pub fn fail_next(&self, reply: TransportResponse) {
        self.state.lock().fail_next = Some(reply);
    }

    // ── Notifications ────────────────────────────────────────────────────

    /// Fire a notification with an explicit sequence. Delivered only while a
    /// client is subscribed; always remembered for `synchronize`.
    pub fn fire(
        &self,
        remote_id: RemoteId,
        notification_type: NotificationType,
        sequence: u64,
        data: Value,
    ) -> NotificationMessage {
        let message = NotificationMessage { remote_id, notification_type, sequence, data: Some(data) };
        let key = (remote_id, message.notification_type.name.clone());
        let deliver = {
            let mut state = self.state.lock();
            state.sequence = state.sequence.max(sequence);
            state.last_fired.insert(key.clone(), message.clone());
            state.active.contains(&key)
        };
        if deliver {
            if let Ok(text) = serde_json::to_string(&message) {
                let _ = self.outbound.send(text);
            }
        }
        message
    }

    /// Fire with the next sequence number.
    pub fn notify(
        &self,
        remote_id: RemoteId,
        notification_type: NotificationType,
        data: Value,
    ) -> NotificationMessage {
        let sequence = self.state.lock().sequence + 1;
        self.fire(remote_id, notification_type, sequence, data)
    }

    pub fn set_children(&self, remote_id: RemoteId, children: &[u64]) -> NotificationMessage {
        let data = StructuralData::new(children.iter().copied().map(RemoteId::new));
        self.notify(
            remote_id,
            NotificationType::new(names::CHILDREN_CHANGED, names::STRUCTURAL_DATA),
            serde_json::json!(data),
        )
    }

    pub fn set_icon(&self, remote_id: RemoteId, icon_id: &str) -> NotificationMessage {
        self.notify(
            remote_id,
            NotificationType::new(names::ICON_CHANGED, names::STRING),
            Value::String(icon_id.to_string()),
        )
    }

    pub fn set_state(&self, remote_id: RemoteId, job_state: JobState) -> NotificationMessage {
        let data = StateData { state: job_state, time: 0, exception: None };
        self.notify(
            remote_id,
            NotificationType::new(names::STATE_CHANGED, names::STATE_DATA),
            serde_json::json!(data),
        )
    }

    // ── Inspection ───────────────────────────────────────────────────────

    pub fn requests(&self) -> Vec<InvokeRequest> {
        self.state.lock().requests.clone()
    }

    /// How many requests named `op` were made against `remote_id`.
    pub fn request_count(&self, remote_id: RemoteId, op: &str) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| r.remote_id == remote_id && r.operation_type.name == op)
            .count()
    }

    pub fn describe_count(&self, remote_id: RemoteId) -> usize {
        self.state.lock().describes.get(&remote_id).copied().unwrap_or(0)
    }

    pub fn subscriptions(&self) -> Vec<SubscriptionMessage> {
        self.state.lock().subscriptions.clone()
    }

    pub fn is_subscribed(&self, remote_id: RemoteId, type_name: &str) -> bool {
        self.state.lock().active.contains(&(remote_id, type_name.to_string()))
    }

    fn answer(&self, request: &InvokeRequest) -> TransportResponse {
        let mut state = self.state.lock();
        if let Some(reply) = state.fail_next.take() {
            return reply;
        }
        let Some(capabilities) = state.objects.get(&request.remote_id).cloned() else {
            return TransportResponse { status: 404, body: format!("no object {}", request.remote_id) };
        };

        let op = request.operation_type.name.as_str();
        let response = if op == DESCRIBE_OPERATION {
            *state.describes.entry(request.remote_id).or_default() += 1;
            let info = ServerInfo {
                implementations: capabilities
                    .iter()
                    .map(|c| Implementation::new(c.as_str(), "1.0"))
                    .collect(),
            };
            Some(InvokeResponse::new(names::SERVER_INFO, serde_json::to_value(info).ok()))
        } else if let Some(scripted) = state.scripted(request) {
            Some(scripted)
        } else if op == SYNCHRONIZE_OPERATION {
            let type_name = request.args.first().and_then(Value::as_str).unwrap_or_default();
            let last = state.last_fired.get(&(request.remote_id, type_name.to_string()));
            Some(InvokeResponse::new(
                names::NOTIFICATION,
                last.and_then(|m| serde_json::to_value(m).ok()),
            ))
        } else {
            None
        };

        match response.map(|r| serde_json::to_string(&r)) {
            Some(Ok(body)) => TransportResponse::ok(body),
            Some(Err(e)) => TransportResponse { status: 500, body: e.to_string() },
            None => TransportResponse { status: 500, body: format!("no script for {op}") },
        }
    }
}

#[async_trait]
impl Transport for LoopbackServer {
    async fn post(&self, body: String) -> Result<TransportResponse> {
        let request: InvokeRequest = match serde_json::from_str(&body) {
            Ok(r) => r,
            Err(e) => return Ok(TransportResponse { status: 400, body: e.to_string() }),
        };
        let gate = {
            let mut state = self.state.lock();
            state.requests.push(request.clone());
            state.gate(&request)
        };
        if let Some(gate) = gate {
            gate.pass().await;
        }
        Ok(self.answer(&request))
    }
}

impl Channel for LoopbackServer {
    fn send(&self, text: String) -> Result<()> {
        let message: SubscriptionMessage =
            serde_json::from_str(&text).map_err(|e| RemoteError::Transport(e.to_string()))?;
        let mut state = self.state.lock();
        let key = (message.remote_id, message.notification_type.name.clone());
        match message.action {
            SubscriptionAction::Add => state.active.insert(key),
            SubscriptionAction::Remove => state.active.remove(&key),
        };
        state.subscriptions.push(message);
        Ok(())
    }
}

/// A loopback server and a connection to it.
pub fn connect(
    registry: CapabilityRegistry,
    config: SessionConfig,
) -> (Arc<LoopbackServer>, RemoteConnection) {
    let (server, inbound) = LoopbackServer::new();
    let connection =
        RemoteConnection::open(server.clone(), server.clone(), inbound, registry, config);
    (server, connection)
}
