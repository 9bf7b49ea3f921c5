//! Per-proxy invocation toolkit.
//!
//! Every handler talks to the server through a [`ClientToolkit`] bound to its
//! proxy's remote id. The toolkit marshals arguments (remote proxies travel as
//! transportable references), applies the session's invocation deadline, and
//! resolves transportable results back into live proxies.

use std::sync::{Arc, Weak};
use std::time::Duration;

use ojremote_types::{
    InvokeRequest, NotificationType, OperationType, RemoteId, TransportableRef, names,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{Instrument, debug_span};

use crate::error::{RemoteError, Result};
use crate::invoker::Invoker;
use crate::notifier::{NotificationListener, Notifier};
use crate::proxy::RemoteProxy;
use crate::session::SessionInner;

/// One argument of a remote call.
#[derive(Clone, Debug)]
pub enum Arg {
    Value(Value),
    /// Sent as a transportable reference to the proxy's remote id.
    Proxy(Arc<RemoteProxy>),
}

impl From<Value> for Arg {
    fn from(value: Value) -> Self {
        Arg::Value(value)
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Value(Value::String(value.to_string()))
    }
}

impl From<Arc<RemoteProxy>> for Arg {
    fn from(proxy: Arc<RemoteProxy>) -> Self {
        Arg::Proxy(proxy)
    }
}

impl From<&Arc<RemoteProxy>> for Arg {
    fn from(proxy: &Arc<RemoteProxy>) -> Self {
        Arg::Proxy(proxy.clone())
    }
}

/// Result of a remote call before the caller picks a static type.
#[derive(Clone, Debug)]
pub enum Returned {
    Value(Option<Value>),
    Proxy(Arc<RemoteProxy>),
}

#[derive(Clone)]
pub struct ClientToolkit {
    remote_id: RemoteId,
    session: Weak<SessionInner>,
    invoker: Arc<dyn Invoker>,
    notifier: Arc<Notifier>,
    timeout: Option<Duration>,
}

impl ClientToolkit {
    pub(crate) fn new(
        remote_id: RemoteId,
        session: Weak<SessionInner>,
        invoker: Arc<dyn Invoker>,
        notifier: Arc<Notifier>,
        timeout: Option<Duration>,
    ) -> Self {
        Self { remote_id, session, invoker, notifier, timeout }
    }

    pub fn remote_id(&self) -> RemoteId {
        self.remote_id
    }

    /// Invoke and deserialize an inline value.
    ///
    /// A void or absent value deserializes from `null`, so `()` and `Option<_>`
    /// both work as result types.
    pub async fn invoke<T: DeserializeOwned>(
        &self,
        operation: &OperationType,
        args: Vec<Arg>,
    ) -> Result<T> {
        match self.invoke_returning(operation, args).await? {
            Returned::Value(value) => Ok(serde_json::from_value(value.unwrap_or(Value::Null))?),
            Returned::Proxy(proxy) => Err(RemoteError::protocol(format!(
                "{} returned remote {} where a value was expected",
                operation.name,
                proxy.remote_id()
            ))),
        }
    }

    /// Invoke an operation whose result is itself a remote object.
    pub async fn invoke_for_proxy(
        &self,
        operation: &OperationType,
        args: Vec<Arg>,
    ) -> Result<Arc<RemoteProxy>> {
        match self.invoke_returning(operation, args).await? {
            Returned::Proxy(proxy) => Ok(proxy),
            Returned::Value(_) => Err(RemoteError::protocol(format!(
                "{} returned a value where a remote was expected",
                operation.name
            ))),
        }
    }

    /// Invoke under the session's configured deadline, if any.
    pub async fn invoke_returning(
        &self,
        operation: &OperationType,
        args: Vec<Arg>,
    ) -> Result<Returned> {
        match self.timeout {
            Some(deadline) => self.invoke_within(operation, args, deadline).await,
            None => self.call(operation, args).await,
        }
    }

    /// Invoke with an explicit deadline, overriding the session's.
    pub async fn invoke_within(
        &self,
        operation: &OperationType,
        args: Vec<Arg>,
        deadline: Duration,
    ) -> Result<Returned> {
        tokio::time::timeout(deadline, self.call(operation, args))
            .await
            .map_err(|_| RemoteError::Timeout { op: operation.name.clone(), after: deadline })?
    }

    async fn call(&self, operation: &OperationType, args: Vec<Arg>) -> Result<Returned> {
        let request = marshal(self.remote_id, operation, args);
        let span = debug_span!("invoke.call", remote_id = %self.remote_id, op = %operation.name);
        let response = self.invoker.invoke(request).instrument(span).await?;

        if response.type_name != names::TRANSPORTABLE {
            return Ok(Returned::Value(response.value));
        }
        let value = response
            .value
            .ok_or_else(|| RemoteError::malformed("transportable response without value"))?;
        let reference: TransportableRef = serde_json::from_value(value)
            .map_err(|e| RemoteError::malformed(format!("bad transportable: {e}")))?;
        let session = self.session.upgrade().ok_or(RemoteError::SessionClosed)?;
        session
            .proxy(reference.remote_id)
            .map(Returned::Proxy)
            .ok_or(RemoteError::NoRemote(reference.remote_id))
    }

    pub fn add_notification_listener(
        &self,
        notification_type: &NotificationType,
        listener: NotificationListener,
    ) -> Result<()> {
        self.notifier
            .add_notification_listener(self.remote_id, notification_type, listener)
    }

    pub fn remove_notification_listener(
        &self,
        notification_type: &NotificationType,
        listener: &NotificationListener,
    ) -> Result<()> {
        self.notifier
            .remove_notification_listener(self.remote_id, notification_type, listener)
    }
}

/// Build the wire request. `argTypes` is only sent when a proxy argument was
/// replaced by a transportable reference.
fn marshal(remote_id: RemoteId, operation: &OperationType, args: Vec<Arg>) -> InvokeRequest {
    let mut values = Vec::with_capacity(args.len());
    let mut types = Vec::with_capacity(args.len());
    let mut substituted = false;

    for (i, arg) in args.into_iter().enumerate() {
        match arg {
            Arg::Value(value) => {
                values.push(value);
                types.push(
                    operation
                        .signature
                        .get(i)
                        .cloned()
                        .unwrap_or_else(|| names::OBJECT.to_string()),
                );
            }
            Arg::Proxy(proxy) => {
                let reference = TransportableRef { remote_id: proxy.remote_id() };
                values.push(serde_json::json!(reference));
                types.push(names::TRANSPORTABLE.to_string());
                substituted = true;
            }
        }
    }

    InvokeRequest {
        remote_id,
        operation_type: operation.clone(),
        args: values,
        arg_types: substituted.then_some(types),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::HandlerManager;
    use serde_json::json;

    fn op() -> OperationType {
        OperationType::new("setJob", names::VOID, [names::STRING, "org.oddjob.Job"])
    }

    #[test]
    fn test_plain_args_have_no_arg_types() {
        let request = marshal(RemoteId::new(1), &op(), vec![Arg::from("a"), json!(2).into()]);
        assert_eq!(request.args, vec![json!("a"), json!(2)]);
        assert!(request.arg_types.is_none());
    }

    #[test]
    fn test_proxy_arg_becomes_transportable() {
        let proxy = Arc::new(RemoteProxy::new(RemoteId::new(42), HandlerManager::default()));
        let request = marshal(RemoteId::new(1), &op(), vec![Arg::from("a"), proxy.into()]);

        assert_eq!(request.args[1], json!({"remoteId": 42}));
        assert_eq!(
            request.arg_types,
            Some(vec![names::STRING.to_string(), names::TRANSPORTABLE.to_string()])
        );
        assert_eq!(request.operation_type.signature[1], "org.oddjob.Job");
    }

    #[test]
    fn test_missing_signature_entry_defaults_to_object() {
        let bare = OperationType::new("call", names::VOID, Vec::<String>::new());
        let proxy = Arc::new(RemoteProxy::new(RemoteId::new(5), HandlerManager::default()));
        let request = marshal(RemoteId::new(1), &bare, vec![json!(true).into(), proxy.into()]);
        assert_eq!(
            request.arg_types,
            Some(vec![names::OBJECT.to_string(), names::TRANSPORTABLE.to_string()])
        );
    }
}
