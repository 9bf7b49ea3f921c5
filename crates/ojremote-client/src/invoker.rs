//! Remote method invocation.
//!
//! Two seams: [`Transport`] moves bytes (an HTTP POST in production), and
//! [`Invoker`] turns an [`InvokeRequest`] into an [`InvokeResponse`].
//! [`HttpInvoker`] is the JSON codec between them and the place where every
//! malformed exchange becomes a [`RemoteError`].

use std::sync::Arc;

use async_trait::async_trait;
use ojremote_types::{InvokeRequest, InvokeResponse};
use serde_json::Value;
use tracing::trace;

use crate::constants::HTTP_OK;
use crate::error::{RemoteError, Result};

/// Raw transport reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self { status: HTTP_OK, body: body.into() }
    }
}

/// Request/response byte transport.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, body: String) -> Result<TransportResponse>;
}

/// Sends one remote call and awaits its typed response.
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, request: InvokeRequest) -> Result<InvokeResponse>;
}

/// JSON-over-[`Transport`] invoker.
pub struct HttpInvoker {
    transport: Arc<dyn Transport>,
}

impl HttpInvoker {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl Invoker for HttpInvoker {
    async fn invoke(&self, request: InvokeRequest) -> Result<InvokeResponse> {
        let body = serde_json::to_string(&request)?;
        trace!(
            remote_id = %request.remote_id,
            op = %request.operation_type.name,
            "invoke"
        );
        let reply = self.transport.post(body).await?;
        if reply.status != HTTP_OK {
            return Err(RemoteError::HttpStatus { status: reply.status, body: reply.body });
        }
        decode_response(&reply.body)
    }
}

/// Parse and validate a response body.
pub fn decode_response(body: &str) -> Result<InvokeResponse> {
    if body.trim().is_empty() {
        return Err(RemoteError::EmptyBody);
    }
    let value: Value = serde_json::from_str(body)
        .map_err(|e| RemoteError::malformed(format!("not JSON: {e}")))?;
    match value.get("type") {
        Some(Value::String(_)) => {}
        _ => return Err(RemoteError::malformed(format!("no type in {body}"))),
    }
    serde_json::from_value(value).map_err(|e| RemoteError::malformed(e.to_string()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ojremote_types::{OperationType, RemoteId};
    use parking_lot::Mutex;
    use serde_json::json;

    /// Replies with a canned response and remembers what it was sent.
    struct CannedTransport {
        reply: TransportResponse,
        sent: Mutex<Vec<String>>,
    }

    impl CannedTransport {
        fn new(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: TransportResponse { status, body: body.to_string() },
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for CannedTransport {
        async fn post(&self, body: String) -> Result<TransportResponse> {
            self.sent.lock().push(body);
            Ok(self.reply.clone())
        }
    }

    fn request() -> InvokeRequest {
        InvokeRequest {
            remote_id: RemoteId::new(3),
            operation_type: OperationType::new("toString", "java.lang.String", Vec::<String>::new()),
            args: vec![],
            arg_types: None,
        }
    }

    #[tokio::test]
    async fn test_success_decodes_value() {
        let transport = CannedTransport::new(200, r#"{"type":"java.lang.String","value":"Echo"}"#);
        let invoker = HttpInvoker::new(transport.clone());

        let response = invoker.invoke(request()).await.unwrap();
        assert_eq!(response.type_name, "java.lang.String");
        assert_eq!(response.value, Some(json!("Echo")));

        let sent: Value = serde_json::from_str(&transport.sent.lock()[0]).unwrap();
        assert_eq!(sent["remoteId"], json!(3));
        assert_eq!(sent["operationType"]["name"], json!("toString"));
        assert!(sent.get("argTypes").is_none());
    }

    #[tokio::test]
    async fn test_non_success_status_fails() {
        let invoker = HttpInvoker::new(CannedTransport::new(500, "boom"));
        let err = invoker.invoke(request()).await.unwrap_err();
        assert!(matches!(err, RemoteError::HttpStatus { status: 500, .. }));
        assert!(err.is_protocol_violation());
    }

    #[tokio::test]
    async fn test_empty_body_fails() {
        let invoker = HttpInvoker::new(CannedTransport::new(200, "  "));
        assert!(matches!(invoker.invoke(request()).await, Err(RemoteError::EmptyBody)));
    }

    #[test]
    fn test_body_without_type_is_malformed() {
        assert!(matches!(decode_response(r#"{"value":1}"#), Err(RemoteError::MalformedResponse(_))));
        assert!(matches!(decode_response("[1,2]"), Err(RemoteError::MalformedResponse(_))));
        assert!(matches!(decode_response("not json"), Err(RemoteError::MalformedResponse(_))));
        assert!(matches!(decode_response(r#"{"type":7}"#), Err(RemoteError::MalformedResponse(_))));
    }

    #[test]
    fn test_void_response_has_no_value() {
        let response = decode_response(r#"{"type":"void"}"#).unwrap();
        assert_eq!(response, InvokeResponse::void());
    }
}
