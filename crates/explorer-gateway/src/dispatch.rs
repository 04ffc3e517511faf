//! Request dispatcher.
//!
//! Every handler of every transport runs through [`Dispatcher::run`]. It
//! raises the pending gauge, catches panics, logs non-public failures and
//! records the outcome, so handlers stay plain `async fn -> ApiResult<T>`.
//! Each transport then turns a [`Failure`] into its own wire shape.

use crate::domain::{error_data, Transport};
use crate::middleware::GatewayMetrics;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use explorer_types::{ApiError, ApiResult};
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::error;

/// Content type of every JSON response
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Why a handler produced no payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Failure {
    /// The handler returned an error.
    Api(ApiError),
    /// The handler panicked; carries the panic value.
    Panic(String),
}

impl Failure {
    pub fn is_public(&self) -> bool {
        matches!(self, Failure::Api(e) if e.is_public())
    }

    /// Text for a REST error body.
    pub fn http_message(&self, debug: bool) -> String {
        match self {
            Failure::Api(e) if e.is_public() => e.message.clone(),
            Failure::Api(e) if debug => format!("Internal server error: {}", e.message),
            Failure::Panic(p) if debug => {
                format!("Internal server error: recovered from panic {}", p)
            }
            _ => "Internal server error".to_string(),
        }
    }

    /// Text for a WebSocket or Socket.IO error envelope.
    pub fn envelope_message(&self, debug: bool) -> String {
        match self {
            Failure::Api(e) if e.is_public() => e.message.clone(),
            Failure::Api(e) if debug => format!("Internal error: {}", e.message),
            Failure::Panic(p) if debug => format!("Internal error: recovered from panic {}", p),
            _ => "Internal error".to_string(),
        }
    }

    /// HTTP status of a REST error
    pub fn status(&self) -> StatusCode {
        if self.is_public() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    fn metric_status(&self) -> &'static str {
        match self {
            Failure::Api(e) if e.is_public() => "error",
            Failure::Api(_) => "internal",
            Failure::Panic(_) => "panic",
        }
    }
}

/// Shared dispatch policy
#[derive(Clone)]
pub struct Dispatcher {
    metrics: Arc<GatewayMetrics>,
    debug: bool,
}

impl Dispatcher {
    pub fn new(metrics: Arc<GatewayMetrics>, debug: bool) -> Self {
        Self { metrics, debug }
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn metrics(&self) -> &Arc<GatewayMetrics> {
        &self.metrics
    }

    /// Run one handler invocation.
    pub async fn run<T, F>(&self, transport: Transport, method: &str, handler: F) -> Result<T, Failure>
    where
        F: Future<Output = ApiResult<T>>,
    {
        let timer = self.metrics.start_request(transport, method);
        let outcome = match AssertUnwindSafe(handler).catch_unwind().await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) => Err(Failure::Api(e)),
            Err(panic) => Err(Failure::Panic(panic_message(panic.as_ref()))),
        };
        match &outcome {
            Ok(_) => timer.finish("ok"),
            Err(failure) => {
                match failure {
                    Failure::Api(e) if !e.is_public() => {
                        error!(transport = %transport, method = %method, error = %e.message, "Handler failed");
                    }
                    Failure::Panic(p) => {
                        error!(transport = %transport, method = %method, panic = %p, "Recovered from panic");
                    }
                    _ => {}
                }
                timer.finish(failure.metric_status());
            }
        }
        outcome
    }

    /// Run a REST handler and encode its result as JSON.
    pub async fn json<T, F>(&self, method: &str, handler: F) -> Response
    where
        T: Serialize,
        F: Future<Output = ApiResult<T>>,
    {
        self.metrics.record_view(method);
        match self.run(Transport::Api, method, handler).await {
            Ok(payload) => json_response(StatusCode::OK, &payload),
            Err(failure) => json_response(
                failure.status(),
                &serde_json::json!({ "error": failure.http_message(self.debug) }),
            ),
        }
    }

    /// Run a WebSocket or Socket.IO handler; failures become the error
    /// envelope `{"error":{"message":...}}`.
    pub async fn envelope<T, F>(&self, transport: Transport, method: &str, handler: F) -> serde_json::Value
    where
        T: Serialize,
        F: Future<Output = ApiResult<T>>,
    {
        match self.run(transport, method, handler).await {
            Ok(payload) => match serde_json::to_value(payload) {
                Ok(v) => v,
                Err(e) => {
                    error!(transport = %transport, method = %method, error = %e, "Encode failed");
                    error_data(&Failure::Api(ApiError::internal(e.to_string())).envelope_message(self.debug))
                }
            },
            Err(failure) => error_data(&failure.envelope_message(self.debug)),
        }
    }
}

/// Serialize `payload` with the JSON content type set before the status.
pub fn json_response<T: Serialize>(status: StatusCode, payload: &T) -> Response {
    match serde_json::to_vec(payload) {
        Ok(body) => {
            let mut res = (status, body).into_response();
            res.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(JSON_CONTENT_TYPE),
            );
            res
        }
        Err(e) => {
            error!(error = %e, "Response encode failed");
            let mut res = (
                StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"error":"Internal server error"}"#,
            )
                .into_response();
            res.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(JSON_CONTENT_TYPE),
            );
            res
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    fn dispatcher(debug: bool) -> Dispatcher {
        Dispatcher::new(Arc::new(GatewayMetrics::new().unwrap()), debug)
    }

    async fn boom() -> ApiResult<()> {
        panic!("boom")
    }

    async fn body_json(res: Response) -> serde_json::Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_public_error_is_400() {
        let d = dispatcher(false);
        let res = d
            .json("api-tx", async { Err::<(), _>(ApiError::public("Missing txid")) })
            .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            res.headers().get(header::CONTENT_TYPE).unwrap(),
            JSON_CONTENT_TYPE
        );
        assert_eq!(body_json(res).await, serde_json::json!({"error": "Missing txid"}));
    }

    #[tokio::test]
    async fn test_internal_error_is_hidden() {
        let d = dispatcher(false);
        let res = d
            .json("api-tx", async { Err::<(), _>(ApiError::internal("db is down")) })
            .await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(res).await,
            serde_json::json!({"error": "Internal server error"})
        );

        let d = dispatcher(true);
        let res = d
            .json("api-tx", async { Err::<(), _>(ApiError::internal("db is down")) })
            .await;
        assert_eq!(
            body_json(res).await,
            serde_json::json!({"error": "Internal server error: db is down"})
        );
    }

    #[tokio::test]
    async fn test_panic_is_recovered() {
        let d = dispatcher(true);
        let res = d.json("api-tx", boom()).await;
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(res).await,
            serde_json::json!({"error": "Internal server error: recovered from panic boom"})
        );
        assert_eq!(d.metrics().pending(Transport::Api, "api-tx"), 0);
        assert_eq!(d.metrics().requests(Transport::Api, "api-tx", "panic"), 1);
    }

    #[tokio::test]
    async fn test_envelope_shapes() {
        let d = dispatcher(false);
        let ok = d
            .envelope(Transport::WebSocket, "ping", async {
                Ok::<_, ApiError>(serde_json::json!({}))
            })
            .await;
        assert_eq!(ok, serde_json::json!({}));

        let public = d
            .envelope(Transport::WebSocket, "getTransaction", async {
                Err::<(), _>(ApiError::tx_not_found("not a tx"))
            })
            .await;
        assert_eq!(
            public,
            serde_json::json!({"error": {"message": "Transaction 'not a tx' not found"}})
        );

        let panicked = d.envelope(Transport::SocketIo, "getInfo", boom()).await;
        assert_eq!(
            panicked,
            serde_json::json!({"error": {"message": "Internal error"}})
        );
        assert_eq!(d.metrics().pending(Transport::SocketIo, "getInfo"), 0);
    }

    #[test]
    fn test_unsupported_is_public() {
        let f = Failure::Api(ApiError::xpub_unsupported());
        assert_eq!(f.status(), StatusCode::BAD_REQUEST);
        assert_eq!(f.http_message(false), "XPUB functionality is not supported");
    }
}
