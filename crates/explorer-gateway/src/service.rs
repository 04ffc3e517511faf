//! Gateway service: builds the shared state, the public and admin routers,
//! and runs both endpoints until shutdown.

use crate::broker::EventBroker;
use crate::dispatch::Dispatcher;
use crate::domain::{GatewayConfig, GatewayError, Transport};
use crate::html::{self, TemplateStore};
use crate::middleware::{create_cors_layer, GatewayMetrics, TracingLayer};
use crate::rest;
use crate::sio;
use crate::state::{AppState, Backends, SharedState};
use crate::subscriptions::SubscriptionRegistry;
use crate::ws;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tracing::{error, info, warn};

/// Content type of the Prometheus text exposition
const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// The explorer gateway.
pub struct GatewayService {
    state: SharedState,
    broker: Arc<EventBroker>,
}

impl GatewayService {
    /// Validate `config` and wire the gateway to its backends.
    pub fn new(config: GatewayConfig, backends: Backends) -> Result<Self, GatewayError> {
        config.validate()?;

        let metrics = Arc::new(GatewayMetrics::new()?);
        let registry = Arc::new(SubscriptionRegistry::new(Arc::clone(&metrics)));
        let templates = TemplateStore::new(&config.explorer, config.debug)?;
        let broker = Arc::new(EventBroker::new(
            backends.clone(),
            Arc::clone(&registry),
            config.features.subscribe_new_tx,
        ));
        let state = Arc::new(AppState {
            dispatcher: Dispatcher::new(metrics, config.debug),
            config,
            backends,
            registry,
            templates,
        });
        Ok(Self { state, broker })
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Entry point for indexer events.
    pub fn broker(&self) -> Arc<EventBroker> {
        Arc::clone(&self.broker)
    }

    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(self.state.dispatcher.metrics())
    }

    /// Public endpoint: REST, explorer, `/websocket` and `/socket.io/`.
    pub fn router(&self) -> Router {
        let config = &self.state.config;
        let supports_v1 = self.state.backends.codec.capabilities().supports_v1;

        let mut router = rest::router(supports_v1);
        if config.explorer.enabled {
            router = router.merge(html::router());
        }
        if config.websocket.enabled {
            router = router.route("/websocket", get(ws::ws_upgrade));
        }
        if config.socketio.enabled {
            router = router
                .route("/socket.io", get(sio::sio_endpoint))
                .route("/socket.io/", get(sio::sio_endpoint));
        }

        let middleware = ServiceBuilder::new()
            .layer(create_cors_layer(&config.cors))
            .layer(TracingLayer::new());

        router.layer(middleware).with_state(Arc::clone(&self.state))
    }

    /// Internal endpoint: `/health` and `/metrics`.
    pub fn admin_router(&self) -> Router {
        let health_state = Arc::clone(&self.state);
        let metrics_state = Arc::clone(&self.state);
        Router::new()
            .route(
                "/health",
                get(move || {
                    let state = Arc::clone(&health_state);
                    async move { health(&state) }
                }),
            )
            .route(
                "/metrics",
                get(move || {
                    let state = Arc::clone(&metrics_state);
                    async move { metrics(&state) }
                }),
            )
    }

    /// Serve the enabled endpoints until `shutdown` resolves, then stop
    /// accepting, close every client and wait at most `shutdown_timeout`
    /// for in-flight work.
    pub async fn run<S>(self, shutdown: S) -> Result<(), GatewayError>
    where
        S: Future<Output = ()> + Send,
    {
        let config = &self.state.config;
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut servers = Vec::new();

        if config.http.enabled {
            let addr = config.http_addr();
            let listener = bind(addr).await?;
            info!(addr = %addr, "Starting public endpoint");
            let app = self.router().into_make_service_with_connect_info::<SocketAddr>();
            let mut stop = stop_rx.clone();
            servers.push(tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = stop.wait_for(|s| *s).await;
                    })
                    .await
            }));
        }

        if config.admin.enabled {
            let addr = config.admin_addr();
            let listener = bind(addr).await?;
            info!(addr = %addr, "Starting admin endpoint");
            let app = self.admin_router();
            let mut stop = stop_rx.clone();
            servers.push(tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move {
                        let _ = stop.wait_for(|s| *s).await;
                    })
                    .await
            }));
        }

        info!("Explorer gateway started");
        shutdown.await;
        info!("Shutting down explorer gateway");

        let _ = stop_tx.send(true);
        self.state.registry.close_all();

        match tokio::time::timeout(config.shutdown_timeout, futures::future::join_all(servers)).await {
            Ok(results) => {
                for result in results {
                    match result {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => error!(error = %e, "Server error"),
                        Err(e) => error!(error = %e, "Server task failed"),
                    }
                }
            }
            Err(_) => warn!(
                timeout = ?config.shutdown_timeout,
                "Shutdown timeout elapsed with requests in flight"
            ),
        }

        info!("Explorer gateway stopped");
        Ok(())
    }
}

async fn bind(addr: SocketAddr) -> Result<TcpListener, GatewayError> {
    TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::Bind(format!("{}: {}", addr, e)))
}

fn health(state: &SharedState) -> Response {
    let registry = &state.registry;
    Json(json!({
        "status": "ok",
        "connections": {
            "websocket": registry.connection_count(Transport::WebSocket),
            "socketio": registry.connection_count(Transport::SocketIo),
        },
        "subscriptions": registry.counts(),
        "mempoolSize": state.backends.mempool.size(),
        "lastTickerTime": state.backends.rates.current_ticker().map(|t| t.timestamp),
    }))
    .into_response()
}

fn metrics(state: &SharedState) -> Response {
    match state.dispatcher.metrics().encode() {
        Ok(text) => ([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], text).into_response(),
        Err(e) => {
            error!(error = %e, "Metrics encoding failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
