//! Prometheus metrics for the gateway.
//!
//! ## Metrics Exported
//!
//! - `explorer_gateway_requests_total{transport,method,status}` - Handled requests
//! - `explorer_gateway_request_duration_us{transport,method}` - Handler latency in microseconds
//! - `explorer_gateway_pending_requests{transport,method}` - Requests currently in a handler
//! - `explorer_gateway_clients{transport}` - Open WebSocket and Socket.IO connections
//! - `explorer_gateway_subscriptions{method}` - Size of each subscription relation
//! - `explorer_gateway_views_total{action}` - REST and explorer page views
//! - `explorer_gateway_sio_subscribes_total{channel,status}` - Socket.IO room joins
//!
//! The registry is owned, not global, so several gateways can live in one
//! process.

use crate::domain::{GatewayError, Transport};
use prometheus::{
    exponential_buckets, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;

const NAMESPACE: &str = "explorer_gateway";

/// Gateway metric families
pub struct GatewayMetrics {
    registry: Registry,
    requests_total: IntCounterVec,
    request_duration_us: HistogramVec,
    pending_requests: IntGaugeVec,
    clients: IntGaugeVec,
    subscriptions: IntGaugeVec,
    views_total: IntCounterVec,
    sio_subscribes_total: IntCounterVec,
}

impl GatewayMetrics {
    pub fn new() -> Result<Self, GatewayError> {
        let registry = Registry::new();

        let requests_total = IntCounterVec::new(
            Opts::new("requests_total", "Handled requests").namespace(NAMESPACE),
            &["transport", "method", "status"],
        )?;
        let request_duration_us = HistogramVec::new(
            HistogramOpts::new("request_duration_us", "Handler latency in microseconds")
                .namespace(NAMESPACE)
                .buckets(exponential_buckets(50.0, 4.0, 10)?),
            &["transport", "method"],
        )?;
        let pending_requests = IntGaugeVec::new(
            Opts::new("pending_requests", "Requests currently in a handler").namespace(NAMESPACE),
            &["transport", "method"],
        )?;
        let clients = IntGaugeVec::new(
            Opts::new("clients", "Open streaming connections").namespace(NAMESPACE),
            &["transport"],
        )?;
        let subscriptions = IntGaugeVec::new(
            Opts::new("subscriptions", "Subscribers per subscription relation")
                .namespace(NAMESPACE),
            &["method"],
        )?;
        let views_total = IntCounterVec::new(
            Opts::new("views_total", "REST and explorer page views").namespace(NAMESPACE),
            &["action"],
        )?;
        let sio_subscribes_total = IntCounterVec::new(
            Opts::new("sio_subscribes_total", "Socket.IO subscribe events").namespace(NAMESPACE),
            &["channel", "status"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(request_duration_us.clone()))?;
        registry.register(Box::new(pending_requests.clone()))?;
        registry.register(Box::new(clients.clone()))?;
        registry.register(Box::new(subscriptions.clone()))?;
        registry.register(Box::new(views_total.clone()))?;
        registry.register(Box::new(sio_subscribes_total.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            request_duration_us,
            pending_requests,
            clients,
            subscriptions,
            views_total,
            sio_subscribes_total,
        })
    }

    /// Start timing a request. The pending gauge is raised now and lowered
    /// when the timer finishes or is dropped.
    pub fn start_request(self: &Arc<Self>, transport: Transport, method: &str) -> RequestTimer {
        self.pending_requests
            .with_label_values(&[transport.as_str(), method])
            .inc();
        RequestTimer {
            start: Instant::now(),
            metrics: Arc::clone(self),
            transport,
            method: method.to_string(),
            finished: false,
        }
    }

    /// Current value of the pending gauge
    pub fn pending(&self, transport: Transport, method: &str) -> i64 {
        self.pending_requests
            .with_label_values(&[transport.as_str(), method])
            .get()
    }

    /// Handled requests with the given outcome
    pub fn requests(&self, transport: Transport, method: &str, status: &str) -> u64 {
        self.requests_total
            .with_label_values(&[transport.as_str(), method, status])
            .get()
    }

    pub fn client_connected(&self, transport: Transport) {
        self.clients.with_label_values(&[transport.as_str()]).inc();
    }

    pub fn client_disconnected(&self, transport: Transport) {
        self.clients.with_label_values(&[transport.as_str()]).dec();
    }

    pub fn clients(&self, transport: Transport) -> i64 {
        self.clients.with_label_values(&[transport.as_str()]).get()
    }

    /// Set the size of a subscription relation
    pub fn set_subscriptions(&self, method: &str, count: usize) {
        self.subscriptions
            .with_label_values(&[method])
            .set(count as i64);
    }

    /// Count a REST or explorer view
    pub fn record_view(&self, action: &str) {
        self.views_total.with_label_values(&[action]).inc();
    }

    pub fn views(&self, action: &str) -> u64 {
        self.views_total.with_label_values(&[action]).get()
    }

    pub fn record_sio_subscribe(&self, channel: &str, ok: bool) {
        let status = if ok { "success" } else { "failure" };
        self.sio_subscribes_total
            .with_label_values(&[channel, status])
            .inc();
    }

    pub fn sio_subscribes(&self, channel: &str, ok: bool) -> u64 {
        let status = if ok { "success" } else { "failure" };
        self.sio_subscribes_total
            .with_label_values(&[channel, status])
            .get()
    }

    /// Prometheus text exposition
    pub fn encode(&self) -> Result<String, GatewayError> {
        let families = self.registry.gather();
        TextEncoder::new()
            .encode_to_string(&families)
            .map_err(GatewayError::from)
    }

    fn finish(&self, transport: Transport, method: &str, status: &str, start: Instant) {
        let labels = [transport.as_str(), method];
        self.pending_requests.with_label_values(&labels).dec();
        self.requests_total
            .with_label_values(&[transport.as_str(), method, status])
            .inc();
        self.request_duration_us
            .with_label_values(&labels)
            .observe(start.elapsed().as_micros() as f64);
    }
}

/// In-flight request. Exactly one pending decrement happens per timer.
pub struct RequestTimer {
    start: Instant,
    metrics: Arc<GatewayMetrics>,
    transport: Transport,
    method: String,
    finished: bool,
}

impl RequestTimer {
    /// Record the outcome: `ok`, `error`, `internal` or `panic`.
    pub fn finish(mut self, status: &str) {
        self.finished = true;
        self.metrics
            .finish(self.transport, &self.method, status, self.start);
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        if !self.finished {
            self.metrics
                .finish(self.transport, &self.method, "cancelled", self.start);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_timer_balances_pending() {
        let metrics = Arc::new(GatewayMetrics::new().unwrap());

        let timer = metrics.start_request(Transport::WebSocket, "getInfo");
        assert_eq!(metrics.pending(Transport::WebSocket, "getInfo"), 1);
        timer.finish("ok");
        assert_eq!(metrics.pending(Transport::WebSocket, "getInfo"), 0);
        assert_eq!(metrics.requests(Transport::WebSocket, "getInfo", "ok"), 1);

        // dropped without finish, e.g. a cancelled future
        drop(metrics.start_request(Transport::WebSocket, "getInfo"));
        assert_eq!(metrics.pending(Transport::WebSocket, "getInfo"), 0);
        assert_eq!(
            metrics.requests(Transport::WebSocket, "getInfo", "cancelled"),
            1
        );
    }

    #[test]
    fn test_encode_text_exposition() {
        let metrics = GatewayMetrics::new().unwrap();
        metrics.record_view("api-tx");
        metrics.client_connected(Transport::SocketIo);
        metrics.set_subscriptions("subscribeNewBlock", 3);

        let text = metrics.encode().unwrap();
        assert!(text.contains("explorer_gateway_views_total{action=\"api-tx\"} 1"));
        assert!(text.contains("explorer_gateway_clients{transport=\"socketio\"} 1"));
        assert!(text.contains("explorer_gateway_subscriptions{method=\"subscribeNewBlock\"} 3"));
    }

    #[test]
    fn test_independent_registries() {
        let a = GatewayMetrics::new().unwrap();
        let b = GatewayMetrics::new().unwrap();
        a.record_view("tx");
        assert_eq!(a.views("tx"), 1);
        assert_eq!(b.views("tx"), 0);
    }
}
