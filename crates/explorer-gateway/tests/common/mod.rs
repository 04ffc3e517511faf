//! Shared harness: a gateway over the in-memory chain, bound on an
//! ephemeral local port.

#![allow(dead_code)]

use explorer_gateway::{Backends, EventBroker, GatewayConfig, GatewayMetrics, GatewayService};
use explorer_types::fixtures::FakeChain;
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestGateway {
    pub addr: SocketAddr,
    pub admin_addr: SocketAddr,
    pub chain: Arc<FakeChain>,
    pub broker: Arc<EventBroker>,
    pub metrics: Arc<GatewayMetrics>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn admin_url(&self, path: &str) -> String {
        format!("http://{}{}", self.admin_addr, path)
    }

    pub fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }
}

/// UTXO chain with default configuration.
pub async fn spawn() -> TestGateway {
    spawn_with(FakeChain::utxo(), |_| {}).await
}

pub async fn spawn_with<F>(chain: Arc<FakeChain>, configure: F) -> TestGateway
where
    F: FnOnce(&mut GatewayConfig),
{
    let mut config = GatewayConfig::default();
    configure(&mut config);
    let service = GatewayService::new(config, Backends::from_shared(Arc::clone(&chain))).unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = service.router().into_make_service_with_connect_info::<SocketAddr>();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let admin_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let admin_addr = admin_listener.local_addr().unwrap();
    let admin = service.admin_router();
    tokio::spawn(async move {
        axum::serve(admin_listener, admin).await.unwrap();
    });

    TestGateway {
        addr,
        admin_addr,
        chain,
        broker: service.broker(),
        metrics: service.metrics(),
    }
}

/// Client that reports redirects instead of following them.
pub fn http() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

pub async fn connect(url: &str) -> WsStream {
    let (ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    ws
}

/// Next text frame, skipping control frames.
pub async fn next_text(ws: &mut WsStream) -> String {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("no frame within 5s")
            .expect("stream closed")
            .expect("read failed");
        if let Message::Text(text) = msg {
            return text.as_str().to_string();
        }
    }
}

/// True when no text frame arrives within `wait`.
pub async fn silent_for(ws: &mut WsStream, wait: Duration) -> bool {
    loop {
        match timeout(wait, ws.next()).await {
            Err(_) => return true,
            Ok(Some(Ok(Message::Text(_)))) => return false,
            Ok(Some(Ok(_))) => continue,
            Ok(_) => return true,
        }
    }
}
