//! State shared by every handler of every transport.

use crate::dispatch::Dispatcher;
use crate::domain::GatewayConfig;
use crate::html::TemplateStore;
use crate::subscriptions::SubscriptionRegistry;
use explorer_types::{AccountService, AddressCodec, ChainBackend, Mempool, RatesStore};
use std::sync::Arc;

/// The external collaborators the gateway reads from.
#[derive(Clone)]
pub struct Backends {
    pub accounts: Arc<dyn AccountService>,
    pub chain: Arc<dyn ChainBackend>,
    pub mempool: Arc<dyn Mempool>,
    pub codec: Arc<dyn AddressCodec>,
    pub rates: Arc<dyn RatesStore>,
}

impl Backends {
    /// Use one object for every port.
    pub fn from_shared<B>(backend: Arc<B>) -> Self
    where
        B: AccountService + ChainBackend + Mempool + AddressCodec + RatesStore + 'static,
    {
        Self {
            accounts: backend.clone(),
            chain: backend.clone(),
            mempool: backend.clone(),
            codec: backend.clone(),
            rates: backend,
        }
    }
}

/// Everything a request handler may touch.
pub struct AppState {
    pub config: GatewayConfig,
    pub backends: Backends,
    pub dispatcher: Dispatcher,
    pub registry: Arc<SubscriptionRegistry>,
    pub templates: TemplateStore,
}

pub type SharedState = Arc<AppState>;
