//! # Explorer Types Crate
//!
//! Domain entities shared by every transport of the explorer gateway, the
//! `ApiError` taxonomy, and the collaborator ports the gateway consumes.
//!
//! ## Design Principles
//!
//! - **Canonical shape**: entities serialize to the v2 wire schema. Legacy v1
//!   shapes are derived from them by the gateway, never stored.
//! - **Collaborators decide visibility**: a backend error that is safe to show
//!   to end users is tagged public by the collaborator that produced it.
//! - **Opaque descriptors**: addresses are compared as `AddressDescriptor`
//!   bytes produced by the `AddressCodec`, never as display strings.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod amount;
pub mod entities;
pub mod errors;
pub mod fiat;
pub mod mempool;
pub mod ports;

#[cfg(feature = "fixtures")]
pub mod fixtures;

pub use amount::{AddressDescriptor, Amount};
pub use entities::*;
pub use errors::{ApiError, ApiResult, ErrorKind};
pub use fiat::{RatesTicker, Ticker, Tickers, TickersList};
pub use mempool::{MempoolEntry, MempoolTokenTransfer, MempoolTx, MempoolVin, MempoolVout};
pub use ports::{
    AccountDetails, AccountService, AddressCodec, AddressFilter, Capabilities, ChainBackend,
    ChainType, Mempool, RatesStore, TokensToReturn, TxStub, VoutFilter,
};
