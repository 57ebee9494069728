//! Loopback-only local auth broker: mints short-lived OAuth access/ID tokens for co-located
//! child processes over a tiny JSON-RPC wire protocol, with an in-memory single-flight refresh
//! cache sitting in front of a pluggable [`TokenMinter`].
//!
//! See [`Broker`] for the public lifecycle (`start`/`stop`) and RPC surface.

mod account;
mod advertisement;
mod broker;
mod cache;
mod config;
mod coordinator;
mod error;
mod minter;
pub mod minters;
pub mod obs;
mod secret;
mod transport;

pub use account::{Account, AccountId, AccountIdError, AccountSet, AccountSetError};
pub use advertisement::{AdvertisedAccount, Advertisement};
pub use broker::{Broker, BrokerError};
pub use cache::{Cache, CacheEntry, CacheKey, FRESHNESS_MARGIN_SECS};
pub use config::{BrokerConfig, BrokerConfigError};
pub use error::RpcError;
pub use minter::{FatalTokenError, MintKind, MintResult, Token, TokenMinter, TransientError};
pub use secret::{RpcSecret, SECRET_BYTES};
