//! Concrete [`TokenMinter`](crate::local_auth::TokenMinter) implementations.

mod oauth_client_credentials;
mod static_minter;

pub use oauth_client_credentials::*;
pub use static_minter::*;
