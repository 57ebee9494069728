//! Optional observability helpers for the local auth broker's RPC surface.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `local_auth_broker.rpc` (tagged with
//!   `method` and `account_id`) around each RPC, a separate `local_auth_broker.mint` span around
//!   each actual mint call, and plain log lines for the bound listener port and per-mint
//!   outcomes.
//! - Enable `metrics` to increment `local_auth_broker_rpc_total`, labeled by `method` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// RPC methods the broker handles, used for logging and metric labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RpcMethod {
	/// `GetOAuthToken`.
	GetOAuthToken,
	/// `GetIDToken`.
	GetIDToken,
}
impl RpcMethod {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RpcMethod::GetOAuthToken => "GetOAuthToken",
			RpcMethod::GetIDToken => "GetIDToken",
		}
	}
}
impl Display for RpcMethod {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each RPC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RpcOutcome {
	/// Token served from a fresh cache entry.
	CacheHit,
	/// Token minted fresh (either no entry, stale entry, or joined an in-flight mint).
	Minted,
	/// Request rejected before reaching the cache (bad shape, bad secret, unknown account).
	Rejected,
	/// Minting failed, fatally or transiently.
	Failed,
}
impl RpcOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			RpcOutcome::CacheHit => "cache_hit",
			RpcOutcome::Minted => "minted",
			RpcOutcome::Rejected => "rejected",
			RpcOutcome::Failed => "failed",
		}
	}
}
impl Display for RpcOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
