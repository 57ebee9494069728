// self
use crate::{_prelude::*, local_auth::{minter::MintKind, obs::RpcMethod}};

/// A span builder used by the RPC handler.
#[derive(Clone, Debug)]
pub struct RpcSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl RpcSpan {
	/// Creates a new span tagged with the method and account id being served.
	pub fn new(method: RpcMethod, account_id: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!(
				"local_auth_broker.rpc",
				method = method.as_str(),
				account_id
			);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (method, account_id);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedRpc<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedRpc<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedRpc<F> = F;

/// A span builder for a single mint attempt, distinct from the per-RPC [`RpcSpan`].
///
/// One `GetOAuthToken`/`GetIDToken` call may join an already in-flight mint rather than
/// starting one, so the mint span only wraps the actual [`TokenMinter`](crate::local_auth::TokenMinter)
/// call, not the whole RPC.
#[derive(Clone, Debug)]
pub struct MintSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl MintSpan {
	/// Creates a new span tagged with the kind of token and the account it is minted for.
	pub fn new(kind: MintKind, account_id: &str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span =
				tracing::info_span!("local_auth_broker.mint", kind = kind.as_str(), account_id);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, account_id);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedMint<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedMint<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedMint<F> = F;

/// Logs the port a broker bound its loopback listener to at startup.
pub fn log_listening(port: u16) {
	#[cfg(feature = "tracing")]
	tracing::info!(port, "local auth broker listening");
	#[cfg(not(feature = "tracing"))]
	{
		let _ = port;
	}
}

/// Logs the outcome of a single mint attempt: which account, which kind of token, and how it
/// resolved (`"minted"`, `"fatal"`, or `"transient"`).
pub fn log_mint(kind: MintKind, account_id: &str, outcome: &'static str) {
	#[cfg(feature = "tracing")]
	tracing::info!(kind = kind.as_str(), account_id, outcome, "minted a token");
	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, account_id, outcome);
	}
}
