// self
use crate::local_auth::obs::{RpcMethod, RpcOutcome};

/// Records an RPC outcome via the global metrics recorder (when enabled).
pub fn record_rpc_outcome(method: RpcMethod, outcome: RpcOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"local_auth_broker_rpc_total",
			"method" => method.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (method, outcome);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn record_rpc_outcome_noop_without_metrics() {
		record_rpc_outcome(RpcMethod::GetIDToken, RpcOutcome::Rejected);
	}
}
