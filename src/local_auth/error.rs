//! RPC-facing error taxonomy and its wire mapping.

// self
use crate::{_prelude::*, local_auth::minter::{FatalTokenError, TransientError}};

/// Errors the RPC handler can produce, each carrying its own HTTP status mapping.
///
/// Mirrors the shape of [`crate::error::Error`]: one flat enum, `thiserror`-derived, with every
/// variant owning the context it needs to render its wire body.
#[derive(Debug, ThisError)]
pub enum RpcError {
	/// Bad headers, JSON shape, or field types.
	#[error("Malformed request: {reason}.")]
	MalformedRequest {
		/// Human-readable reason, safe to echo to the caller.
		reason: String,
	},
	/// The request used an HTTP method other than `POST`.
	#[error("Unsupported HTTP method: {method}.")]
	MethodNotAllowed {
		/// The rejected method token, e.g. `"GET"`.
		method: String,
	},
	/// The request path did not match `/rpc/LuciLocalAuthService.*`.
	#[error("Path does not name an RPC service: {path}.")]
	UnknownPath {
		/// The unmatched request path.
		path: String,
	},
	/// Path matched `/rpc/LuciLocalAuthService.*` but the method name is not recognized.
	#[error("Unknown method: {method}.")]
	UnknownMethod {
		/// The unrecognized method name.
		method: String,
	},
	/// `account_id` is not one of the broker's configured accounts.
	#[error("Unknown account: {account_id}.")]
	UnknownAccount {
		/// The unrecognized account id.
		account_id: String,
	},
	/// Secret missing or mismatched.
	#[error("Bad secret.")]
	BadSecret,
	/// The broker is not running (never started, or `stop()` has been called).
	#[error("Broker is not running.")]
	Stopped,
	/// The minter signalled a permanent failure for this key; cached (P7).
	#[error(transparent)]
	Fatal(#[from] FatalTokenError),
	/// The minter signalled a temporary failure; never cached.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// An unexpected failure in the transport or handler.
	#[error("Internal error: {reason}.")]
	Internal {
		/// Human-readable reason, for logs; never sent verbatim beyond the fixed template.
		reason: String,
	},
}
impl RpcError {
	/// HTTP status code this error maps to.
	///
	/// [`RpcError::Fatal`] is deliberately **not** an HTTP-layer error: it is reported as a 200
	/// response with a non-zero `error_code` field (§7), so it never reaches
	/// [`RpcError::wire_body`].
	pub const fn status(&self) -> u16 {
		match self {
			RpcError::MalformedRequest { .. } => 400,
			RpcError::MethodNotAllowed { .. } => 405,
			RpcError::UnknownPath { .. }
			| RpcError::UnknownMethod { .. }
			| RpcError::UnknownAccount { .. } => 404,
			RpcError::BadSecret => 403,
			RpcError::Stopped => 503,
			RpcError::Fatal(_) => 200,
			RpcError::Transient(_) | RpcError::Internal { .. } => 500,
		}
	}

	/// A short, stable explanation suitable for the fixed three-line body template.
	pub fn explanation(&self) -> &'static str {
		match self {
			RpcError::MalformedRequest { .. } => "The request body or headers did not match the expected shape.",
			RpcError::MethodNotAllowed { .. } => "Only the POST method is accepted.",
			RpcError::UnknownPath { .. } => "The request path did not name an RPC service.",
			RpcError::UnknownMethod { .. } => "The RPC path did not name a method this service implements.",
			RpcError::UnknownAccount { .. } => "The requested account is not configured on this broker.",
			RpcError::BadSecret => "The request secret is missing or does not match.",
			RpcError::Stopped => "The broker has been stopped and is no longer accepting requests.",
			RpcError::Fatal(_) => "The minter reported a permanent failure for this request.",
			RpcError::Transient(_) => "The minter reported a temporary failure; retrying later may succeed.",
			RpcError::Internal { .. } => "An unexpected internal failure occurred.",
		}
	}

	/// Renders the fixed three-line plain-text body used for every HTTP-layer error.
	///
	/// Never called for [`RpcError::Fatal`], which is serialized as a JSON body instead (see
	/// [`crate::local_auth::broker`]).
	pub fn wire_body(&self) -> String {
		format!(
			"Error code: {}\nMessage: {}\nExplanation: {}\n",
			self.status(),
			self,
			self.explanation()
		)
	}
}
impl From<crate::error::Error> for RpcError {
	/// Maps a provider-client failure (raised internally by `OAuthClientCredentialsMinter`) into
	/// the RPC taxonomy: anything that looks like a permanent grant/client rejection becomes
	/// fatal and cacheable, transport/transient upstream trouble becomes [`RpcError::Transient`],
	/// everything else becomes [`RpcError::Internal`].
	fn from(err: crate::error::Error) -> Self {
		use crate::error::Error;

		match err {
			Error::InvalidGrant { reason } =>
				RpcError::Fatal(FatalTokenError::new(1, format!("Provider rejected the grant: {reason}."))),
			Error::InvalidClient { reason } =>
				RpcError::Fatal(FatalTokenError::new(2, format!("Client authentication failed: {reason}."))),
			Error::InsufficientScope { reason } =>
				RpcError::Fatal(FatalTokenError::new(3, format!("Requested scopes were refused: {reason}."))),
			Error::Revoked => RpcError::Fatal(FatalTokenError::new(4, "Token has been revoked.")),
			Error::Transient(e) => RpcError::Transient(TransientError::new(e.to_string())),
			Error::Transport(e) => RpcError::Transient(TransientError::new(e.to_string())),
			Error::Config(e) => RpcError::Internal { reason: e.to_string() },
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn status_codes_match_the_taxonomy() {
		assert_eq!(RpcError::MalformedRequest { reason: "x".into() }.status(), 400);
		assert_eq!(RpcError::MethodNotAllowed { method: "GET".into() }.status(), 405);
		assert_eq!(RpcError::UnknownPath { path: "/nope".into() }.status(), 404);
		assert_eq!(RpcError::UnknownMethod { method: "x".into() }.status(), 404);
		assert_eq!(RpcError::UnknownAccount { account_id: "x".into() }.status(), 404);
		assert_eq!(RpcError::BadSecret.status(), 403);
		assert_eq!(RpcError::Stopped.status(), 503);
		assert_eq!(RpcError::Fatal(FatalTokenError::new(1, "x")).status(), 200);
		assert_eq!(RpcError::Transient(TransientError::new("x")).status(), 500);
		assert_eq!(RpcError::Internal { reason: "x".into() }.status(), 500);
	}

	#[test]
	fn wire_body_has_three_lines() {
		let body = RpcError::BadSecret.wire_body();
		let lines: Vec<_> = body.lines().collect();

		assert_eq!(lines.len(), 3);
		assert!(lines[0].starts_with("Error code: "));
		assert!(lines[1].starts_with("Message: "));
		assert!(lines[2].starts_with("Explanation: "));
	}

	#[test]
	fn provider_grant_rejection_maps_to_fatal() {
		let err: RpcError = crate::error::Error::InvalidGrant { reason: "expired".into() }.into();

		assert!(matches!(err, RpcError::Fatal(_)));
	}
}
