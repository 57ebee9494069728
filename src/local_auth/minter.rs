//! The [`TokenMinter`] collaborator contract and the token/error types it produces.

// self
use crate::_prelude::*;

/// An access or ID token minted for an account.
///
/// Immutable; the `expiry` is whatever the minter returned and is never rewritten by the
/// broker (I2).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
	/// Opaque token value.
	pub value: String,
	/// Expiry as a unix timestamp in seconds.
	pub expiry: i64,
}
impl Token {
	/// Creates a new token value with the given unix-seconds expiry.
	pub fn new(value: impl Into<String>, expiry: i64) -> Self {
		Self { value: value.into(), expiry }
	}
}

/// A permanent, cacheable refusal to mint a token for a given key.
///
/// Once recorded, a `FatalTokenError` suppresses further mint attempts for the same
/// [`CacheKey`](crate::local_auth::CacheKey) until the broker is stopped (P7).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
#[error("{message}")]
pub struct FatalTokenError {
	/// Non-zero application-defined error code.
	pub code: i64,
	/// Human-readable explanation, surfaced verbatim to the caller.
	pub message: String,
}
impl FatalTokenError {
	/// Creates a new fatal error with the given code and message.
	pub fn new(code: i64, message: impl Into<String>) -> Self {
		Self { code, message: message.into() }
	}
}

/// A temporary minting failure; never cached, surfaced as a 5xx RPC failure.
#[derive(Clone, Debug, ThisError)]
#[error("{message}")]
pub struct TransientError {
	/// Human-readable explanation, for logs only (never sent verbatim to avoid leaking upstream
	/// provider internals, though callers only ever see a generic 500).
	pub message: String,
}
impl TransientError {
	/// Creates a new transient error with the given message.
	pub fn new(message: impl Into<String>) -> Self {
		Self { message: message.into() }
	}
}

/// Outcome of a single mint attempt.
pub type MintResult = Result<Result<Token, FatalTokenError>, TransientError>;

/// Which kind of token a mint call is producing, used for logging and cache keying.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MintKind {
	/// An OAuth 2.0 access token scoped by a set of scopes.
	Access,
	/// An OpenID Connect ID token scoped by an audience.
	Id,
}
impl MintKind {
	/// Stable label suitable for log fields and metric labels.
	pub const fn as_str(self) -> &'static str {
		match self {
			MintKind::Access => "access",
			MintKind::Id => "id",
		}
	}
}
impl Display for MintKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Contract for producing real OAuth access/ID tokens on demand.
///
/// Implementations may be called concurrently from multiple broker tasks and must be
/// internally synchronized if they hold mutable state. A [`FatalTokenError`] asserts the
/// request is permanently unservable for that key (e.g. scope forbidden, account
/// misconfigured) and is cached by the broker; a [`TransientError`] asks the broker to
/// surface a 5xx-class RPC failure without caching anything.
pub trait TokenMinter
where
	Self: Send + Sync,
{
	/// Mints a new access token with the given scopes for `account_id`.
	fn mint_access<'a>(
		&'a self,
		account_id: &'a str,
		scopes: &'a [String],
	) -> Pin<Box<dyn Future<Output = MintResult> + Send + 'a>>;

	/// Mints a new ID token with the given audience for `account_id`.
	fn mint_id<'a>(
		&'a self,
		account_id: &'a str,
		audience: &'a str,
	) -> Pin<Box<dyn Future<Output = MintResult> + Send + 'a>>;
}
