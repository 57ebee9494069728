//! A deterministic, non-networked [`TokenMinter`] for tests and demos.
//!
//! Mirrors the Python reference implementation's `DumbProvider`: it never talks to a real
//! provider, just derives a predictable token string from the request and a fixed lifetime.

// self
use crate::{
	_prelude::*,
	local_auth::minter::{FatalTokenError, MintResult, Token, TokenMinter, TransientError},
};

/// Default token lifetime minted by [`StaticTokenMinter`], in seconds.
pub const DEFAULT_LIFETIME_SECS: i64 = 3600;

/// Canned outcome registered for one lookup key, substituted for the usual deterministic token.
#[derive(Clone, Debug)]
enum Canned {
	Fatal(FatalTokenError),
	Transient(TransientError),
}

/// Mints tokens with a predictable value and a fixed lifetime from "now".
///
/// `now` is supplied by the caller at construction time rather than read from the system clock,
/// so tests can pin exact expiry values. Individual keys can be overridden with a canned
/// [`FatalTokenError`] or [`TransientError`] via [`Self::with_fatal`]/[`Self::with_transient`],
/// for tests that exercise the broker's negative-caching and error-mapping behavior.
pub struct StaticTokenMinter {
	now_unix: i64,
	lifetime_secs: i64,
	canned: HashMap<String, Canned>,
}
impl StaticTokenMinter {
	/// Creates a minter whose tokens are minted as if "now" were `now_unix`.
	pub fn new(now_unix: i64) -> Self {
		Self { now_unix, lifetime_secs: DEFAULT_LIFETIME_SECS, canned: HashMap::new() }
	}

	/// Overrides the default token lifetime.
	pub fn with_lifetime(mut self, lifetime_secs: i64) -> Self {
		self.lifetime_secs = lifetime_secs;

		self
	}

	/// Registers a canned fatal error to return instead of minting, for the request whose
	/// canonical key matches [`Self::access_key`] or [`Self::id_key`].
	pub fn with_fatal(mut self, key: impl Into<String>, error: FatalTokenError) -> Self {
		self.canned.insert(key.into(), Canned::Fatal(error));

		self
	}

	/// Registers a canned transient error, same keying scheme as [`Self::with_fatal`].
	pub fn with_transient(mut self, key: impl Into<String>, error: TransientError) -> Self {
		self.canned.insert(key.into(), Canned::Transient(error));

		self
	}

	/// Canonical lookup key for a canned access-token outcome.
	pub fn access_key(account_id: &str, scopes: &[String]) -> String {
		format!("access-{account_id}-{}", scopes.join(","))
	}

	/// Canonical lookup key for a canned ID-token outcome.
	pub fn id_key(account_id: &str, audience: &str) -> String {
		format!("id-{account_id}-{audience}")
	}
}
impl TokenMinter for StaticTokenMinter {
	fn mint_access<'a>(
		&'a self,
		account_id: &'a str,
		scopes: &'a [String],
	) -> Pin<Box<dyn Future<Output = MintResult> + Send + 'a>> {
		let key = Self::access_key(account_id, scopes);

		match self.canned.get(&key) {
			Some(Canned::Fatal(error)) => {
				let error = error.clone();

				Box::pin(async move { Ok(Err(error)) })
			},
			Some(Canned::Transient(error)) => {
				let error = error.clone();

				Box::pin(async move { Err(error) })
			},
			None => {
				let token = Token::new(key, self.now_unix + self.lifetime_secs);

				Box::pin(async move { Ok(Ok(token)) })
			},
		}
	}

	fn mint_id<'a>(
		&'a self,
		account_id: &'a str,
		audience: &'a str,
	) -> Pin<Box<dyn Future<Output = MintResult> + Send + 'a>> {
		let key = Self::id_key(account_id, audience);

		match self.canned.get(&key) {
			Some(Canned::Fatal(error)) => {
				let error = error.clone();

				Box::pin(async move { Ok(Err(error)) })
			},
			Some(Canned::Transient(error)) => {
				let error = error.clone();

				Box::pin(async move { Err(error) })
			},
			None => {
				let token = Token::new(key, self.now_unix + self.lifetime_secs);

				Box::pin(async move { Ok(Ok(token)) })
			},
		}
	}
}
