//! Keyed store of tokens-or-fatal-errors with a fixed freshness policy.

// std
use std::collections::BTreeSet;
// self
use crate::{
	_prelude::*,
	local_auth::{account::AccountId, minter::{FatalTokenError, Token}},
};

/// Slack subtracted from a token's `expiry` before it is considered stale.
///
/// Guarantees callers never receive a token with less than ~3 minutes of remaining life,
/// absorbing their own use latency.
pub const FRESHNESS_MARGIN_SECS: i64 = 180;

/// Cache key identifying a single logical token request.
///
/// Scope sets are canonicalized (sorted, deduplicated) before a key is constructed so that
/// requests differing only in scope order or duplication collide in the cache (P3).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CacheKey {
	/// An access token for `account_id` with the given canonical scope set.
	Access {
		/// Logical account the token is for.
		account_id: AccountId,
		/// Sorted, deduplicated scopes.
		scopes: Arc<[String]>,
	},
	/// An ID token for `account_id` with the given audience.
	Id {
		/// Logical account the token is for.
		account_id: AccountId,
		/// OIDC audience string.
		audience: String,
	},
}
impl CacheKey {
	/// Builds an access-token key, canonicalizing `scopes` by sort + dedupe.
	pub fn access(account_id: AccountId, scopes: impl IntoIterator<Item = String>) -> Self {
		let set: BTreeSet<String> = scopes.into_iter().collect();

		Self::Access { account_id, scopes: Arc::from(set.into_iter().collect::<Vec<_>>()) }
	}

	/// Builds an ID-token key for the given audience.
	pub fn id(account_id: AccountId, audience: impl Into<String>) -> Self {
		Self::Id { account_id, audience: audience.into() }
	}

	/// The account id this key was requested for.
	pub fn account_id(&self) -> &AccountId {
		match self {
			CacheKey::Access { account_id, .. } | CacheKey::Id { account_id, .. } => account_id,
		}
	}
}

/// Either a usable token or a permanently cached fatal error for one [`CacheKey`].
#[derive(Clone, Debug)]
pub enum CacheEntry {
	/// A minted token.
	Token(Token),
	/// A permanent refusal to mint this key.
	Fatal(FatalTokenError),
}
impl CacheEntry {
	/// Returns `true` if this entry is fresh enough to serve without refreshing.
	///
	/// Fatal errors are always considered "fresh" — they are evicted only by
	/// [`Cache::clear`], never by staleness (P7).
	pub fn is_fresh(&self, now_unix: i64) -> bool {
		match self {
			CacheEntry::Token(token) => now_unix < token.expiry - FRESHNESS_MARGIN_SECS,
			CacheEntry::Fatal(_) => true,
		}
	}
}

/// Keyed store of [`CacheEntry`] values.
///
/// Holds no synchronization of its own: callers (the broker's state mutex) serialize access.
/// Never touched while holding a lock across a mint call — see
/// [`RefreshCoordinator`](crate::local_auth::RefreshCoordinator).
#[derive(Debug, Default)]
pub struct Cache {
	entries: HashMap<CacheKey, CacheEntry>,
}
impl Cache {
	/// Creates an empty cache.
	pub fn new() -> Self {
		Self::default()
	}

	/// Looks up `key`, returning `None` if absent.
	pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
		self.entries.get(key)
	}

	/// Inserts or replaces the entry for `key` (I1: at most one entry per key).
	pub fn put(&mut self, key: CacheKey, entry: CacheEntry) {
		self.entries.insert(key, entry);
	}

	/// Drops every cached entry (called on `stop()`).
	pub fn clear(&mut self) {
		self.entries.clear();
	}

	/// Number of entries currently cached (test/introspection helper).
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	/// Returns `true` if the cache holds no entries.
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}
