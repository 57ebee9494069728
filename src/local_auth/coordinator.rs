//! Single-flight bookkeeping: at most one mint in flight per [`CacheKey`] at a time.
//!
//! The coordinator itself holds no lock; the broker's state mutex guards the `Inflight` map the
//! same way it guards the [`Cache`](crate::local_auth::Cache). The type here only owns the
//! per-key broadcast channel used as the "set once, read many" completion primitive described
//! by the design notes: a single mint result fans out to every waiter that subscribed before it
//! was produced.

// crates.io
use tokio::sync::broadcast;
// self
use crate::{
	_prelude::*,
	local_auth::{cache::CacheEntry, cache::CacheKey, minter::TransientError},
};

/// Channel capacity for the completion broadcast.
///
/// Exactly one value is ever sent per key before the channel is torn down, so capacity 1 is
/// sufficient; it only needs to outlive the single `send` call, not buffer a backlog.
const COMPLETION_CAPACITY: usize = 1;

/// Result of a single mint attempt, fanned out to every waiter for a key.
pub(crate) type MintOutcome = Result<CacheEntry, TransientError>;

/// Map of keys currently being refreshed to the broadcast sender that will deliver the result.
#[derive(Default)]
pub(crate) struct Inflight {
	senders: HashMap<CacheKey, broadcast::Sender<MintOutcome>>,
}
impl Inflight {
	/// Creates an empty map.
	pub(crate) fn new() -> Self {
		Self::default()
	}

	/// If a mint for `key` is already underway, returns a receiver subscribed to its result.
	pub(crate) fn subscribe(&self, key: &CacheKey) -> Option<broadcast::Receiver<MintOutcome>> {
		self.senders.get(key).map(broadcast::Sender::subscribe)
	}

	/// Registers `key` as in-flight, returning the sender the caller must use to publish the
	/// eventual result via [`Inflight::finish`].
	pub(crate) fn begin(&mut self, key: CacheKey) -> broadcast::Sender<MintOutcome> {
		let (tx, _rx) = broadcast::channel(COMPLETION_CAPACITY);

		self.senders.insert(key, tx.clone());

		tx
	}

	/// Publishes `outcome` to every current subscriber and removes the in-flight entry.
	///
	/// Waiters that never subscribed (e.g. none existed) simply see the send fail silently,
	/// which is fine: nobody was waiting.
	pub(crate) fn finish(&mut self, key: &CacheKey, outcome: MintOutcome) {
		if let Some(tx) = self.senders.remove(key) {
			let _ = tx.send(outcome);
		}
	}

	/// Drops every in-flight entry without publishing (used when the broker stops).
	pub(crate) fn clear(&mut self) {
		self.senders.clear();
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::local_auth::{account::AccountId, minter::Token};

	#[tokio::test]
	async fn waiters_receive_the_published_outcome() {
		let mut inflight = Inflight::new();
		let key = CacheKey::access(AccountId::new("svc").unwrap(), ["s".to_string()]);
		let tx = inflight.begin(key.clone());
		let mut rx1 = inflight.subscribe(&key).expect("Subscriber should see the in-flight key.");
		let mut rx2 = inflight.subscribe(&key).expect("Second subscriber should also see it.");

		inflight.finish(&key, Ok(CacheEntry::Token(Token::new("tok", 1_000))));

		drop(tx);

		let a = rx1.recv().await.expect("First waiter should receive the outcome.");
		let b = rx2.recv().await.expect("Second waiter should receive the outcome.");

		assert!(matches!(a, Ok(CacheEntry::Token(ref t)) if t.value == "tok"));
		assert!(matches!(b, Ok(CacheEntry::Token(ref t)) if t.value == "tok"));
		assert!(inflight.subscribe(&key).is_none());
	}

	#[test]
	fn clear_drops_all_inflight_entries() {
		let mut inflight = Inflight::new();
		let key = CacheKey::id(AccountId::new("svc").unwrap(), "aud");

		inflight.begin(key.clone());
		inflight.clear();

		assert!(inflight.subscribe(&key).is_none());
	}
}
