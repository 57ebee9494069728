//! Per-run RPC secret: generation, redaction, and constant-time comparison.

// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD};
use rand::RngCore;
// self
use crate::_prelude::*;

/// Number of random bytes drawn for a new secret (I4).
pub const SECRET_BYTES: usize = 48;

/// The per-run shared secret children must present on every RPC.
///
/// Generated from a cryptographically strong RNG at `start()` time and compared in constant
/// time on every request; never logged (I4, P4, P5).
#[derive(Clone, PartialEq, Eq)]
pub struct RpcSecret(String);
impl RpcSecret {
	/// Generates a new secret from [`SECRET_BYTES`] bytes of OS randomness, base64-encoded with
	/// the standard (padded) alphabet.
	pub fn generate() -> Self {
		let mut bytes = [0u8; SECRET_BYTES];

		rand::rng().fill_bytes(&mut bytes);

		Self(STANDARD.encode(bytes))
	}

	/// Wraps an already-encoded secret string (used by tests that need a fixed value).
	pub fn from_encoded(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the base64 wire representation clients must echo back.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Compares `candidate` against this secret in constant time.
	///
	/// Mismatched lengths are rejected without a short-circuit: both buffers are still walked in
	/// full so that execution time does not depend on which byte (or whether the length itself)
	/// differs (P4).
	pub fn constant_time_eq(&self, candidate: &str) -> bool {
		constant_time_eq(self.0.as_bytes(), candidate.as_bytes())
	}

	/// A fixed-length canonical secret that never matches a real one.
	///
	/// Used to run the constant-time compare against *something* of the right shape when no
	/// broker is running, so a caller cannot learn "the broker is stopped" by timing alone (P4).
	pub fn dummy() -> Self {
		Self("A".repeat(SECRET_BYTES / 3 * 4))
	}
}
impl Debug for RpcSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("RpcSecret").field(&"<redacted>").finish()
	}
}
impl Display for RpcSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Byte-oriented xor-accumulate comparison that always reads both buffers in full.
///
/// Length mismatches are folded into the accumulator rather than returned immediately, so a
/// caller cannot learn the expected length from timing alone.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
	let len = a.len().max(b.len());
	let mut diff = (a.len() != b.len()) as u8;

	for i in 0..len {
		let x = a.get(i).copied().unwrap_or(0);
		let y = b.get(i).copied().unwrap_or(0);

		diff |= x ^ y;
	}

	diff == 0
}
