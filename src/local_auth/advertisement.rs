//! The small record returned from `start()` and handed to child processes.

// self
use crate::{_prelude::*, local_auth::account::{AccountId, AccountSet}};

/// One account entry as surfaced on the wire (id + email only).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisedAccount {
	/// Account id.
	pub id: AccountId,
	/// Account email.
	pub email: String,
}

/// Everything a child process needs to talk to a running broker.
///
/// Returned by [`Broker::start`](crate::local_auth::Broker::start); shape-only, no behavior.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Advertisement {
	/// TCP port the broker is listening on at `127.0.0.1`.
	pub rpc_port: u16,
	/// Shared secret callers must echo back on every request.
	pub secret: String,
	/// Accounts the broker can mint tokens for, sorted by id.
	pub accounts: Vec<AdvertisedAccount>,
	/// Default account id, present only when one was configured.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub default_account_id: Option<AccountId>,
}
impl Advertisement {
	/// Builds an advertisement from the broker's frozen account set, port, and secret.
	pub fn new(rpc_port: u16, secret: impl Into<String>, accounts: &AccountSet) -> Self {
		Self {
			rpc_port,
			secret: secret.into(),
			accounts: accounts
				.iter()
				.map(|a| AdvertisedAccount { id: a.id.clone(), email: a.email.clone() })
				.collect(),
			default_account_id: accounts.default_account_id().cloned(),
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::local_auth::account::Account;

	#[test]
	fn advertisement_omits_default_account_id_when_absent() {
		let accounts = AccountSet::new(
			[Account::new(AccountId::new("a").unwrap(), "a@x")],
			None,
		)
		.unwrap();
		let ad = Advertisement::new(4180, "secret", &accounts);
		let json = serde_json::to_value(&ad).unwrap();

		assert!(json.get("default_account_id").is_none());
		assert_eq!(ad.accounts.len(), 1);
	}

	#[test]
	fn advertisement_sorts_accounts_by_id() {
		let accounts = AccountSet::new(
			[
				Account::new(AccountId::new("b").unwrap(), "b@x"),
				Account::new(AccountId::new("a").unwrap(), "a@x"),
			],
			Some(AccountId::new("a").unwrap()),
		)
		.unwrap();
		let ad = Advertisement::new(0, "secret", &accounts);

		assert_eq!(ad.accounts[0].id, AccountId::new("a").unwrap());
		assert_eq!(ad.accounts[1].id, AccountId::new("b").unwrap());
		assert_eq!(ad.default_account_id, Some(AccountId::new("a").unwrap()));
	}
}
