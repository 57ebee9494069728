//! Bootstrap configuration: assembles a [`Broker`] plus the [`AccountSet`] it serves from
//! explicit values, so embedders don't have to hand-construct each collaborator themselves.

// self
use crate::{
	_prelude::*,
	local_auth::{
		account::{Account, AccountId, AccountIdError, AccountSet, AccountSetError},
		broker::Broker,
		minter::TokenMinter,
	},
};

/// One account entry as supplied to [`BrokerConfig::with_account`], prior to validation.
#[derive(Clone, Debug)]
struct AccountConfig {
	id: String,
	email: String,
}

/// Errors raised while [`BrokerConfig::build`]-ing a broker from explicit values.
#[derive(Debug, ThisError)]
pub enum BrokerConfigError {
	/// One of the configured account ids failed validation.
	#[error(transparent)]
	Account(#[from] AccountIdError),
	/// The configured accounts could not be assembled into a set.
	#[error(transparent)]
	AccountSet(#[from] AccountSetError),
}

/// Builder that assembles a [`Broker`] and its frozen [`AccountSet`] from explicit values.
///
/// `BrokerConfig` only validates and wires collaborators together; it does not start the
/// broker itself — pass the returned [`AccountSet`] to [`Broker::start`] once ready.
pub struct BrokerConfig {
	minter: Arc<dyn TokenMinter>,
	accounts: Vec<AccountConfig>,
	default_account_id: Option<String>,
}
impl BrokerConfig {
	/// Starts a config with the given minter and no accounts yet.
	pub fn new(minter: Arc<dyn TokenMinter>) -> Self {
		Self { minter, accounts: Vec::new(), default_account_id: None }
	}

	/// Adds one account, given its id and email.
	pub fn with_account(mut self, id: impl Into<String>, email: impl Into<String>) -> Self {
		self.accounts.push(AccountConfig { id: id.into(), email: email.into() });

		self
	}

	/// Sets the default account id advertised to child processes.
	pub fn with_default_account(mut self, id: impl Into<String>) -> Self {
		self.default_account_id = Some(id.into());

		self
	}

	/// Validates the configured accounts and builds the [`Broker`] plus its [`AccountSet`].
	///
	/// The broker is returned not yet listening; call [`Broker::start`] with the returned
	/// [`AccountSet`] to begin serving.
	pub fn build(self) -> Result<(Broker, AccountSet), BrokerConfigError> {
		let mut accounts = Vec::with_capacity(self.accounts.len());

		for account in self.accounts {
			let id = AccountId::new(&account.id)?;

			accounts.push(Account::new(id, account.email));
		}

		let default_account_id =
			self.default_account_id.map(AccountId::new).transpose()?;
		let accounts = AccountSet::new(accounts, default_account_id)?;
		let broker = Broker::new(self.minter);

		Ok((broker, accounts))
	}
}
