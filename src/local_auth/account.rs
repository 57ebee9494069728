//! Logical account identifiers and the frozen account set a broker serves.

// std
use std::{collections::BTreeMap, fmt::Debug, ops::Deref};
// self
use crate::_prelude::*;

/// Maximum length accepted for an [`AccountId`].
const ACCOUNT_ID_MAX_LEN: usize = 128;

/// Errors raised while validating an [`AccountId`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum AccountIdError {
	/// The identifier was empty.
	#[error("Account id cannot be empty.")]
	Empty,
	/// The identifier contained whitespace.
	#[error("Account id cannot contain whitespace.")]
	ContainsWhitespace,
	/// The identifier exceeded the allowed character count.
	#[error("Account id exceeds {max} characters.")]
	TooLong {
		/// Maximum permitted character count.
		max: usize,
	},
}

/// Logical account identifier, e.g. `"task"` or `"system"`.
///
/// Validated the same way as the crate's other identifier newtypes (see
/// [`crate::auth::TenantId`]): non-empty, free of embedded whitespace, and bounded in length.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccountId(String);
impl AccountId {
	/// Validates and wraps a new account id.
	pub fn new(value: impl AsRef<str>) -> Result<Self, AccountIdError> {
		let view = value.as_ref();

		if view.is_empty() {
			return Err(AccountIdError::Empty);
		}
		if view.chars().any(char::is_whitespace) {
			return Err(AccountIdError::ContainsWhitespace);
		}
		if view.len() > ACCOUNT_ID_MAX_LEN {
			return Err(AccountIdError::TooLong { max: ACCOUNT_ID_MAX_LEN });
		}

		Ok(Self(view.to_owned()))
	}
}
impl Deref for AccountId {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for AccountId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl From<AccountId> for String {
	fn from(value: AccountId) -> Self {
		value.0
	}
}
impl TryFrom<String> for AccountId {
	type Error = AccountIdError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::new(&value)
	}
}
impl FromStr for AccountId {
	type Err = AccountIdError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}
impl Debug for AccountId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "AccountId({})", self.0)
	}
}
impl Display for AccountId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

/// One logical account the broker can mint tokens for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
	/// Short identifier, e.g. `"task"` or `"system"`.
	pub id: AccountId,
	/// Email address associated with the account, surfaced to callers verbatim.
	pub email: String,
}
impl Account {
	/// Creates a new account from a validated id and an email string.
	pub fn new(id: AccountId, email: impl Into<String>) -> Self {
		Self { id, email: email.into() }
	}
}

/// Errors raised while assembling an [`AccountSet`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum AccountSetError {
	/// A broker must be configured with at least one account.
	#[error("At least one account is required.")]
	Empty,
	/// Two accounts were supplied with the same id.
	#[error("Duplicate account id: {id}.")]
	Duplicate {
		/// The duplicated account id.
		id: AccountId,
	},
	/// `default_account_id` did not match any supplied account.
	#[error("Default account id {id} is not one of the configured accounts.")]
	UnknownDefault {
		/// The unmatched default account id.
		id: AccountId,
	},
}

/// Immutable, frozen set of accounts a [`Broker`](crate::local_auth::Broker) serves.
///
/// Constructed once at `start()` time and never mutated afterwards (I5).
#[derive(Clone, Debug)]
pub struct AccountSet {
	by_id: Arc<BTreeMap<AccountId, Account>>,
	default_account_id: Option<AccountId>,
}
impl AccountSet {
	/// Builds a frozen account set, validating uniqueness and the default account reference.
	pub fn new(
		accounts: impl IntoIterator<Item = Account>,
		default_account_id: Option<AccountId>,
	) -> Result<Self, AccountSetError> {
		let mut by_id = BTreeMap::new();

		for account in accounts {
			if by_id.insert(account.id.clone(), account.clone()).is_some() {
				return Err(AccountSetError::Duplicate { id: account.id });
			}
		}

		if by_id.is_empty() {
			return Err(AccountSetError::Empty);
		}

		if let Some(id) = &default_account_id
			&& !by_id.contains_key(id)
		{
			return Err(AccountSetError::UnknownDefault { id: id.clone() });
		}

		Ok(Self { by_id: Arc::new(by_id), default_account_id })
	}

	/// Returns `true` if `id` names one of the configured accounts.
	pub fn contains(&self, id: &AccountId) -> bool {
		self.by_id.contains_key(id)
	}

	/// Returns the account for `id`, if configured.
	pub fn get(&self, id: &AccountId) -> Option<&Account> {
		self.by_id.get(id)
	}

	/// Iterates accounts sorted by id.
	pub fn iter(&self) -> impl Iterator<Item = &Account> {
		self.by_id.values()
	}

	/// Returns the configured default account id, if any.
	pub fn default_account_id(&self) -> Option<&AccountId> {
		self.default_account_id.as_ref()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn acc(id: &str, email: &str) -> Account {
		Account::new(AccountId::new(id).unwrap(), email)
	}

	#[test]
	fn account_id_rejects_empty_and_whitespace() {
		assert!(matches!(AccountId::new(""), Err(AccountIdError::Empty)));
		assert!(matches!(AccountId::new("has space"), Err(AccountIdError::ContainsWhitespace)));
		assert!(AccountId::new("task").is_ok());
	}

	#[test]
	fn account_set_rejects_empty_and_duplicates() {
		assert!(matches!(AccountSet::new([], None), Err(AccountSetError::Empty)));

		let err = AccountSet::new([acc("a", "a@x"), acc("a", "dup@x")], None)
			.expect_err("Duplicate account ids should be rejected.");

		assert!(matches!(err, AccountSetError::Duplicate { .. }));
	}

	#[test]
	fn account_set_validates_default_account() {
		let bad = AccountSet::new([acc("a", "a@x")], Some(AccountId::new("b").unwrap()));

		assert!(matches!(bad, Err(AccountSetError::UnknownDefault { .. })));

		let good = AccountSet::new([acc("a", "a@x"), acc("b", "b@x")], Some(
			AccountId::new("a").unwrap(),
		))
		.expect("Valid default account id should be accepted.");

		assert!(good.contains(&AccountId::new("a").unwrap()));
		assert_eq!(good.iter().count(), 2);
	}
}
