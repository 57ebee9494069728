//! A [`TokenMinter`] backed by the crate's own OAuth 2.0 client-credentials machinery.

// std
use std::collections::BTreeMap;
// self
use crate::{
	_prelude::*,
	auth::{PrincipalId, TenantId, TokenFamily},
	http::TokenHttpClient,
	local_auth::{
		error::RpcError,
		minter::{MintResult, Token, TokenMinter, TransientError},
	},
	oauth::{BasicFacade, OAuth2Facade, TransportErrorMapper},
	provider::{GrantType, ProviderDescriptor, ProviderStrategy},
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper};

/// Fixed tenant under which every account's client-credentials grant is classified.
///
/// The donor's token-family model splits identity into tenant + principal; this broker has no
/// notion of tenants, so every account shares one fixed tenant and the account id becomes the
/// principal.
const TENANT: &str = "local-auth-broker";

#[cfg(feature = "reqwest")]
/// Minter specialized for the crate's default reqwest transport stack.
pub type ReqwestOAuthClientCredentialsMinter =
	OAuthClientCredentialsMinter<ReqwestHttpClient, ReqwestTransportErrorMapper>;

/// Mints real access/ID tokens by driving the crate's client-credentials exchange against an
/// upstream OAuth provider.
///
/// Deliberately stateless between calls: no caching, no store, no singleflight guard. All of
/// that is the [`Broker`](crate::local_auth::Broker)'s job; this type's only responsibility is
/// "go get one token from the provider right now."
pub struct OAuthClientCredentialsMinter<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	descriptor: ProviderDescriptor,
	strategy: Arc<dyn ProviderStrategy>,
	client_id: String,
	client_secret: Option<String>,
	http_client: Arc<C>,
	transport_mapper: Arc<M>,
}
impl<C, M> OAuthClientCredentialsMinter<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a minter that reuses a caller-provided transport + error mapper pair.
	pub fn with_http_client(
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		client_id: impl Into<String>,
		client_secret: Option<String>,
		http_client: impl Into<Arc<C>>,
		transport_mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			descriptor,
			strategy,
			client_id: client_id.into(),
			client_secret,
			http_client: http_client.into(),
			transport_mapper: transport_mapper.into(),
		}
	}

	fn family(&self, account_id: &str) -> Result<TokenFamily, RpcError> {
		let tenant = TenantId::new(TENANT)
			.map_err(|e| RpcError::Internal { reason: format!("Bad tenant id: {e}.") })?;
		let principal = PrincipalId::new(account_id)
			.map_err(|e| RpcError::Internal { reason: format!("Bad principal id: {e}.") })?;

		Ok(TokenFamily::new(tenant, principal))
	}

	async fn exchange(
		&self,
		account_id: &str,
		scopes: &[&str],
		extra_params: &[(String, String)],
	) -> Result<Token, RpcError> {
		if !self.descriptor.supports(GrantType::ClientCredentials) {
			return Err(RpcError::Internal {
				reason: format!(
					"Provider descriptor `{}` does not enable the client_credentials grant.",
					self.descriptor.id
				),
			});
		}

		let family = self.family(account_id)?;
		let facade: BasicFacade<C, M> = BasicFacade::from_descriptor(
			&self.descriptor,
			&self.client_id,
			self.client_secret.as_deref(),
			None,
			self.http_client.clone(),
			self.transport_mapper.clone(),
		)
		.map_err(RpcError::from)?;
		let mut form = BTreeMap::new();

		form.insert("grant_type".into(), GrantType::ClientCredentials.as_str().into());

		for (key, value) in extra_params {
			form.insert(key.clone(), value.clone());
		}

		self.strategy.augment_token_request(GrantType::ClientCredentials, &mut form);

		let strategy_params: Vec<(String, String)> = form
			.into_iter()
			.filter(|(key, _)| key != "grant_type" && key != "scope")
			.collect();
		let record = facade
			.exchange_client_credentials(self.strategy.as_ref(), family, scopes, &strategy_params)
			.await
			.map_err(RpcError::from)?;

		Ok(Token::new(record.access_token.expose(), record.expires_at.unix_timestamp()))
	}
}
#[cfg(feature = "reqwest")]
impl OAuthClientCredentialsMinter<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Creates a minter using the crate's default reqwest transport.
	pub fn new(
		descriptor: ProviderDescriptor,
		strategy: Arc<dyn ProviderStrategy>,
		client_id: impl Into<String>,
		client_secret: Option<String>,
	) -> Self {
		Self::with_http_client(
			descriptor,
			strategy,
			client_id,
			client_secret,
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
		)
	}
}
impl<C, M> TokenMinter for OAuthClientCredentialsMinter<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn mint_access<'a>(
		&'a self,
		account_id: &'a str,
		scopes: &'a [String],
	) -> Pin<Box<dyn Future<Output = MintResult> + Send + 'a>> {
		Box::pin(async move {
			let scope_refs: Vec<&str> = scopes.iter().map(String::as_str).collect();

			to_mint_result(self.exchange(account_id, &scope_refs, &[]).await)
		})
	}

	fn mint_id<'a>(
		&'a self,
		account_id: &'a str,
		audience: &'a str,
	) -> Pin<Box<dyn Future<Output = MintResult> + Send + 'a>> {
		Box::pin(async move {
			let extra = [("audience".to_owned(), audience.to_owned())];

			to_mint_result(self.exchange(account_id, &[], &extra).await)
		})
	}
}

/// Splits an [`RpcError`] back into the [`MintResult`] shape a [`TokenMinter`] must return.
fn to_mint_result(result: Result<Token, RpcError>) -> MintResult {
	match result {
		Ok(token) => Ok(Ok(token)),
		Err(RpcError::Fatal(fatal)) => Ok(Err(fatal)),
		Err(RpcError::Transient(transient)) => Err(transient),
		Err(other) => Err(TransientError::new(other.to_string())),
	}
}
