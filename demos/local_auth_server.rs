//! Starts a local auth broker backed by a mocked OAuth provider, advertises it, and drives one
//! `GetOAuthToken` RPC against it over a real TCP connection.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use serde_json::json;
use url::Url;
// self
use local_auth_broker::{
	auth::ProviderId,
	local_auth::{BrokerConfig, TokenMinter, minters::OAuthClientCredentialsMinter},
	provider::{DefaultProviderStrategy, GrantType, ProviderDescriptor, ProviderStrategy},
	reqwest::Client,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt::init();

	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"token_type\":\"bearer\",\"expires_in\":900}",
			);
		})
		.await;

	let descriptor = ProviderDescriptor::builder(ProviderId::new("demo-provider")?)
		.authorization_endpoint(Url::parse(&server.url("/authorize"))?)
		.token_endpoint(Url::parse(&server.url("/token"))?)
		.support_grant(GrantType::ClientCredentials)
		.build()?;
	let strategy: Arc<dyn ProviderStrategy> = Arc::new(DefaultProviderStrategy);
	let minter: Arc<dyn TokenMinter> = Arc::new(OAuthClientCredentialsMinter::new(
		descriptor,
		strategy,
		"demo-client",
		Some("super-secret".to_owned()),
	));
	let (broker, accounts) = BrokerConfig::new(minter)
		.with_account("task", "task@demo.local")
		.with_default_account("task")
		.build()?;
	let advertisement = broker.start(accounts, 0).await?;

	let client = Client::new();
	let response = client
		.post(format!(
			"http://127.0.0.1:{}/rpc/LuciLocalAuthService.GetOAuthToken",
			advertisement.rpc_port
		))
		.header("content-type", "application/json")
		.json(&json!({
			"account_id": "task",
			"scopes": ["demo.scope"],
			"secret": advertisement.secret,
		}))
		.send()
		.await?;

	println!("status: {}", response.status());
	println!("body: {}", response.text().await?);

	broker.stop().await;

	Ok(())
}
