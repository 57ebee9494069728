#![cfg(feature = "reqwest")]

// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use serde_json::{Value, json};
// self
use local_auth_broker::{
	local_auth::{
		Account, AccountId, AccountSet, Broker, FatalTokenError, MintResult, Token, TokenMinter,
		minters::StaticTokenMinter,
	},
	reqwest::Client,
};

const SECRET_FIELD: &str = "secret";

fn accounts(default: &str) -> AccountSet {
	AccountSet::new(
		[
			Account::new(AccountId::new("task").unwrap(), "task@demo.local"),
			Account::new(AccountId::new("other").unwrap(), "other@demo.local"),
		],
		Some(AccountId::new(default).unwrap()),
	)
	.expect("Account set should build successfully for local auth integration tests.")
}

/// A [`TokenMinter`] that counts calls and can be told to fail fatally, for tests that must
/// observe whether the minter was actually invoked.
struct CountingMinter {
	access_calls: AtomicUsize,
	id_calls: AtomicUsize,
	fatal: bool,
}
impl CountingMinter {
	fn new() -> Self {
		Self { access_calls: AtomicUsize::new(0), id_calls: AtomicUsize::new(0), fatal: false }
	}

	fn fatal() -> Self {
		Self { access_calls: AtomicUsize::new(0), id_calls: AtomicUsize::new(0), fatal: true }
	}

	fn access_call_count(&self) -> usize {
		self.access_calls.load(Ordering::SeqCst)
	}
}
impl TokenMinter for CountingMinter {
	fn mint_access<'a>(
		&'a self,
		account_id: &'a str,
		scopes: &'a [String],
	) -> std::pin::Pin<Box<dyn std::future::Future<Output = MintResult> + Send + 'a>> {
		self.access_calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move {
			if self.fatal {
				return Ok(Err(FatalTokenError::new(7, "account disabled")));
			}

			Ok(Ok(Token::new(format!("access-{account_id}-{}", scopes.join(",")), 10_000)))
		})
	}

	fn mint_id<'a>(
		&'a self,
		account_id: &'a str,
		audience: &'a str,
	) -> std::pin::Pin<Box<dyn std::future::Future<Output = MintResult> + Send + 'a>> {
		self.id_calls.fetch_add(1, Ordering::SeqCst);

		Box::pin(async move { Ok(Ok(Token::new(format!("id-{account_id}-{audience}"), 10_000))) })
	}
}

async fn get_oauth_token(
	client: &Client,
	port: u16,
	account_id: &str,
	scopes: &[&str],
	secret: &str,
) -> (u16, Value) {
	let response = client
		.post(format!("http://127.0.0.1:{port}/rpc/LuciLocalAuthService.GetOAuthToken"))
		.header("content-type", "application/json")
		.json(&json!({ "account_id": account_id, "scopes": scopes, SECRET_FIELD: secret }))
		.send()
		.await
		.expect("Request to the local auth broker should reach the loopback listener.");
	let status = response.status().as_u16();
	let body: Value = response
		.json()
		.await
		.expect("Local auth broker response body should parse as JSON.");

	(status, body)
}

#[tokio::test]
async fn mints_and_then_serves_a_cached_access_token() {
	let minter = Arc::new(CountingMinter::new());
	let broker = Broker::new(minter.clone());
	let ad = broker
		.start(accounts("task"), 0)
		.await
		.expect("Broker should start on an ephemeral port.");
	let client = Client::new();

	let (status, first) =
		get_oauth_token(&client, ad.rpc_port, "task", &["a.scope"], &ad.secret).await;

	assert_eq!(status, 200);
	assert_eq!(first["access_token"], "access-task-a.scope");
	assert_eq!(minter.access_call_count(), 1);

	let (status, second) =
		get_oauth_token(&client, ad.rpc_port, "task", &["a.scope"], &ad.secret).await;

	assert_eq!(status, 200);
	assert_eq!(second["access_token"], first["access_token"]);
	assert_eq!(minter.access_call_count(), 1, "cache hit should not mint a second time");

	broker.stop().await;
}

#[tokio::test]
async fn scope_order_and_duplicates_collapse_to_one_mint() {
	let minter = Arc::new(CountingMinter::new());
	let broker = Broker::new(minter.clone());
	let ad = broker.start(accounts("task"), 0).await.expect("Broker should start.");
	let client = Client::new();

	let (_, first) =
		get_oauth_token(&client, ad.rpc_port, "task", &["b.scope", "a.scope"], &ad.secret).await;
	let (_, second) = get_oauth_token(
		&client,
		ad.rpc_port,
		"task",
		&["a.scope", "b.scope", "a.scope"],
		&ad.secret,
	)
	.await;

	assert_eq!(first["access_token"], second["access_token"]);
	assert_eq!(minter.access_call_count(), 1, "reordered/duplicated scopes should share one cache entry");

	broker.stop().await;
}

#[tokio::test]
async fn concurrent_requests_for_a_fresh_key_single_flight() {
	let minter = Arc::new(CountingMinter::new());
	let broker = Arc::new(Broker::new(minter.clone()));
	let ad = broker.start(accounts("task"), 0).await.expect("Broker should start.");
	let client = Client::new();
	let mut handles = Vec::new();

	for _ in 0..50 {
		let client = client.clone();
		let port = ad.rpc_port;
		let secret = ad.secret.clone();

		handles.push(tokio::spawn(async move {
			get_oauth_token(&client, port, "task", &["a.scope"], &secret).await
		}));
	}

	let mut tokens = Vec::new();

	for handle in handles {
		let (status, body) = handle.await.expect("Spawned request task should not panic.");

		assert_eq!(status, 200);
		tokens.push(body["access_token"].as_str().unwrap().to_owned());
	}

	assert!(tokens.iter().all(|t| t == &tokens[0]));
	assert_eq!(minter.access_call_count(), 1, "50 concurrent callers for one key should mint once");

	broker.stop().await;
}

#[tokio::test]
async fn fatal_minting_failure_is_cached_and_not_retried() {
	let minter = Arc::new(CountingMinter::fatal());
	let broker = Broker::new(minter.clone());
	let ad = broker.start(accounts("task"), 0).await.expect("Broker should start.");
	let client = Client::new();

	let (status, first) =
		get_oauth_token(&client, ad.rpc_port, "task", &["a.scope"], &ad.secret).await;

	assert_eq!(status, 200, "a cached fatal error is still a 200 on the wire");
	assert_eq!(first["error_code"], 7);

	let (status, second) =
		get_oauth_token(&client, ad.rpc_port, "task", &["a.scope"], &ad.secret).await;

	assert_eq!(status, 200);
	assert_eq!(second["error_code"], 7);
	assert_eq!(minter.access_call_count(), 1, "fatal errors must not be retried");

	broker.stop().await;
}

#[tokio::test]
async fn wrong_secret_is_rejected_without_minting() {
	let minter = Arc::new(CountingMinter::new());
	let broker = Broker::new(minter.clone());
	let ad = broker.start(accounts("task"), 0).await.expect("Broker should start.");
	let client = Client::new();

	let (status, _) =
		get_oauth_token(&client, ad.rpc_port, "task", &["a.scope"], "not-the-secret").await;

	assert_eq!(status, 403);
	assert_eq!(minter.access_call_count(), 0, "a bad secret must short-circuit before minting");

	broker.stop().await;
}

#[tokio::test]
async fn unknown_account_is_rejected_without_minting() {
	let minter = Arc::new(CountingMinter::new());
	let broker = Broker::new(minter.clone());
	let ad = broker.start(accounts("task"), 0).await.expect("Broker should start.");
	let client = Client::new();

	let (status, _) =
		get_oauth_token(&client, ad.rpc_port, "ghost", &["a.scope"], "anything").await;

	assert_eq!(status, 404);
	assert_eq!(minter.access_call_count(), 0);

	broker.stop().await;
}

#[tokio::test]
async fn non_post_method_is_rejected_with_405() {
	let broker = Broker::new(Arc::new(StaticTokenMinter::new(1_000)));
	let ad = broker.start(accounts("task"), 0).await.expect("Broker should start.");
	let client = Client::new();

	let response = client
		.get(format!("http://127.0.0.1:{}/rpc/LuciLocalAuthService.GetOAuthToken", ad.rpc_port))
		.send()
		.await
		.expect("Request should reach the loopback listener.");

	assert_eq!(response.status().as_u16(), 405);

	broker.stop().await;
}

#[tokio::test]
async fn path_not_matching_the_rpc_shape_is_rejected_with_404() {
	let broker = Broker::new(Arc::new(StaticTokenMinter::new(1_000)));
	let ad = broker.start(accounts("task"), 0).await.expect("Broker should start.");
	let client = Client::new();

	let response = client
		.post(format!("http://127.0.0.1:{}/not/the/right/path", ad.rpc_port))
		.header("content-type", "application/json")
		.json(&json!({}))
		.send()
		.await
		.expect("Request should reach the loopback listener.");

	assert_eq!(response.status().as_u16(), 404);

	broker.stop().await;
}

#[tokio::test]
async fn stopped_broker_refuses_new_connections() {
	let broker = Broker::new(Arc::new(StaticTokenMinter::new(1_000)));
	let ad = broker.start(accounts("task"), 0).await.expect("Broker should start.");
	let port = ad.rpc_port;

	broker.stop().await;

	let client = Client::new();
	let result = client
		.post(format!("http://127.0.0.1:{port}/rpc/LuciLocalAuthService.GetOAuthToken"))
		.header("content-type", "application/json")
		.json(&json!({ "account_id": "task", "scopes": ["a.scope"], SECRET_FIELD: ad.secret }))
		.send()
		.await;

	assert!(result.is_err(), "no listener should remain once the broker has stopped");
}

#[tokio::test]
async fn id_token_request_mints_with_audience() {
	let minter = Arc::new(CountingMinter::new());
	let broker = Broker::new(minter.clone());
	let ad = broker.start(accounts("task"), 0).await.expect("Broker should start.");
	let client = Client::new();

	let response = client
		.post(format!(
			"http://127.0.0.1:{}/rpc/LuciLocalAuthService.GetIDToken",
			ad.rpc_port
		))
		.header("content-type", "application/json")
		.json(&json!({ "account_id": "task", "audience": "my-aud", SECRET_FIELD: ad.secret }))
		.send()
		.await
		.expect("Request should reach the loopback listener.");

	assert_eq!(response.status().as_u16(), 200);

	let body: Value = response.json().await.expect("Response body should parse as JSON.");

	assert_eq!(body["id_token"], "id-task-my-aud");

	broker.stop().await;
}
