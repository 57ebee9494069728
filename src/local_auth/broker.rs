//! The public broker facade: `start`/`stop` lifecycle and the RPC handler itself.

// std
use std::io;
// crates.io
use tokio::{
	io::BufReader,
	net::{TcpListener, TcpStream},
	task::{JoinHandle, JoinSet},
};
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	local_auth::{
		account::{AccountId, AccountSet},
		advertisement::Advertisement,
		cache::{Cache, CacheEntry, CacheKey},
		coordinator::Inflight,
		error::RpcError,
		minter::{MintKind, TokenMinter},
		obs::{self, MintSpan, RpcMethod, RpcOutcome, RpcSpan},
		secret::RpcSecret,
		transport::{self, ParsedRequest},
	},
};

/// Errors raised by [`Broker::start`].
#[derive(Debug, ThisError)]
pub enum BrokerError {
	/// `start` was called while the broker was already running.
	#[error("Broker is already running.")]
	AlreadyRunning,
	/// The loopback listener could not be bound.
	#[error("Failed to bind the RPC listener: {source}.")]
	Bind {
		/// Underlying bind failure.
		#[source]
		source: io::Error,
	},
}

/// State that exists only while the broker is running.
struct Running {
	secret: RpcSecret,
	accounts: AccountSet,
	cache: Cache,
	inflight: Inflight,
}

/// Bookkeeping for the spawned accept-loop task, torn down by `stop()`.
struct ServerHandle {
	cancel: CancellationToken,
	task: JoinHandle<()>,
}

/// Loopback-only JSON-RPC broker that mints short-lived OAuth access and ID tokens for
/// co-located child processes.
///
/// One state mutex guards `{cache, inflight, secret, accounts}` together (§9 design notes); it
/// is a [`parking_lot::Mutex`] and is never held across an `.await` point. Minting happens
/// outside the lock; the single-flight bookkeeping in [`Inflight`] makes that safe.
pub struct Broker {
	minter: Arc<dyn TokenMinter>,
	state: Arc<Mutex<Option<Running>>>,
	server: Mutex<Option<ServerHandle>>,
}
impl Broker {
	/// Creates a broker that is not yet listening; call [`Broker::start`] to begin serving.
	pub fn new(minter: Arc<dyn TokenMinter>) -> Self {
		Self { minter, state: Arc::new(Mutex::new(None)), server: Mutex::new(None) }
	}

	/// Starts listening on `127.0.0.1:port` (`port` 0 lets the OS choose) and returns the
	/// [`Advertisement`] child processes need to reach it.
	///
	/// Generates a fresh [`RpcSecret`], replacing any secret from a previous `start()`/`stop()`
	/// cycle (I4).
	pub async fn start(
		&self,
		accounts: AccountSet,
		port: u16,
	) -> Result<Advertisement, BrokerError> {
		if self.server.lock().is_some() {
			return Err(BrokerError::AlreadyRunning);
		}

		let listener = TcpListener::bind(("127.0.0.1", port))
			.await
			.map_err(|source| BrokerError::Bind { source })?;
		let bound_port = listener.local_addr().map_err(|source| BrokerError::Bind { source })?.port();

		obs::log_listening(bound_port);

		let secret = RpcSecret::generate();

		*self.state.lock() = Some(Running {
			secret: secret.clone(),
			accounts: accounts.clone(),
			cache: Cache::new(),
			inflight: Inflight::new(),
		});

		let cancel = CancellationToken::new();
		let task = tokio::spawn(Self::serve(listener, cancel.clone(), self.state.clone(), self.minter.clone()));

		*self.server.lock() = Some(ServerHandle { cancel, task });

		Ok(Advertisement::new(bound_port, secret.as_str(), &accounts))
	}

	/// Stops accepting new connections and waits for every in-flight handler task to finish.
	///
	/// Idempotent: calling `stop()` on an already-stopped broker is a no-op. Clears the cache
	/// and discards any in-flight mint bookkeeping (P6, P7's "until `stop()`" boundary).
	pub async fn stop(&self) {
		let handle = self.server.lock().take();

		let Some(handle) = handle else { return };

		handle.cancel.cancel();
		let _ = handle.task.await;

		*self.state.lock() = None;
	}

	/// Returns `true` if the broker is currently accepting connections.
	pub fn is_running(&self) -> bool {
		self.server.lock().is_some()
	}

	async fn serve(
		listener: TcpListener,
		cancel: CancellationToken,
		state: Arc<Mutex<Option<Running>>>,
		minter: Arc<dyn TokenMinter>,
	) {
		let mut handlers = JoinSet::new();

		loop {
			tokio::select! {
				biased;

				_ = cancel.cancelled() => break,

				accepted = listener.accept() => {
					if let Ok((stream, _addr)) = accepted {
						let state = state.clone();
						let minter = minter.clone();

						handlers.spawn(async move {
							handle_connection(stream, state, minter).await;
						});
					}
				},

				Some(_) = handlers.join_next(), if !handlers.is_empty() => {},
			}
		}

		while handlers.join_next().await.is_some() {}
	}
}
impl Debug for Broker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Broker").field("running", &self.is_running()).finish()
	}
}

/// Request body shape for `GetOAuthToken`.
#[derive(Deserialize)]
struct GetOAuthTokenRequest {
	account_id: String,
	scopes: Vec<String>,
	secret: String,
}

/// Request body shape for `GetIDToken`.
#[derive(Deserialize)]
struct GetIdTokenRequest {
	account_id: String,
	audience: String,
	secret: String,
}

/// Success response body for an access token.
#[derive(Serialize)]
struct AccessTokenResponse {
	access_token: String,
	expiry: i64,
}

/// Success response body for an ID token.
#[derive(Serialize)]
struct IdTokenResponse {
	id_token: String,
	expiry: i64,
}

/// Response body for a cached fatal minting failure (HTTP 200, §7).
#[derive(Serialize)]
struct FatalTokenResponseBody {
	error_code: i64,
	error_message: String,
}

async fn handle_connection(
	stream: TcpStream,
	state: Arc<Mutex<Option<Running>>>,
	minter: Arc<dyn TokenMinter>,
) {
	let mut io = BufReader::new(stream);
	let parsed = match transport::read_request(&mut io).await {
		Ok(parsed) => parsed,
		Err(err) => {
			obs::record_rpc_outcome(RpcMethod::GetOAuthToken, RpcOutcome::Rejected);
			let _ = send_error(&mut io, &err).await;
			return;
		},
	};

	dispatch(&mut io, parsed, &state, &minter).await;
}

async fn dispatch(
	io: &mut BufReader<TcpStream>,
	parsed: ParsedRequest,
	state: &Arc<Mutex<Option<Running>>>,
	minter: &Arc<dyn TokenMinter>,
) {
	match parsed.method.as_str() {
		"GetOAuthToken" => handle_get_oauth_token(io, &parsed.body, state, minter).await,
		"GetIDToken" => handle_get_id_token(io, &parsed.body, state, minter).await,
		other => {
			let err = RpcError::UnknownMethod { method: other.to_owned() };

			obs::record_rpc_outcome(RpcMethod::GetOAuthToken, RpcOutcome::Rejected);
			let _ = send_error(io, &err).await;
		},
	}
}

async fn handle_get_oauth_token(
	io: &mut BufReader<TcpStream>,
	body: &[u8],
	state: &Arc<Mutex<Option<Running>>>,
	minter: &Arc<dyn TokenMinter>,
) {
	const METHOD: RpcMethod = RpcMethod::GetOAuthToken;

	let request: GetOAuthTokenRequest = match serde_json::from_slice(body) {
		Ok(req) => req,
		Err(e) => {
			obs::record_rpc_outcome(METHOD, RpcOutcome::Rejected);
			let _ =
				send_error(io, &RpcError::MalformedRequest { reason: e.to_string() }).await;
			return;
		},
	};

	let account_id = match validate_account(state, &request.account_id, &request.secret) {
		Ok(id) => id,
		Err(err) => {
			obs::record_rpc_outcome(METHOD, RpcOutcome::Rejected);
			let _ = send_error(io, &err).await;
			return;
		},
	};

	let span = RpcSpan::new(METHOD, account_id.as_ref());
	let key = CacheKey::access(account_id, request.scopes);
	let outcome = span.instrument(resolve_entry(state.clone(), minter.clone(), key)).await;

	match outcome {
		Ok((CacheEntry::Token(token), served_as)) => {
			obs::record_rpc_outcome(METHOD, served_as);
			let _ = send_json(
				io,
				200,
				&AccessTokenResponse { access_token: token.value, expiry: token.expiry },
			)
			.await;
		},
		Ok((CacheEntry::Fatal(fatal), _)) => {
			obs::record_rpc_outcome(METHOD, RpcOutcome::Failed);
			let _ = send_json(
				io,
				200,
				&FatalTokenResponseBody { error_code: fatal.code, error_message: fatal.message },
			)
			.await;
		},
		Err(err) => {
			obs::record_rpc_outcome(METHOD, RpcOutcome::Failed);
			let _ = send_error(io, &err).await;
		},
	}
}

async fn handle_get_id_token(
	io: &mut BufReader<TcpStream>,
	body: &[u8],
	state: &Arc<Mutex<Option<Running>>>,
	minter: &Arc<dyn TokenMinter>,
) {
	const METHOD: RpcMethod = RpcMethod::GetIDToken;

	let request: GetIdTokenRequest = match serde_json::from_slice(body) {
		Ok(req) => req,
		Err(e) => {
			obs::record_rpc_outcome(METHOD, RpcOutcome::Rejected);
			let _ =
				send_error(io, &RpcError::MalformedRequest { reason: e.to_string() }).await;
			return;
		},
	};

	let account_id = match validate_account(state, &request.account_id, &request.secret) {
		Ok(id) => id,
		Err(err) => {
			obs::record_rpc_outcome(METHOD, RpcOutcome::Rejected);
			let _ = send_error(io, &err).await;
			return;
		},
	};

	let span = RpcSpan::new(METHOD, account_id.as_ref());
	let key = CacheKey::id(account_id, request.audience);
	let outcome = span.instrument(resolve_entry(state.clone(), minter.clone(), key)).await;

	match outcome {
		Ok((CacheEntry::Token(token), served_as)) => {
			obs::record_rpc_outcome(METHOD, served_as);
			let _ =
				send_json(io, 200, &IdTokenResponse { id_token: token.value, expiry: token.expiry })
					.await;
		},
		Ok((CacheEntry::Fatal(fatal), _)) => {
			obs::record_rpc_outcome(METHOD, RpcOutcome::Failed);
			let _ = send_json(
				io,
				200,
				&FatalTokenResponseBody { error_code: fatal.code, error_message: fatal.message },
			)
			.await;
		},
		Err(err) => {
			obs::record_rpc_outcome(METHOD, RpcOutcome::Failed);
			let _ = send_error(io, &err).await;
		},
	}
}

/// Validates request shape, then the secret, then account existence, without ever holding the
/// state lock across an `.await`.
///
/// The constant-time secret compare always runs, against a fixed-length dummy secret when the
/// broker is stopped, so that "stopped" / "unknown account" / "bad secret" cannot be
/// distinguished by response latency (§4.4, P4): which [`RpcError`] to surface is decided only
/// after the compare has already happened.
fn validate_account(
	state: &Arc<Mutex<Option<Running>>>,
	account_id: &str,
	secret: &str,
) -> Result<AccountId, RpcError> {
	let account_id = AccountId::new(account_id)
		.map_err(|e| RpcError::MalformedRequest { reason: e.to_string() })?;
	let guard = state.lock();
	let running = guard.as_ref();
	let secret_matches = match running {
		Some(running) => running.secret.constant_time_eq(secret),
		None => RpcSecret::dummy().constant_time_eq(secret),
	};
	let running = running.ok_or(RpcError::Stopped)?;

	if !running.accounts.contains(&account_id) {
		return Err(RpcError::UnknownAccount { account_id: account_id.to_string() });
	}
	if !secret_matches {
		return Err(RpcError::BadSecret);
	}

	Ok(account_id)
}

/// Outcome of one mint attempt, fanned out to every concurrent waiter for the same key (P1).
///
/// Returns the served [`CacheEntry`] alongside the [`RpcOutcome`] it should be reported as:
/// [`RpcOutcome::CacheHit`] only for the direct fresh-cache path below, [`RpcOutcome::Minted`]
/// for a fresh mint or a joined in-flight one.
async fn resolve_entry(
	state: Arc<Mutex<Option<Running>>>,
	minter: Arc<dyn TokenMinter>,
	key: CacheKey,
) -> Result<(CacheEntry, RpcOutcome), RpcError> {
	use crate::local_auth::coordinator::MintOutcome;

	enum Lead {
		Join(tokio::sync::broadcast::Receiver<MintOutcome>),
		Mint(tokio::sync::broadcast::Sender<MintOutcome>),
	}

	let now = OffsetDateTime::now_utc().unix_timestamp();
	let lead = {
		let mut guard = state.lock();
		let running = guard.as_mut().ok_or(RpcError::Stopped)?;

		if let Some(entry) = running.cache.get(&key)
			&& entry.is_fresh(now)
		{
			return Ok((entry.clone(), RpcOutcome::CacheHit));
		}

		if let Some(rx) = running.inflight.subscribe(&key) {
			Lead::Join(rx)
		} else {
			Lead::Mint(running.inflight.begin(key.clone()))
		}
	};

	match lead {
		Lead::Join(mut rx) => rx
			.recv()
			.await
			.map_err(|_| RpcError::Internal {
				reason: "Mint result channel closed before delivering an outcome.".into(),
			})?
			.map(|entry| (entry, RpcOutcome::Minted))
			.map_err(RpcError::from),
		Lead::Mint(_tx) => {
			let kind = match &key {
				CacheKey::Access { .. } => MintKind::Access,
				CacheKey::Id { .. } => MintKind::Id,
			};
			let account_id = key.account_id().as_ref();
			let mint_span = MintSpan::new(kind, account_id);
			let mint_result = match &key {
				CacheKey::Access { account_id, scopes } =>
					mint_span.instrument(minter.mint_access(account_id.as_ref(), scopes)).await,
				CacheKey::Id { account_id, audience } =>
					mint_span.instrument(minter.mint_id(account_id.as_ref(), audience)).await,
			};
			let outcome: MintOutcome = match mint_result {
				Ok(Ok(token)) => Ok(CacheEntry::Token(token)),
				Ok(Err(fatal)) => Ok(CacheEntry::Fatal(fatal)),
				Err(transient) => Err(transient),
			};

			obs::log_mint(kind, account_id, match &outcome {
				Ok(CacheEntry::Token(_)) => "minted",
				Ok(CacheEntry::Fatal(_)) => "fatal",
				Err(_) => "transient",
			});

			{
				let mut guard = state.lock();

				if let Some(running) = guard.as_mut() {
					if let Ok(entry) = &outcome {
						running.cache.put(key.clone(), entry.clone());
					}

					running.inflight.finish(&key, outcome.clone());
				}
			}

			outcome.map(|entry| (entry, RpcOutcome::Minted)).map_err(RpcError::from)
		},
	}
}

async fn send_json<S>(stream: &mut S, status: u16, value: &impl Serialize) -> io::Result<()>
where
	S: tokio::io::AsyncWrite + Unpin,
{
	let body = serde_json::to_vec(value)
		.map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

	transport::write_response(stream, status, "application/json", &body).await
}

async fn send_error<S>(stream: &mut S, err: &RpcError) -> io::Result<()>
where
	S: tokio::io::AsyncWrite + Unpin,
{
	if let RpcError::Fatal(fatal) = err {
		return send_json(
			stream,
			200,
			&FatalTokenResponseBody { error_code: fatal.code, error_message: fatal.message.clone() },
		)
		.await;
	}

	transport::write_response(stream, err.status(), "text/plain", err.wire_body().as_bytes()).await
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::local_auth::{account::Account, minters::StaticTokenMinter};

	fn accounts() -> AccountSet {
		AccountSet::new(
			[Account::new(AccountId::new("a").unwrap(), "a@x")],
			Some(AccountId::new("a").unwrap()),
		)
		.unwrap()
	}

	#[tokio::test]
	async fn start_then_stop_is_idempotent_and_clears_state() {
		let broker = Broker::new(Arc::new(StaticTokenMinter::new(1_000)));
		let ad = broker.start(accounts(), 0).await.expect("start should succeed on port 0");

		assert!(ad.rpc_port > 0);
		assert!(broker.is_running());

		broker.stop().await;
		broker.stop().await;

		assert!(!broker.is_running());
	}

	#[tokio::test]
	async fn cannot_start_twice_without_stopping() {
		let broker = Broker::new(Arc::new(StaticTokenMinter::new(1_000)));

		broker.start(accounts(), 0).await.unwrap();

		let err = broker.start(accounts(), 0).await.expect_err("second start should fail");

		assert!(matches!(err, BrokerError::AlreadyRunning));

		broker.stop().await;
	}

	#[tokio::test]
	async fn validate_account_reports_unknown_account_and_bad_secret() {
		let state = Arc::new(Mutex::new(Some(Running {
			secret: RpcSecret::from_encoded("right"),
			accounts: accounts(),
			cache: Cache::new(),
			inflight: Inflight::new(),
		})));

		let err = validate_account(&state, "missing", "wrong").unwrap_err();

		assert!(matches!(err, RpcError::UnknownAccount { .. }));

		let err = validate_account(&state, "a", "wrong").unwrap_err();

		assert!(matches!(err, RpcError::BadSecret));

		assert!(validate_account(&state, "a", "right").is_ok());
	}

	#[tokio::test]
	async fn validate_account_compares_the_secret_even_when_stopped() {
		let state: Arc<Mutex<Option<Running>>> = Arc::new(Mutex::new(None));

		let err = validate_account(&state, "a", "anything").unwrap_err();

		assert!(matches!(err, RpcError::Stopped));
	}

	#[tokio::test]
	async fn resolve_entry_single_flights_concurrent_callers() {
		let state = Arc::new(Mutex::new(Some(Running {
			secret: RpcSecret::from_encoded("s"),
			accounts: accounts(),
			cache: Cache::new(),
			inflight: Inflight::new(),
		})));
		let minter: Arc<dyn TokenMinter> = Arc::new(StaticTokenMinter::new(1_000));
		let key = CacheKey::access(AccountId::new("a").unwrap(), ["s1".to_string()]);
		let mut handles = Vec::new();

		for _ in 0..50 {
			let state = state.clone();
			let minter = minter.clone();
			let key = key.clone();

			handles.push(tokio::spawn(resolve_entry(state, minter, key)));
		}

		let mut values = Vec::new();

		for handle in handles {
			let (entry, _served_as) = handle.await.unwrap().unwrap();

			if let CacheEntry::Token(token) = entry {
				values.push(token.value);
			} else {
				panic!("expected a token entry");
			}
		}

		assert!(values.iter().all(|v| v == &values[0]));
	}

	#[tokio::test]
	async fn resolve_entry_distinguishes_cache_hit_from_minted() {
		let state = Arc::new(Mutex::new(Some(Running {
			secret: RpcSecret::from_encoded("s"),
			accounts: accounts(),
			cache: Cache::new(),
			inflight: Inflight::new(),
		})));
		let minter: Arc<dyn TokenMinter> = Arc::new(StaticTokenMinter::new(1_000));
		let key = CacheKey::access(AccountId::new("a").unwrap(), ["s1".to_string()]);

		let (_, first) = resolve_entry(state.clone(), minter.clone(), key.clone()).await.unwrap();

		assert!(matches!(first, RpcOutcome::Minted));

		let (_, second) = resolve_entry(state, minter, key).await.unwrap();

		assert!(matches!(second, RpcOutcome::CacheHit));
	}
}
