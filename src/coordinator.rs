//! Authenticated request coordination with singleflight refresh and FIFO replay.
//!
//! [`Coordinator::send`] attaches the current access credential to every outgoing
//! request and transparently recovers from credential expiry. The first 401/403 of an
//! episode starts exactly one refresh-token exchange; requests that fail while that
//! exchange is in flight join a waiter queue and are replayed in arrival order once
//! it settles. A failed exchange rejects the triggering caller and every waiter with
//! the same [`RefreshError`] and forces a logout by clearing the auth store (and the
//! durable vault, when one is attached).

mod metrics;

pub use metrics::RefreshMetrics;

// crates.io
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	auth::{CredentialPair, TokenSecret},
	error::{ConfigError, RefreshError},
	http::{ApiRequest, ApiResponse, HttpTransport, PreparedRequest, header},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::{AuthStore, TokenVault},
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

/// Path of the refresh-token exchange, resolved against the coordinator's base URL.
pub const REFRESH_TOKEN_PATH: &str = "/auth/refresh-token";

#[cfg(feature = "reqwest")]
/// Coordinator specialized for the crate's default reqwest transport.
pub type ReqwestCoordinator = Coordinator<ReqwestTransport>;

/// Coordinates bearer-authenticated requests against a single base URL.
///
/// The coordinator owns the transport, the auth-store collaborator, and the optional
/// durable vault as injected dependencies, and keeps its refresh state (the
/// in-progress flag plus the waiter queue) in instance-scoped fields so independent
/// coordinators, one per test for example, never share an episode.
pub struct Coordinator<T>
where
	T: ?Sized + HttpTransport,
{
	/// Transport used for every outbound request, refresh exchanges included.
	pub transport: Arc<T>,
	/// Live credential store read at send time and written on rotation/logout.
	pub store: Arc<dyn AuthStore>,
	/// Optional durable vault mirroring the live store across launches; best-effort.
	pub vault: Option<Arc<dyn TokenVault>>,
	/// Base URL every request path is resolved against.
	pub base_url: Url,
	/// Shared counters for refresh episode outcomes.
	pub refresh_metrics: Arc<RefreshMetrics>,
	gate: Mutex<RefreshGate>,
}
impl<T> Coordinator<T>
where
	T: ?Sized + HttpTransport,
{
	/// Creates a coordinator that reuses the caller-provided transport.
	pub fn with_transport(
		store: Arc<dyn AuthStore>,
		base_url: Url,
		transport: impl Into<Arc<T>>,
	) -> Self {
		Self {
			transport: transport.into(),
			store,
			vault: None,
			base_url,
			refresh_metrics: Default::default(),
			gate: Default::default(),
		}
	}

	/// Attaches a durable token vault mirroring successful rotations and logouts.
	pub fn with_vault(mut self, vault: Arc<dyn TokenVault>) -> Self {
		self.vault = Some(vault);

		self
	}

	/// Loads the persisted credential pair from the vault into the live store.
	///
	/// Returns `true` when a pair was restored. Vault failures here are best-effort
	/// like the rest of the vault surface: they are logged and the coordinator starts
	/// logged out, as if no pair had been persisted.
	pub async fn hydrate(&self) -> Result<bool> {
		let Some(vault) = &self.vault else {
			return Ok(false);
		};

		match vault.load_tokens().await {
			Ok(Some(pair)) => {
				self.store.set_credentials(pair);

				Ok(true)
			},
			Ok(None) => Ok(false),
			Err(e) => {
				obs::warn_vault_failure("load_tokens", &e);

				Ok(false)
			},
		}
	}

	/// Issues the request with the current access credential attached as a bearer
	/// header, running the refresh protocol on authorization failure.
	///
	/// Callers never need to know whether a refresh was involved:
	/// - responses outside 401/403 are returned unchanged, whatever their status;
	/// - a recoverable 401/403 resolves to the outcome of the refreshed replay;
	/// - a terminal 401/403 (no refresh token, or a second rejection after a
	///   successful refresh) surfaces as [`Error::Unauthorized`] with the original
	///   status and body preserved;
	/// - transport failures propagate verbatim and are never retried.
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		const KIND: FlowKind = FlowKind::Request;

		let span = FlowSpan::new(KIND, "send");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let access = self.store.credentials().map(|pair| pair.access_token);
				let response = self.dispatch(&request, access.as_ref()).await?;

				if !is_auth_failure(response.status()) {
					return Ok(response);
				}

				self.recover(request, response).await
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Runs the refresh protocol for a request that was just rejected with 401/403.
	async fn recover(&self, request: ApiRequest, rejection: ApiResponse) -> Result<ApiResponse> {
		let Some(refresh_token) = self.store.credentials().and_then(|pair| pair.refresh_token)
		else {
			// Not logged in, or a session without a refresh token: terminal.
			return Err(unauthorized(&rejection));
		};
		let role = {
			let mut gate = self.gate.lock();

			if gate.refreshing {
				let (tx, rx) = oneshot::channel();

				gate.waiters.push(Waiter { request, tx });

				EpisodeRole::Waiter(rx)
			} else {
				gate.refreshing = true;

				EpisodeRole::Lead(request)
			}
		};

		match role {
			EpisodeRole::Lead(trigger) => self.lead_episode(trigger, refresh_token).await,
			EpisodeRole::Waiter(rx) => match rx.await {
				Ok(outcome) => outcome,
				// The episode lead dropped its future before draining the queue.
				Err(_) => Err(RefreshError::Abandoned.into()),
			},
		}
	}

	/// Performs the single refresh exchange of an episode and drains the queue.
	async fn lead_episode(
		&self,
		trigger: ApiRequest,
		refresh_token: TokenSecret,
	) -> Result<ApiResponse> {
		let mut guard = EpisodeGuard { coordinator: self, armed: true };

		self.refresh_metrics.record_attempt();

		match self.exchange_refresh_token(&refresh_token).await {
			Ok(pair) => {
				self.store.set_credentials(pair.clone());
				self.persist_rotation(&pair).await;
				self.refresh_metrics.record_success();

				let waiters = self.close_episode();

				guard.armed = false;

				// The trigger is the episode's earliest arrival, so it replays first;
				// waiters follow strictly in the order they were queued.
				let outcome = self.replay(&trigger, &pair.access_token).await;

				for waiter in waiters {
					let result = self.replay(&waiter.request, &pair.access_token).await;
					let _ = waiter.tx.send(result);
				}

				outcome
			},
			Err(err) => {
				self.refresh_metrics.record_failure();
				// Forced logout: the refresh token is no longer usable.
				self.store.clear_credentials();
				self.purge_persisted().await;

				let waiters = self.close_episode();

				guard.armed = false;

				for waiter in waiters {
					let _ = waiter.tx.send(Err(Error::Refresh(err.clone())));
				}

				Err(err.into())
			},
		}
	}

	/// Exchanges the refresh token for a new credential pair.
	async fn exchange_refresh_token(
		&self,
		refresh_token: &TokenSecret,
	) -> Result<CredentialPair, RefreshError> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "exchange_refresh_token");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let request = ApiRequest::post(REFRESH_TOKEN_PATH)
					.json(&RefreshTokenRequest { refresh_token: refresh_token.expose() })
					.map_err(|e| RefreshError::Prepare { message: e.to_string() })?;
				// The exchange itself goes out unauthenticated.
				let prepared = self
					.prepare(&request, None)
					.map_err(|e| RefreshError::Prepare { message: e.to_string() })?;
				let response = self
					.transport
					.execute(prepared)
					.await
					.map_err(|e| RefreshError::Transport { message: e.to_string() })?;

				if !response.status().is_success() {
					return Err(RefreshError::Rejected {
						status: response.status().as_u16(),
						message: rejection_message(&response),
					});
				}

				let envelope: RefreshTokenEnvelope = response
					.json()
					.map_err(|e| RefreshError::Malformed { message: e.0.to_string() })?;

				Ok(CredentialPair::new(envelope.data.access_token, envelope.data.refresh_token))
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Re-issues a request with the freshly rotated access credential.
	///
	/// A replayed request never re-enters the refresh protocol: a second 401/403 is
	/// terminal, which is what prevents infinite refresh loops against a backend that
	/// keeps rejecting the credential.
	async fn replay(&self, request: &ApiRequest, access: &TokenSecret) -> Result<ApiResponse> {
		const KIND: FlowKind = FlowKind::Replay;

		let span = FlowSpan::new(KIND, "replay");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let response = self.dispatch(request, Some(access)).await?;

				if is_auth_failure(response.status()) {
					return Err(unauthorized(&response));
				}

				Ok(response)
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn dispatch(
		&self,
		request: &ApiRequest,
		access: Option<&TokenSecret>,
	) -> Result<ApiResponse> {
		let prepared = self.prepare(request, access)?;

		Ok(self.transport.execute(prepared).await?)
	}

	fn prepare(
		&self,
		request: &ApiRequest,
		access: Option<&TokenSecret>,
	) -> Result<PreparedRequest, ConfigError> {
		let mut url = self.endpoint(&request.path)?;

		if !request.query.is_empty() {
			let mut pairs = url.query_pairs_mut();

			for (key, value) in &request.query {
				pairs.append_pair(key, value);
			}
		}

		let mut headers = request.headers.clone();

		if let Some(access) = access {
			let mut bearer = HeaderValue::from_str(&format!("Bearer {}", access.expose()))?;

			bearer.set_sensitive(true);
			headers.insert(header::AUTHORIZATION, bearer);
		}

		Ok(PreparedRequest {
			method: request.method.clone(),
			url,
			headers,
			body: request.body.clone(),
		})
	}

	fn endpoint(&self, path: &str) -> Result<Url, ConfigError> {
		let base = self.base_url.as_str().trim_end_matches('/');
		let path = path.trim_start_matches('/');

		Url::parse(&format!("{base}/{path}"))
			.map_err(|source| ConfigError::InvalidEndpoint { source })
	}

	/// Marks the episode settled and takes the waiter queue, preserving arrival order.
	fn close_episode(&self) -> Vec<Waiter> {
		let mut gate = self.gate.lock();

		gate.refreshing = false;

		std::mem::take(&mut gate.waiters)
	}

	async fn persist_rotation(&self, pair: &CredentialPair) {
		let Some(vault) = &self.vault else {
			return;
		};

		if let Err(e) = vault.save_tokens(pair).await {
			obs::warn_vault_failure("save_tokens", &e);
		}
	}

	async fn purge_persisted(&self) {
		let Some(vault) = &self.vault else {
			return;
		};

		if let Err(e) = vault.remove_tokens().await {
			obs::warn_vault_failure("remove_tokens", &e);
		}
	}
}
#[cfg(feature = "reqwest")]
impl ReqwestCoordinator {
	/// Creates a coordinator with the crate's default reqwest transport, including its
	/// fixed 30-second request timeout.
	pub fn new(store: Arc<dyn AuthStore>, base_url: Url) -> Result<Self> {
		Ok(Self::with_transport(store, base_url, ReqwestTransport::new()?))
	}
}
impl<T> Debug for Coordinator<T>
where
	T: ?Sized + HttpTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Coordinator")
			.field("base_url", &self.base_url)
			.field("vault_set", &self.vault.is_some())
			.finish()
	}
}

#[derive(Default)]
struct RefreshGate {
	refreshing: bool,
	waiters: Vec<Waiter>,
}

/// A caller suspended behind an in-flight refresh, queued for replay.
struct Waiter {
	request: ApiRequest,
	tx: oneshot::Sender<Result<ApiResponse>>,
}

enum EpisodeRole {
	Lead(ApiRequest),
	Waiter(oneshot::Receiver<Result<ApiResponse>>),
}

/// Rejects queued waiters if the episode lead is dropped mid-refresh, so no waiter
/// pends forever on a queue nothing will ever drain.
struct EpisodeGuard<'a, T>
where
	T: ?Sized + HttpTransport,
{
	coordinator: &'a Coordinator<T>,
	armed: bool,
}
impl<T> Drop for EpisodeGuard<'_, T>
where
	T: ?Sized + HttpTransport,
{
	fn drop(&mut self) {
		if !self.armed {
			return;
		}

		for waiter in self.coordinator.close_episode() {
			let _ = waiter.tx.send(Err(RefreshError::Abandoned.into()));
		}
	}
}

fn is_auth_failure(status: StatusCode) -> bool {
	status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

fn unauthorized(response: &ApiResponse) -> Error {
	Error::Unauthorized { status: response.status().as_u16(), body: response.text_lossy() }
}

/// Pulls the backend envelope's `message` out of a refresh rejection, falling back to
/// the raw body; recovery decisions never depend on it, only error reporting does.
fn rejection_message(response: &ApiResponse) -> String {
	#[derive(Deserialize)]
	struct ErrorEnvelope {
		message: Option<String>,
	}

	if let Ok(ErrorEnvelope { message: Some(message) }) =
		serde_json::from_slice(response.body())
	{
		return message;
	}

	response.text_lossy().unwrap_or_else(|| "no response body".into())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshTokenRequest<'a> {
	refresh_token: &'a str,
}

#[derive(Deserialize)]
struct RefreshTokenEnvelope {
	data: RefreshTokenGrant,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshTokenGrant {
	access_token: String,
	refresh_token: String,
}
