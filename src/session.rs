//! Token source with caching, lazy expiry, and single-flight acquisition.
//!
//! [`TokenSource::acquire`] answers from the cached token while it is valid and only
//! contacts the token endpoint when the cache is absent or expired. The exchange runs as
//! a shared future parked in the cache state: the first caller starts it, every caller
//! that arrives while it is pending attaches to the same future, and all of them observe
//! the same outcome. The future commits its own result to the cache, so the refresh
//! completes for the remaining waiters even if the caller that started it goes away.

pub mod clock;

mod metrics;

pub use clock::*;
pub use metrics::TokenSourceMetrics;

// std
use std::{pin::pin, sync::Weak};
// crates.io
use futures::{
	FutureExt,
	future::{self, BoxFuture, Either, Shared},
};
// self
use crate::{
	_prelude::*,
	auth::Token,
	oauth::ClientCredentialsExchange,
	obs::{self, OpKind, OpOutcome, OpSpan},
};

type SharedExchange = Shared<BoxFuture<'static, Result<Token>>>;

/// Lifecycle of the cached token as observed by [`TokenSource::state`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenState {
	/// No token has been acquired (or seeded) yet.
	Absent,
	/// A cached token is usable right now.
	Valid,
	/// The cached token is past its expiry (including the skew); the next acquisition
	/// refreshes it.
	Expired,
	/// A token endpoint exchange is in flight.
	Refreshing,
}

#[derive(Default)]
struct CacheState {
	token: Option<Token>,
	in_flight: Option<SharedExchange>,
}

struct ExchangeContext {
	exchange: ClientCredentialsExchange,
	clock: Arc<dyn Clock>,
	metrics: TokenSourceMetrics,
}

struct TokenSourceInner {
	context: Arc<ExchangeContext>,
	skew: Duration,
	state: Arc<Mutex<CacheState>>,
}

enum Lookup {
	Cached(Token),
	Wait(SharedExchange),
}

/// Produces valid tokens on demand for exactly one set of client credentials.
///
/// Cloning is cheap and every clone shares the same cache, in-flight marker, and
/// counters.
#[derive(Clone)]
pub struct TokenSource(Arc<TokenSourceInner>);
impl TokenSource {
	/// Default safety margin subtracted from a token's expiry.
	pub const DEFAULT_EXPIRY_SKEW: Duration = Duration::seconds(10);

	pub(crate) fn new(
		exchange: ClientCredentialsExchange,
		clock: Arc<dyn Clock>,
		skew: Duration,
		initial_token: Option<Token>,
	) -> Self {
		let skew = if skew.is_negative() { Duration::ZERO } else { skew };
		let context =
			Arc::new(ExchangeContext { exchange, clock, metrics: TokenSourceMetrics::default() });
		let state = Arc::new(Mutex::new(CacheState { token: initial_token, in_flight: None }));

		Self(Arc::new(TokenSourceInner { context, skew, state }))
	}

	/// Returns a valid token, contacting the token endpoint only when the cache is absent
	/// or expired.
	///
	/// Failures are never cached: the previous token state is kept and the next call
	/// starts a fresh exchange.
	pub async fn acquire(&self) -> Result<Token> {
		const KIND: OpKind = OpKind::TokenAcquire;

		let span = OpSpan::new(KIND, "acquire");

		span.instrument(async move {
			match self.lookup() {
				Lookup::Cached(token) => {
					self.0.context.metrics.record_cache_hit();
					obs::record_op_outcome(KIND, OpOutcome::CacheHit);

					Ok(token)
				},
				Lookup::Wait(exchange) => exchange.await,
			}
		})
		.await
	}

	/// Same as [`acquire`](Self::acquire) but gives up with [`Error::Cancelled`] once
	/// `cancel` fires.
	///
	/// Cancelling only detaches this caller. A shared exchange keeps running for the
	/// other waiters and still populates the cache when it completes.
	pub async fn acquire_with(&self, cancel: &CancellationToken) -> Result<Token> {
		if cancel.is_cancelled() {
			return Err(Error::Cancelled);
		}

		let acquire = pin!(self.acquire());
		let cancelled = pin!(cancel.cancelled());

		match future::select(acquire, cancelled).await {
			Either::Left((result, _)) => result,
			Either::Right(_) => Err(Error::Cancelled),
		}
	}

	/// Returns a copy of the cached token without validating or refreshing it.
	pub fn cached(&self) -> Option<Token> {
		self.0.state.lock().token.clone()
	}

	/// Reports the current lifecycle state.
	pub fn state(&self) -> TokenState {
		let state = self.0.state.lock();

		if state.in_flight.is_some() {
			return TokenState::Refreshing;
		}

		match state.token.as_ref() {
			None => TokenState::Absent,
			Some(token) if token.is_valid_at(self.0.context.clock.now(), self.0.skew) =>
				TokenState::Valid,
			Some(_) => TokenState::Expired,
		}
	}

	/// Safety margin applied before a token's expiry.
	pub fn expiry_skew(&self) -> Duration {
		self.0.skew
	}

	/// Acquisition counters for this source.
	pub fn metrics(&self) -> &TokenSourceMetrics {
		&self.0.context.metrics
	}

	fn lookup(&self) -> Lookup {
		let mut state = self.0.state.lock();
		let now = self.0.context.clock.now();

		if let Some(token) = state.token.as_ref().filter(|token| token.is_valid_at(now, self.0.skew))
		{
			return Lookup::Cached(token.clone());
		}
		if let Some(in_flight) = state.in_flight.as_ref() {
			return Lookup::Wait(in_flight.clone());
		}

		let exchange =
			Self::exchange(self.0.context.clone(), Arc::downgrade(&self.0.state)).boxed().shared();

		state.in_flight = Some(exchange.clone());

		Lookup::Wait(exchange)
	}

	async fn exchange(context: Arc<ExchangeContext>, state: Weak<Mutex<CacheState>>) -> Result<Token> {
		const KIND: OpKind = OpKind::TokenAcquire;

		context.metrics.record_exchange();
		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let clock = context.clock.clone();
		let result = context.exchange.request(move || clock.now()).await;

		match &result {
			Ok(_) => obs::record_op_outcome(KIND, OpOutcome::Success),
			Err(_) => {
				context.metrics.record_failure();
				obs::record_op_outcome(KIND, OpOutcome::Failure);
			},
		}

		if let Some(state) = state.upgrade() {
			let mut state = state.lock();

			state.in_flight = None;

			if let Ok(token) = &result {
				state.token = Some(token.clone());
			}
		}

		result
	}
}
impl Debug for TokenSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenSource")
			.field("state", &self.state())
			.field("skew", &self.0.skew)
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use futures::channel::oneshot;
	use time::macros;
	// self
	use super::*;
	use crate::{
		auth::Credentials,
		error::AuthenticationError,
		oauth::ExchangeParams,
		transport::{HttpTransport, TransportFuture},
	};

	/// Token endpoint double that counts calls and can hold replies until released.
	struct CountingEndpoint {
		calls: AtomicUsize,
		status: Mutex<u16>,
		gate: Mutex<Option<Shared<oneshot::Receiver<()>>>>,
	}
	impl CountingEndpoint {
		fn new() -> Arc<Self> {
			Arc::new(Self { calls: AtomicUsize::new(0), status: Mutex::new(200), gate: Mutex::new(None) })
		}

		fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}

		fn hold(&self) -> oneshot::Sender<()> {
			let (tx, rx) = oneshot::channel();

			*self.gate.lock() = Some(rx.shared());

			tx
		}
	}
	impl HttpTransport for CountingEndpoint {
		fn send(&self, _request: HttpRequest) -> TransportFuture<'_> {
			let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
			let gate = self.gate.lock().clone();
			let status = *self.status.lock();

			Box::pin(async move {
				if let Some(gate) = gate {
					let _ = gate.await;
				}

				let body = if status == 200 {
					format!(
						"{{\"access_token\":\"token-{call}\",\"token_type\":\"bearer\",\"expires_in\":3600}}"
					)
				} else {
					"{\"error\":\"invalid_client\"}".to_owned()
				};
				let response = http::Response::builder()
					.status(status)
					.header(http::header::CONTENT_TYPE, "application/json")
					.body(body.into_bytes())
					.map_err(crate::error::NetworkError::from)?;

				Ok(response)
			})
		}
	}

	fn source(
		endpoint: Arc<CountingEndpoint>,
		clock: Arc<dyn Clock>,
		initial: Option<Token>,
	) -> TokenSource {
		let url = Url::parse("https://auth.example.com/oauth/token")
			.expect("Token endpoint fixture should parse.");
		let exchange = ClientCredentialsExchange::new(
			&url,
			&Credentials::new("id", "secret"),
			ExchangeParams::default(),
			endpoint,
		)
		.expect("Exchange should build.");

		TokenSource::new(exchange, clock, TokenSource::DEFAULT_EXPIRY_SKEW, initial)
	}

	fn start() -> OffsetDateTime {
		macros::datetime!(2025-03-01 09:00 UTC)
	}

	#[tokio::test]
	async fn valid_cache_is_reused_without_network_calls() {
		let endpoint = CountingEndpoint::new();
		let tokens = source(endpoint.clone(), Arc::new(ManualClock::new(start())), None);

		assert_eq!(tokens.state(), TokenState::Absent);

		let first = tokens.acquire().await.expect("First acquisition should succeed.");

		for _ in 0..5 {
			assert_eq!(tokens.acquire().await.expect("Cached acquisition should succeed."), first);
		}

		assert_eq!(endpoint.calls(), 1);
		assert_eq!(tokens.metrics().exchanges(), 1);
		assert_eq!(tokens.metrics().cache_hits(), 5);
		assert_eq!(tokens.state(), TokenState::Valid);
	}

	#[tokio::test]
	async fn expired_tokens_trigger_exactly_one_refresh() {
		let endpoint = CountingEndpoint::new();
		let clock = ManualClock::new(start());
		let tokens = source(endpoint.clone(), Arc::new(clock.clone()), None);
		let first = tokens.acquire().await.expect("First acquisition should succeed.");

		// Inside the skew window the token already counts as expired.
		clock.advance(Duration::seconds(3600 - 10));

		assert_eq!(tokens.state(), TokenState::Expired);

		let second = tokens.acquire().await.expect("Refresh should succeed.");

		assert_ne!(first.access_token, second.access_token);
		assert_eq!(second.access_token.expose(), "token-2");
		assert_eq!(second.expires_at, Some(clock.now() + Duration::hours(1)));
		assert_eq!(endpoint.calls(), 2);
	}

	#[tokio::test]
	async fn seeded_token_is_used_until_it_expires() {
		let endpoint = CountingEndpoint::new();
		let clock = ManualClock::new(start());
		let seed = Token::bearer("seeded", Some(start() + Duration::minutes(5)));
		let tokens = source(endpoint.clone(), Arc::new(clock.clone()), Some(seed.clone()));

		assert_eq!(tokens.acquire().await.expect("Seed should be served."), seed);
		assert_eq!(endpoint.calls(), 0);

		clock.advance(Duration::minutes(5));

		let refreshed = tokens.acquire().await.expect("Expired seed should be replaced.");

		assert_eq!(refreshed.access_token.expose(), "token-1");
		assert_eq!(endpoint.calls(), 1);
	}

	#[tokio::test]
	async fn concurrent_callers_share_one_exchange() {
		let endpoint = CountingEndpoint::new();
		let tokens = source(endpoint.clone(), Arc::new(ManualClock::new(start())), None);
		let release = endpoint.hold();
		let waiters = (0..32).map(|_| tokens.acquire()).collect::<Vec<_>>();
		let opener = async {
			while endpoint.calls() == 0 {
				tokio::task::yield_now().await;
			}

			assert_eq!(tokens.state(), TokenState::Refreshing);

			let _ = release.send(());
		};
		let (results, ()) = futures::join!(future::join_all(waiters), opener);
		let first = results[0].clone().expect("Shared exchange should succeed.");

		for result in results {
			assert_eq!(result.expect("Every waiter should succeed."), first);
		}

		assert_eq!(endpoint.calls(), 1);
	}

	#[tokio::test]
	async fn concurrent_callers_share_one_failure_and_retry_afterwards() {
		let endpoint = CountingEndpoint::new();
		let tokens = source(endpoint.clone(), Arc::new(ManualClock::new(start())), None);

		*endpoint.status.lock() = 401;

		let release = endpoint.hold();
		let waiters = (0..8).map(|_| tokens.acquire()).collect::<Vec<_>>();
		let opener = async {
			while endpoint.calls() == 0 {
				tokio::task::yield_now().await;
			}

			let _ = release.send(());
		};
		let (results, ()) = futures::join!(future::join_all(waiters), opener);

		for result in results {
			assert!(matches!(
				result,
				Err(Error::Authentication(AuthenticationError::Rejected { status: Some(401), .. }))
			));
		}

		assert_eq!(endpoint.calls(), 1);
		assert_eq!(tokens.state(), TokenState::Absent);
		assert!(tokens.cached().is_none());

		*endpoint.status.lock() = 200;
		*endpoint.gate.lock() = None;

		tokens.acquire().await.expect("Retry after a failure should contact the endpoint again.");

		assert_eq!(endpoint.calls(), 2);
		assert_eq!(tokens.metrics().failures(), 1);
	}

	#[tokio::test]
	async fn failed_refresh_keeps_the_previous_token() {
		let endpoint = CountingEndpoint::new();
		let clock = ManualClock::new(start());
		let tokens = source(endpoint.clone(), Arc::new(clock.clone()), None);
		let first = tokens.acquire().await.expect("First acquisition should succeed.");

		clock.advance(Duration::hours(2));
		*endpoint.status.lock() = 401;

		tokens.acquire().await.expect_err("Refresh should fail.");

		assert_eq!(tokens.cached(), Some(first));
		assert_eq!(tokens.state(), TokenState::Expired);
	}

	#[tokio::test]
	async fn cancelling_one_waiter_does_not_cancel_the_shared_exchange() {
		let endpoint = CountingEndpoint::new();
		let tokens = source(endpoint.clone(), Arc::new(ManualClock::new(start())), None);
		let release = endpoint.hold();
		let cancel = CancellationToken::new();
		let cancelled = tokens.acquire_with(&cancel);
		let patient = tokens.acquire();
		let driver = async {
			while endpoint.calls() == 0 {
				tokio::task::yield_now().await;
			}

			cancel.cancel();
			tokio::task::yield_now().await;

			let _ = release.send(());
		};
		let (cancelled, patient, ()) = futures::join!(cancelled, patient, driver);

		assert!(matches!(cancelled, Err(Error::Cancelled)));
		assert_eq!(patient.expect("Remaining waiter should succeed.").access_token.expose(), "token-1");
		assert_eq!(endpoint.calls(), 1);
	}

	#[tokio::test]
	async fn abandoned_exchange_is_resumed_by_the_next_caller() {
		let endpoint = CountingEndpoint::new();
		let tokens = source(endpoint.clone(), Arc::new(ManualClock::new(start())), None);
		let release = endpoint.hold();
		let cancel = CancellationToken::new();
		let driver = async {
			while endpoint.calls() == 0 {
				tokio::task::yield_now().await;
			}

			cancel.cancel();
		};
		let (abandoned, ()) = futures::join!(tokens.acquire_with(&cancel), driver);

		assert!(abandoned.is_err());
		assert_eq!(tokens.state(), TokenState::Refreshing);

		let _ = release.send(());
		let token = tokens.acquire().await.expect("Pending exchange should be resumed.");

		assert_eq!(token.access_token.expose(), "token-1");
		assert_eq!(endpoint.calls(), 1);
	}

	#[tokio::test]
	async fn pre_cancelled_callers_never_touch_the_network() {
		let endpoint = CountingEndpoint::new();
		let tokens = source(endpoint.clone(), Arc::new(ManualClock::new(start())), None);
		let cancel = CancellationToken::new();

		cancel.cancel();

		assert!(matches!(tokens.acquire_with(&cancel).await, Err(Error::Cancelled)));
		assert_eq!(endpoint.calls(), 0);
	}
}
