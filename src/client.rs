//! Client assembly: configuration, one token source, the request pipeline, and the facade.

mod config;

pub use config::*;

// self
use crate::{
	_prelude::*,
	api::{ApiFacade, ApiTransport, JsonApi},
	auth::{Credentials, Token},
	error::ConstructionError,
	interceptor::InterceptorChain,
	oauth::ClientCredentialsExchange,
	session::{TokenSource, TokenState},
	transport::{AuthTransport, HttpTransport},
};

/// Authenticated API client.
///
/// A client owns exactly one [`TokenSource`] bound to its credentials. Facade calls
/// reached through [`api`](Self::api) acquire tokens transparently: a cached token is
/// reused until it expires, concurrent callers share a single refresh, and failures are
/// returned to the caller without being cached.
///
/// Requests flow through the configured interceptors first, in registration order, and
/// then receive the `Authorization` header, which replaces any value an interceptor set.
/// Token endpoint requests go straight to the base transport and never pass through the
/// interceptors or the authorization layer.
#[derive(Clone)]
pub struct Client<A = JsonApi>
where
	A: ApiFacade,
{
	config: ClientConfig,
	base_url: Url,
	tokens: TokenSource,
	api: A,
}
impl<A> Client<A>
where
	A: ApiFacade,
{
	/// Builds a client by applying `options` over the defaults.
	///
	/// Fails with [`Error::Construction`] for malformed URLs, a missing transport, or a
	/// facade that refuses the pipeline.
	pub fn with_options(
		credentials: Credentials,
		options: impl IntoIterator<Item = ClientOption>,
	) -> Result<Self> {
		Self::from_config(credentials, ClientConfig::from_options(options))
	}

	/// Builds a client from an already assembled configuration.
	pub fn from_config(credentials: Credentials, config: ClientConfig) -> Result<Self> {
		let urls = config.validate()?;
		let transport = match config.transport.clone() {
			Some(transport) => transport,
			None => default_transport()?,
		};
		let exchange = ClientCredentialsExchange::new(
			&urls.token_endpoint,
			&credentials,
			config.exchange_params(),
			transport.clone(),
		)?;
		let tokens = TokenSource::new(
			exchange,
			config.clock.clone(),
			config.expiry_skew,
			config.initial_token.clone(),
		);
		let pipeline = ApiTransport::new(
			urls.base_url.clone(),
			InterceptorChain::new(config.interceptors.iter().cloned()),
			AuthTransport::new(transport, tokens.clone()),
		);
		let api = A::from_transport(pipeline)?;

		Ok(Self { config, base_url: urls.base_url, tokens, api })
	}

	/// Returns a valid token, refreshing it if needed.
	pub async fn token(&self) -> Result<Token> {
		self.tokens.acquire().await
	}

	/// Same as [`token`](Self::token), giving up with [`Error::Cancelled`] once `cancel`
	/// fires.
	pub async fn token_with(&self, cancel: &CancellationToken) -> Result<Token> {
		self.tokens.acquire_with(cancel).await
	}

	/// Cached token (possibly expired) without any network call.
	pub fn cached_token(&self) -> Option<Token> {
		self.tokens.cached()
	}

	/// Lifecycle state of the cached token.
	pub fn token_state(&self) -> TokenState {
		self.tokens.state()
	}

	/// Token source shared by every facade call.
	pub fn token_source(&self) -> &TokenSource {
		&self.tokens
	}

	/// Effective configuration.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Validated base URL (always ending in `/`).
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// API facade.
	pub fn api(&self) -> &A {
		&self.api
	}

	/// Consumes the client, keeping only the facade.
	pub fn into_api(self) -> A {
		self.api
	}
}
impl Client<JsonApi> {
	/// Builds a client with the built-in [`JsonApi`] facade.
	pub fn new(
		credentials: Credentials,
		options: impl IntoIterator<Item = ClientOption>,
	) -> Result<Self> {
		Self::with_options(credentials, options)
	}
}
impl<A> Debug for Client<A>
where
	A: ApiFacade,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Client")
			.field("base_url", &self.base_url.as_str())
			.field("tokens", &self.tokens)
			.finish_non_exhaustive()
	}
}

#[cfg(feature = "reqwest")]
fn default_transport() -> Result<Arc<dyn HttpTransport>, ConstructionError> {
	Ok(Arc::new(crate::transport::ReqwestTransport::try_default()?))
}

#[cfg(not(feature = "reqwest"))]
fn default_transport() -> Result<Arc<dyn HttpTransport>, ConstructionError> {
	Err(ConstructionError::MissingTransport)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		error::NetworkError,
		session::{Clock, ManualClock},
		transport::TransportFuture,
	};

	struct Refusing;
	impl ApiFacade for Refusing {
		fn from_transport(_transport: ApiTransport) -> Result<Self> {
			Err(ConstructionError::Facade { reason: "no base path".into() }.into())
		}
	}

	struct Unreachable;
	impl HttpTransport for Unreachable {
		fn send(&self, _request: HttpRequest) -> TransportFuture<'_> {
			Box::pin(async {
				Err(NetworkError::from(std::io::Error::other("unreachable in tests")).into())
			})
		}
	}

	fn credentials() -> Credentials {
		Credentials::new("client-id", "client-secret")
	}

	#[test]
	fn malformed_urls_fail_construction() {
		let err = Client::new(
			credentials(),
			[ClientOption::transport(Unreachable), ClientOption::base_url("::nope::")],
		)
		.expect_err("Malformed base URL should fail.");

		assert!(matches!(err, Error::Construction(ConstructionError::InvalidUrl { .. })));
	}

	#[test]
	fn oversized_expiry_skew_fails_construction() {
		let err = Client::new(
			credentials(),
			[
				ClientOption::transport(Unreachable),
				ClientOption::InitialToken(Token::bearer(
					"seeded",
					Some(OffsetDateTime::now_utc() + Duration::hours(1)),
				)),
				ClientOption::ExpirySkew(Duration::MAX),
			],
		)
		.expect_err("Unbounded skew should fail.");

		assert!(matches!(err, Error::Construction(ConstructionError::InvalidExpirySkew { .. })));
	}

	#[test]
	fn facade_refusal_fails_construction() {
		let err =
			Client::<Refusing>::with_options(credentials(), [ClientOption::transport(Unreachable)])
				.expect_err("Refusing facade should fail.");

		assert!(matches!(err, Error::Construction(ConstructionError::Facade { .. })));
	}

	#[tokio::test]
	async fn seeded_token_is_served_without_network() {
		let seed = Token::bearer("seeded", None);
		let client = Client::new(
			credentials(),
			[ClientOption::transport(Unreachable), ClientOption::InitialToken(seed.clone())],
		)
		.expect("Client should build.");

		assert_eq!(client.token_state(), TokenState::Valid);
		assert_eq!(client.token().await.expect("Seed should be served."), seed);
		assert_eq!(client.token_source().metrics().exchanges(), 0);
	}

	#[tokio::test]
	async fn expired_seed_surfaces_transport_failures() {
		let clock = ManualClock::new(time::macros::datetime!(2025-05-01 00:00 UTC));
		let seed = Token::bearer("stale", Some(clock.now() - Duration::minutes(1)));
		let client = Client::new(
			credentials(),
			[
				ClientOption::transport(Unreachable),
				ClientOption::InitialToken(seed.clone()),
				ClientOption::clock(clock),
			],
		)
		.expect("Client should build.");

		assert_eq!(client.token_state(), TokenState::Expired);
		assert!(matches!(client.token().await, Err(Error::Network(NetworkError::Io(_)))));
		assert_eq!(client.cached_token(), Some(seed));
	}

	#[test]
	fn accessors_expose_the_effective_configuration() {
		let client = Client::new(
			credentials(),
			[
				ClientOption::transport(Unreachable),
				ClientOption::base_url("https://api.example.com/hr"),
				ClientOption::scopes(["employees.read"]),
			],
		)
		.expect("Client should build.");

		assert_eq!(client.base_url().as_str(), "https://api.example.com/hr/");
		assert_eq!(client.api().transport().base_url(), client.base_url());
		assert_eq!(client.config().scopes, ["employees.read"]);
		assert_eq!(client.token_state(), TokenState::Absent);
		assert!(!format!("{client:?}").contains("client-secret"));
	}
}
