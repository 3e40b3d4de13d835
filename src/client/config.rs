//! Client configuration assembled from an ordered list of [`ClientOption`] edits.

// self
use crate::{
	_prelude::*,
	auth::Token,
	error::ConstructionError,
	interceptor::Interceptor,
	oauth::{ClientAuthMethod, ExchangeParams},
	session::{Clock, SystemClock, TokenSource},
	transport::HttpTransport,
};

/// A single configuration edit applied by [`ClientConfig::apply`].
///
/// Options are applied in the order given; for single-valued settings the last write
/// wins, interceptors accumulate in registration order.
#[derive(Clone)]
pub enum ClientOption {
	/// Base transport used for both token exchanges and API calls.
	Transport(Arc<dyn HttpTransport>),
	/// Appends a request interceptor.
	Interceptor(Arc<dyn Interceptor>),
	/// Seeds the token cache, e.g. with a token persisted by an earlier process.
	InitialToken(Token),
	/// Base URL API paths are resolved against.
	BaseUrl(String),
	/// Client-credentials token endpoint.
	TokenEndpoint(String),
	/// Scopes requested on every exchange (replaces earlier scopes).
	Scopes(Vec<String>),
	/// Extra token request form parameter; a repeated key replaces the earlier value.
	EndpointParam(String, String),
	/// How client credentials are presented to the token endpoint.
	ClientAuthMethod(ClientAuthMethod),
	/// Margin before expiry at which cached tokens stop being used.
	ExpirySkew(Duration),
	/// Time source for expiry decisions.
	Clock(Arc<dyn Clock>),
}
impl ClientOption {
	/// Wraps a concrete transport.
	pub fn transport(transport: impl HttpTransport) -> Self {
		Self::Transport(Arc::new(transport))
	}

	/// Wraps a concrete interceptor or closure.
	pub fn interceptor(interceptor: impl 'static + Interceptor) -> Self {
		Self::Interceptor(Arc::new(interceptor))
	}

	/// Sets the base URL.
	pub fn base_url(url: impl Into<String>) -> Self {
		Self::BaseUrl(url.into())
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(url: impl Into<String>) -> Self {
		Self::TokenEndpoint(url.into())
	}

	/// Sets the requested scopes.
	pub fn scopes<I, S>(scopes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self::Scopes(scopes.into_iter().map(Into::into).collect())
	}

	/// Adds an extra token request parameter.
	pub fn endpoint_param(key: impl Into<String>, value: impl Into<String>) -> Self {
		Self::EndpointParam(key.into(), value.into())
	}

	/// Wraps a concrete clock.
	pub fn clock(clock: impl 'static + Clock) -> Self {
		Self::Clock(Arc::new(clock))
	}
}
impl Debug for ClientOption {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self {
			Self::Transport(_) => f.write_str("Transport(..)"),
			Self::Interceptor(_) => f.write_str("Interceptor(..)"),
			Self::InitialToken(token) => f.debug_tuple("InitialToken").field(token).finish(),
			Self::BaseUrl(url) => f.debug_tuple("BaseUrl").field(url).finish(),
			Self::TokenEndpoint(url) => f.debug_tuple("TokenEndpoint").field(url).finish(),
			Self::Scopes(scopes) => f.debug_tuple("Scopes").field(scopes).finish(),
			Self::EndpointParam(key, value) =>
				f.debug_tuple("EndpointParam").field(key).field(value).finish(),
			Self::ClientAuthMethod(method) =>
				f.debug_tuple("ClientAuthMethod").field(method).finish(),
			Self::ExpirySkew(skew) => f.debug_tuple("ExpirySkew").field(skew).finish(),
			Self::Clock(_) => f.write_str("Clock(..)"),
		}
	}
}

/// Effective client configuration.
///
/// Built once from defaults plus options and never mutated after the client exists.
/// URLs stay as written until [`validate`](Self::validate) parses them, so a malformed
/// option surfaces as a [`ConstructionError`] instead of a panic.
#[derive(Clone)]
pub struct ClientConfig {
	/// Base URL for API paths.
	pub base_url: String,
	/// Client-credentials token endpoint.
	pub token_endpoint: String,
	/// Explicit base transport; `None` selects the default reqwest transport.
	pub transport: Option<Arc<dyn HttpTransport>>,
	/// Interceptors in registration order.
	pub interceptors: Vec<Arc<dyn Interceptor>>,
	/// Token used to seed the cache.
	pub initial_token: Option<Token>,
	/// Scopes requested on every exchange.
	pub scopes: Vec<String>,
	/// Extra token request parameters.
	pub endpoint_params: Vec<(String, String)>,
	/// Client authentication style at the token endpoint.
	pub client_auth_method: ClientAuthMethod,
	/// Expiry safety margin.
	pub expiry_skew: Duration,
	/// Time source for expiry decisions.
	pub clock: Arc<dyn Clock>,
}
impl ClientConfig {
	/// Default API base URL.
	pub const DEFAULT_BASE_URL: &'static str = "https://demo.openapi.humahr.com/";
	/// Default token endpoint.
	pub const DEFAULT_TOKEN_ENDPOINT: &'static str =
		"https://demo.openapi.humahr.com/auth/oauth/token";
	/// Largest accepted expiry skew.
	pub const MAX_EXPIRY_SKEW: Duration = Duration::days(1);

	/// Applies `options` in order over the defaults.
	pub fn from_options(options: impl IntoIterator<Item = ClientOption>) -> Self {
		let mut config = Self::default();

		for option in options {
			config.apply(option);
		}

		config
	}

	/// Applies a single option.
	pub fn apply(&mut self, option: ClientOption) {
		match option {
			ClientOption::Transport(transport) => self.transport = Some(transport),
			ClientOption::Interceptor(interceptor) => self.interceptors.push(interceptor),
			ClientOption::InitialToken(token) => self.initial_token = Some(token),
			ClientOption::BaseUrl(url) => self.base_url = url,
			ClientOption::TokenEndpoint(url) => self.token_endpoint = url,
			ClientOption::Scopes(scopes) => self.scopes = scopes,
			ClientOption::EndpointParam(key, value) => {
				self.endpoint_params.retain(|(existing, _)| existing != &key);
				self.endpoint_params.push((key, value));
			},
			ClientOption::ClientAuthMethod(method) => self.client_auth_method = method,
			ClientOption::ExpirySkew(skew) => self.expiry_skew = skew,
			ClientOption::Clock(clock) => self.clock = clock,
		}
	}

	/// Checks both URLs and the expiry skew, returning the URLs parsed with the base URL
	/// normalized to end in `/` so relative paths resolve beneath it.
	///
	/// Negative skews are accepted and later treated as zero.
	pub fn validate(&self) -> Result<ValidatedUrls, ConstructionError> {
		if self.expiry_skew > Self::MAX_EXPIRY_SKEW {
			return Err(ConstructionError::InvalidExpirySkew { skew: self.expiry_skew });
		}

		let mut base_url = parse_endpoint("base_url", &self.base_url)?;
		let token_endpoint = parse_endpoint("token_endpoint", &self.token_endpoint)?;

		if !base_url.path().ends_with('/') {
			let path = format!("{}/", base_url.path());

			base_url.set_path(&path);
		}

		Ok(ValidatedUrls { base_url, token_endpoint })
	}

	pub(crate) fn exchange_params(&self) -> ExchangeParams {
		ExchangeParams {
			scopes: self.scopes.clone(),
			endpoint_params: self.endpoint_params.clone(),
			auth_method: self.client_auth_method,
		}
	}
}
impl Default for ClientConfig {
	fn default() -> Self {
		Self {
			base_url: Self::DEFAULT_BASE_URL.into(),
			token_endpoint: Self::DEFAULT_TOKEN_ENDPOINT.into(),
			transport: None,
			interceptors: Vec::new(),
			initial_token: None,
			scopes: Vec::new(),
			endpoint_params: Vec::new(),
			client_auth_method: ClientAuthMethod::default(),
			expiry_skew: TokenSource::DEFAULT_EXPIRY_SKEW,
			clock: Arc::new(SystemClock),
		}
	}
}
impl Debug for ClientConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientConfig")
			.field("base_url", &self.base_url)
			.field("token_endpoint", &self.token_endpoint)
			.field("custom_transport", &self.transport.is_some())
			.field("interceptors", &self.interceptors.len())
			.field("initial_token", &self.initial_token)
			.field("scopes", &self.scopes)
			.field("endpoint_params", &self.endpoint_params)
			.field("client_auth_method", &self.client_auth_method)
			.field("expiry_skew", &self.expiry_skew)
			.finish_non_exhaustive()
	}
}

/// URLs produced by [`ClientConfig::validate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidatedUrls {
	/// Base URL, always ending in `/`.
	pub base_url: Url,
	/// Token endpoint.
	pub token_endpoint: Url,
}

fn parse_endpoint(field: &'static str, raw: &str) -> Result<Url, ConstructionError> {
	let url = Url::parse(raw).map_err(|source| ConstructionError::InvalidUrl { field, source })?;

	if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() || !url.has_host() {
		return Err(ConstructionError::UnsupportedUrl { field, url: url.to_string() });
	}

	Ok(url)
}
