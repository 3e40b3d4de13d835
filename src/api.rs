//! Boundary between the authenticated session and the API bindings.
//!
//! Bindings implement [`ApiFacade`] and receive an [`ApiTransport`]: a handle that
//! resolves endpoint paths against the configured base URL and sends requests through
//! the interceptor chain and the authorization layer. Bindings never see credentials or
//! the token endpoint. [`JsonApi`] is the built-in untyped facade for JSON endpoints.

// std
use std::pin::pin;
// crates.io
use futures::future::{self, Either};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	error::NetworkError,
	interceptor::InterceptorChain,
	obs::{self, OpKind, OpOutcome, OpSpan},
	session::TokenSource,
	transport::AuthTransport,
};

/// Implemented by API bindings so a [`Client`](crate::client::Client) can construct them.
pub trait ApiFacade
where
	Self: Sized + Send + Sync,
{
	/// Builds the facade over `transport`.
	///
	/// Returning an error (typically
	/// [`ConstructionError::Facade`](crate::error::ConstructionError::Facade)) fails client
	/// construction.
	fn from_transport(transport: ApiTransport) -> Result<Self>;
}

/// Authenticated request pipeline handed to an [`ApiFacade`].
///
/// Every request sent through it passes the interceptor chain in registration order,
/// then receives the `Authorization` header, then goes to the base transport.
#[derive(Clone, Debug)]
pub struct ApiTransport {
	base_url: Url,
	interceptors: InterceptorChain,
	auth: AuthTransport,
}
impl ApiTransport {
	/// Assembles a pipeline; `base_url` should end with `/` so relative paths join under it.
	pub fn new(base_url: Url, interceptors: InterceptorChain, auth: AuthTransport) -> Self {
		Self { base_url, interceptors, auth }
	}

	/// Base URL endpoint paths are resolved against.
	pub fn base_url(&self) -> &Url {
		&self.base_url
	}

	/// Token source backing the authorization layer.
	pub fn token_source(&self) -> &TokenSource {
		self.auth.token_source()
	}

	/// Resolves `path` relative to the base URL. A leading `/` is ignored.
	///
	/// The session token is only ever sent beneath the base URL: absolute URLs pointing
	/// elsewhere and `..` segments climbing above the base path fail with
	/// [`Error::InvalidEndpoint`].
	pub fn endpoint(&self, path: &str) -> Result<Url> {
		let invalid = || Error::InvalidEndpoint { path: path.to_owned() };
		let url = self.base_url.join(path.trim_start_matches('/')).map_err(|_| invalid())?;

		if url.origin() != self.base_url.origin() || !url.path().starts_with(self.base_url.path())
		{
			return Err(invalid());
		}

		Ok(url)
	}

	/// Starts a request builder for `method` on `path`.
	pub fn request(&self, method: http::Method, path: &str) -> Result<http::request::Builder> {
		let url = self.endpoint(path)?;

		Ok(http::Request::builder().method(method).uri(url.as_str()))
	}

	/// Sends `request` through the interceptors and the authorization layer.
	pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
		self.send_with(request, &CancellationToken::new()).await
	}

	/// Same as [`send`](Self::send), resolving to [`Error::Cancelled`] once `cancel`
	/// fires. Cancellation detaches this request only; a token refresh it joined keeps
	/// running for other callers.
	pub async fn send_with(
		&self,
		request: HttpRequest,
		cancel: &CancellationToken,
	) -> Result<HttpResponse> {
		OpSpan::new(OpKind::ApiRequest, "send").instrument(self.dispatch(request, cancel)).await
	}

	async fn dispatch(
		&self,
		mut request: HttpRequest,
		cancel: &CancellationToken,
	) -> Result<HttpResponse> {
		const KIND: OpKind = OpKind::ApiRequest;

		obs::record_op_outcome(KIND, OpOutcome::Attempt);

		let result = match self.interceptors.apply(&mut request) {
			Ok(()) => {
				let send = pin!(self.auth.send_with(request, cancel));
				let cancelled = pin!(cancel.cancelled());

				match future::select(send, cancelled).await {
					Either::Left((result, _)) => result,
					Either::Right(_) => Err(Error::Cancelled),
				}
			},
			Err(e) => Err(e),
		};

		obs::record_op_outcome(
			KIND,
			if result.is_ok() { OpOutcome::Success } else { OpOutcome::Failure },
		);

		result
	}
}

/// Untyped JSON facade: sends requests and decodes JSON responses.
#[derive(Clone, Debug)]
pub struct JsonApi {
	transport: ApiTransport,
}
impl JsonApi {
	/// Underlying authenticated pipeline.
	pub fn transport(&self) -> &ApiTransport {
		&self.transport
	}

	/// `GET`s `path` and decodes the JSON body.
	pub async fn get_json<T>(&self, path: &str) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let request = self
			.transport
			.request(http::Method::GET, path)?
			.header(http::header::ACCEPT, "application/json")
			.body(Vec::new())
			.map_err(NetworkError::from)?;

		self.send_json(request).await
	}

	/// `POST`s `body` as JSON to `path` and decodes the JSON response.
	pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
	where
		B: ?Sized + Serialize,
		T: DeserializeOwned,
	{
		let mut payload = Vec::new();

		serde_path_to_error::serialize(body, &mut serde_json::Serializer::new(&mut payload))
			.map_err(|source| Error::Encode { source: Arc::new(source) })?;

		let request = self
			.transport
			.request(http::Method::POST, path)?
			.header(http::header::ACCEPT, "application/json")
			.header(http::header::CONTENT_TYPE, "application/json")
			.body(payload)
			.map_err(NetworkError::from)?;

		self.send_json(request).await
	}

	/// Sends a prepared request and decodes a successful JSON response.
	///
	/// Non-2xx answers become [`Error::UnexpectedStatus`]; an empty body decodes as
	/// JSON `null`.
	pub async fn send_json<T>(&self, request: HttpRequest) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let response = self.transport.send(request).await?;
		let status = response.status();
		let body = response.into_body();

		if !status.is_success() {
			return Err(Error::UnexpectedStatus {
				status: status.as_u16(),
				body: String::from_utf8_lossy(&body).into_owned(),
			});
		}

		let body =
			if body.iter().all(u8::is_ascii_whitespace) { b"null".as_slice() } else { body.as_slice() };

		serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_slice(body))
			.map_err(|source| Error::Decode { source: Arc::new(source) })
	}
}
impl ApiFacade for JsonApi {
	fn from_transport(transport: ApiTransport) -> Result<Self> {
		Ok(Self { transport })
	}
}
