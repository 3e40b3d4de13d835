//! Client-credentials grant executed through the `oauth2` crate over an [`HttpTransport`].

pub use oauth2;

// crates.io
use oauth2::{
	AsyncHttpClient, AuthType, ClientId, ClientSecret, EndpointNotSet, EndpointSet,
	HttpClientError, RequestTokenError, Scope, TokenResponse, TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenResponse},
};
// self
use crate::{
	_prelude::*,
	auth::{Credentials, Token},
	error::{AuthenticationError, ConstructionError, NetworkError},
	transport::{HttpTransport, ResponseMetadata, ResponseMetadataSlot},
};

type ConfiguredBasicClient =
	BasicClient<EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type HandleFuture<'c> =
	Pin<Box<dyn Future<Output = Result<HttpResponse, HttpClientError<Error>>> + 'c + Send>>;

/// How the client authenticates itself to the token endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
}

/// Token request parameters beyond the credentials themselves.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExchangeParams {
	/// Scopes requested with every exchange.
	pub scopes: Vec<String>,
	/// Additional form parameters (e.g. `audience`).
	pub endpoint_params: Vec<(String, String)>,
	/// Client authentication style.
	pub auth_method: ClientAuthMethod,
}

/// Performs `grant_type=client_credentials` exchanges against one token endpoint.
///
/// The exchange owns the *base* transport. It never sees the authorization decorator,
/// so token requests cannot recurse into token acquisition.
pub(crate) struct ClientCredentialsExchange {
	oauth_client: ConfiguredBasicClient,
	transport: Arc<dyn HttpTransport>,
	params: ExchangeParams,
}
impl ClientCredentialsExchange {
	pub(crate) fn new(
		token_endpoint: &Url,
		credentials: &Credentials,
		params: ExchangeParams,
		transport: Arc<dyn HttpTransport>,
	) -> Result<Self, ConstructionError> {
		let token_url = TokenUrl::new(token_endpoint.to_string())
			.map_err(|source| ConstructionError::InvalidUrl { field: "token_endpoint", source })?;
		let mut oauth_client = BasicClient::new(ClientId::new(credentials.client_id().to_owned()))
			.set_client_secret(ClientSecret::new(credentials.client_secret().expose().to_owned()))
			.set_token_uri(token_url);

		if matches!(params.auth_method, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Ok(Self { oauth_client, transport, params })
	}

	/// Runs one exchange. `now` is sampled after the response arrives and anchors the
	/// relative `expires_in`.
	pub(crate) async fn request(&self, now: impl FnOnce() -> OffsetDateTime) -> Result<Token> {
		let meta = ResponseMetadataSlot::default();
		let handle = TokenEndpointHandle { transport: self.transport.clone(), slot: meta.clone() };
		let mut request = self.oauth_client.exchange_client_credentials();

		for scope in &self.params.scopes {
			request = request.add_scope(Scope::new(scope.to_owned()));
		}
		for (key, value) in &self.params.endpoint_params {
			request = request.add_extra_param(key.to_owned(), value.to_owned());
		}

		let response = request
			.request_async(&handle)
			.await
			.map_err(|err| map_request_error(meta.take(), err))?;

		map_token_response(response, now())
	}
}

/// [`AsyncHttpClient`] adapter that sends through an [`HttpTransport`] and records the
/// response status for error classification.
struct TokenEndpointHandle {
	transport: Arc<dyn HttpTransport>,
	slot: ResponseMetadataSlot,
}
impl<'c> AsyncHttpClient<'c> for TokenEndpointHandle {
	type Error = HttpClientError<Error>;
	type Future = HandleFuture<'c>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		Box::pin(async move {
			self.slot.take();

			let response = self.transport.send(request).await.map_err(Box::new)?;

			self.slot.store(ResponseMetadata { status: Some(response.status().as_u16()) });

			Ok(response)
		})
	}
}

fn map_token_response(response: BasicTokenResponse, issued_at: OffsetDateTime) -> Result<Token> {
	let expires_at = match response.expires_in() {
		// A zero lifetime carries no expiry information.
		Some(lifetime) if !lifetime.is_zero() => {
			let secs =
				i64::try_from(lifetime.as_secs()).map_err(|_| AuthenticationError::InvalidExpiry)?;

			Some(
				issued_at
					.checked_add(Duration::seconds(secs))
					.ok_or(AuthenticationError::InvalidExpiry)?,
			)
		},
		_ => None,
	};
	let token_type = serde_json::to_value(response.token_type())
		.ok()
		.and_then(|value| value.as_str().map(str::to_owned))
		.unwrap_or_else(|| "bearer".into());

	Ok(Token::new(response.access_token().secret().to_owned(), token_type, expires_at))
}

fn map_request_error(
	meta: Option<ResponseMetadata>,
	err: BasicRequestTokenError<HttpClientError<Error>>,
) -> Error {
	let status = meta.and_then(|value| value.status);

	match err {
		RequestTokenError::ServerResponse(response) => map_server_response_error(status, response),
		RequestTokenError::Request(error) => map_transport_error(status, error),
		RequestTokenError::Parse(error, _body) =>
			AuthenticationError::MalformedResponse { status, source: Arc::new(error) }.into(),
		RequestTokenError::Other(message) =>
			AuthenticationError::UnexpectedResponse { status, message }.into(),
	}
}

fn map_server_response_error(status: Option<u16>, response: BasicErrorResponse) -> Error {
	AuthenticationError::Rejected {
		status,
		code: response.error().as_ref().to_string(),
		description: response.error_description().cloned(),
	}
	.into()
}

fn map_transport_error(status: Option<u16>, err: HttpClientError<Error>) -> Error {
	match err {
		// The variant name is historical; it carries whatever the transport returned.
		HttpClientError::Reqwest(inner) => *inner,
		HttpClientError::Http(inner) => NetworkError::from(inner).into(),
		HttpClientError::Io(inner) => NetworkError::from(inner).into(),
		HttpClientError::Other(message) =>
			AuthenticationError::UnexpectedResponse { status, message }.into(),
		_ => AuthenticationError::UnexpectedResponse {
			status,
			message: "HTTP client error occurred while calling the token endpoint".into(),
		}
		.into(),
	}
}
