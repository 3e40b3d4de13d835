// self
use crate::{
	_prelude::*,
	error::AuthenticationError,
	session::TokenSource,
	transport::{HttpTransport, TransportFuture},
};

/// Transport decorator that stamps every outgoing request with a fresh token.
///
/// Each send acquires a token from the shared [`TokenSource`], writes it into the
/// `Authorization` header (replacing any existing value), and forwards the request to the
/// wrapped transport. When no token can be obtained the request is never sent and the
/// token source's error is returned unchanged.
#[derive(Clone)]
pub struct AuthTransport {
	inner: Arc<dyn HttpTransport>,
	tokens: TokenSource,
}
impl AuthTransport {
	/// Wraps `inner` so requests carry tokens from `tokens`.
	pub fn new(inner: Arc<dyn HttpTransport>, tokens: TokenSource) -> Self {
		Self { inner, tokens }
	}

	/// Token source consulted before every send.
	pub fn token_source(&self) -> &TokenSource {
		&self.tokens
	}

	/// Authorizes and sends `request`, abandoning the wait for a token if `cancel` fires.
	pub async fn send_with(
		&self,
		mut request: HttpRequest,
		cancel: &CancellationToken,
	) -> Result<HttpResponse> {
		let token = self.tokens.acquire_with(cancel).await?;
		let value = http::HeaderValue::from_str(&token.authorization_value()).map_err(|_| {
			AuthenticationError::UnexpectedResponse {
				status: None,
				message: "access token contains bytes not allowed in a header".into(),
			}
		})?;

		request.headers_mut().insert(http::header::AUTHORIZATION, value);

		if cancel.is_cancelled() {
			return Err(Error::Cancelled);
		}

		self.inner.send(request).await
	}
}
impl HttpTransport for AuthTransport {
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let never = CancellationToken::new();

			self.send_with(request, &never).await
		})
	}
}
impl Debug for AuthTransport {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AuthTransport").field("tokens", &self.tokens).finish_non_exhaustive()
	}
}
