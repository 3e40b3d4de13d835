//! HTTP transport primitives shared by token exchanges and API calls.
//!
//! [`HttpTransport`] is the client's only dependency on an HTTP stack. The same base
//! transport is handed to the [`TokenSource`](crate::session::TokenSource) for token
//! exchanges and wrapped by [`AuthTransport`] for API calls, so custom clients (proxies,
//! timeouts, test doubles) apply to both paths without the token endpoint ever being
//! routed through the authorization layer.

mod auth;

pub use auth::AuthTransport;

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// self
use crate::_prelude::*;
#[cfg(feature = "reqwest")] use crate::error::{ConstructionError, NetworkError};

/// Boxed future returned by [`HttpTransport::send`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing a fully-built request.
///
/// Implementations must be `Send + Sync + 'static` so a single transport can be shared
/// behind an `Arc` by the token source, the authorization decorator, and every facade
/// call. Failures should be reported as [`Error::Network`]; decorators may surface other
/// variants (e.g. [`Error::Authentication`]) without sending anything.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Sends `request` and resolves to the complete response.
	fn send(&self, request: HttpRequest) -> TransportFuture<'_>;
}
impl<T> HttpTransport for Arc<T>
where
	T: ?Sized + HttpTransport,
{
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		(**self).send(request)
	}
}

/// Captures metadata from the most recent HTTP response for downstream error mapping.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code returned by the endpoint, if available.
	pub status: Option<u16>,
}

/// Thread-safe slot for sharing [`ResponseMetadata`] between transport and error layers.
///
/// The token source creates a fresh slot for each exchange and reads the captured
/// metadata immediately after `oauth2` resolves.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Default transport backed by [`ReqwestClient`].
///
/// Token requests should not follow redirects, matching OAuth 2.0 guidance that token
/// endpoints return results directly; [`ReqwestTransport::try_default`] disables
/// redirect following for that reason. Custom clients passed to
/// [`ReqwestTransport::with_client`] are used as-is.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Builds the default client without redirect following.
	pub fn try_default() -> Result<Self, ConstructionError> {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.build()
			.map_err(ConstructionError::http_client_build)?;

		Ok(Self(client))
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let request = reqwest::Request::try_from(request).map_err(NetworkError::from)?;
			let response = self.0.execute(request).await.map_err(NetworkError::from)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let version = response.version();
			let body = response.bytes().await.map_err(NetworkError::from)?;
			let mut response_new = HttpResponse::new(body.to_vec());

			*response_new.status_mut() = status;
			*response_new.headers_mut() = headers;
			*response_new.version_mut() = version;

			Ok(response_new)
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn metadata_slot_take_consumes_the_value() {
		let slot = ResponseMetadataSlot::default();

		slot.store(ResponseMetadata { status: Some(401) });

		assert_eq!(slot.take().and_then(|meta| meta.status), Some(401));
		assert!(slot.take().is_none());
	}

	#[cfg(feature = "reqwest")]
	#[test]
	fn reqwest_transport_builds_without_redirects() {
		assert!(ReqwestTransport::try_default().is_ok());
	}
}
