//! Authenticated Huma HR API client: OAuth 2.0 client-credentials sessions with single-flight
//! token refresh, transport injection, and ordered request interceptors.
//!
//! ```no_run
//! # async fn demo() -> huma_client::error::Result<()> {
//! use huma_client::{auth::Credentials, client::Client};
//!
//! let client = Client::new(Credentials::new("client-id", "client-secret"), [])?;
//! let users: serde_json::Value = client.api().get_json("users").await?;
//! let token = client.token().await?;
//! # let _ = (users, token);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod api;
pub mod auth;
pub mod client;
pub mod error;
pub mod interceptor;
pub mod oauth;
pub mod obs;
pub mod session;
pub mod transport;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use futures::{
		FutureExt,
		channel::oneshot,
		future::{self, Shared},
	};
	// self
	use crate::{
		auth::{Credentials, Token},
		client::{Client, ClientOption},
		transport::{HttpTransport, ReqwestTransport, TransportFuture},
	};

	/// Builds a reqwest transport that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	pub fn test_reqwest_transport() -> ReqwestTransport {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestTransport::with_client(client)
	}

	/// Constructs a [`Client`] whose base URL and token endpoint point at `server_url`
	/// (`<server_url>/` and `<server_url>/oauth/token`) over the test reqwest transport.
	pub fn build_reqwest_test_client(
		server_url: &str,
		client_id: &str,
		client_secret: &str,
		extra: impl IntoIterator<Item = ClientOption>,
	) -> Client {
		let mut options = vec![
			ClientOption::BaseUrl(format!("{server_url}/")),
			ClientOption::TokenEndpoint(format!("{server_url}/oauth/token")),
			ClientOption::transport(test_reqwest_transport()),
		];

		options.extend(extra);

		Client::new(Credentials::new(client_id, client_secret), options)
			.expect("Test client should build against the mock server.")
	}

	/// Scripted reply produced by [`RecordingTransport`].
	#[derive(Clone, Debug)]
	pub struct ScriptedReply {
		/// HTTP status code.
		pub status: u16,
		/// JSON body.
		pub body: String,
	}
	impl ScriptedReply {
		/// A `200 OK` JSON reply.
		pub fn ok(body: impl Into<String>) -> Self {
			Self { status: 200, body: body.into() }
		}

		/// A JSON reply with an arbitrary status.
		pub fn status(status: u16, body: impl Into<String>) -> Self {
			Self { status, body: body.into() }
		}

		/// A bearer token reply that expires after `expires_in` seconds.
		pub fn token(access_token: &str, expires_in: u64) -> Self {
			Self::ok(format!(
				"{{\"access_token\":\"{access_token}\",\"token_type\":\"bearer\",\"expires_in\":{expires_in}}}"
			))
		}
	}

	/// In-process transport double that records every request and answers token
	/// endpoint calls and API calls from separate scripts.
	///
	/// Requests whose path ends with `token_path` are treated as token exchanges. An
	/// optional [`TokenGate`] holds token exchanges in flight until the test opens it.
	#[derive(Clone)]
	pub struct RecordingTransport {
		token_path: String,
		token_reply: Arc<Mutex<ScriptedReply>>,
		api_reply: Arc<Mutex<ScriptedReply>>,
		token_gate: Option<Shared<oneshot::Receiver<()>>>,
		token_calls: Arc<AtomicUsize>,
		requests: Arc<Mutex<Vec<HttpRequest>>>,
	}
	impl RecordingTransport {
		/// Creates a double answering token exchanges at `token_path`.
		pub fn new(token_path: impl Into<String>, token_reply: ScriptedReply) -> Self {
			Self {
				token_path: token_path.into(),
				token_reply: Arc::new(Mutex::new(token_reply)),
				api_reply: Arc::new(Mutex::new(ScriptedReply::ok("{}"))),
				token_gate: None,
				token_calls: Default::default(),
				requests: Default::default(),
			}
		}

		/// Holds every token exchange until the returned gate is opened.
		pub fn gated(mut self) -> (Self, TokenGate) {
			let (tx, rx) = oneshot::channel();

			self.token_gate = Some(rx.shared());

			(self, TokenGate(Arc::new(Mutex::new(Some(tx)))))
		}

		/// Overrides the reply used for non-token requests.
		pub fn with_api_reply(self, reply: ScriptedReply) -> Self {
			*self.api_reply.lock() = reply;

			self
		}

		/// Replaces the token endpoint reply for subsequent exchanges.
		pub fn set_token_reply(&self, reply: ScriptedReply) {
			*self.token_reply.lock() = reply;
		}

		/// Number of token exchanges observed so far.
		pub fn token_calls(&self) -> usize {
			self.token_calls.load(Ordering::SeqCst)
		}

		/// Snapshot of every request observed so far, in arrival order.
		pub fn requests(&self) -> Vec<HttpRequest> {
			self.requests.lock().clone()
		}

		/// Requests that did not target the token endpoint.
		pub fn api_requests(&self) -> Vec<HttpRequest> {
			self.requests().into_iter().filter(|req| !self.is_token_request(req)).collect()
		}

		/// Requests that targeted the token endpoint.
		pub fn token_requests(&self) -> Vec<HttpRequest> {
			self.requests().into_iter().filter(|req| self.is_token_request(req)).collect()
		}

		fn is_token_request(&self, request: &HttpRequest) -> bool {
			request.uri().path().ends_with(self.token_path.as_str())
		}
	}
	impl HttpTransport for RecordingTransport {
		fn send(&self, request: HttpRequest) -> TransportFuture<'_> {
			Box::pin(async move {
				let is_token = self.is_token_request(&request);

				self.requests.lock().push(request);

				let reply = if is_token {
					self.token_calls.fetch_add(1, Ordering::SeqCst);

					if let Some(gate) = self.token_gate.clone() {
						let _ = gate.await;
					}

					self.token_reply.lock().clone()
				} else {
					self.api_reply.lock().clone()
				};
				let response = http::Response::builder()
					.status(reply.status)
					.header(http::header::CONTENT_TYPE, "application/json")
					.body(reply.body.into_bytes())
					.map_err(crate::error::NetworkError::from)?;

				Ok(response)
			})
		}
	}

	/// Release handle returned by [`RecordingTransport::gated`].
	#[derive(Clone)]
	pub struct TokenGate(Arc<Mutex<Option<oneshot::Sender<()>>>>);
	impl TokenGate {
		/// Lets every pending and future token exchange complete.
		pub fn open(&self) {
			if let Some(tx) = self.0.lock().take() {
				let _ = tx.send(());
			}
		}
	}

	/// Future that resolves once `transport` has observed `calls` token exchanges.
	pub async fn wait_for_token_calls(transport: &RecordingTransport, calls: usize) {
		while transport.token_calls() < calls {
			yield_now().await;
		}
	}

	async fn yield_now() {
		let mut yielded = false;

		future::poll_fn(|cx| {
			if yielded {
				std::task::Poll::Ready(())
			} else {
				yielded = true;
				cx.waker().wake_by_ref();

				std::task::Poll::Pending
			}
		})
		.await
	}

	/// Creates a bearer token valid for `ttl` from now.
	pub fn token_valid_for(access_token: &str, ttl: Duration) -> Token {
		Token::bearer(access_token, Some(OffsetDateTime::now_utc() + ttl))
	}
}

mod _prelude {
	pub use std::{
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use oauth2::{HttpRequest, HttpResponse, http};
	pub use parking_lot::Mutex;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use tokio_util::sync::CancellationToken;
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use oauth2::http;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use tokio_util::sync::CancellationToken;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
