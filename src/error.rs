//! Client-level error types shared across the session, transport, and facade layers.
//!
//! Every variant is `Clone` because a single token exchange may be observed by many
//! concurrent waiters, and each of them receives the same outcome.

// self
use crate::_prelude::*;

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Canonical client error exposed by public APIs.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Token endpoint rejected the credentials or answered with an unusable payload.
	#[error(transparent)]
	Authentication(#[from] AuthenticationError),
	/// Transport failure while reaching the token endpoint or the API.
	#[error(transparent)]
	Network(#[from] NetworkError),
	/// Client could not be assembled from its configuration.
	#[error(transparent)]
	Construction(#[from] ConstructionError),

	/// A request interceptor refused the outgoing request.
	#[error("Request interceptor failed: {reason}.")]
	Interceptor {
		/// Interceptor-supplied reason string.
		reason: String,
	},
	/// API endpoint answered with a non-success status.
	#[error("API endpoint returned HTTP {status}.")]
	UnexpectedStatus {
		/// HTTP status code.
		status: u16,
		/// Response body, lossily decoded.
		body: String,
	},
	/// An API path resolved outside the configured base URL.
	#[error("Endpoint path {path:?} does not resolve beneath the API base URL.")]
	InvalidEndpoint {
		/// Path as supplied by the caller.
		path: String,
	},
	/// API request body could not be encoded as JSON.
	#[error("API request body could not be encoded.")]
	Encode {
		/// Structured serialization failure.
		#[source]
		source: Arc<serde_path_to_error::Error<serde_json::Error>>,
	},
	/// API response body could not be decoded.
	#[error("API response body could not be decoded.")]
	Decode {
		/// Structured parsing failure.
		#[source]
		source: Arc<serde_path_to_error::Error<serde_json::Error>>,
	},
	/// Caller cancelled the operation before it completed.
	#[error("Operation was cancelled.")]
	Cancelled,
}
impl Error {
	/// Builds an [`Error::Interceptor`] from any displayable reason.
	pub fn interceptor(reason: impl Display) -> Self {
		Self::Interceptor { reason: reason.to_string() }
	}

	/// HTTP status attached to the failure, when one was observed.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Authentication(err) => err.status(),
			Self::UnexpectedStatus { status, .. } => Some(*status),
			_ => None,
		}
	}

	/// Returns `true` when the failure came from the caller's cancellation.
	pub fn is_cancelled(&self) -> bool {
		matches!(self, Self::Cancelled)
	}
}

/// Token endpoint failures. None of them are retried automatically.
#[derive(Clone, Debug, ThisError)]
pub enum AuthenticationError {
	/// Token endpoint returned an OAuth error response.
	#[error("Token endpoint rejected the client credentials: {code}.")]
	Rejected {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// OAuth `error` code (e.g. `invalid_client`).
		code: String,
		/// OAuth `error_description`, when supplied.
		description: Option<String>,
	},
	/// Token endpoint responded with JSON that does not describe a token.
	#[error("Token endpoint returned malformed JSON.")]
	MalformedResponse {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Structured parsing failure.
		#[source]
		source: Arc<serde_path_to_error::Error<serde_json::Error>>,
	},
	/// Token endpoint responded with something the grant cannot interpret.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	UnexpectedResponse {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Summary of the failure.
		message: String,
	},
	/// Token endpoint returned an `expires_in` outside the supported range.
	#[error("The expires_in value exceeds the supported range.")]
	InvalidExpiry,
}
impl AuthenticationError {
	/// HTTP status returned by the token endpoint, when available.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Rejected { status, .. }
			| Self::MalformedResponse { status, .. }
			| Self::UnexpectedResponse { status, .. } => *status,
			Self::InvalidExpiry => None,
		}
	}
}

/// Transport-level failures (network, IO, request assembly).
#[derive(Clone, Debug, ThisError)]
pub enum NetworkError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while sending the request.")]
	Transport {
		/// Transport-specific network error.
		#[source]
		source: SharedError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while sending the request.")]
	Io(#[source] Arc<std::io::Error>),
	/// The HTTP request could not be assembled.
	#[error("HTTP request could not be built.")]
	Request(#[source] Arc<http::Error>),
}
impl NetworkError {
	/// Wraps a transport-specific network error.
	pub fn transport(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Transport { source: Arc::new(src) }
	}
}
impl From<std::io::Error> for NetworkError {
	fn from(e: std::io::Error) -> Self {
		Self::Io(Arc::new(e))
	}
}
impl From<http::Error> for NetworkError {
	fn from(e: http::Error) -> Self {
		Self::Request(Arc::new(e))
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for NetworkError {
	fn from(e: ReqwestError) -> Self {
		Self::transport(e)
	}
}

/// Configuration failures raised once while building a client. They indicate a
/// programming error and are never worth retrying.
#[derive(Clone, Debug, ThisError)]
pub enum ConstructionError {
	/// A configured URL could not be parsed.
	#[error("The {field} URL is invalid.")]
	InvalidUrl {
		/// Which configuration field failed.
		field: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A configured URL uses a scheme other than HTTP(S) or cannot carry paths.
	#[error("The {field} URL must be an absolute HTTP(S) URL: {url}.")]
	UnsupportedUrl {
		/// Which configuration field failed.
		field: &'static str,
		/// URL that failed validation.
		url: String,
	},
	/// The expiry skew exceeds the largest supported safety margin.
	#[error("Expiry skew {skew} exceeds the supported maximum.")]
	InvalidExpirySkew {
		/// Configured skew.
		skew: Duration,
	},
	/// No transport was configured and the default one is not compiled in.
	#[error("No HTTP transport configured; enable the `reqwest` feature or pass one explicitly.")]
	MissingTransport,
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: SharedError,
	},
	/// The API facade refused the transport or base URL.
	#[error("API facade could not be constructed: {reason}.")]
	Facade {
		/// Facade-supplied reason string.
		reason: String,
	},
}
impl ConstructionError {
	/// Wraps a transport's builder failure inside [`ConstructionError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}
}
