//! Access token model, validity checks, and authorization header rendering.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Access token issued by the token endpoint.
///
/// Tokens serialize to JSON so callers can persist them across restarts and seed a new
/// client through [`ClientOption::InitialToken`](crate::client::ClientOption::InitialToken).
/// A token without `expires_at` never expires.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Token type reported by the endpoint (usually `bearer`).
	#[serde(default)]
	pub token_type: String,
	/// Absolute expiry instant, if the endpoint reported one.
	#[serde(default, with = "time::serde::rfc3339::option")]
	pub expires_at: Option<OffsetDateTime>,
}
impl Token {
	/// Creates a token with an explicit type.
	pub fn new(
		access_token: impl Into<String>,
		token_type: impl Into<String>,
		expires_at: Option<OffsetDateTime>,
	) -> Self {
		Self {
			access_token: TokenSecret::new(access_token),
			token_type: token_type.into(),
			expires_at,
		}
	}

	/// Creates a bearer token.
	pub fn bearer(access_token: impl Into<String>, expires_at: Option<OffsetDateTime>) -> Self {
		Self::new(access_token, "bearer", expires_at)
	}

	/// Returns `true` if the token can still be sent at `now`, treating the token as
	/// expired `skew` before its actual expiry.
	///
	/// A deadline that overflows the representable range counts as expired.
	pub fn is_valid_at(&self, now: OffsetDateTime, skew: Duration) -> bool {
		if self.access_token.is_empty() {
			return false;
		}

		match self.expires_at {
			Some(expires_at) => now.checked_add(skew).is_some_and(|deadline| deadline < expires_at),
			None => true,
		}
	}

	/// Returns `true` if the token has expired at `now` (ignoring any skew).
	pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
		self.expires_at.is_some_and(|expires_at| now >= expires_at)
	}

	/// Token type with canonical casing for the `Authorization` header.
	pub fn scheme(&self) -> &str {
		let kind = self.token_type.as_str();

		if kind.is_empty() || kind.eq_ignore_ascii_case("bearer") {
			"Bearer"
		} else if kind.eq_ignore_ascii_case("mac") {
			"MAC"
		} else if kind.eq_ignore_ascii_case("basic") {
			"Basic"
		} else {
			kind
		}
	}

	/// Renders the `Authorization` header value (`"<scheme> <token>"`).
	pub fn authorization_value(&self) -> String {
		format!("{} {}", self.scheme(), self.access_token.expose())
	}
}
impl Debug for Token {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Token")
			.field("access_token", &"<redacted>")
			.field("token_type", &self.token_type)
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
