//! Client-credentials holder.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// OAuth 2.0 client identifier + secret used for the client-credentials grant.
///
/// The value is immutable after construction, redacts the secret in every formatter,
/// and intentionally has no `Serialize` implementation.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
	client_id: String,
	client_secret: TokenSecret,
}
impl Credentials {
	/// Creates credentials from an identifier + secret pair.
	pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
		Self { client_id: client_id.into(), client_secret: TokenSecret::new(client_secret) }
	}

	/// OAuth 2.0 client identifier.
	pub fn client_id(&self) -> &str {
		&self.client_id
	}

	/// OAuth 2.0 client secret.
	pub fn client_secret(&self) -> &TokenSecret {
		&self.client_secret
	}
}
impl Debug for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credentials")
			.field("client_id", &self.client_id)
			.field("client_secret", &self.client_secret)
			.finish()
	}
}
