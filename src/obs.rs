//! Optional observability hooks for token acquisition and API calls.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to wrap operations in spans named `huma_client.op` with the `op`
//!   (operation kind) and `stage` (call site) fields.
//! - Enable `metrics` to increment the `huma_client_op_total` counter for every
//!   cache hit, attempt, success, and failure, labeled by `op` + `outcome`.
//!
//! Both layers compile to no-ops when their feature is disabled.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
	/// Token acquisition through the token source.
	TokenAcquire,
	/// Authenticated API request sent through the facade transport.
	ApiRequest,
}
impl OpKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpKind::TokenAcquire => "token_acquire",
			OpKind::ApiRequest => "api_request",
		}
	}
}
impl Display for OpKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded per operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpOutcome {
	/// Answered from the token cache without contacting the network.
	CacheHit,
	/// Network work started.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl OpOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			OpOutcome::CacheHit => "cache_hit",
			OpOutcome::Attempt => "attempt",
			OpOutcome::Success => "success",
			OpOutcome::Failure => "failure",
		}
	}
}
impl Display for OpOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
