//! Ordered request interceptors applied to every facade call.
//!
//! Interceptors run in registration order on the outgoing request *before* the
//! authorization layer stamps the `Authorization` header. They may add headers, rewrite
//! the URI, or veto the request, but any `Authorization` value they write is replaced by
//! the token source's credentials, so every API request goes out authenticated.

// self
use crate::_prelude::*;

/// Mutates (or rejects) an outgoing API request.
///
/// Closures of the shape `Fn(&mut HttpRequest) -> Result<()>` implement this trait, so
/// most interceptors never need a named type.
pub trait Interceptor
where
	Self: Send + Sync,
{
	/// Adjusts `request` in place; returning an error aborts the request before it is
	/// sent.
	fn intercept(&self, request: &mut HttpRequest) -> Result<()>;
}
impl<F> Interceptor for F
where
	F: Send + Sync + Fn(&mut HttpRequest) -> Result<()>,
{
	fn intercept(&self, request: &mut HttpRequest) -> Result<()> {
		self(request)
	}
}

/// Immutable, ordered list of interceptors fixed at client construction.
#[derive(Clone, Default)]
pub struct InterceptorChain(Vec<Arc<dyn Interceptor>>);
impl InterceptorChain {
	/// Builds a chain that applies `interceptors` in iteration order.
	pub fn new(interceptors: impl IntoIterator<Item = Arc<dyn Interceptor>>) -> Self {
		Self(interceptors.into_iter().collect())
	}

	/// Runs every interceptor against `request`, stopping at the first failure.
	pub fn apply(&self, request: &mut HttpRequest) -> Result<()> {
		self.0.iter().try_for_each(|interceptor| interceptor.intercept(request))
	}

	/// Number of registered interceptors.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when no interceptors are registered.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl Debug for InterceptorChain {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("InterceptorChain").field("len", &self.len()).finish()
	}
}

/// Interceptor that sets a fixed header on every request, replacing earlier values.
#[derive(Clone, Debug)]
pub struct StaticHeader {
	name: http::HeaderName,
	value: http::HeaderValue,
}
impl StaticHeader {
	/// Validates `name` and `value` once so the interceptor itself cannot fail.
	pub fn new(name: &str, value: &str) -> Result<Self> {
		let name = http::HeaderName::from_bytes(name.as_bytes()).map_err(Error::interceptor)?;
		let value = http::HeaderValue::from_str(value).map_err(Error::interceptor)?;

		Ok(Self { name, value })
	}
}
impl Interceptor for StaticHeader {
	fn intercept(&self, request: &mut HttpRequest) -> Result<()> {
		request.headers_mut().insert(self.name.clone(), self.value.clone());

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn request() -> HttpRequest {
		http::Request::builder()
			.uri("https://api.example.com/users")
			.body(Vec::new())
			.expect("Request fixture should build.")
	}

	fn append(marker: &'static str) -> Arc<dyn Interceptor> {
		Arc::new(move |request: &mut HttpRequest| -> Result<()> {
			request
				.headers_mut()
				.append("x-trace", http::HeaderValue::from_static(marker));

			Ok(())
		})
	}

	#[test]
	fn interceptors_run_in_registration_order() {
		let chain = InterceptorChain::new([append("first"), append("second"), append("third")]);
		let mut request = request();

		chain.apply(&mut request).expect("Chain should succeed.");

		let seen = request
			.headers()
			.get_all("x-trace")
			.iter()
			.filter_map(|value| value.to_str().ok())
			.collect::<Vec<_>>();

		assert_eq!(seen, ["first", "second", "third"]);
		assert_eq!(chain.len(), 3);
	}

	#[test]
	fn first_failure_stops_the_chain() {
		let veto: Arc<dyn Interceptor> = Arc::new(|_: &mut HttpRequest| -> Result<()> {
			Err(Error::interceptor("tenant header missing"))
		});
		let chain = InterceptorChain::new([append("first"), veto, append("never")]);
		let mut request = request();
		let err = chain.apply(&mut request).expect_err("Veto should abort the chain.");

		assert!(matches!(err, Error::Interceptor { ref reason } if reason == "tenant header missing"));
		assert_eq!(request.headers().get_all("x-trace").iter().count(), 1);
	}

	#[test]
	fn empty_chain_leaves_the_request_untouched() {
		let chain = InterceptorChain::default();
		let mut request = request();

		chain.apply(&mut request).expect("Empty chain should succeed.");

		assert!(chain.is_empty());
		assert!(request.headers().is_empty());
	}

	#[test]
	fn static_header_rejects_invalid_names() {
		assert!(StaticHeader::new("bad header", "value").is_err());

		let header = StaticHeader::new("x-tenant", "acme").expect("Header should validate.");
		let mut request = request();

		header.intercept(&mut request).expect("Static header should apply.");

		assert_eq!(request.headers().get("x-tenant").and_then(|v| v.to_str().ok()), Some("acme"));
	}
}
