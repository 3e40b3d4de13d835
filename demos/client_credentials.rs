//! Demonstrates an authenticated client against a mocked Huma HR deployment: one token
//! exchange serves several API calls, and a tenant header is added by an interceptor.

// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use huma_client::{
	auth::Credentials,
	client::{Client, ClientOption},
	interceptor::StaticHeader,
	reqwest,
	transport::ReqwestTransport,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/oauth/token");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"token_type\":\"bearer\",\"expires_in\":900}",
			);
		})
		.await;
	let users_mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/users")
				.header("authorization", "Bearer demo-access")
				.header("x-tenant", "acme");
			then.status(200)
				.header("content-type", "application/json")
				.body("[{\"id\":1,\"name\":\"Ada\"},{\"id\":2,\"name\":\"Grace\"}]");
		})
		.await;
	let transport = ReqwestTransport::with_client(reqwest::Client::builder().build()?);
	let client = Client::new(
		Credentials::new("demo-client", "super-secret"),
		[
			ClientOption::base_url(server.base_url()),
			ClientOption::token_endpoint(server.url("/auth/oauth/token")),
			ClientOption::transport(transport),
			ClientOption::interceptor(StaticHeader::new("x-tenant", "acme")?),
		],
	)?;

	for _ in 0..2 {
		let users: Vec<serde_json::Value> = client.api().get_json("users").await?;

		println!("Fetched {} users.", users.len());
	}

	let token = client.token().await?;

	println!("Token state: {:?}, expires at {:?}.", client.token_state(), token.expires_at);

	token_mock.assert_async().await;
	users_mock.assert_calls_async(2).await;

	Ok(())
}
