#![cfg(feature = "reqwest")]

// std
use std::{sync::Arc, time::Duration};
// crates.io
use httpmock::prelude::*;
// self
use bearer_gate::{
	auth::CredentialPair,
	coordinator::ReqwestCoordinator,
	error::{Error, RefreshError},
	http::{ApiRequest, StatusCode},
	store::{AuthStore, MemoryAuthStore},
	url::Url,
};

fn build_coordinator(server: &MockServer) -> (ReqwestCoordinator, Arc<MemoryAuthStore>) {
	let store_backend = Arc::new(MemoryAuthStore::default());
	let store: Arc<dyn AuthStore> = store_backend.clone();
	let base_url = Url::parse(&server.url("")).expect("Mock server URL should parse.");
	let coordinator =
		ReqwestCoordinator::new(store, base_url).expect("Reqwest coordinator should build.");

	(coordinator, store_backend)
}

#[tokio::test]
async fn concurrent_rejections_share_one_refresh_and_succeed() {
	let server = MockServer::start_async().await;
	let (coordinator, store) = build_coordinator(&server);

	store.set_credentials(CredentialPair::new("A1", "R1"));

	server
		.mock_async(|when, then| {
			when.method(GET).path("/products").header("authorization", "Bearer A1");
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"success\":false,\"message\":\"Token expired.\"}");
		})
		.await;

	let refresh = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/auth/refresh-token")
				.header("content-type", "application/json")
				.json_body(serde_json::json!({ "refreshToken": "R1" }));
			then.status(200)
				.delay(Duration::from_millis(200))
				.header("content-type", "application/json")
				.body(
					"{\"success\":true,\"data\":{\"accessToken\":\"A2\",\"refreshToken\":\"R2\"}}",
				);
		})
		.await;
	let fresh = server
		.mock_async(|when, then| {
			when.method(GET).path("/products").header("authorization", "Bearer A2");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"success\":true,\"data\":[]}");
		})
		.await;

	let (first, second, third) = tokio::join!(
		coordinator.send(ApiRequest::get("/products")),
		coordinator.send(ApiRequest::get("/products")),
		coordinator.send(ApiRequest::get("/products")),
	);

	for result in [first, second, third] {
		let response = result.expect("Every request should succeed after the shared refresh.");

		assert_eq!(response.status(), StatusCode::OK);
	}

	refresh.assert_calls_async(1).await;
	fresh.assert_calls_async(3).await;

	assert_eq!(store.credentials(), Some(CredentialPair::new("A2", "R2")));
	assert_eq!(coordinator.refresh_metrics.attempts(), 1);
	assert_eq!(coordinator.refresh_metrics.successes(), 1);
}

#[tokio::test]
async fn refresh_rejection_cascades_and_clears_credentials() {
	let server = MockServer::start_async().await;
	let (coordinator, store) = build_coordinator(&server);

	store.set_credentials(CredentialPair::new("A1", "R1"));

	server
		.mock_async(|when, then| {
			when.method(GET).path("/cart");
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"success\":false,\"message\":\"Token expired.\"}");
		})
		.await;

	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh-token");
			then.status(400)
				.delay(Duration::from_millis(200))
				.header("content-type", "application/json")
				.body("{\"success\":false,\"message\":\"Invalid refresh token.\"}");
		})
		.await;

	let (first, second, third) = tokio::join!(
		coordinator.send(ApiRequest::get("/cart")),
		coordinator.send(ApiRequest::get("/cart")),
		coordinator.send(ApiRequest::get("/cart")),
	);

	for result in [first, second, third] {
		let err = result.expect_err("Every request should observe the refresh failure.");

		match err {
			Error::Refresh(RefreshError::Rejected { status, message }) => {
				assert_eq!(status, 400);
				assert_eq!(message, "Invalid refresh token.");
			},
			other => panic!("Expected the refresh rejection, got {other:?}."),
		}
	}

	refresh.assert_calls_async(1).await;

	assert_eq!(store.credentials(), None);
	assert_eq!(coordinator.refresh_metrics.failures(), 1);
}

#[tokio::test]
async fn second_rejection_after_refresh_is_terminal() {
	let server = MockServer::start_async().await;
	let (coordinator, store) = build_coordinator(&server);

	store.set_credentials(CredentialPair::new("A1", "R1"));

	let orders = server
		.mock_async(|when, then| {
			when.method(GET).path("/orders");
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"success\":false,\"message\":\"Nope.\"}");
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh-token");
			then.status(200)
				.header("content-type", "application/json")
				.body(
					"{\"success\":true,\"data\":{\"accessToken\":\"A2\",\"refreshToken\":\"R2\"}}",
				);
		})
		.await;

	let err = coordinator
		.send(ApiRequest::get("/orders"))
		.await
		.expect_err("Second rejection after a successful refresh should be terminal.");

	assert!(matches!(err, Error::Unauthorized { status: 401, .. }));

	refresh.assert_calls_async(1).await;
	orders.assert_calls_async(2).await;

	// The rotation itself succeeded; only the replayed request stayed rejected.
	assert_eq!(store.credentials(), Some(CredentialPair::new("A2", "R2")));
}

#[tokio::test]
async fn missing_refresh_token_short_circuits() {
	let server = MockServer::start_async().await;
	let (coordinator, store) = build_coordinator(&server);

	store.set_credentials(CredentialPair::access_only("A1"));

	server
		.mock_async(|when, then| {
			when.method(GET).path("/profile");
			then.status(403)
				.header("content-type", "application/json")
				.body("{\"success\":false,\"message\":\"Forbidden.\"}");
		})
		.await;

	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh-token");
			then.status(200).body("{}");
		})
		.await;

	let err = coordinator
		.send(ApiRequest::get("/profile"))
		.await
		.expect_err("Rejection without a refresh token should be terminal.");

	match err {
		Error::Unauthorized { status, body } => {
			assert_eq!(status, 403);
			assert!(body.expect("Rejection body should be preserved.").contains("Forbidden"));
		},
		other => panic!("Expected a terminal authorization error, got {other:?}."),
	}

	refresh.assert_calls_async(0).await;

	// The session is left untouched; only a failed refresh forces a logout.
	assert_eq!(store.credentials(), Some(CredentialPair::access_only("A1")));
}
