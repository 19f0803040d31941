//! Transport primitives for authenticated API calls.
//!
//! The module exposes [`HttpTransport`] as the crate's only dependency on an HTTP
//! stack. The coordinator resolves an [`ApiRequest`] into a [`PreparedRequest`]
//! (absolute URL, bearer header attached) and hands it to the transport, which
//! returns a fully buffered [`ApiResponse`]. Implementations must be
//! `'static + Send + Sync` so a single transport can be shared across coordinator
//! instances, and the futures they return must be `Send` so coordinator futures can
//! hop executors freely.

pub use ::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, DecodeError, TransportError},
};

/// Boxed future returned by [`HttpTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send>>;

/// Abstraction over HTTP stacks capable of executing prepared requests.
pub trait HttpTransport
where
	Self: 'static + Send + Sync,
{
	/// Executes a prepared request and buffers the full response.
	///
	/// Implementations report every transport-level failure, timeouts included, as
	/// [`TransportError`]; responses with non-success statuses are returned as ordinary
	/// [`ApiResponse`] values so the coordinator can inspect them.
	fn execute(&self, request: PreparedRequest) -> TransportFuture<'_>;
}

/// Outbound API call description, relative to the coordinator's base URL.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Path below the base URL, with or without a leading slash.
	pub path: String,
	/// Query pairs appended to the resolved URL.
	pub query: Vec<(String, String)>,
	/// Extra headers merged into the prepared request.
	pub headers: HeaderMap,
	/// Optional request body.
	pub body: Option<Vec<u8>>,
}
impl ApiRequest {
	/// Creates a request for the provided method and path.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self { method, path: path.into(), query: Vec::new(), headers: HeaderMap::new(), body: None }
	}

	/// Creates a GET request for the provided path.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::GET, path)
	}

	/// Creates a POST request for the provided path.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::POST, path)
	}

	/// Creates a PUT request for the provided path.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::PUT, path)
	}

	/// Creates a DELETE request for the provided path.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::DELETE, path)
	}

	/// Appends a query pair.
	pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((key.into(), value.into()));

		self
	}

	/// Sets or replaces an extra header.
	pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
		self.headers.insert(name, value);

		self
	}

	/// Attaches a JSON payload and the matching content type.
	pub fn json<T>(mut self, payload: &T) -> Result<Self, ConfigError>
	where
		T: ?Sized + Serialize,
	{
		self.body = Some(serde_json::to_vec(payload)?);
		self.headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

		Ok(self)
	}

	/// Attaches a raw payload with an explicit content type.
	pub fn bytes(mut self, body: Vec<u8>, content_type: HeaderValue) -> Self {
		self.body = Some(body);
		self.headers.insert(header::CONTENT_TYPE, content_type);

		self
	}
}

/// Fully resolved request handed to the transport; the coordinator has already
/// attached the bearer header and expanded the URL.
#[derive(Clone, Debug)]
pub struct PreparedRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute request URL, query included.
	pub url: Url,
	/// Complete header set.
	pub headers: HeaderMap,
	/// Optional request body.
	pub body: Option<Vec<u8>>,
}

/// Fully buffered response returned by a transport.
#[derive(Clone, Debug)]
pub struct ApiResponse {
	status: StatusCode,
	headers: HeaderMap,
	body: Vec<u8>,
}
impl ApiResponse {
	/// Builds a response from its parts.
	pub fn new(status: StatusCode, headers: HeaderMap, body: Vec<u8>) -> Self {
		Self { status, headers, body }
	}

	/// Returns the HTTP status.
	pub fn status(&self) -> StatusCode {
		self.status
	}

	/// Returns the response headers.
	pub fn headers(&self) -> &HeaderMap {
		&self.headers
	}

	/// Returns the raw response body.
	pub fn body(&self) -> &[u8] {
		&self.body
	}

	/// Consumes the response and returns the raw body.
	pub fn into_body(self) -> Vec<u8> {
		self.body
	}

	/// Returns the body as lossily decoded UTF-8, or `None` when it is empty.
	pub fn text_lossy(&self) -> Option<String> {
		if self.body.is_empty() {
			return None;
		}

		Some(String::from_utf8_lossy(&self.body).into_owned())
	}

	/// Decodes the body as JSON, reporting the failing path on malformed payloads.
	pub fn json<T>(&self) -> Result<T, DecodeError>
	where
		T: DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer).map_err(DecodeError)
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// [`ReqwestTransport::new`] applies the crate's fixed 30-second wall-clock timeout to
/// every request, refresh calls and replays included; a timeout surfaces as an
/// ordinary [`TransportError`]. Custom clients passed through
/// [`ReqwestTransport::with_client`] keep whatever timeout they were built with.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wall-clock timeout applied to every request by [`ReqwestTransport::new`].
	pub const DEFAULT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

	/// Builds a transport with the default timeout configuration.
	pub fn new() -> Result<Self, ConfigError> {
		let client = ReqwestClient::builder().timeout(Self::DEFAULT_TIMEOUT).build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl HttpTransport for ReqwestTransport {
	fn execute(&self, request: PreparedRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let mut builder =
				client.request(request.method, request.url).headers(request.headers);

			if let Some(body) = request.body {
				builder = builder.body(body);
			}

			let response = builder.send().await.map_err(TransportError::from)?;
			let status = response.status();
			let headers = response.headers().to_owned();
			let body = response.bytes().await.map_err(TransportError::from)?.to_vec();

			Ok(ApiResponse::new(status, headers, body))
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn json_builder_sets_content_type() {
		let request = ApiRequest::post("/products")
			.json(&serde_json::json!({ "name": "bike" }))
			.expect("JSON payload should serialize.");

		assert_eq!(
			request.headers.get(header::CONTENT_TYPE),
			Some(&HeaderValue::from_static("application/json")),
		);
		assert_eq!(request.body.as_deref(), Some(br#"{"name":"bike"}"# as &[u8]));
	}

	#[test]
	fn response_json_reports_failing_path() {
		let response = ApiResponse::new(
			StatusCode::OK,
			HeaderMap::new(),
			br#"{"data":{"accessToken":42}}"#.to_vec(),
		);
		let err = response
			.json::<CredentialEnvelope>()
			.expect_err("Numeric access token should fail to decode.");

		assert!(err.0.path().to_string().contains("accessToken"));
	}

	#[derive(Debug, Deserialize)]
	struct CredentialEnvelope {
		#[allow(dead_code)]
		data: CredentialPayload,
	}
	#[derive(Debug, Deserialize)]
	#[serde(rename_all = "camelCase")]
	struct CredentialPayload {
		#[allow(dead_code)]
		access_token: String,
	}

	#[test]
	fn text_lossy_is_none_for_empty_bodies() {
		let response = ApiResponse::new(StatusCode::NO_CONTENT, HeaderMap::new(), Vec::new());

		assert_eq!(response.text_lossy(), None);
	}
}
