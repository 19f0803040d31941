//! Coordinator-level error types shared across the transport, store, and refresh layers.

// self
use crate::_prelude::*;

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical coordinator error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Store(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Refresh-token exchange failure; also delivered to every waiter of the episode.
	#[error(transparent)]
	Refresh(#[from] RefreshError),
	/// Response body could not be decoded into the requested type.
	#[error(transparent)]
	Decode(#[from] DecodeError),

	/// Terminal authorization failure the coordinator declined to recover from.
	///
	/// Raised when a 401/403 arrives with no refresh token available, or when a request
	/// replayed after a successful refresh fails with 401/403 again. The original status
	/// and body are preserved so callers can inspect them unchanged.
	#[error("Request was rejected with status {status} and no recovery is possible.")]
	Unauthorized {
		/// HTTP status code of the rejected response (401 or 403).
		status: u16,
		/// Raw response body, when one was returned.
		body: Option<String>,
	},
}

/// Configuration and request-construction failures raised by the coordinator.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Base URL and request path do not combine into a valid endpoint.
	#[error("Request path does not resolve to a valid endpoint URL.")]
	InvalidEndpoint {
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Credential material cannot be encoded as an HTTP header value.
	#[error("Bearer credential is not a valid header value.")]
	InvalidBearer(#[from] ::http::header::InvalidHeaderValue),
	/// Request payload could not be serialized to JSON.
	#[error("Request payload could not be serialized.")]
	SerializePayload(#[from] serde_json::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
///
/// Timeouts surface here as ordinary network failures; the coordinator never retries
/// them and never distinguishes them from other transport errors.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while executing the request.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

/// Failure of the refresh-token exchange itself.
///
/// One refresh failure rejects the triggering caller and every queued waiter, so the
/// type is [`Clone`] and carries its sources in rendered form.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RefreshError {
	/// Refresh endpoint answered with a non-success status.
	#[error("Refresh endpoint rejected the exchange with status {status}: {message}.")]
	Rejected {
		/// HTTP status code returned by the refresh endpoint.
		status: u16,
		/// Message extracted from the response envelope, or the raw body.
		message: String,
	},
	/// Refresh request could not be constructed locally, before anything left the
	/// process.
	#[error("Refresh request could not be constructed: {message}.")]
	Prepare {
		/// Rendered construction failure.
		message: String,
	},
	/// Refresh call failed before an HTTP status was available.
	#[error("Refresh call failed in transit: {message}.")]
	Transport {
		/// Rendered transport failure.
		message: String,
	},
	/// Refresh endpoint answered 2xx but the credential payload could not be parsed.
	#[error("Refresh endpoint returned a malformed credential payload: {message}.")]
	Malformed {
		/// Rendered parsing failure, including the JSON path.
		message: String,
	},
	/// The caller that was driving the refresh dropped its future before the episode
	/// settled, so queued waiters can never be replayed.
	#[error("Refresh episode was abandoned before it settled.")]
	Abandoned,
}

/// JSON decoding failure for a response body.
#[derive(Debug, ThisError)]
#[error("Response body could not be decoded as JSON.")]
pub struct DecodeError(#[source] pub serde_path_to_error::Error<serde_json::Error>);

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// self
	use super::*;
	use crate::store::StoreError;

	#[test]
	fn store_error_converts_into_coordinator_error_with_source() {
		let store_error = StoreError::Backend { message: "vault unreachable".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Store(_)));
		assert!(error.to_string().contains("vault unreachable"));

		let source = StdError::source(&error)
			.expect("Coordinator error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}

	#[test]
	fn refresh_error_separates_local_construction_from_transit() {
		let prepare = RefreshError::Prepare { message: "path does not resolve".into() };
		let transit = RefreshError::Transport { message: "connection reset".into() };

		assert_ne!(prepare, transit);
		assert!(prepare.to_string().contains("could not be constructed"));
		assert!(transit.to_string().contains("in transit"));
	}

	#[test]
	fn refresh_error_clones_preserve_status_and_message() {
		let original = RefreshError::Rejected { status: 400, message: "invalid_grant".into() };
		let cloned = original.clone();

		assert_eq!(original, cloned);
		assert!(cloned.to_string().contains("400"));
		assert!(cloned.to_string().contains("invalid_grant"));
	}
}
