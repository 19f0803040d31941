//! Credential models shared by the coordinator and its stores.

// self
use crate::_prelude::*;

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Access/refresh credential pair owned by the auth store.
///
/// Created on login, replaced atomically on every successful refresh, and cleared on
/// logout or unrecoverable refresh failure. The serde shape matches the persisted
/// `{"accessToken", "refreshToken"}` payload used by the durable vault.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPair {
	/// Short-lived bearer value attached to every outgoing request.
	pub access_token: TokenSecret,
	/// Longer-lived secret exchanged for a new pair when the access token expires.
	/// Absent for sessions that cannot be refreshed.
	pub refresh_token: Option<TokenSecret>,
}
impl CredentialPair {
	/// Builds a refreshable pair from both secrets.
	pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
		Self {
			access_token: TokenSecret::new(access),
			refresh_token: Some(TokenSecret::new(refresh)),
		}
	}

	/// Builds a pair that carries no refresh token; authorization failures on such a
	/// session are terminal.
	pub fn access_only(access: impl Into<String>) -> Self {
		Self { access_token: TokenSecret::new(access), refresh_token: None }
	}
}
