//! Credential-store contracts and built-in implementations.
//!
//! Two collaborators back the coordinator: an [`AuthStore`] holding the live
//! credential pair, and an optional [`TokenVault`] persisting it across launches.
//! The auth store is synchronous on purpose: the coordinator reads and writes
//! credential state in lock-to-completion sections with no suspension point in
//! between, so a single refresh episode can never observe a half-applied rotation.
//! The vault may perform IO and therefore keeps the boxed-future contract.

pub mod file;
pub mod memory;

pub use file::FileVault;
pub use memory::MemoryAuthStore;

// self
use crate::{_prelude::*, auth::CredentialPair};

/// Boxed future returned by [`TokenVault`] operations.
pub type VaultFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Live credential store consulted on every outgoing request.
pub trait AuthStore
where
	Self: Send + Sync,
{
	/// Returns the current credential pair, if a session exists.
	fn credentials(&self) -> Option<CredentialPair>;

	/// Installs a new credential pair, replacing any previous one.
	fn set_credentials(&self, pair: CredentialPair);

	/// Clears the credential pair; subsequent requests go out unauthenticated.
	fn clear_credentials(&self);
}

/// Durable credential storage surviving process restarts.
///
/// Vault calls on the refresh paths are best-effort: the coordinator logs failures
/// and carries on, since the live store already holds the authoritative pair.
pub trait TokenVault
where
	Self: Send + Sync,
{
	/// Persists the credential pair.
	fn save_tokens<'a>(&'a self, pair: &'a CredentialPair) -> VaultFuture<'a, ()>;

	/// Loads the persisted credential pair, if one exists.
	fn load_tokens(&self) -> VaultFuture<'_, Option<CredentialPair>>;

	/// Removes the persisted credential pair.
	fn remove_tokens(&self) -> VaultFuture<'_, ()>;
}

/// Error type produced by [`TokenVault`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
