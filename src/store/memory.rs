//! Thread-safe in-memory [`AuthStore`] implementation.

// self
use crate::{_prelude::*, auth::CredentialPair, store::AuthStore};

/// In-process credential store; the default choice for applications and tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryAuthStore(Arc<RwLock<Option<CredentialPair>>>);
impl AuthStore for MemoryAuthStore {
	fn credentials(&self) -> Option<CredentialPair> {
		self.0.read().clone()
	}

	fn set_credentials(&self, pair: CredentialPair) {
		*self.0.write() = Some(pair);
	}

	fn clear_credentials(&self) {
		*self.0.write() = None;
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn set_replace_clear_round_trip() {
		let store = MemoryAuthStore::default();

		assert_eq!(store.credentials(), None);

		store.set_credentials(CredentialPair::new("A1", "R1"));
		store.set_credentials(CredentialPair::new("A2", "R2"));

		assert_eq!(store.credentials(), Some(CredentialPair::new("A2", "R2")));

		store.clear_credentials();

		assert_eq!(store.credentials(), None);
	}
}
