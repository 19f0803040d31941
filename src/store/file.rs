//! Simple file-backed [`TokenVault`] for desktop and CLI deployments.
//!
//! Stands in for the mobile platform's encrypted keystore: a single JSON snapshot
//! replaced atomically on every save. Callers who need at-rest encryption should
//! provide their own [`TokenVault`] over the platform facility.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::CredentialPair,
	store::{StoreError, TokenVault, VaultFuture},
};

/// Persists the credential pair to a JSON file after each mutation.
#[derive(Clone, Debug)]
pub struct FileVault {
	path: PathBuf,
}
impl FileVault {
	/// Creates a vault at the provided path, creating parent directories on demand.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		Ok(Self { path })
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create vault directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn load_snapshot(&self) -> Result<Option<VaultRecord>, StoreError> {
		if !self.path.exists() {
			return Ok(None);
		}

		let metadata = self.path.metadata().map_err(|e| StoreError::Backend {
			message: format!("Failed to inspect {}: {e}", self.path.display()),
		})?;

		if metadata.len() == 0 {
			return Ok(None);
		}

		let bytes = fs::read(&self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", self.path.display()),
		})?;
		let record = serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", self.path.display()),
		})?;

		Ok(Some(record))
	}

	fn persist_snapshot(&self, record: &VaultRecord) -> Result<(), StoreError> {
		Self::ensure_parent_exists(&self.path)?;

		let serialized = serde_json::to_vec_pretty(record).map_err(|e| StoreError::Serialization {
			message: format!("Failed to serialize vault snapshot: {e}"),
		})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}

	fn remove_snapshot(&self) -> Result<(), StoreError> {
		match fs::remove_file(&self.path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StoreError::Backend {
				message: format!("Failed to remove {}: {e}", self.path.display()),
			}),
		}
	}
}
impl TokenVault for FileVault {
	fn save_tokens<'a>(&'a self, pair: &'a CredentialPair) -> VaultFuture<'a, ()> {
		Box::pin(async move {
			let record =
				VaultRecord { credentials: pair.clone(), saved_at: OffsetDateTime::now_utc() };

			self.persist_snapshot(&record)
		})
	}

	fn load_tokens(&self) -> VaultFuture<'_, Option<CredentialPair>> {
		Box::pin(async move { Ok(self.load_snapshot()?.map(|record| record.credentials)) })
	}

	fn remove_tokens(&self) -> VaultFuture<'_, ()> {
		Box::pin(async move { self.remove_snapshot() })
	}
}

/// On-disk snapshot shape; the instant records when the pair was last rotated.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VaultRecord {
	#[serde(flatten)]
	credentials: CredentialPair,
	#[serde(with = "time::serde::rfc3339")]
	saved_at: OffsetDateTime,
}
