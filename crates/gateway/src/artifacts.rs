//! Artifact naming and placement under the gateway's output root.
//!
//! The filesystem is the system of record: an artifact is nothing but a
//! category directory plus a caller-chosen file name.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::error::{GatewayError, Result};

/// Artifact categories, each mapping to one directory under the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
	Screenshot,
	Pdf,
	Trace,
}

impl ArtifactKind {
	pub fn dir_name(self) -> &'static str {
		match self {
			Self::Screenshot => "screenshots",
			Self::Pdf => "pdfs",
			Self::Trace => "traces",
		}
	}
}

/// Resolves artifact names to paths, creating category directories on first use.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
	root: PathBuf,
}

impl ArtifactStore {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	/// Returns the path for `name` in the category directory.
	///
	/// Only the file-name component of `name` is used, so caller input can
	/// never escape the artifact root. Directory creation is idempotent and
	/// safe under concurrent first use.
	pub fn resolve(&self, kind: ArtifactKind, name: &str) -> Result<PathBuf> {
		let file_name = Path::new(name)
			.file_name()
			.and_then(OsStr::to_str)
			.filter(|file_name| !file_name.is_empty() && *file_name != "..")
			.ok_or_else(|| GatewayError::InvalidArtifactName(name.to_string()))?;

		let dir = self.root.join(kind.dir_name());
		std::fs::create_dir_all(&dir)?;
		Ok(dir.join(file_name))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn resolution_is_deterministic_and_creates_the_category_dir() {
		let root = tempfile::TempDir::new().unwrap();
		let store = ArtifactStore::new(root.path());

		let first = store.resolve(ArtifactKind::Screenshot, "x.png").unwrap();
		let second = store.resolve(ArtifactKind::Screenshot, "x.png").unwrap();
		assert_eq!(first, second);
		assert_eq!(first, root.path().join("screenshots/x.png"));
		assert!(root.path().join("screenshots").is_dir());
	}

	#[test]
	fn traversal_attempts_stay_inside_the_category_dir() {
		let root = tempfile::TempDir::new().unwrap();
		let store = ArtifactStore::new(root.path());

		let resolved = store.resolve(ArtifactKind::Pdf, "../../etc/x.pdf").unwrap();
		assert_eq!(resolved, root.path().join("pdfs/x.pdf"));

		assert!(store.resolve(ArtifactKind::Pdf, "..").is_err());
		assert!(store.resolve(ArtifactKind::Pdf, "").is_err());
	}

	#[test]
	fn categories_map_to_distinct_directories() {
		let root = tempfile::TempDir::new().unwrap();
		let store = ArtifactStore::new(root.path());

		let image = store.resolve(ArtifactKind::Screenshot, "a.png").unwrap();
		let document = store.resolve(ArtifactKind::Pdf, "a.pdf").unwrap();
		let trace = store.resolve(ArtifactKind::Trace, "a.json").unwrap();
		assert_ne!(image.parent(), document.parent());
		assert_ne!(document.parent(), trace.parent());
	}

	#[test]
	fn concurrent_first_use_is_safe() {
		let root = tempfile::TempDir::new().unwrap();
		let store = ArtifactStore::new(root.path());

		std::thread::scope(|scope| {
			for i in 0..8 {
				let store = store.clone();
				scope.spawn(move || store.resolve(ArtifactKind::Trace, &format!("t{i}.json")).unwrap());
			}
		});
		assert!(root.path().join("traces").is_dir());
	}
}
