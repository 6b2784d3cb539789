//! Filesystem store for challenge screenshots and crops.
//!
//! Writes go through a capability-scoped directory handle so the store
//! can only ever touch its configured root.

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use chrono::Utc;
use thiserror::Error;

/// Subdirectory holding screenshots and crops.
pub const CHALLENGE_SUBDIR: &str = "captchas";
/// Filename prefix for full screenshots.
pub const SCREENSHOT_PREFIX: &str = "o";
/// Filename prefix for cropped challenge regions.
pub const CROP_PREFIX: &str = "c";
/// Subdirectory holding collected user logs.
pub const USER_LOGS_SUBDIR: &str = "userslogs";

/// Errors raised by the challenge store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Raised when the store root cannot be created or opened.
    #[error("failed to open challenge store at {root}: {message}")]
    Open {
        /// Configured store root.
        root: Utf8PathBuf,
        /// OS error message.
        message: String,
    },
    /// Raised when a file write fails.
    #[error("failed to write {path}: {message}")]
    Write {
        /// Path that could not be written.
        path: Utf8PathBuf,
        /// OS error message.
        message: String,
    },
}

/// Stores challenge images under a fixed root directory.
#[derive(Clone, Debug)]
pub struct ChallengeStore {
    root: Utf8PathBuf,
}

impl ChallengeStore {
    /// Creates a store rooted at `root`.
    #[must_use]
    pub const fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    /// Configured store root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Directory screenshots and crops are written into.
    #[must_use]
    pub fn challenge_dir(&self) -> Utf8PathBuf {
        self.root.join(CHALLENGE_SUBDIR)
    }

    /// Path prefix reported for stored screenshots.
    #[must_use]
    pub fn screenshot_prefix(&self) -> Utf8PathBuf {
        self.challenge_dir().join(SCREENSHOT_PREFIX)
    }

    /// Path prefix reported for stored crops.
    #[must_use]
    pub fn crop_prefix(&self) -> Utf8PathBuf {
        self.challenge_dir().join(CROP_PREFIX)
    }

    /// Directory collected user logs are written into.
    #[must_use]
    pub fn user_logs_dir(&self) -> Utf8PathBuf {
        self.root.join(USER_LOGS_SUBDIR)
    }

    /// Saves a full screenshot, returning its path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the directory or file write fails.
    pub fn save_screenshot(&self, png: &[u8]) -> Result<Utf8PathBuf, StoreError> {
        self.write_file(&format!("{SCREENSHOT_PREFIX}{}.png", unix_millis()), png)
    }

    /// Saves a cropped challenge region, returning its path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the directory or file write fails.
    pub fn save_crop(&self, png: &[u8]) -> Result<Utf8PathBuf, StoreError> {
        self.write_file(&format!("{CROP_PREFIX}{}.png", unix_millis()), png)
    }

    fn write_file(&self, name: &str, contents: &[u8]) -> Result<Utf8PathBuf, StoreError> {
        let dir_path = self.challenge_dir();
        Dir::create_ambient_dir_all(&dir_path, ambient_authority()).map_err(|err| {
            StoreError::Open {
                root: self.root.clone(),
                message: err.to_string(),
            }
        })?;
        let dir = Dir::open_ambient_dir(&dir_path, ambient_authority()).map_err(|err| {
            StoreError::Open {
                root: self.root.clone(),
                message: err.to_string(),
            }
        })?;

        let path = dir_path.join(name);
        dir.write(name, contents).map_err(|err| StoreError::Write {
            path: path.clone(),
            message: err.to_string(),
        })?;
        Ok(path)
    }
}

fn unix_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    use super::ChallengeStore;

    fn store() -> (TempDir, ChallengeStore) {
        let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
            .unwrap_or_else(|path| panic!("non-utf8 tempdir path: {}", path.display()));
        (tmp, ChallengeStore::new(root))
    }

    #[test]
    fn screenshots_and_crops_land_under_their_prefixes() {
        let (_tmp, store) = store();

        let shot = store
            .save_screenshot(b"png-bytes")
            .unwrap_or_else(|err| panic!("screenshot write: {err}"));
        let crop = store
            .save_crop(b"crop-bytes")
            .unwrap_or_else(|err| panic!("crop write: {err}"));

        assert!(shot.as_str().starts_with(store.screenshot_prefix().as_str()));
        assert!(crop.as_str().starts_with(store.crop_prefix().as_str()));
        assert!(shot.as_std_path().exists());
        assert!(crop.as_std_path().exists());
    }

    #[test]
    fn reported_paths_are_rooted() {
        let (_tmp, store) = store();
        assert!(
            store
                .user_logs_dir()
                .as_str()
                .starts_with(store.root().as_str())
        );
        assert!(store.challenge_dir().as_str().ends_with("captchas"));
    }
}
