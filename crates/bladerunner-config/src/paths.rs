//! Derives per-instance state paths shared by the CLI and the supervisor.
//!
//! Both binaries need to agree on the directory layout so short-lived CLI
//! invocations find the socket the supervisor created.

use std::fs::DirBuilder;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::defaults::CONTROL_SOCKET_NAME;

/// Canonical paths for artefacts written by the supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    state_dir: Utf8PathBuf,
    socket_path: Utf8PathBuf,
    log_path: Utf8PathBuf,
}

impl StatePaths {
    /// Derives the layout for `state_dir` without touching the filesystem.
    #[must_use]
    pub fn new(state_dir: &Utf8Path) -> Self {
        Self {
            socket_path: state_dir.join(CONTROL_SOCKET_NAME),
            log_path: state_dir.join("bladerunner.log"),
            state_dir: state_dir.to_path_buf(),
        }
    }

    /// Derives the layout and creates the state directory owner-only.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be created.
    pub fn prepare(state_dir: &Utf8Path) -> Result<Self, StatePathsError> {
        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        match builder.create(state_dir.as_std_path()) {
            Ok(()) => Ok(Self::new(state_dir)),
            Err(source) if source.kind() == io::ErrorKind::AlreadyExists => {
                Ok(Self::new(state_dir))
            }
            Err(source) => Err(StatePathsError::StateDirectory {
                path: state_dir.to_path_buf(),
                source,
            }),
        }
    }

    /// Directory holding per-instance state.
    #[must_use]
    pub fn state_dir(&self) -> &Utf8Path {
        &self.state_dir
    }

    /// Path of the control socket file.
    #[must_use]
    pub fn socket_path(&self) -> &Utf8Path {
        &self.socket_path
    }

    /// Path of the supervisor log file.
    #[must_use]
    pub fn log_path(&self) -> &Utf8Path {
        &self.log_path
    }
}

/// Errors raised while deriving state paths.
#[derive(Debug, Error)]
pub enum StatePathsError {
    /// Creating the state directory failed.
    #[error("failed to prepare state directory '{path}': {source}")]
    StateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_paths_inside_state_dir() {
        let paths = StatePaths::new(Utf8Path::new("/state/br"));
        assert_eq!(paths.socket_path(), Utf8Path::new("/state/br/control.sock"));
        assert_eq!(paths.log_path(), Utf8Path::new("/state/br/bladerunner.log"));
    }

    #[cfg(unix)]
    #[test]
    fn prepare_creates_owner_only_directory() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().expect("temp dir");
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf8 temp dir");
        let state_dir = root.join("instance");
        let paths = StatePaths::prepare(&state_dir).expect("prepare state dir");
        let mode = std::fs::metadata(paths.state_dir())
            .expect("state dir metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o700);
    }
}
