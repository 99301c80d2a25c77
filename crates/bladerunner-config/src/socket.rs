//! Control socket endpoints.
//!
//! Endpoints are written as `unix:///abs/path.sock` or `tcp://host:port`.

use std::fmt;
use std::fs::DirBuilder;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use url::Url;

use crate::defaults::CONTROL_SOCKET_NAME;

/// Where the supervisor's control plane listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEndpoint {
    /// Unix domain socket; the file is removed when the listener closes.
    Unix {
        /// Filesystem path of the socket file.
        path: Utf8PathBuf,
    },
    /// TCP socket.
    Tcp {
        /// Host name or address to bind or dial.
        host: String,
        /// TCP port.
        port: u16,
    },
}

impl SocketEndpoint {
    /// Builds a Unix domain socket endpoint.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Builds a TCP socket endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// `<state_dir>/control.sock`.
    #[must_use]
    pub fn in_state_dir(state_dir: &Utf8Path) -> Self {
        Self::unix(state_dir.join(CONTROL_SOCKET_NAME))
    }

    /// The socket file, for Unix endpoints.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Unix { path } => Some(path.as_path()),
            Self::Tcp { .. } => None,
        }
    }

    /// Transport-level address: a filesystem path or `host:port`.
    #[must_use]
    pub fn address(&self) -> String {
        match self {
            Self::Unix { path } => path.to_string(),
            Self::Tcp { host, port } => format!("{host}:{port}"),
        }
    }

    /// Creates the socket's parent directory, owner-only, when missing.
    ///
    /// TCP endpoints need nothing.
    ///
    /// # Errors
    ///
    /// Fails when the path has no parent or the directory cannot be created.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Some(path) = self.unix_path() else {
            return Ok(());
        };
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .ok_or_else(|| SocketPreparationError::MissingParent {
                path: path.to_path_buf(),
            })?;

        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        match builder.create(parent) {
            Err(source) if source.kind() != std::io::ErrorKind::AlreadyExists => {
                Err(SocketPreparationError::CreateDirectory {
                    path: parent.to_path_buf(),
                    source,
                })
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(formatter, "unix://{path}"),
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
        }
    }
}

impl FromStr for SocketEndpoint {
    type Err = SocketParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        match url.scheme() {
            "unix" => unix_from_url(&url, input),
            "tcp" => tcp_from_url(&url, input),
            other => Err(SocketParseError::UnsupportedScheme(other.to_owned())),
        }
    }
}

fn unix_from_url(url: &Url, input: &str) -> Result<SocketEndpoint, SocketParseError> {
    // `unix://run/x.sock` would otherwise lose `run` to the URL host.
    if url.host_str().is_some_and(|host| !host.is_empty()) {
        return Err(SocketParseError::RelativeUnixPath(input.to_owned()));
    }
    match url.path() {
        "" | "/" => Err(SocketParseError::MissingUnixPath(input.to_owned())),
        path => Ok(SocketEndpoint::unix(path)),
    }
}

fn tcp_from_url(url: &Url, input: &str) -> Result<SocketEndpoint, SocketParseError> {
    let missing = || SocketParseError::MissingHostPort(input.to_owned());
    let host = url.host_str().filter(|host| !host.is_empty()).ok_or_else(missing)?;
    let port = url.port().ok_or_else(missing)?;
    Ok(SocketEndpoint::tcp(host, port))
}

/// Rejected `--control-socket` values.
#[derive(Debug, Error)]
pub enum SocketParseError {
    /// Neither `unix` nor `tcp`.
    #[error("unsupported control socket scheme '{0}'; use unix:// or tcp://")]
    UnsupportedScheme(String),
    /// A `tcp://` URL without both host and port.
    #[error("control socket '{0}' must name a host and port")]
    MissingHostPort(String),
    /// A `unix://` URL without a path.
    #[error("control socket '{0}' has no socket path")]
    MissingUnixPath(String),
    /// A `unix://` URL whose path is not absolute.
    #[error("control socket '{0}' must use an absolute path, as in unix:///path")]
    RelativeUnixPath(String),
    /// Not a URL at all.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

/// Errors raised when preparing socket directories.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// The socket path is a bare file name.
    #[error("socket path '{path}' has no parent directory")]
    MissingParent {
        /// Socket path lacking a parent.
        path: Utf8PathBuf,
    },
    /// Failed to create the socket directory.
    #[error("failed to create socket directory '{path}': {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}
