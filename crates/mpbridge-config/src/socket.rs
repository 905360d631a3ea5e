use std::fmt;
use std::fs::DirBuilder;
use std::io;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::defaults::DEFAULT_TCP_PORT;

/// Socket the bridge listens on or connects to.
///
/// Written as `tcp://host[:port]` or `unix:///path`; a TCP address without a
/// port uses [`DEFAULT_TCP_PORT`].
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum SocketEndpoint {
    /// Filesystem socket at `path`.
    Unix { path: Utf8PathBuf },
    /// TCP socket endpoint; IPv6 hosts are stored without brackets.
    Tcp { host: String, port: u16 },
}

impl SocketEndpoint {
    /// Endpoint for a filesystem socket.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Endpoint for a TCP host and port.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Socket file path, for Unix endpoints only.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Unix { path } => Some(path),
            Self::Tcp { .. } => None,
        }
    }

    /// Creates the directory holding a Unix socket, owner-only on Unix.
    ///
    /// Existing directories are left as they are; TCP endpoints need nothing.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Self::Unix { path } = self else {
            return Ok(());
        };
        let parent = path
            .parent()
            .filter(|parent| !parent.as_str().is_empty())
            .ok_or_else(|| SocketPreparationError::MissingParent {
                path: path.to_path_buf(),
            })?;
        if parent.is_dir() {
            return Ok(());
        }
        create_private_dir(parent).map_err(|source| SocketPreparationError::CreateDirectory {
            path: parent.to_path_buf(),
            source,
        })
    }
}

fn create_private_dir(dir: &Utf8Path) -> io::Result<()> {
    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(formatter, "unix://{path}"),
            Self::Tcp { host, port } if host.contains(':') => {
                write!(formatter, "tcp://[{host}]:{port}")
            }
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
        }
    }
}

impl FromStr for SocketEndpoint {
    type Err = SocketParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        match url.scheme() {
            "tcp" => {
                let host = url
                    .host_str()
                    .filter(|host| !host.is_empty())
                    .ok_or_else(|| SocketParseError::MissingHost(input.to_owned()))?;
                let host = host.trim_start_matches('[').trim_end_matches(']');
                Ok(Self::tcp(host, url.port().unwrap_or(DEFAULT_TCP_PORT)))
            }
            "unix" => match url.path() {
                "" | "/" => Err(SocketParseError::MissingUnixPath(input.to_owned())),
                path => Ok(Self::unix(path)),
            },
            other => Err(SocketParseError::UnsupportedScheme(other.to_owned())),
        }
    }
}

/// Why an endpoint string was rejected.
#[derive(Debug, Error)]
pub enum SocketParseError {
    /// Scheme is neither `tcp` nor `unix`.
    #[error("unsupported socket scheme '{0}', expected tcp or unix")]
    UnsupportedScheme(String),
    /// `tcp://` without a host.
    #[error("'{0}' names no TCP host")]
    MissingHost(String),
    /// `unix://` without a path.
    #[error("'{0}' names no socket path")]
    MissingUnixPath(String),
    /// Text is not a URL at all.
    #[error("malformed endpoint: {0}")]
    Url(#[from] url::ParseError),
}

/// Why the socket directory could not be prepared.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// The socket path has no directory component.
    #[error("socket path '{path}' is not inside a directory")]
    MissingParent { path: Utf8PathBuf },
    /// The socket directory could not be created.
    #[error("cannot create socket directory '{path}': {source}")]
    CreateDirectory {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}
