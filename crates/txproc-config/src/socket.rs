use std::fmt;
use std::fs::{self, DirBuilder};
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Path of the worker's own datagram socket.
///
/// The peer addresses replies to this path, so it must be stable for the
/// lifetime of the process and free of stale files from earlier runs.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct LocalSocket {
    path: Utf8PathBuf,
}

impl LocalSocket {
    /// Wraps a socket path.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the socket path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Ensures the socket's parent directory exists with restrictive
    /// permissions and removes any socket file left by an earlier process.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Some(parent) = self.path.parent().filter(|p| !p.as_str().is_empty()) else {
            return Err(SocketPreparationError::MissingParent {
                path: self.path.clone(),
            });
        };

        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }

        if let Err(source) = builder.create(parent.as_std_path())
            && source.kind() != io::ErrorKind::AlreadyExists
        {
            return Err(SocketPreparationError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            });
        }

        match fs::remove_file(self.path.as_std_path()) {
            Err(source) if source.kind() != io::ErrorKind::NotFound => {
                Err(SocketPreparationError::RemoveStale {
                    path: self.path.clone(),
                    source,
                })
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for LocalSocket {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "unix://{}", self.path)
    }
}

/// Errors raised when preparing the local socket path.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// Parent directory is missing when creating a Unix socket path.
    #[error("socket path '{path}' has no parent directory")]
    MissingParent { path: Utf8PathBuf },
    /// Failed to create or adjust socket directories.
    #[error("failed to create socket directory '{path}': {source}")]
    CreateDirectory {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    /// A file already occupies the socket path and could not be removed.
    #[error("failed to remove stale socket '{path}': {source}")]
    RemoveStale {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf8(path: std::path::PathBuf) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(path).expect("temp paths are UTF-8")
    }

    #[test]
    fn display_unix_socket() {
        let socket = LocalSocket::new("/tmp/txproc/worker.sock");
        assert_eq!(socket.to_string(), "unix:///tmp/txproc/worker.sock");
    }

    #[test]
    fn creates_private_parent_directory() {
        let temp = tempfile::tempdir().expect("temp dir");
        let dir = utf8(temp.path().join("nested/run"));
        let socket = LocalSocket::new(dir.join("worker.sock"));

        socket.prepare_filesystem().expect("prepare");

        assert!(dir.is_dir());
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&dir).expect("metadata").permissions().mode();
            assert_eq!(mode & 0o777, 0o700);
        }
    }

    #[test]
    fn removes_stale_socket_file() {
        let temp = tempfile::tempdir().expect("temp dir");
        let path = utf8(temp.path().join("worker.sock"));
        fs::write(&path, b"stale").expect("write stale file");

        LocalSocket::new(path.clone())
            .prepare_filesystem()
            .expect("prepare");

        assert!(!path.exists());
    }

    #[test]
    fn rejects_path_without_parent() {
        let error = LocalSocket::new("worker.sock")
            .prepare_filesystem()
            .expect_err("bare file name has no parent");
        assert!(matches!(error, SocketPreparationError::MissingParent { .. }));
    }
}
