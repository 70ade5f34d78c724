//! Test configuration loaders for scenarios covering success and failure paths.

use std::ffi::OsString;
use std::os::unix::net::UnixDatagram;
use std::sync::Arc;

use camino::Utf8PathBuf;
use ortho_config::OrthoError;
use tempfile::TempDir;
use txproc_config::Config;

use crate::bootstrap::ConfigLoader;

fn utf8_dir(dir: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
        .expect("temporary directory path was not valid UTF-8")
}

fn base_config(log_dir: Utf8PathBuf, peer_socket: Utf8PathBuf) -> Config {
    Config {
        app_name: Some("test-worker".to_owned()),
        log_dir: Some(log_dir),
        log_to_stderr: Some(true),
        peer_socket: Some(peer_socket),
        ..Config::default()
    }
}

/// Loader whose peer socket is bound for the lifetime of the loader.
pub struct TestConfigLoader {
    dir: TempDir,
    peer: UnixDatagram,
}

impl TestConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temporary directory for sockets");
        let peer = UnixDatagram::bind(dir.path().join("txproc.sock")).expect("bind peer socket");
        Self { dir, peer }
    }

    /// Socket standing in for txProc.
    pub const fn peer(&self) -> &UnixDatagram {
        &self.peer
    }
}

impl ConfigLoader for TestConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let dir = utf8_dir(&self.dir);
        Ok(base_config(dir.join("run"), dir.join("txproc.sock")))
    }
}

/// Loader naming a peer socket that nobody listens on.
pub struct MissingPeerConfigLoader {
    dir: TempDir,
}

impl MissingPeerConfigLoader {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temporary directory for sockets"),
        }
    }
}

impl ConfigLoader for MissingPeerConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let dir = utf8_dir(&self.dir);
        Ok(base_config(dir.clone(), dir.join("absent.sock")))
    }
}

/// Loader that intentionally fails by passing an unknown CLI flag.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        let args = vec![
            OsString::from("txproc-worker"),
            OsString::from("--no-such-flag"),
        ];
        Config::load_from_iter(args)
    }
}
