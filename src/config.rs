// (c) 2025 peerlink developers

//! Client configuration
//!
//! A plain settings record passed through the [`Client`](crate::Client)
//! constructor. There is no config-file or environment plumbing here; peers
//! embedding this crate construct the record themselves.

use std::path::PathBuf;

/// Default chunk size for file-channel reads and writes (bytes).
pub const DEFAULT_FILE_BUFFER_SIZE: usize = 128 * 1024;

/// Default advisory size ceiling for non-file packages (bytes). Oversized
/// packages are logged, not rejected.
pub const DEFAULT_MAX_PACKAGE_SIZE: usize = 64 * 1024;

/// Transport variant selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum::Display)]
pub enum ClientMode {
    /// Plain TCP.
    #[default]
    Tcp,
    /// TLS 1.3 over TCP, with self-signed certificates and peer verification
    /// disabled.
    Tls,
}

/// Configuration record for one [`Client`](crate::Client).
#[derive(Clone, Debug)]
pub struct Settings {
    /// Transport variant to use for new connections. May be changed later
    /// via [`Client::set_mode`](crate::Client::set_mode).
    pub mode: ClientMode,
    /// Directory that received files are written into.
    pub download_directory: PathBuf,
    /// Directory holding (or receiving) `privateKey.key` and
    /// `certificate.crt` for TLS mode.
    pub certificate_directory: PathBuf,
    /// Chunk size for file-channel I/O.
    pub file_buffer_size: usize,
    /// Advisory ceiling for non-file packages; crossing it logs a warning.
    pub max_package_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: ClientMode::default(),
            download_directory: PathBuf::from("."),
            certificate_directory: PathBuf::from("./certificates"),
            file_buffer_size: DEFAULT_FILE_BUFFER_SIZE,
            max_package_size: DEFAULT_MAX_PACKAGE_SIZE,
        }
    }
}

impl Settings {
    /// Convenience constructor for the common case of selecting a mode and a
    /// download directory.
    #[must_use]
    pub fn new(mode: ClientMode, download_directory: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            download_directory: download_directory.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_certificate_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.certificate_directory = directory.into();
        self
    }

    #[must_use]
    pub fn with_file_buffer_size(mut self, bytes: usize) -> Self {
        self.file_buffer_size = bytes;
        self
    }

    #[must_use]
    pub fn with_max_package_size(mut self, bytes: usize) -> Self {
        self.max_package_size = bytes;
        self
    }
}
