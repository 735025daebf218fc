// (c) 2025 peerlink developers

//! File-request protocol frames
//!
//! Constructors and parsers for the two flag-distinguished control frames
//! that bracket a file transfer. See the [protocol docs](super) for the
//! choreography.

use super::package::{Package, PackageHeader};
use super::wire::WireError;

/// A decoded `file_request` body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRequest {
    /// Requester-minted identifier, echoed back in the matching info frame.
    pub request_id: u64,
    /// Path of the file on the responder's filesystem.
    pub source_path: String,
}

impl FileRequest {
    /// Builds the outgoing package, flags set, type zero.
    ///
    /// # Errors
    /// [`WireError::SizeOverflow`] for a pathologically long path.
    pub fn into_package(self) -> Result<Package, WireError> {
        Ok(Package::new(0, (self.request_id, self.source_path))?
            .with_flags(PackageHeader::FLAG_FILE_REQUEST))
    }

    /// Decodes a routed `file_request` package.
    ///
    /// # Errors
    /// [`WireError::BodyOverrun`] on a malformed body.
    pub fn from_package(package: &mut Package) -> Result<Self, WireError> {
        Ok(Self {
            request_id: package.read()?,
            source_path: package.read()?,
        })
    }
}

/// A decoded `file_receive_info` body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileInfo {
    /// Echo of the requester's id.
    pub request_id: u64,
    /// Exact number of bytes that will follow on the file channel.
    pub byte_count: u32,
}

impl FileInfo {
    /// Builds the outgoing package, flags set, type zero.
    ///
    /// # Errors
    /// [`WireError::SizeOverflow`] (cannot occur for this fixed-size body,
    /// but the signature follows the package constructor).
    pub fn into_package(self) -> Result<Package, WireError> {
        Ok(Package::new(0, (self.request_id, self.byte_count))?
            .with_flags(PackageHeader::FLAG_FILE_RECEIVE_INFO))
    }

    /// Decodes a routed `file_receive_info` package.
    ///
    /// # Errors
    /// [`WireError::BodyOverrun`] on a malformed body.
    pub fn from_package(package: &mut Package) -> Result<Self, WireError> {
        Ok(Self {
            request_id: package.read()?,
            byte_count: package.read()?,
        })
    }
}
