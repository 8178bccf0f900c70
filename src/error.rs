// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use thiserror::Error;

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum InstallerError {
    #[error("invalid wheel filename: {0}")]
    WheelFilename(String),

    #[error("invalid wheel archive: {0}")]
    InvalidWheelSource(String),

    #[error("unsupported Wheel-Version: {0}")]
    UnsupportedWheelVersion(String),

    #[error("RECORD row {row} is invalid ({content}): {issues}")]
    InvalidRecordEntry {
        row: usize,
        content: String,
        issues: String,
    },

    #[error("{path} does not match RECORD: {reason}")]
    RecordMismatch { path: String, reason: String },

    #[error("invalid script: {0}")]
    InvalidScript(String),

    #[error("hash algorithm {0} is not in the allowed set")]
    DisallowedHashAlgorithm(String),

    #[error("no destination path configured for scheme {0}")]
    UnknownScheme(&'static str),

    #[error("I/O error writing {0}: {1:?}")]
    DestinationIoPath(String, std::io::Error),

    #[error("metadata parse error: {0:?}")]
    MetadataParse(#[from] mailparse::MailParseError),

    #[error("zip archive error: {0:?}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, InstallerError>;
