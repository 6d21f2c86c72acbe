//! The finished bundle and its build manifest.

use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::discovery::{Export, ExportSet};
use crate::error::Error;
use crate::inline::extract_payload;

/// A completed bundle: the module text plus what went into it.
#[derive(Debug, Clone)]
pub struct Bundle {
    source: String,
    exports: ExportSet,
    payload_size: usize,
    payload_sha256: [u8; 32],
}

impl Bundle {
    pub(crate) fn new(source: String, exports: ExportSet, payload: &[u8]) -> Self {
        Self {
            source,
            exports,
            payload_size: payload.len(),
            payload_sha256: Sha256::digest(payload).into(),
        }
    }

    /// The ES module text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The exports forwarded by the bundle, in order.
    pub fn exports(&self) -> &ExportSet {
        &self.exports
    }

    /// Size of the embedded artifact in bytes.
    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    /// Hex SHA-256 of the embedded artifact.
    pub fn payload_sha256(&self) -> String {
        hex::encode(self.payload_sha256)
    }

    /// Decode the embedded artifact back out of the module text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Inline`] if the payload is missing or malformed.
    pub fn payload(&self) -> Result<Vec<u8>, Error> {
        Ok(extract_payload(&self.source)?)
    }

    /// Describe this bundle as written to `output`.
    pub fn manifest(&self, output: &Path) -> BuildManifest {
        BuildManifest {
            output: output.to_path_buf(),
            exports: self.exports.iter().cloned().collect(),
            payload_size: self.payload_size,
            payload_sha256: self.payload_sha256(),
            inlay_version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// JSON record of a build, written next to the bundle on request.
#[derive(Debug, Clone, Serialize)]
pub struct BuildManifest {
    /// Where the bundle was written.
    pub output: PathBuf,
    /// Forwarded exports, in order.
    pub exports: Vec<Export>,
    /// Size of the embedded artifact in bytes.
    pub payload_size: usize,
    /// Hex SHA-256 of the embedded artifact.
    pub payload_sha256: String,
    /// Version of inlay that produced the bundle.
    pub inlay_version: &'static str,
}

impl BuildManifest {
    /// Render as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if serialization fails.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self).map_err(|e| Error::io(&self.output, e.into()))
    }
}
