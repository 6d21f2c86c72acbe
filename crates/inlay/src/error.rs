//! Error types for inlay.

use std::path::PathBuf;

use crate::config::ConfigError;
use crate::discovery::DiscoveryError;
use crate::inline::InlineError;
use crate::synth::SynthesisError;

/// Errors that can occur while building a bundle or hosting an artifact.
///
/// Every build-time variant aborts the whole build; no output is written.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The build configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The artifact's export table could not be discovered.
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Forwarding exports could not be synthesized.
    #[error("synthesis error: {0}")]
    Synthesis(#[from] SynthesisError),

    /// The payload could not be inlined (or extracted back out).
    #[error("inline error: {0}")]
    Inline(#[from] InlineError),

    /// Reading or writing a file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Instantiating or calling an artifact through [`ArtifactHost`](crate::ArtifactHost) failed.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
