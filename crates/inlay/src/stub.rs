//! The loader stub template and path resolution.

use std::path::Path;

use crate::config::ArtifactPath;
use crate::error::Error;

/// Build-time token standing in for the artifact path, quote delimiters included.
///
/// Matching the delimiters as well keeps the substitution from touching any
/// unquoted mention of the file name.
pub const PATH_PLACEHOLDER: &str = "'artifact.wasm'";

/// The built-in loader stub.
const DEFAULT_STUB: &str = include_str!("../assets/loader.mjs");

/// JS source of a loader stub, before or after path resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderStub {
    source: String,
}

impl Default for LoaderStub {
    fn default() -> Self {
        Self::from_source(DEFAULT_STUB)
    }
}

impl LoaderStub {
    /// Wrap arbitrary stub source.
    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    /// Read a custom stub template from disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read.
    pub async fn from_file(path: &Path) -> Result<Self, Error> {
        let source = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::io(path, e))?;
        Ok(Self::from_source(source))
    }

    /// The stub's source text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Consume the stub, returning its source text.
    pub fn into_source(self) -> String {
        self.source
    }

    /// Replace every occurrence of [`PATH_PLACEHOLDER`] with the artifact
    /// path as a quoted JS string literal.
    ///
    /// Matching is literal; nothing in the template is interpreted as a
    /// pattern.
    pub fn resolve(&self, artifact: &ArtifactPath) -> Self {
        let occurrences = self.source.matches(PATH_PLACEHOLDER).count();
        tracing::debug!(
            path = %artifact.as_str(),
            occurrences,
            "Resolving artifact path in loader stub"
        );
        if occurrences == 0 {
            tracing::warn!("Loader stub contains no artifact path placeholder");
        }

        Self {
            source: self
                .source
                .replace(PATH_PLACEHOLDER, &artifact.js_literal()),
        }
    }
}
