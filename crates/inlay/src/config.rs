//! Build configuration.
//!
//! The only required setting is the absolute path to the artifact. It is
//! validated once, up front, and then threaded through the pipeline as a typed
//! [`ArtifactPath`] so later stages never re-check it.

use std::path::{Path, PathBuf};

/// Directory bundles are written to when no output path is given.
const DEFAULT_OUTPUT_DIR: &str = "dist";

/// Extension of the generated ES module.
const OUTPUT_EXTENSION: &str = "mjs";

/// Invalid build configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// No artifact path was supplied, or it was empty.
    #[error("artifact path is not set: pass --config-wasm=FILE or set INLAY_CONFIG_WASM")]
    Missing,

    /// The artifact path is relative.
    #[error("artifact path must be absolute, got {}", .0.display())]
    NotAbsolute(PathBuf),

    /// The artifact path cannot be spelled as a JS string.
    #[error("artifact path is not valid UTF-8: {}", .0.display())]
    NotUtf8(PathBuf),
}

/// Validated absolute, UTF-8 path to the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPath(PathBuf);

impl ArtifactPath {
    /// Validate a candidate artifact path.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Missing`] when `path` is `None` or empty,
    /// [`ConfigError::NotAbsolute`] when it is relative, and
    /// [`ConfigError::NotUtf8`] when it cannot be represented in JS source.
    pub fn new(path: Option<impl AsRef<Path>>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) if !p.as_ref().as_os_str().is_empty() => p.as_ref().to_path_buf(),
            _ => return Err(ConfigError::Missing),
        };

        if !path.is_absolute() {
            return Err(ConfigError::NotAbsolute(path));
        }
        if path.to_str().is_none() {
            return Err(ConfigError::NotUtf8(path));
        }

        Ok(Self(path))
    }

    /// The path on disk.
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// The path as a string slice.
    pub fn as_str(&self) -> &str {
        // Checked in `new`.
        self.0.to_str().unwrap_or_default()
    }

    /// The path as a double-quoted JS string literal, as `JSON.stringify` would spell it.
    pub fn js_literal(&self) -> String {
        serde_json::Value::String(self.as_str().to_owned()).to_string()
    }

    /// The artifact's file stem, used to name the default output.
    fn stem(&self) -> &str {
        self.0
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("bundle")
    }
}

/// Optional knobs for a build.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Where to write the bundle. Defaults to `dist/<artifact stem>.mjs`.
    pub output: Option<PathBuf>,
    /// Custom loader stub template. Defaults to the built-in stub.
    pub stub: Option<PathBuf>,
    /// Largest payload, in bytes, that may be embedded. `None` means unbounded.
    pub max_embed_size: Option<u64>,
    /// Run the size reducer over the final text.
    pub minify: bool,
    /// Where to write a JSON build manifest, if anywhere.
    pub manifest: Option<PathBuf>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            output: None,
            stub: None,
            max_embed_size: None,
            minify: true,
            manifest: None,
        }
    }
}

/// Everything one build invocation needs. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    artifact: ArtifactPath,
    options: BuildOptions,
}

impl BuildConfig {
    /// Create a configuration with default options.
    pub fn new(artifact: ArtifactPath) -> Self {
        Self {
            artifact,
            options: BuildOptions::default(),
        }
    }

    /// Validate `path` and create a configuration with default options.
    ///
    /// # Errors
    ///
    /// See [`ArtifactPath::new`].
    pub fn from_path(path: Option<impl AsRef<Path>>) -> Result<Self, ConfigError> {
        ArtifactPath::new(path).map(Self::new)
    }

    /// Replace the build options.
    #[must_use]
    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    /// The validated artifact path.
    pub fn artifact(&self) -> &ArtifactPath {
        &self.artifact
    }

    /// The build options.
    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// The path the bundle will be written to.
    pub fn output_path(&self) -> PathBuf {
        self.options.output.clone().unwrap_or_else(|| {
            Path::new(DEFAULT_OUTPUT_DIR)
                .join(self.artifact.stem())
                .with_extension(OUTPUT_EXTENSION)
        })
    }
}
