//! The build pipeline.
//!
//! Stages run strictly in sequence, each consuming the complete output of the
//! previous one. The bundle is only written once every stage has succeeded,
//! and it is written through a temp file in the target directory, so a failed
//! build never leaves partial output behind.

use std::io::Write as _;
use std::path::{Path, PathBuf};

use crate::bundle::Bundle;
use crate::config::BuildConfig;
use crate::discovery::{DiscoveryError, discover};
use crate::error::Error;
use crate::inline::inline;
use crate::minify::minify;
use crate::stub::LoaderStub;
use crate::synth::append_exports;

/// Builds a bundle from a [`BuildConfig`].
#[derive(Debug, Clone)]
pub struct Bundler {
    config: BuildConfig,
    stub: Option<LoaderStub>,
}

impl Bundler {
    /// Create a bundler for `config`.
    pub fn new(config: BuildConfig) -> Self {
        Self { config, stub: None }
    }

    /// Use `stub` instead of the built-in or configured stub template.
    #[must_use]
    pub fn with_stub(mut self, stub: LoaderStub) -> Self {
        self.stub = Some(stub);
        self
    }

    /// The configuration this bundler builds.
    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Run every stage and return the bundle without writing it.
    ///
    /// # Errors
    ///
    /// Returns the first stage error; later stages do not run.
    pub async fn build(&self) -> Result<Bundle, Error> {
        let artifact = self.config.artifact();
        let options = self.config.options();

        let stub = match (&self.stub, &options.stub) {
            (Some(stub), _) => stub.clone(),
            (None, Some(path)) => LoaderStub::from_file(path).await?,
            (None, None) => LoaderStub::default(),
        };
        let resolved = stub.resolve(artifact);

        let wasm_bytes = tokio::fs::read(artifact.as_path())
            .await
            .map_err(|e| Error::io(artifact.as_path(), e))?;
        tracing::info!(
            path = %artifact.as_str(),
            bytes = wasm_bytes.len(),
            "Read artifact"
        );

        let (wasm_bytes, discovered) = tokio::task::spawn_blocking(move || {
            let exports = discover(&wasm_bytes);
            (wasm_bytes, exports)
        })
        .await
        .map_err(|e| DiscoveryError::Aborted(e.to_string()))?;
        let exports = discovered?;

        let source = append_exports(resolved.source(), &exports)?;
        let source = inline(&source, artifact, &wasm_bytes, options.max_embed_size)?;
        let source = if options.minify {
            minify(&source)
        } else {
            source
        };

        Ok(Bundle::new(source, exports, &wasm_bytes))
    }

    /// Build the bundle and write it (and the manifest, if configured).
    ///
    /// Returns the bundle and the path it was written to.
    ///
    /// # Errors
    ///
    /// Returns the first stage error, or [`Error::Io`] if writing fails. No
    /// output file exists after a failed build: if the manifest cannot be
    /// written, the bundle written before it is removed again.
    pub async fn build_to_file(&self) -> Result<(Bundle, PathBuf), Error> {
        let bundle = self.build().await?;
        let output = self.config.output_path();

        let manifest = match &self.config.options().manifest {
            Some(path) => Some((path, bundle.manifest(&output).to_json()?)),
            None => None,
        };

        write_atomically(&output, bundle.source().as_bytes().to_vec()).await?;
        tracing::info!(
            output = %output.display(),
            bytes = bundle.source().len(),
            exports = bundle.exports().len(),
            "Wrote bundle"
        );

        if let Some((manifest_path, json)) = manifest {
            if let Err(e) = write_atomically(manifest_path, json.into_bytes()).await {
                tracing::error!(error = %e, "Failed to write build manifest");
                if let Err(cleanup) = remove_if_exists(&output).await {
                    tracing::warn!(error = %cleanup, "Failed to remove partial output");
                }
                return Err(e);
            }
            tracing::debug!(path = %manifest_path.display(), "Wrote build manifest");
        }

        Ok((bundle, output))
    }

    /// Remove the bundle at `output` and the configured manifest, if present.
    ///
    /// Files that do not exist are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] for the first file that exists but cannot be
    /// removed. Removal of the remaining files is still attempted.
    pub async fn remove_outputs(&self, output: &Path) -> Result<(), Error> {
        let manifest = self.config.options().manifest.as_deref();
        let mut first_error = None;

        for path in std::iter::once(output).chain(manifest) {
            if let Err(e) = remove_if_exists(path).await {
                tracing::warn!(error = %e, "Failed to remove output");
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), Error> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed output");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Write `contents` to `path` via a temp file in the same directory.
async fn write_atomically(path: &Path, contents: Vec<u8>) -> Result<(), Error> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| Error::io(&dir, e))?;

    let target = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let mut file = tempfile::NamedTempFile::new_in(&dir).map_err(|e| Error::io(&dir, e))?;
        file.write_all(&contents)
            .map_err(|e| Error::io(file.path(), e))?;
        file.persist(&target)
            .map_err(|e| Error::io(&target, e.error))?;
        Ok::<(), Error>(())
    })
    .await
    .map_err(|e| Error::io(path, std::io::Error::other(e)))?
}
