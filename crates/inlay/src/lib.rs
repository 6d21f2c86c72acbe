//! # Inlay
//!
//! Bundle a precompiled WebAssembly module into a single self-contained ES
//! module that hosts can `import` without a separate binary-loading step.
//!
//! The build pipeline runs these stages in order:
//!
//! - **Path resolution** - validate the absolute artifact path and splice it
//!   into the loader stub ([`ArtifactPath`], [`LoaderStub::resolve`])
//! - **Export discovery** - instantiate the artifact in a throwaway store and
//!   read back its export table ([`discover`])
//! - **Export synthesis** - append one forwarding export per discovered name
//!   ([`synthesize`])
//! - **Inlining** - embed the payload as base64 and replace the file import
//!   with an inline loader ([`inline()`])
//! - **Size reduction** - strip comments and indentation ([`minify()`])
//!
//! The artifact's single import, `env.extern_rng`, is served at load time by
//! the entropy bridge. The JS form ships inside the loader stub; the Rust form
//! ([`EntropyBridge`]) lets wasmtime embedders run the same artifact through
//! [`ArtifactHost`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use inlay::{BuildConfig, Bundler};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), inlay::Error> {
//!     let config = BuildConfig::from_path(Some("/opt/artifacts/vodozemac.wasm"))?;
//!     let bundle = Bundler::new(config).build().await?;
//!
//!     println!("exports: {:?}", bundle.exports().names().collect::<Vec<_>>());
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

mod bundle;
mod config;
pub mod discovery;
pub mod entropy;
mod error;
mod host;
pub mod inline;
pub mod minify;
mod pipeline;
mod stub;
pub mod synth;

pub use bundle::{BuildManifest, Bundle};
pub use config::{ArtifactPath, BuildConfig, BuildOptions, ConfigError};
pub use discovery::{DiscoveryError, Export, ExportKind, ExportSet, discover};
pub use entropy::{EntropyBridge, EntropyError, EntropySource, OsEntropy};
pub use error::Error;
pub use host::ArtifactHost;
pub use inline::{InlineError, extract_payload, inline};
pub use minify::minify;
pub use pipeline::Bundler;
pub use stub::{LoaderStub, PATH_PLACEHOLDER};
pub use synth::{SynthesisError, synthesize};

/// Import module the artifact's randomness callback lives in.
pub const RNG_IMPORT_MODULE: &str = "env";

/// Name of the artifact's randomness callback.
pub const RNG_IMPORT_NAME: &str = "extern_rng";
