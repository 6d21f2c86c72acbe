//! CLI tool for bundling WebAssembly artifacts.
//!
//! Turns a precompiled `.wasm` artifact into a single ES module with the
//! payload embedded inline, the randomness import wired to
//! `crypto.getRandomValues`, and every artifact export re-exported by name.
//!
//! # Examples
//!
//! ```bash
//! # Bundle into dist/vodozemac.mjs
//! inlay --config-wasm /build/vodozemac.wasm
//!
//! # Explicit output, unminified, with a build manifest
//! inlay --config-wasm /build/vodozemac.wasm -o web/vodozemac.mjs --no-minify \
//!   --manifest web/vodozemac.json
//!
//! # Path from the environment, custom loader stub
//! INLAY_CONFIG_WASM=/build/vodozemac.wasm inlay --stub ./loader.mjs
//! ```

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use inlay::{ArtifactHost, BuildConfig, BuildOptions, Bundle, Bundler, EntropyBridge};

/// Bundle a WebAssembly artifact into a self-contained ES module.
#[derive(Parser, Debug)]
#[command(name = "inlay")]
#[command(version, about, long_about = None)]
struct Args {
    /// Absolute path to the .wasm artifact
    #[arg(long, env = "INLAY_CONFIG_WASM", value_name = "FILE")]
    config_wasm: Option<PathBuf>,

    /// Output path (default: dist/<artifact stem>.mjs)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Custom loader stub template
    ///
    /// The stub must import the artifact from the 'artifact.wasm' placeholder
    /// (single quotes included) and may wire `env.extern_rng` however it likes.
    #[arg(long, value_name = "FILE")]
    stub: Option<PathBuf>,

    /// Refuse to embed artifacts larger than this many bytes
    #[arg(long, value_name = "BYTES")]
    max_size: Option<u64>,

    /// Skip the size reduction pass
    #[arg(long)]
    no_minify: bool,

    /// Write a JSON build manifest to this path
    #[arg(long, value_name = "FILE")]
    manifest: Option<PathBuf>,

    /// Skip verification step
    #[arg(long)]
    no_verify: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up tracing
    let filter = if args.verbose {
        "inlay=debug,inlay_cli=debug"
    } else {
        "inlay=warn,inlay_cli=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = BuildConfig::from_path(args.config_wasm.as_deref())
        .context("Invalid configuration")?
        .with_options(BuildOptions {
            output: args.output,
            stub: args.stub,
            max_embed_size: args.max_size,
            minify: !args.no_minify,
            manifest: args.manifest,
        });
    let output = config.output_path();

    println!("inlay");
    println!("=====");
    println!();
    println!("Artifact: {}", config.artifact().as_path().display());
    println!("Output:   {}", output.display());
    if let Some(ref stub) = config.options().stub {
        println!("Stub:     {}", stub.display());
    }
    if let Some(limit) = config.options().max_embed_size {
        println!("Limit:    {limit} bytes");
    }

    println!();
    println!("Step 1: Discovering exports and building bundle...");
    let start = Instant::now();
    let bundler = Bundler::new(config.clone());
    let (bundle, output) = bundler
        .build_to_file()
        .await
        .context("Failed to build bundle")?;
    println!(
        "  Done in {:?} ({} exports, {} byte payload, {} byte bundle)",
        start.elapsed(),
        bundle.exports().len(),
        bundle.payload_size(),
        bundle.source().len()
    );
    for export in bundle.exports() {
        tracing::info!(name = %export.name, kind = ?export.kind, "export");
    }
    println!("  Payload sha256: {}", bundle.payload_sha256());
    println!("  Saved to: {}", output.display());

    if !args.no_verify {
        println!();
        println!("Step 2: Verifying...");
        if let Err(e) = verify_bundle(&bundle, &output, config.artifact().as_path()) {
            // Leave nothing behind that failed verification.
            bundler
                .remove_outputs(&output)
                .await
                .with_context(|| format!("Failed to remove unverified bundle ({e:#})"))?;
            return Err(e);
        }
        println!("  Verification passed!");
    }

    println!();
    println!("Success!");
    Ok(())
}

/// Check that the written bundle carries the artifact intact and that the
/// embedded payload runs with the entropy bridge wired in.
fn verify_bundle(bundle: &Bundle, output: &Path, artifact: &Path) -> Result<()> {
    let written = std::fs::read_to_string(output)
        .with_context(|| format!("Failed to read back bundle: {}", output.display()))?;
    let payload = inlay::extract_payload(&written).context("Failed to extract payload")?;

    let original = std::fs::read(artifact)
        .with_context(|| format!("Failed to re-read artifact: {}", artifact.display()))?;
    if payload != original {
        anyhow::bail!(
            "Verification failed: embedded payload ({} bytes) differs from artifact ({} bytes)",
            payload.len(),
            original.len()
        );
    }

    let exports = inlay::discover(&payload).context("Failed to re-discover exports")?;
    if &exports != bundle.exports() {
        anyhow::bail!("Verification failed: export table changed between discovery runs");
    }

    let mut host = ArtifactHost::instantiate(&payload, &EntropyBridge::default())
        .context("Failed to instantiate payload with entropy bridge")?;
    let names = host.export_names();
    if !names.iter().map(String::as_str).eq(bundle.exports().names()) {
        anyhow::bail!(
            "Verification failed: live exports [{}] differ from bundled exports",
            names.join(", ")
        );
    }

    Ok(())
}
