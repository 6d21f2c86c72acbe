//! Integration tests for the bundle build pipeline.
//!
//! Each test writes a small artifact assembled from WAT into a scratch
//! directory and runs the full pipeline against it.
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::path::{Path, PathBuf};

use inlay::{
    BuildConfig, BuildOptions, Bundler, ConfigError, DiscoveryError, Error, InlineError,
    LoaderStub, extract_payload,
};

const CRYPTO_ARTIFACT: &str = r#"
    (module
        (import "env" "extern_rng" (func $rng (param i32 i32) (result i32)))
        (func (export "encrypt") (param i32 i32) (result i32)
            (call $rng (local.get 0) (local.get 1)))
        (func (export "decrypt") (param i32 i32) (result i32)
            i32.const 0)
    )
"#;

/// Write `wat` as a binary artifact into `dir` and return its absolute path.
fn write_artifact(dir: &Path, name: &str, wat: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, wat::parse_str(wat).unwrap()).unwrap();
    path
}

fn config(artifact: &Path, output: &Path) -> BuildConfig {
    BuildConfig::from_path(Some(artifact))
        .unwrap()
        .with_options(BuildOptions {
            output: Some(output.to_path_buf()),
            ..BuildOptions::default()
        })
}

/// Names a bundle exports, in source order.
fn exported_names(source: &str) -> Vec<String> {
    let mut names = Vec::new();
    for line in source.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("export const ") {
            names.push(rest.split(" =").next().unwrap().to_owned());
        } else if let Some(rest) = line.strip_prefix("export { ") {
            let inner = rest.trim_end_matches("};").trim();
            let exported = inner.rsplit(" as ").next().unwrap();
            names.push(exported.trim_matches('"').to_owned());
        }
    }
    names
}

#[tokio::test]
async fn test_end_to_end_encrypt_decrypt() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(dir.path(), "vodozemac.wasm", CRYPTO_ARTIFACT);
    let output = dir.path().join("dist").join("vodozemac.mjs");

    let (bundle, written) = Bundler::new(config(&artifact, &output))
        .build_to_file()
        .await
        .unwrap();

    assert_eq!(written, output);
    let source = std::fs::read_to_string(&output).unwrap();
    assert_eq!(source, bundle.source());

    assert_eq!(
        bundle.exports().names().collect::<Vec<_>>(),
        ["encrypt", "decrypt"]
    );
    assert_eq!(exported_names(&source), ["instance", "encrypt", "decrypt"]);

    // The path has been replaced and nothing refers to an external file.
    let artifact_str = artifact.to_str().unwrap();
    let artifact_literal = serde_json::to_string(artifact_str).unwrap();
    assert!(!source.contains(artifact_str));
    assert!(!source.contains(&artifact_literal));
    assert!(!source.contains(".wasm"));
    assert!(!source.contains("import "));
    assert!(!source.contains(inlay::PATH_PLACEHOLDER));

    // The entropy bridge ships in the bundle.
    assert!(source.contains("extern_rng"));
    assert!(source.contains("crypto.getRandomValues"));
}

#[tokio::test]
async fn test_artifact_without_exports() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(dir.path(), "empty.wasm", "(module)");

    let bundle = Bundler::new(BuildConfig::from_path(Some(&artifact)).unwrap())
        .build()
        .await
        .unwrap();

    assert!(bundle.exports().is_empty());
    assert_eq!(exported_names(bundle.source()), ["instance"]);
}

#[tokio::test]
async fn test_export_order_follows_artifact_and_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(
        dir.path(),
        "ordered.wasm",
        r#"
        (module
            (import "env" "extern_rng" (func (param i32 i32) (result i32)))
            (memory (export "memory") 1)
            (func (export "zeta"))
            (func (export "alpha"))
            (func (export "megolm-session"))
            (global (export "beta") i32 (i32.const 0))
        )
        "#,
    );

    let bundler = Bundler::new(BuildConfig::from_path(Some(&artifact)).unwrap());
    let first = bundler.build().await.unwrap();
    let second = bundler.build().await.unwrap();

    let expected = ["memory", "zeta", "alpha", "megolm-session", "beta"];
    assert_eq!(first.exports().names().collect::<Vec<_>>(), expected);
    assert_eq!(
        exported_names(first.source())[1..],
        expected.map(String::from)
    );
    assert_eq!(first.source(), second.source());
}

#[test]
fn test_invalid_paths_fail_before_building() {
    assert_eq!(
        BuildConfig::from_path(None::<&str>).unwrap_err(),
        ConfigError::Missing
    );
    assert_eq!(
        BuildConfig::from_path(Some("")).unwrap_err(),
        ConfigError::Missing
    );
    assert!(matches!(
        BuildConfig::from_path(Some("vodozemac.wasm")).unwrap_err(),
        ConfigError::NotAbsolute(_)
    ));
}

#[tokio::test]
async fn test_truncated_artifact_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("truncated.wasm");
    let bytes = wat::parse_str(CRYPTO_ARTIFACT).unwrap();
    std::fs::write(&artifact, &bytes[..bytes.len() / 2]).unwrap();
    let output = dir.path().join("dist").join("truncated.mjs");

    let err = Bundler::new(config(&artifact, &output))
        .build_to_file()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Discovery(DiscoveryError::Compile(_))));
    assert!(!output.exists());
    assert!(!output.parent().unwrap().exists());
}

#[tokio::test]
async fn test_unsupported_import_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(
        dir.path(),
        "wasi.wasm",
        r#"
        (module
            (import "wasi_snapshot_preview1" "random_get"
                (func (param i32 i32) (result i32)))
        )
        "#,
    );
    let output = dir.path().join("wasi.mjs");

    let err = Bundler::new(config(&artifact, &output))
        .build_to_file()
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Discovery(DiscoveryError::UnsupportedImport { .. })
    ));
    assert!(!output.exists());
}

#[tokio::test]
async fn test_missing_artifact_file() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = dir.path().join("absent.wasm");

    let err = Bundler::new(BuildConfig::from_path(Some(&artifact)).unwrap())
        .build()
        .await
        .unwrap_err();

    match err {
        Error::Io { path, .. } => assert_eq!(path, artifact),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_size_limit_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(dir.path(), "big.wasm", CRYPTO_ARTIFACT);
    let output = dir.path().join("big.mjs");
    let size = std::fs::metadata(&artifact).unwrap().len();

    let config = config(&artifact, &output);
    let options = BuildOptions {
        max_embed_size: Some(size - 1),
        ..config.options().clone()
    };
    let err = Bundler::new(config.with_options(options))
        .build_to_file()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Inline(InlineError::TooLarge { .. })));
    assert!(!output.exists());
}

#[tokio::test]
async fn test_payload_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(dir.path(), "vodozemac.wasm", CRYPTO_ARTIFACT);
    let output = dir.path().join("vodozemac.mjs");
    let original = std::fs::read(&artifact).unwrap();

    let (bundle, _) = Bundler::new(config(&artifact, &output))
        .build_to_file()
        .await
        .unwrap();

    assert_eq!(bundle.payload().unwrap(), original);
    let written = std::fs::read_to_string(&output).unwrap();
    assert_eq!(extract_payload(&written).unwrap(), original);
    assert_eq!(bundle.payload_size(), original.len());
}

#[tokio::test]
async fn test_manifest_is_written() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(dir.path(), "vodozemac.wasm", CRYPTO_ARTIFACT);
    let output = dir.path().join("vodozemac.mjs");
    let manifest = dir.path().join("vodozemac.manifest.json");

    let config = BuildConfig::from_path(Some(&artifact))
        .unwrap()
        .with_options(BuildOptions {
            output: Some(output.clone()),
            manifest: Some(manifest.clone()),
            ..BuildOptions::default()
        });
    let (bundle, _) = Bundler::new(config).build_to_file().await.unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&manifest).unwrap()).unwrap();
    assert_eq!(value["exports"][0]["name"], "encrypt");
    assert_eq!(value["exports"][1]["name"], "decrypt");
    assert_eq!(value["payload_sha256"], bundle.payload_sha256());
}

#[tokio::test]
async fn test_unwritable_manifest_leaves_no_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(dir.path(), "vodozemac.wasm", CRYPTO_ARTIFACT);
    let output = dir.path().join("vodozemac.mjs");
    // A directory already sits where the manifest should go.
    let manifest = dir.path().join("manifest.json");
    std::fs::create_dir(&manifest).unwrap();

    let config = BuildConfig::from_path(Some(&artifact))
        .unwrap()
        .with_options(BuildOptions {
            output: Some(output.clone()),
            manifest: Some(manifest.clone()),
            ..BuildOptions::default()
        });
    let err = Bundler::new(config).build_to_file().await.unwrap_err();

    match err {
        Error::Io { path, .. } => assert_eq!(path, manifest),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!output.exists());
    assert!(manifest.is_dir());
}

#[tokio::test]
async fn test_remove_outputs_deletes_bundle_and_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(dir.path(), "vodozemac.wasm", CRYPTO_ARTIFACT);
    let output = dir.path().join("vodozemac.mjs");
    let manifest = dir.path().join("vodozemac.manifest.json");

    let bundler = Bundler::new(
        BuildConfig::from_path(Some(&artifact))
            .unwrap()
            .with_options(BuildOptions {
                output: Some(output.clone()),
                manifest: Some(manifest.clone()),
                ..BuildOptions::default()
            }),
    );
    let (_, written) = bundler.build_to_file().await.unwrap();
    assert!(written.exists() && manifest.exists());

    bundler.remove_outputs(&written).await.unwrap();
    assert!(!output.exists());
    assert!(!manifest.exists());

    // Already gone is not an error.
    bundler.remove_outputs(&written).await.unwrap();
}

#[tokio::test]
async fn test_unminified_output_keeps_stub_layout() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(dir.path(), "vodozemac.wasm", CRYPTO_ARTIFACT);

    let config = BuildConfig::from_path(Some(&artifact))
        .unwrap()
        .with_options(BuildOptions {
            minify: false,
            ..BuildOptions::default()
        });
    let bundle = Bundler::new(config).build().await.unwrap();

    assert!(bundle.source().starts_with("// Loader stub for inlay bundles."));
    assert!(bundle.source().contains("      return 0;"));
}

#[tokio::test]
async fn test_custom_stub() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(dir.path(), "vodozemac.wasm", CRYPTO_ARTIFACT);
    let stub = LoaderStub::from_source(
        "import load from 'artifact.wasm';\n\
         const { instance } = await load({ env: { extern_rng: () => 0 } });\n\
         export { instance };\n",
    );

    let bundle = Bundler::new(BuildConfig::from_path(Some(&artifact)).unwrap())
        .with_stub(stub)
        .build()
        .await
        .unwrap();

    assert!(
        bundle
            .source()
            .contains("const load = (imports) => WebAssembly.instantiate(")
    );
    assert_eq!(
        exported_names(bundle.source()),
        ["instance", "encrypt", "decrypt"]
    );
}

#[tokio::test]
async fn test_custom_stub_without_placeholder() {
    let dir = tempfile::tempdir().unwrap();
    let artifact = write_artifact(dir.path(), "vodozemac.wasm", CRYPTO_ARTIFACT);
    let stub_path = dir.path().join("stub.mjs");
    std::fs::write(&stub_path, "export const nothing = 1;\n").unwrap();

    let config = BuildConfig::from_path(Some(&artifact))
        .unwrap()
        .with_options(BuildOptions {
            stub: Some(stub_path),
            ..BuildOptions::default()
        });
    let err = Bundler::new(config).build().await.unwrap_err();

    assert!(matches!(err, Error::Inline(InlineError::MissingImport(_))));
}
