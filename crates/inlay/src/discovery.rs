//! Export discovery.
//!
//! The artifact's export table is only known once it is instantiated, so
//! discovery compiles the bytes, instantiates them in a throwaway store with a
//! no-op stand-in for the randomness import, and reads the export names back
//! in the order the instance reports them. The store and instance are dropped
//! before [`discover`] returns; nothing from them is reused.

use serde::Serialize;
use wasmtime::{Engine, ExternType, FuncType, Linker, Module, Store, ValType};

use crate::{RNG_IMPORT_MODULE, RNG_IMPORT_NAME};

/// Failure to discover an artifact's exports.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    /// The bytes are not a valid WebAssembly binary.
    #[error("failed to compile artifact: {0}")]
    Compile(String),

    /// The artifact requires an import other than `env.extern_rng(i32, i32) -> i32`.
    #[error("unsupported import {module}::{name}: {reason}")]
    UnsupportedImport {
        /// Import module name.
        module: String,
        /// Import field name.
        name: String,
        /// Why the import cannot be satisfied.
        reason: String,
    },

    /// Instantiation failed (start function trapped, linking failed, ...).
    #[error("failed to instantiate artifact: {0}")]
    Instantiate(String),

    /// The discovery task did not run to completion.
    #[error("discovery task aborted: {0}")]
    Aborted(String),
}

/// What kind of item an export is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    /// A function.
    Func,
    /// A linear memory.
    Memory,
    /// A global.
    Global,
    /// A table.
    Table,
    /// Anything else (tags, future extern kinds).
    Other,
}

impl From<&ExternType> for ExportKind {
    fn from(ty: &ExternType) -> Self {
        match ty {
            ExternType::Func(_) => Self::Func,
            ExternType::Memory(_) => Self::Memory,
            ExternType::Global(_) => Self::Global,
            ExternType::Table(_) => Self::Table,
            #[allow(unreachable_patterns)]
            _ => Self::Other,
        }
    }
}

/// A single discovered export.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Export {
    /// Export name, exactly as spelled in the artifact.
    pub name: String,
    /// Export kind.
    pub kind: ExportKind,
}

/// The artifact's exports, in the artifact's own order.
///
/// Names are distinct: a valid module cannot export the same name twice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSet {
    exports: Vec<Export>,
}

impl ExportSet {
    /// Build a set from exports already in discovery order.
    pub fn from_exports(exports: Vec<Export>) -> Self {
        Self { exports }
    }

    /// Export names, in order.
    pub fn names(&self) -> impl ExactSizeIterator<Item = &str> {
        self.exports.iter().map(|e| e.name.as_str())
    }

    /// The exports, in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Export> {
        self.exports.iter()
    }

    /// Whether an export with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.exports.iter().any(|e| e.name == name)
    }

    /// Number of exports.
    pub fn len(&self) -> usize {
        self.exports.len()
    }

    /// Whether the artifact exports nothing.
    pub fn is_empty(&self) -> bool {
        self.exports.is_empty()
    }
}

impl<'a> IntoIterator for &'a ExportSet {
    type Item = &'a Export;
    type IntoIter = std::slice::Iter<'a, Export>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Discover the export table of an artifact.
///
/// # Errors
///
/// Returns a [`DiscoveryError`] if the bytes do not compile, if the artifact
/// imports anything besides the randomness callback, or if instantiation
/// fails. There is no partial result.
pub fn discover(wasm_bytes: &[u8]) -> Result<ExportSet, DiscoveryError> {
    let engine = Engine::default();
    let module = Module::from_binary(&engine, wasm_bytes)
        .map_err(|e| DiscoveryError::Compile(format!("{e:#}")))?;

    check_imports(&module)?;

    let mut linker: Linker<()> = Linker::new(&engine);
    linker
        .func_wrap(RNG_IMPORT_MODULE, RNG_IMPORT_NAME, |_ptr: i32, _len: i32| -> i32 {
            0
        })
        .map_err(|e| DiscoveryError::Instantiate(format!("{e:#}")))?;

    let mut store = Store::new(&engine, ());
    let instance = linker
        .instantiate(&mut store, &module)
        .map_err(|e| DiscoveryError::Instantiate(format!("{e:#}")))?;

    let exports: Vec<Export> = instance
        .exports(&mut store)
        .map(|export| {
            let name = export.name().to_owned();
            let kind = module
                .get_export(&name)
                .map_or(ExportKind::Other, |ty| ExportKind::from(&ty));
            Export { name, kind }
        })
        .collect();

    for export in &exports {
        tracing::debug!(name = %export.name, kind = ?export.kind, "Discovered export");
    }
    tracing::info!(count = exports.len(), "Discovered artifact exports");

    Ok(ExportSet::from_exports(exports))
}

/// Reject every import except `env.extern_rng(i32, i32) -> i32`.
fn check_imports(module: &Module) -> Result<(), DiscoveryError> {
    for import in module.imports() {
        let unsupported = |reason: &str| DiscoveryError::UnsupportedImport {
            module: import.module().to_owned(),
            name: import.name().to_owned(),
            reason: reason.to_owned(),
        };

        if import.module() != RNG_IMPORT_MODULE || import.name() != RNG_IMPORT_NAME {
            return Err(unsupported(&format!(
                "only {RNG_IMPORT_MODULE}::{RNG_IMPORT_NAME} can be satisfied"
            )));
        }

        match import.ty() {
            ExternType::Func(ty) if is_rng_signature(&ty) => {}
            ExternType::Func(_) => {
                return Err(unsupported("expected signature (i32, i32) -> i32"));
            }
            _ => return Err(unsupported("must be a function")),
        }
    }
    Ok(())
}

fn is_rng_signature(ty: &FuncType) -> bool {
    let params: Vec<ValType> = ty.params().collect();
    let results: Vec<ValType> = ty.results().collect();
    params.len() == 2
        && params.iter().all(|p| matches!(p, ValType::I32))
        && results.len() == 1
        && results.iter().all(|r| matches!(r, ValType::I32))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn wasm(wat: &str) -> Vec<u8> {
        wat::parse_str(wat).unwrap()
    }

    #[test]
    fn test_discovers_exports_in_declaration_order() {
        let bytes = wasm(
            r#"
            (module
                (import "env" "extern_rng" (func (param i32 i32) (result i32)))
                (memory (export "memory") 1)
                (func (export "olm_account_new") (result i32) i32.const 0)
                (func (export "alloc") (param i32 i32) (result i32) i32.const 0)
                (global (export "__heap_base") i32 (i32.const 1024))
                (func (export "dealloc") (param i32 i32 i32))
            )
            "#,
        );
        let exports = discover(&bytes).unwrap();
        assert_eq!(
            exports.names().collect::<Vec<_>>(),
            ["memory", "olm_account_new", "alloc", "__heap_base", "dealloc"]
        );
        let kinds: Vec<_> = exports.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            [
                ExportKind::Memory,
                ExportKind::Func,
                ExportKind::Func,
                ExportKind::Global,
                ExportKind::Func
            ]
        );
    }

    #[test]
    fn test_no_exports() {
        let exports = discover(&wasm("(module)")).unwrap();
        assert!(exports.is_empty());
    }

    #[test]
    fn test_start_function_calling_rng_is_stubbed() {
        let bytes = wasm(
            r#"
            (module
                (import "env" "extern_rng" (func $rng (param i32 i32) (result i32)))
                (memory 1)
                (func $init
                    (if (call $rng (i32.const 0) (i32.const 32))
                        (then unreachable)))
                (start $init)
                (func (export "ready") (result i32) i32.const 1)
            )
            "#,
        );
        let exports = discover(&bytes).unwrap();
        assert_eq!(exports.names().collect::<Vec<_>>(), ["ready"]);
    }

    #[test]
    fn test_reject_truncated_binary() {
        let bytes = wasm(r#"(module (func (export "encrypt")))"#);
        let err = discover(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, DiscoveryError::Compile(_)));
    }

    #[test]
    fn test_reject_wat_text() {
        let err = discover(b"(module)").unwrap_err();
        assert!(matches!(err, DiscoveryError::Compile(_)));
    }

    #[test]
    fn test_reject_unknown_import() {
        let bytes = wasm(
            r#"
            (module
                (import "env" "extern_rng" (func (param i32 i32) (result i32)))
                (import "wasi_snapshot_preview1" "fd_write"
                    (func (param i32 i32 i32 i32) (result i32)))
            )
            "#,
        );
        let err = discover(&bytes).unwrap_err();
        match err {
            DiscoveryError::UnsupportedImport { module, name, .. } => {
                assert_eq!(module, "wasi_snapshot_preview1");
                assert_eq!(name, "fd_write");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_reject_wrong_rng_signature() {
        let bytes = wasm(
            r#"(module (import "env" "extern_rng" (func (param i64 i64) (result i32))))"#,
        );
        let err = discover(&bytes).unwrap_err();
        assert!(matches!(err, DiscoveryError::UnsupportedImport { .. }));
        assert!(err.to_string().contains("(i32, i32) -> i32"));
    }

    #[test]
    fn test_reject_memory_import() {
        let bytes = wasm(r#"(module (import "env" "extern_rng" (memory 1)))"#);
        let err = discover(&bytes).unwrap_err();
        assert!(err.to_string().contains("must be a function"));
    }

    #[test]
    fn test_start_trap_is_instantiate_error() {
        let bytes = wasm(
            r#"
            (module
                (func $boom unreachable)
                (start $boom)
            )
            "#,
        );
        let err = discover(&bytes).unwrap_err();
        assert!(matches!(err, DiscoveryError::Instantiate(_)));
    }
}
