//! Entropy bridge for the artifact's `env.extern_rng` import.
//!
//! The artifact asks its host to fill `len` bytes of its own linear memory at
//! `ptr` with secure random bytes and expects status `0` back. Bundles serve
//! this from `crypto.getRandomValues` inside the loader stub; this module is
//! the wasmtime-side equivalent for Rust embedders.
//!
//! The randomness source is injected as an [`EntropySource`] so tests can
//! substitute a deterministic or failing one. There is no fallback: if the
//! source fails, the call traps rather than handing the artifact predictable
//! bytes.

use std::fmt;
use std::sync::Arc;

use rand::RngCore;
use rand::rngs::OsRng;
use wasmtime::{Caller, Extern, Linker};

use crate::{RNG_IMPORT_MODULE, RNG_IMPORT_NAME};

/// Status returned to the artifact on success.
pub const RNG_OK: i32 = 0;

/// Failure while serving an entropy request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EntropyError {
    /// The secure random source could not produce bytes.
    #[error("secure random source unavailable: {0}")]
    Unavailable(String),

    /// The requested range lies outside the artifact's linear memory.
    #[error("entropy request [{ptr}, {ptr}+{len}) is outside linear memory of {memory_size} bytes")]
    OutOfBounds {
        /// Requested offset.
        ptr: u32,
        /// Requested length.
        len: u32,
        /// Size of linear memory at the time of the call.
        memory_size: usize,
    },

    /// The artifact does not export its linear memory as `memory`.
    #[error("artifact does not export `memory`")]
    NoMemory,
}

/// A source of cryptographically secure random bytes.
pub trait EntropySource: Send + Sync {
    /// Fill `buf` entirely with secure random bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EntropyError::Unavailable`] if the source cannot supply bytes.
    fn fill(&self, buf: &mut [u8]) -> Result<(), EntropyError>;
}

/// The operating system's secure random source.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) -> Result<(), EntropyError> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| EntropyError::Unavailable(e.to_string()))
    }
}

/// Serves `extern_rng` calls from an [`EntropySource`].
///
/// The bridge holds no per-call state; every call sees only the memory view
/// it is handed.
#[derive(Clone)]
pub struct EntropyBridge {
    source: Arc<dyn EntropySource>,
}

impl fmt::Debug for EntropyBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntropyBridge")
            .field("source", &"<dyn EntropySource>")
            .finish()
    }
}

impl Default for EntropyBridge {
    fn default() -> Self {
        Self::new(Arc::new(OsEntropy))
    }
}

impl EntropyBridge {
    /// Create a bridge over the given source.
    pub fn new(source: Arc<dyn EntropySource>) -> Self {
        Self { source }
    }

    /// Fill `memory[ptr..ptr + len]` with random bytes.
    ///
    /// `ptr` and `len` are the raw i32 arguments of the import and are read
    /// as unsigned wasm32 offsets, so the upper half of a 4 GiB memory is
    /// reachable.
    ///
    /// # Errors
    ///
    /// [`EntropyError::OutOfBounds`] if the range does not fit in `memory`,
    /// or the source's error if it cannot supply bytes.
    pub fn serve(&self, memory: &mut [u8], ptr: i32, len: i32) -> Result<i32, EntropyError> {
        let (ptr, len) = (ptr.cast_unsigned(), len.cast_unsigned());
        let memory_size = memory.len();
        let out_of_bounds = || EntropyError::OutOfBounds {
            ptr,
            len,
            memory_size,
        };

        let start = usize::try_from(ptr).map_err(|_| out_of_bounds())?;
        let len_bytes = usize::try_from(len).map_err(|_| out_of_bounds())?;
        let end = start.checked_add(len_bytes).ok_or_else(out_of_bounds)?;
        if end > memory_size {
            return Err(out_of_bounds());
        }

        self.source.fill(&mut memory[start..end])?;
        Ok(RNG_OK)
    }

    /// Define `env.extern_rng` on `linker`, served by this bridge.
    ///
    /// Any [`EntropyError`] is returned from the host function, which traps
    /// the artifact's current call.
    ///
    /// # Errors
    ///
    /// Returns an error if the linker already defines the import.
    pub fn register<T: 'static>(&self, linker: &mut Linker<T>) -> wasmtime::Result<()> {
        let bridge = self.clone();
        linker.func_wrap(
            RNG_IMPORT_MODULE,
            RNG_IMPORT_NAME,
            move |mut caller: Caller<'_, T>, ptr: i32, len: i32| -> wasmtime::Result<i32> {
                let memory = caller
                    .get_export("memory")
                    .and_then(Extern::into_memory)
                    .ok_or(EntropyError::NoMemory)?;
                let data = memory.data_mut(&mut caller);
                let status = bridge.serve(data, ptr, len).inspect_err(|e| {
                    tracing::error!(error = %e, "extern_rng failed");
                })?;
                Ok(status)
            },
        )?;
        Ok(())
    }
}
