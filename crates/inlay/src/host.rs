//! Running an artifact from Rust with the entropy bridge wired in.
//!
//! This is the wasmtime counterpart of the loader stub: it instantiates the
//! artifact once with `env.extern_rng` served by an [`EntropyBridge`] and
//! exposes the resulting instance's exports.

use wasmtime::{Engine, Instance, Linker, Module, Store, TypedFunc, WasmParams, WasmResults};

use crate::entropy::EntropyBridge;
use crate::error::Error;

/// A live artifact instance.
pub struct ArtifactHost {
    store: Store<()>,
    instance: Instance,
}

impl std::fmt::Debug for ArtifactHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactHost")
            .field("store", &"<wasmtime::Store>")
            .field("instance", &self.instance)
            .finish()
    }
}

impl ArtifactHost {
    /// Compile and instantiate an artifact, serving its randomness import
    /// from `bridge`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Runtime`] if the artifact does not compile or link,
    /// or if its start function traps.
    pub fn instantiate(wasm_bytes: &[u8], bridge: &EntropyBridge) -> Result<Self, Error> {
        let engine = Engine::default();
        let module = Module::from_binary(&engine, wasm_bytes)
            .map_err(|e| Error::Runtime(format!("failed to compile artifact: {e:#}")))?;

        let mut linker: Linker<()> = Linker::new(&engine);
        bridge
            .register(&mut linker)
            .map_err(|e| Error::Runtime(format!("failed to register entropy bridge: {e:#}")))?;

        let mut store = Store::new(&engine, ());
        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| Error::Runtime(format!("failed to instantiate artifact: {e:#}")))?;

        tracing::debug!("Artifact instantiated with entropy bridge");
        Ok(Self { store, instance })
    }

    /// Names of the instance's exports, in order.
    pub fn export_names(&mut self) -> Vec<String> {
        self.instance
            .exports(&mut self.store)
            .map(|e| e.name().to_owned())
            .collect()
    }

    /// Look up a typed exported function.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Runtime`] if the export is missing or has a different
    /// signature.
    pub fn typed_func<P, R>(&mut self, name: &str) -> Result<TypedFunc<P, R>, Error>
    where
        P: WasmParams,
        R: WasmResults,
    {
        self.instance
            .get_typed_func::<P, R>(&mut self.store, name)
            .map_err(|e| Error::Runtime(format!("export {name:?}: {e:#}")))
    }

    /// Call an exported function.
    ///
    /// A trap inside the artifact, including a failed entropy request, is
    /// returned as [`Error::Runtime`].
    ///
    /// # Errors
    ///
    /// See [`typed_func`](Self::typed_func); also fails if the call traps.
    pub fn call<P, R>(&mut self, name: &str, params: P) -> Result<R, Error>
    where
        P: WasmParams,
        R: WasmResults,
    {
        let func = self.typed_func::<P, R>(name)?;
        func.call(&mut self.store, params)
            .map_err(|e| Error::Runtime(format!("call to {name:?} failed: {e:?}")))
    }

    /// The artifact's exported linear memory, if it has one.
    pub fn memory(&mut self) -> Option<&[u8]> {
        let memory = self.instance.get_memory(&mut self.store, "memory")?;
        Some(memory.data(&self.store))
    }
}
