//! Program Cache
//!
//! Central owner of all compiled shader programs. Drives the full pipeline
//! on a cache miss (expand, resolve, generate, native compile/link) and
//! memoizes the result by `(identity, compile-time fingerprint, backend)`.
//!
//! # Concurrency
//!
//! Cache hits take a read lock only, so concurrent hits never block each
//! other. Misses serialize through a compile mutex (driver contexts are
//! single-threaded-bound) with a double-check after acquisition, so a key
//! is compiled at most once. There is no cancellation and no retry: a
//! failed compile is reported to the caller and any previously cached
//! program for the identity stays untouched.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;

use crate::backend::{BackendKind, FinalProgramSource, ShaderBackend, StageInput};
use crate::binding::BindingTable;
use crate::errors::{CompileStage, Result, VoxError};
use crate::params::ParameterSet;
use crate::template::{TemplateRegistry, expand};

/// Registry keys of one backend's vertex/fragment template pair.
#[derive(Debug, Clone)]
pub struct StagePair {
    pub vertex_key: String,
    pub fragment_key: String,
}

impl StagePair {
    #[must_use]
    pub fn new(vertex_key: &str, fragment_key: &str) -> Self {
        Self {
            vertex_key: vertex_key.to_string(),
            fragment_key: fragment_key.to_string(),
        }
    }
}

/// Names the stage templates behind one shader identity, per backend.
///
/// Each backend authors its own stage templates (the targets are
/// structurally incompatible), so an identity maps to two pairs; the cache
/// picks the pair matching its backend strategy.
#[derive(Debug, Clone)]
pub struct ProgramDescriptor {
    /// Identity string, e.g. `volume3d`.
    pub identity: String,
    pub structured: StagePair,
    pub assembly: StagePair,
}

impl ProgramDescriptor {
    #[must_use]
    pub fn new(identity: &str, structured: StagePair, assembly: StagePair) -> Self {
        Self {
            identity: identity.to_string(),
            structured,
            assembly,
        }
    }

    #[must_use]
    pub fn stage_keys(&self, backend: BackendKind) -> &StagePair {
        match backend {
            BackendKind::Structured => &self.structured,
            BackendKind::Assembly => &self.assembly,
        }
    }
}

/// Opaque driver-allocated program object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u64);

/// A compiled program plus everything a draw call needs to feed it.
#[derive(Debug)]
pub struct CompiledProgram {
    pub handle: ProgramHandle,
    pub bindings: BindingTable,
    pub backend: BackendKind,
    /// Compile-time parameter fingerprint this program was built for.
    pub fingerprint: u128,
    /// Final generated source, kept for diagnostics.
    pub source: FinalProgramSource,
}

/// A native-driver diagnostic from a rejected compile or link.
#[derive(Debug, Clone)]
pub struct DriverDiagnostic {
    pub stage: CompileStage,
    pub log: String,
}

/// The native graphics driver's compile/link entry point.
///
/// The crate itself never talks to a driver; embedders implement this over
/// their context, and tests use [`MockCompiler`].
pub trait NativeCompiler: Send + Sync {
    fn compile_link(
        &self,
        source: &FinalProgramSource,
        backend: BackendKind,
    ) -> std::result::Result<ProgramHandle, DriverDiagnostic>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProgramKey {
    identity: String,
    fingerprint: u128,
    backend: BackendKind,
}

/// Compiled-program store, keyed by identity and compile-time fingerprint.
pub struct ProgramCache {
    registry: Arc<TemplateRegistry>,
    backend: Box<dyn ShaderBackend>,
    compiler: Arc<dyn NativeCompiler>,
    descriptors: FxHashMap<String, ProgramDescriptor>,
    programs: RwLock<FxHashMap<ProgramKey, Arc<CompiledProgram>>>,
    compile_lock: Mutex<()>,
    compile_count: AtomicU64,
}

impl ProgramCache {
    #[must_use]
    pub fn new(
        registry: Arc<TemplateRegistry>,
        backend: Box<dyn ShaderBackend>,
        compiler: Arc<dyn NativeCompiler>,
    ) -> Self {
        Self {
            registry,
            backend,
            compiler,
            descriptors: FxHashMap::default(),
            programs: RwLock::new(FxHashMap::default()),
            compile_lock: Mutex::new(()),
            compile_count: AtomicU64::new(0),
        }
    }

    /// Registers a shader identity. Startup-time only, like the template
    /// registry itself.
    pub fn register_program(&mut self, descriptor: ProgramDescriptor) {
        self.descriptors
            .insert(descriptor.identity.clone(), descriptor);
    }

    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Returns the cached program for `(identity, params)`, compiling it on
    /// first request.
    ///
    /// Re-requesting an equal key is guaranteed not to recompile; the same
    /// `Arc` comes back. Errors propagate unchanged: never swallowed, never
    /// retried with altered parameters.
    pub fn get_or_compile(
        &self,
        identity: &str,
        params: &ParameterSet,
    ) -> Result<Arc<CompiledProgram>> {
        let descriptor = self
            .descriptors
            .get(identity)
            .ok_or_else(|| VoxError::TemplateNotFound(identity.to_string()))?;

        let key = ProgramKey {
            identity: identity.to_string(),
            fingerprint: params.fingerprint(),
            backend: self.backend.kind(),
        };

        if let Some(program) = self.programs.read().get(&key) {
            return Ok(Arc::clone(program));
        }

        let _guard = self.compile_lock.lock();
        // Another thread may have compiled this key while we waited.
        if let Some(program) = self.programs.read().get(&key) {
            return Ok(Arc::clone(program));
        }

        log::debug!(
            "compiling {identity} ({:?}, fingerprint {:032x})",
            key.backend,
            key.fingerprint
        );

        let stages = descriptor.stage_keys(key.backend);
        let vertex_tpl = self.registry.get(&stages.vertex_key)?;
        let fragment_tpl = self.registry.get(&stages.fragment_key)?;
        let vertex_exp = expand(&self.registry, vertex_tpl, params)?;
        let fragment_exp = expand(&self.registry, fragment_tpl, params)?;

        let resolved = self.backend.resolve(
            &self.registry,
            StageInput {
                template: vertex_tpl,
                expanded: &vertex_exp,
            },
            StageInput {
                template: fragment_tpl,
                expanded: &fragment_exp,
            },
            params,
        )?;
        let (source, bindings) = self.backend.generate(resolved)?;

        self.compile_count.fetch_add(1, Ordering::Relaxed);
        let handle = self
            .compiler
            .compile_link(&source, key.backend)
            .map_err(|diag| {
                log::debug!(
                    "driver rejected {identity} at {} stage:\n{}",
                    diag.stage,
                    diag.log
                );
                let rejected = match diag.stage {
                    CompileStage::Vertex => Some(source.vertex.clone()),
                    CompileStage::Fragment => Some(source.fragment.clone()),
                    CompileStage::Link => None,
                };
                VoxError::CompileError {
                    stage: diag.stage,
                    message: diag.log,
                    source_text: rejected,
                }
            })?;

        let program = Arc::new(CompiledProgram {
            handle,
            bindings,
            backend: key.backend,
            fingerprint: key.fingerprint,
            source,
        });
        self.programs
            .write()
            .insert(key, Arc::clone(&program));
        Ok(program)
    }

    /// Number of cached programs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.programs.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.programs.read().is_empty()
    }

    /// How many times the full pipeline ran (cache misses reaching the
    /// native compiler).
    #[must_use]
    pub fn compile_count(&self) -> u64 {
        self.compile_count.load(Ordering::Relaxed)
    }
}

// ─── Mock Compiler ───────────────────────────────────────────────────────────

/// A counting stand-in for the native driver.
///
/// Hands out sequential handles and records every invocation; tests assert
/// on [`MockCompiler::calls`] to prove cache hits bypass the driver.
#[derive(Debug, Default)]
pub struct MockCompiler {
    calls: AtomicU64,
    fail: AtomicBool,
}

impl MockCompiler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total `compile_link` invocations.
    #[must_use]
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Makes every subsequent compile fail with a canned diagnostic.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }
}

impl NativeCompiler for MockCompiler {
    fn compile_link(
        &self,
        _source: &FinalProgramSource,
        _backend: BackendKind,
    ) -> std::result::Result<ProgramHandle, DriverDiagnostic> {
        let call = self.calls.fetch_add(1, Ordering::Relaxed);
        if self.fail.load(Ordering::Relaxed) {
            return Err(DriverDiagnostic {
                stage: CompileStage::Link,
                log: "mock driver: compilation disabled".to_string(),
            });
        }
        Ok(ProgramHandle(call + 1))
    }
}
