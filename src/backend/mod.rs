//! Backend Strategy Interface
//!
//! Two structurally incompatible targets sit behind one contract: the
//! **structured** backend (a C-like shading language with branches, loops
//! and real declarations) and the **assembly** backend (flat, register-
//! indexed straight-line code). Shared logic never branches on backend
//! kind; only the program cache selects a strategy.

pub mod assembly;
pub mod structured;

pub use assembly::{AssemblyBackend, AssemblyLimits};
pub use structured::StructuredBackend;

use crate::binding::BindingTable;
use crate::errors::Result;
use crate::params::ParameterSet;
use crate::template::{ExpandedSource, ShaderTemplate, TemplateRegistry};

/// Which pipeline stage a template targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

/// The two code-generation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// C-like shading language with native control flow.
    Structured,
    /// Flat register-based program text with no control flow.
    Assembly,
}

/// One stage's template plus its expanded source, bundled for resolution.
#[derive(Debug, Clone, Copy)]
pub struct StageInput<'a> {
    pub template: &'a ShaderTemplate,
    pub expanded: &'a ExpandedSource,
}

/// Both stages after logical-name resolution, with the binding table that
/// records every assignment made.
#[derive(Debug, Clone)]
pub struct ResolvedProgram {
    pub vertex: String,
    pub fragment: String,
    pub bindings: BindingTable,
}

/// Final backend source, ready for the native compiler.
#[derive(Debug, Clone)]
pub struct FinalProgramSource {
    pub vertex: String,
    pub fragment: String,
}

/// A swappable code-generation strategy.
pub trait ShaderBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Maps logical names onto backend declarations, registers, and texture
    /// units for both stages. The registry is available for textual routine
    /// inlining on targets without real subroutines.
    fn resolve(
        &self,
        registry: &TemplateRegistry,
        vertex: StageInput<'_>,
        fragment: StageInput<'_>,
        params: &ParameterSet,
    ) -> Result<ResolvedProgram>;

    /// Emits final source from resolved source, performing any
    /// target-specific lowering and validation.
    fn generate(&self, resolved: ResolvedProgram) -> Result<(FinalProgramSource, BindingTable)>;
}
