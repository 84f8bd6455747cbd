//! Error Types
//!
//! This module defines the error types used throughout the crate.
//!
//! # Overview
//!
//! The main error type [`VoxError`] covers all failure modes including:
//! - Template expansion failures (includes, parameters, directives)
//! - Assembly code-generation failures (register pressure, program size)
//! - Native driver compile/link rejections
//!
//! # Usage
//!
//! All public APIs return [`Result<T>`] which is an alias for
//! `std::result::Result<T, VoxError>`.

use thiserror::Error;

/// The pipeline stage a native-driver diagnostic originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileStage {
    /// Vertex program compilation.
    Vertex,
    /// Fragment program compilation.
    Fragment,
    /// Program link step.
    Link,
}

impl std::fmt::Display for CompileStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Vertex => write!(f, "vertex"),
            Self::Fragment => write!(f, "fragment"),
            Self::Link => write!(f, "link"),
        }
    }
}

/// The main error type for the voxtrace pipeline.
///
/// Each variant carries enough context to surface a useful diagnostic
/// without the caller re-deriving which stage failed.
#[derive(Error, Debug)]
pub enum VoxError {
    // ========================================================================
    // Template Expansion Errors
    // ========================================================================
    /// A template key was not found in the registry.
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// An `#include` directive referenced a fragment that is not registered.
    #[error("Unresolved include \"{include}\" in template \"{template}\"")]
    UnresolvedInclude {
        /// Template containing the directive
        template: String,
        /// The missing fragment key
        include: String,
    },

    /// Include resolution re-entered a fragment already on the include stack.
    #[error("Circular include detected: {chain}")]
    CircularInclude {
        /// The include chain, outermost first (e.g. `a -> b -> a`)
        chain: String,
    },

    /// A compile-time parameter the template declares was not supplied.
    #[error("Missing compile-time parameter \"{name}\" for template \"{template}\"")]
    MissingParameter {
        /// Template being expanded
        template: String,
        /// Name of the absent parameter
        name: String,
    },

    /// A template control block failed to parse or evaluate.
    #[error("Malformed directive in template \"{template}\": {message}")]
    MalformedDirective {
        /// Template being expanded
        template: String,
        /// Engine-provided detail
        message: String,
    },

    // ========================================================================
    // Code Generation Errors
    // ========================================================================
    /// A hardware register file overflowed during assignment.
    #[error("Register file exhausted: {file} (limit {limit})")]
    RegisterExhausted {
        /// Which register file overflowed (`constant`, `temporary`, `texcoord`, ...)
        file: &'static str,
        /// The configured hardware limit
        limit: u32,
    },

    /// The generated assembly exceeds the hardware instruction ceiling.
    #[error("Generated program too large: {count} instructions (limit {limit})")]
    ProgramTooLarge {
        /// Instructions the program would need
        count: usize,
        /// The configured ceiling
        limit: usize,
    },

    /// A logical name survived resolution without a declaration.
    #[error("Unresolved symbol \"{name}\" in generated source")]
    UnresolvedSymbol {
        /// The marker name left behind
        name: String,
    },

    // ========================================================================
    // Native Compilation Errors
    // ========================================================================
    /// The native driver rejected the generated source.
    ///
    /// Never retried with altered parameters; surfaced to the caller as-is.
    #[error("Driver compile error at {stage} stage: {message}")]
    CompileError {
        /// Pipeline stage the driver reported the failure for
        stage: CompileStage,
        /// The driver's diagnostic log
        message: String,
        /// The generated source that was rejected, when available
        source_text: Option<String>,
    },
}

/// Alias for `Result<T, VoxError>`.
pub type Result<T> = std::result::Result<T, VoxError>;
