//! voxtrace: shader template compiler and volume ray-casting renderer core.
//!
//! A rendering request names a shader identity and a parameter set; the
//! [`cache::ProgramCache`] memoizes compiled programs by compile-time
//! fingerprint and, on a miss, drives the pipeline: template expansion
//! ([`template`]), logical-name resolution and code generation for one of
//! two back ends ([`backend`]), then the native driver's compile/link step
//! behind [`cache::NativeCompiler`]. The volumetric compositing algorithm
//! realized by the generated programs is specified once, in Rust, in
//! [`raycast`].

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod backend;
pub mod binding;
pub mod builtin;
pub mod cache;
pub mod errors;
pub mod features;
pub mod params;
pub mod raycast;
pub mod template;

pub use backend::{AssemblyBackend, AssemblyLimits, BackendKind, ShaderBackend, StructuredBackend};
pub use binding::{BindingDecl, BindingRole, BindingSlot, BindingTable, BindingType};
pub use builtin::{builtin_cache, builtin_descriptors, builtin_registry};
pub use cache::{
    CompiledProgram, DriverDiagnostic, MockCompiler, NativeCompiler, ProgramCache,
    ProgramDescriptor, ProgramHandle, StagePair,
};
pub use errors::{CompileStage, Result, VoxError};
pub use features::{VolumeFeatures, VolumeProgramOptions};
pub use params::{ParamDecl, ParamKind, ParamValue, ParameterSet};
pub use raycast::{
    ClipMode, ClipPlane, ColourMap, FragmentOutput, Interpolation, RayCaster, TransferFunction,
    VolumeTexture, VoxelTransform,
};
pub use template::{ExpandedSource, ShaderTemplate, TemplateRegistry, expand};
