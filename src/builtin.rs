//! Built-in Shader Set
//!
//! Registers the embedded template sources and describes the two shipped
//! program identities:
//!
//! | Identity   | What it renders                                |
//! |------------|------------------------------------------------|
//! | `volume3d` | 3D volume ray casting (front-to-back)          |
//! | `slice2d`  | 2D slice display through the same transfer     |
//!
//! Each identity is authored once per backend (a structured pair under
//! `glsl/`, an assembly pair under `arb/`) plus the shared chunks and
//! routines they pull in.

use std::sync::Arc;

use rust_embed::RustEmbed;

use crate::backend::{ShaderBackend, ShaderStage};
use crate::binding::{BindingDecl, BindingRole, BindingType};
use crate::cache::{NativeCompiler, ProgramCache, ProgramDescriptor, StagePair};
use crate::features::MAX_CLIP_PLANES;
use crate::params::{ParamDecl, ParamKind};
use crate::template::{ShaderTemplate, TemplateRegistry};

#[derive(RustEmbed)]
#[folder = "src/shaders"]
struct ShaderAssets;

fn embedded(path: &str) -> String {
    let file = ShaderAssets::get(path)
        .unwrap_or_else(|| panic!("embedded shader missing: {path}"));
    std::str::from_utf8(file.data.as_ref())
        .expect("embedded shader is not UTF-8")
        .to_string()
}

// ─── Declaration sets ────────────────────────────────────────────────────────

fn vertex_bindings() -> Vec<BindingDecl> {
    vec![
        BindingDecl::new("position", BindingRole::Attribute, BindingType::Vec4),
        BindingDecl::new("texcoord", BindingRole::Attribute, BindingType::Vec3),
        BindingDecl::new("frag_texcoord", BindingRole::Varying, BindingType::Vec3),
        BindingDecl::new("mvp", BindingRole::Uniform, BindingType::Mat4),
    ]
}

/// Bindings of the shared sampling/transfer chain.
fn transfer_bindings(volume_ty: BindingType) -> Vec<BindingDecl> {
    vec![
        BindingDecl::new("volume_texture", BindingRole::Texture, volume_ty),
        BindingDecl::new("cmap_texture", BindingRole::Texture, BindingType::Sampler1D),
        BindingDecl::new(
            "negative_cmap_texture",
            BindingRole::Texture,
            BindingType::Sampler1D,
        ),
        BindingDecl::new("voxel_xform", BindingRole::Uniform, BindingType::Vec4),
        BindingDecl::new("clip_params", BindingRole::Uniform, BindingType::Vec4),
        BindingDecl::new("cmap_params", BindingRole::Uniform, BindingType::Vec4),
        BindingDecl::new("texture_shape", BindingRole::Uniform, BindingType::Vec4),
    ]
}

fn clip_plane_bindings() -> Vec<BindingDecl> {
    (0..MAX_CLIP_PLANES)
        .map(|i| {
            BindingDecl::new(
                &format!("clip_plane{i}"),
                BindingRole::Uniform,
                BindingType::Vec4,
            )
        })
        .collect()
}

fn slice_params() -> Vec<ParamDecl> {
    vec![
        ParamDecl::compile_time("texture_is_3d", ParamKind::Boolean),
        ParamDecl::compile_time("use_negative_cmap", ParamKind::Boolean),
        ParamDecl::compile_time("cubic_interp", ParamKind::Boolean),
        ParamDecl::runtime("clip_params", ParamKind::Vector),
        ParamDecl::runtime("cmap_params", ParamKind::Vector),
        ParamDecl::runtime("voxel_xform", ParamKind::Vector),
    ]
}

fn volume_params() -> Vec<ParamDecl> {
    let mut params = slice_params();
    params.push(ParamDecl::compile_time("num_steps", ParamKind::Scalar));
    params.push(ParamDecl::compile_time("num_clip_planes", ParamKind::Scalar));
    params.push(ParamDecl::compile_time("clip_mode", ParamKind::Scalar));
    params.push(ParamDecl::runtime("step_vector", ParamKind::Vector));
    params.push(ParamDecl::runtime("ray_params", ParamKind::Vector));
    params.push(ParamDecl::runtime("depth_xform", ParamKind::Matrix));
    params
}

fn volume_fragment_bindings(volume_ty: BindingType) -> Vec<BindingDecl> {
    let mut bindings = vec![
        BindingDecl::new("frag_texcoord", BindingRole::Varying, BindingType::Vec3),
        BindingDecl::new("step_vector", BindingRole::Uniform, BindingType::Vec4),
        BindingDecl::new("ray_params", BindingRole::Uniform, BindingType::Vec4),
        BindingDecl::new("depth_xform", BindingRole::Uniform, BindingType::Mat4),
    ];
    bindings.extend(clip_plane_bindings());
    bindings.extend(transfer_bindings(volume_ty));
    bindings
}

fn slice_fragment_bindings(volume_ty: BindingType) -> Vec<BindingDecl> {
    let mut bindings = vec![BindingDecl::new(
        "frag_texcoord",
        BindingRole::Varying,
        BindingType::Vec3,
    )];
    bindings.extend(transfer_bindings(volume_ty));
    bindings
}

/// The assembly transfer routine also needs the reciprocal texture shape
/// (no division instruction on that target).
fn arb_transfer_bindings() -> Vec<BindingDecl> {
    let mut bindings = transfer_bindings(BindingType::Sampler3D);
    bindings.push(BindingDecl::new(
        "texture_shape_inv",
        BindingRole::Uniform,
        BindingType::Vec4,
    ));
    bindings
}

// ─── Registry & descriptors ──────────────────────────────────────────────────

/// Builds the registry of every built-in template, loaded once at startup.
#[must_use]
pub fn builtin_registry() -> TemplateRegistry {
    let mut registry = TemplateRegistry::new();

    // Structured stage templates.
    registry.register(ShaderTemplate::stage(
        "glsl/proxy.vert",
        ShaderStage::Vertex,
        &embedded("glsl/proxy.vert"),
        Vec::new(),
        vertex_bindings(),
    ));
    registry.register(ShaderTemplate::stage(
        "glsl/volume3d.frag",
        ShaderStage::Fragment,
        &embedded("glsl/volume3d.frag"),
        volume_params(),
        volume_fragment_bindings(BindingType::Sampler3D),
    ));
    registry.register(ShaderTemplate::stage(
        "glsl/slice2d.frag",
        ShaderStage::Fragment,
        &embedded("glsl/slice2d.frag"),
        slice_params(),
        slice_fragment_bindings(BindingType::Sampler2D),
    ));
    registry.register(ShaderTemplate::fragment(
        "glsl/common.frag",
        &embedded("glsl/common.frag"),
    ));

    // Assembly stage templates.
    registry.register(ShaderTemplate::stage(
        "arb/proxy.vp",
        ShaderStage::Vertex,
        &embedded("arb/proxy.vp"),
        Vec::new(),
        vertex_bindings(),
    ));
    registry.register(ShaderTemplate::stage(
        "arb/volume3d.fp",
        ShaderStage::Fragment,
        &embedded("arb/volume3d.fp"),
        volume_params(),
        vec![
            BindingDecl::new("frag_texcoord", BindingRole::Varying, BindingType::Vec3),
            BindingDecl::new("step_vector", BindingRole::Uniform, BindingType::Vec4),
            BindingDecl::new("ray_params", BindingRole::Uniform, BindingType::Vec4),
            BindingDecl::new("depth_xform", BindingRole::Uniform, BindingType::Mat4),
        ],
    ));
    registry.register(ShaderTemplate::stage(
        "arb/slice2d.fp",
        ShaderStage::Fragment,
        &embedded("arb/slice2d.fp"),
        slice_params(),
        vec![BindingDecl::new(
            "frag_texcoord",
            BindingRole::Varying,
            BindingType::Vec3,
        )],
    ));

    // Assembly routines, inlined per call site.
    registry.register(ShaderTemplate::fragment("arb/dither", &embedded("arb/dither")));
    registry.register(ShaderTemplate::fragment_with_bindings(
        "arb/shade_sample",
        &embedded("arb/shade_sample"),
        arb_transfer_bindings(),
    ));
    let mut step_bindings = clip_plane_bindings();
    step_bindings.push(BindingDecl::new(
        "ray_params",
        BindingRole::Uniform,
        BindingType::Vec4,
    ));
    registry.register(ShaderTemplate::fragment_with_bindings(
        "arb/volume_step",
        &embedded("arb/volume_step"),
        step_bindings,
    ));

    registry
}

/// Descriptors for the shipped shader identities.
#[must_use]
pub fn builtin_descriptors() -> Vec<ProgramDescriptor> {
    vec![
        ProgramDescriptor::new(
            "volume3d",
            StagePair::new("glsl/proxy.vert", "glsl/volume3d.frag"),
            StagePair::new("arb/proxy.vp", "arb/volume3d.fp"),
        ),
        ProgramDescriptor::new(
            "slice2d",
            StagePair::new("glsl/proxy.vert", "glsl/slice2d.frag"),
            StagePair::new("arb/proxy.vp", "arb/slice2d.fp"),
        ),
    ]
}

/// A ready-to-use cache over the built-in registry and identities.
#[must_use]
pub fn builtin_cache(
    backend: Box<dyn ShaderBackend>,
    compiler: Arc<dyn NativeCompiler>,
) -> ProgramCache {
    let registry = Arc::new(builtin_registry());
    let mut cache = ProgramCache::new(registry, backend, compiler);
    for descriptor in builtin_descriptors() {
        cache.register_program(descriptor);
    }
    cache
}
