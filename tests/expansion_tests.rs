//! Template Expansion Tests
//!
//! Tests for:
//! - Determinism: identical (template, parameters) -> byte-identical output
//! - Built-in templates expanding for both backends
//! - Static loop unrolling driven by compile-time integers
//! - Clip-mode equivalence at zero active planes
//! - Missing-parameter and malformed-directive failure modes

use proptest::prelude::*;

use voxtrace::features::MAX_CLIP_PLANES;
use voxtrace::{
    ClipMode, ParamValue, ParameterSet, VolumeFeatures, VolumeProgramOptions, VoxError,
    builtin_registry, expand,
};

fn volume_options(num_steps: u32, num_clip_planes: u32, clip_mode: ClipMode) -> ParameterSet {
    VolumeProgramOptions {
        features: VolumeFeatures::TEXTURE_3D,
        num_steps,
        num_clip_planes,
        clip_mode,
    }
    .to_parameter_set()
}

#[test]
fn expansion_is_deterministic() {
    let registry = builtin_registry();
    let template = registry.get("glsl/volume3d.frag").unwrap();
    let params = volume_options(16, 2, ClipMode::Union);

    let first = expand(&registry, template, &params).unwrap();
    let second = expand(&registry, template, &params).unwrap();
    assert_eq!(first.as_str(), second.as_str());
}

#[test]
fn builtin_templates_expand_for_both_backends() {
    let registry = builtin_registry();
    let params = volume_options(8, 1, ClipMode::Intersection);

    for key in [
        "glsl/proxy.vert",
        "glsl/volume3d.frag",
        "glsl/slice2d.frag",
        "arb/proxy.vp",
        "arb/volume3d.fp",
        "arb/slice2d.fp",
    ] {
        let template = registry.get(key).unwrap();
        let expanded = expand(&registry, template, &params)
            .unwrap_or_else(|e| panic!("{key} failed to expand: {e}"));
        assert!(
            !expanded.as_str().contains("{%") && !expanded.as_str().contains("{{"),
            "{key} left directives behind"
        );
    }
}

#[test]
fn include_chunks_are_spliced_into_fragments() {
    let registry = builtin_registry();
    let template = registry.get("glsl/slice2d.frag").unwrap();
    let params = volume_options(8, 0, ClipMode::Intersection);

    let expanded = expand(&registry, template, &params).unwrap();
    // The shared transfer chain comes from glsl/common.frag.
    assert!(expanded.as_str().contains("vox_classify"));
    assert!(!expanded.as_str().contains("#include"));
}

#[test]
fn loop_unrolling_is_fully_static() {
    let registry = builtin_registry();
    let template = registry.get("arb/volume3d.fp").unwrap();

    let expanded = expand(&registry, template, &volume_options(5, 0, ClipMode::Union)).unwrap();
    let steps = expanded.as_str().matches("%call arb/volume_step").count();
    assert_eq!(steps, 5);

    let expanded = expand(&registry, template, &volume_options(12, 0, ClipMode::Union)).unwrap();
    let steps = expanded.as_str().matches("%call arb/volume_step").count();
    assert_eq!(steps, 12);
}

#[test]
fn structured_loop_bound_is_baked_in() {
    let registry = builtin_registry();
    let template = registry.get("glsl/volume3d.frag").unwrap();
    let expanded = expand(&registry, template, &volume_options(24, 0, ClipMode::Union)).unwrap();
    assert!(expanded.as_str().contains("i < 24"));
}

#[test]
fn zero_planes_expansion_is_identical_across_clip_modes() {
    let registry = builtin_registry();

    for key in ["glsl/volume3d.frag", "arb/volume3d.fp"] {
        let template = registry.get(key).unwrap();
        let intersection = expand(
            &registry,
            template,
            &volume_options(16, 0, ClipMode::Intersection),
        )
        .unwrap();
        let union = expand(&registry, template, &volume_options(16, 0, ClipMode::Union)).unwrap();
        let complement = expand(
            &registry,
            template,
            &volume_options(16, 0, ClipMode::Complement),
        )
        .unwrap();

        assert_eq!(intersection.as_str(), union.as_str(), "{key}");
        assert_eq!(intersection.as_str(), complement.as_str(), "{key}");
    }
}

#[test]
fn clip_mode_changes_codegen_when_planes_are_active() {
    let registry = builtin_registry();
    let template = registry.get("glsl/volume3d.frag").unwrap();

    let intersection = expand(
        &registry,
        template,
        &volume_options(16, 2, ClipMode::Intersection),
    )
    .unwrap();
    let union = expand(&registry, template, &volume_options(16, 2, ClipMode::Union)).unwrap();
    assert_ne!(intersection.as_str(), union.as_str());
}

#[test]
fn missing_compile_time_parameter_is_a_hard_error() {
    let registry = builtin_registry();
    let template = registry.get("glsl/volume3d.frag").unwrap();

    let mut params = volume_options(16, 0, ClipMode::Intersection);
    // Rebuild without num_steps.
    let mut incomplete = ParameterSet::new();
    for (name, value) in params.compile_time() {
        if name != "num_steps" {
            incomplete.set_constant(name, value.clone());
        }
    }
    params = incomplete;

    let err = expand(&registry, template, &params).unwrap_err();
    match err {
        VoxError::MissingParameter { name, .. } => assert_eq!(name, "num_steps"),
        other => panic!("expected MissingParameter, got {other:?}"),
    }
}

#[test]
fn runtime_values_do_not_change_expansion() {
    let registry = builtin_registry();
    let template = registry.get("glsl/volume3d.frag").unwrap();

    let base = volume_options(16, 1, ClipMode::Intersection);
    let mut with_runtime = base.clone();
    with_runtime.set_runtime("clip_params", ParamValue::Vec4(glam::Vec4::splat(3.0)));

    let a = expand(&registry, template, &base).unwrap();
    let b = expand(&registry, template, &with_runtime).unwrap();
    assert_eq!(a.as_str(), b.as_str());
}

proptest! {
    #[test]
    fn expansion_determinism_over_the_parameter_space(
        num_steps in 1u32..48,
        num_clip_planes in 0u32..=MAX_CLIP_PLANES,
        mode_idx in 0usize..3,
        negative in proptest::bool::ANY,
        cubic in proptest::bool::ANY,
    ) {
        let mode = [ClipMode::Intersection, ClipMode::Union, ClipMode::Complement][mode_idx];
        let mut features = VolumeFeatures::TEXTURE_3D;
        features.set(VolumeFeatures::NEGATIVE_CMAP, negative);
        features.set(VolumeFeatures::CUBIC_INTERP, cubic);
        let params = VolumeProgramOptions {
            features,
            num_steps,
            num_clip_planes,
            clip_mode: mode,
        }
        .to_parameter_set();

        let registry = builtin_registry();
        for key in ["glsl/volume3d.frag", "arb/volume3d.fp"] {
            let template = registry.get(key).unwrap();
            let first = expand(&registry, template, &params).unwrap();
            let second = expand(&registry, template, &params).unwrap();
            prop_assert_eq!(first.as_str(), second.as_str());
        }
    }
}
