//! Volume Shader Feature Flags
//!
//! A compact feature set describing which optional code paths a volume
//! program needs. Folded into a [`ParameterSet`] as compile-time constants
//! before expansion, so feature changes recompile and everything else stays
//! on the cached program.

use bitflags::bitflags;

use crate::params::{ParamValue, ParameterSet};
use crate::raycast::ClipMode;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct VolumeFeatures: u32 {
        /// Source texture is a 3D volume rather than a 2D slice.
        const TEXTURE_3D    = 1 << 0;
        /// A negative colour map is active below the zero point.
        const NEGATIVE_CMAP = 1 << 1;
        /// Cubic (spline) interpolation instead of the sampler's native filter.
        const CUBIC_INTERP  = 1 << 2;
    }
}

/// Everything that fixes the shape of a generated volume program.
///
/// Changing any field here produces a different compile-time fingerprint;
/// runtime values (thresholds, matrices, step vectors) live outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VolumeProgramOptions {
    pub features: VolumeFeatures,
    /// Ray-march iteration bound; statically unrolled on the assembly backend.
    pub num_steps: u32,
    /// Active clip planes, 0 to [`MAX_CLIP_PLANES`].
    pub num_clip_planes: u32,
    pub clip_mode: ClipMode,
}

/// Upper bound on simultaneously active clip planes.
pub const MAX_CLIP_PLANES: u32 = 5;

impl Default for VolumeProgramOptions {
    fn default() -> Self {
        Self {
            features: VolumeFeatures::TEXTURE_3D,
            num_steps: 16,
            num_clip_planes: 0,
            clip_mode: ClipMode::Intersection,
        }
    }
}

impl VolumeProgramOptions {
    /// Writes the compile-time constants this option set implies.
    ///
    /// The clip-plane count is clamped to [`MAX_CLIP_PLANES`]; there are only
    /// that many plane uniforms declared.
    pub fn apply_to(&self, params: &mut ParameterSet) {
        let planes = self.num_clip_planes.min(MAX_CLIP_PLANES);
        if planes < self.num_clip_planes {
            log::warn!(
                "clip plane count {} clamped to {MAX_CLIP_PLANES}",
                self.num_clip_planes
            );
        }

        params.set_constant("num_steps", ParamValue::Int(i64::from(self.num_steps)));
        params.set_constant("num_clip_planes", ParamValue::Int(i64::from(planes)));
        params.set_constant(
            "clip_mode",
            ParamValue::Str(self.clip_mode.as_str().to_string()),
        );
        params.set_constant(
            "texture_is_3d",
            ParamValue::Bool(self.features.contains(VolumeFeatures::TEXTURE_3D)),
        );
        params.set_constant(
            "use_negative_cmap",
            ParamValue::Bool(self.features.contains(VolumeFeatures::NEGATIVE_CMAP)),
        );
        params.set_constant(
            "cubic_interp",
            ParamValue::Bool(self.features.contains(VolumeFeatures::CUBIC_INTERP)),
        );
    }

    /// Convenience wrapper building a fresh parameter set.
    #[must_use]
    pub fn to_parameter_set(&self) -> ParameterSet {
        let mut params = ParameterSet::new();
        self.apply_to(&mut params);
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_bake_expected_constants() {
        let opts = VolumeProgramOptions {
            features: VolumeFeatures::TEXTURE_3D | VolumeFeatures::NEGATIVE_CMAP,
            num_steps: 32,
            num_clip_planes: 2,
            clip_mode: ClipMode::Union,
        };
        let params = opts.to_parameter_set();

        assert_eq!(params.get("num_steps"), Some(&ParamValue::Int(32)));
        assert_eq!(params.get("num_clip_planes"), Some(&ParamValue::Int(2)));
        assert_eq!(
            params.get("clip_mode"),
            Some(&ParamValue::Str("union".to_string()))
        );
        assert_eq!(params.get("use_negative_cmap"), Some(&ParamValue::Bool(true)));
        assert_eq!(params.get("cubic_interp"), Some(&ParamValue::Bool(false)));
    }

    #[test]
    fn plane_count_clamps_to_declared_uniforms() {
        let opts = VolumeProgramOptions {
            num_clip_planes: 9,
            ..VolumeProgramOptions::default()
        };
        let params = opts.to_parameter_set();
        assert_eq!(
            params.get("num_clip_planes"),
            Some(&ParamValue::Int(i64::from(MAX_CLIP_PLANES)))
        );
    }
}
