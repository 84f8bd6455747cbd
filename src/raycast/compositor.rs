//! Ray-Casting Compositor
//!
//! The front-to-back volumetric compositing algorithm, expressed once as
//! the reference semantics for both shader backends. Conceptually this
//! runs once per covered screen fragment; fragments are independent, so
//! the whole function is pure.
//!
//! Traversal is fixed-iteration with per-iteration skip: the step count is
//! a compile-time parameter on the GPU side, and skipped samples (clipped,
//! missing, out of range) contribute nothing rather than ending the ray.
//! Breaking out early at opacity saturation is a pure optimization: every
//! post-saturation step is defined to contribute nothing.

use glam::{Mat4, Vec3};

use super::{
    ALPHA_SATURATION, ClipMode, ClipPlane, Interpolation, TransferFunction, VolumeTexture,
};

/// Per-ray accumulation state. Created at the start of traversal,
/// discarded at the end; never persisted.
#[derive(Debug, Clone, Copy)]
pub struct RayState {
    /// Premultiplied accumulated colour.
    pub colour: Vec3,
    /// Accumulated opacity, non-decreasing, in [0, 1].
    pub opacity: f32,
    /// Depth of the first contributing sample, once one exists.
    pub depth: Option<f32>,
}

impl RayState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            colour: Vec3::ZERO,
            opacity: 0.0,
            depth: None,
        }
    }
}

impl Default for RayState {
    fn default() -> Self {
        Self::new()
    }
}

/// What a contributing fragment writes back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentOutput {
    /// Premultiplied RGB plus accumulated opacity.
    pub colour: glam::Vec4,
    /// Screen-space depth in [0, 1].
    pub depth: f32,
}

/// Deterministic per-fragment dither in [0, 1).
///
/// A hash of the integer fragment coordinate, not randomness: the same
/// fragment always gets the same phase offset, which is what removes the
/// wood-grain banding of fixed-phase sampling without making output
/// nondeterministic.
#[must_use]
pub fn dither_hash(x: u32, y: u32) -> f32 {
    let mut h = x.wrapping_mul(0x9E37_79B9) ^ y.wrapping_mul(0x85EB_CA6B);
    h ^= h >> 16;
    h = h.wrapping_mul(0x7FEB_352D);
    h ^= h >> 15;
    h = h.wrapping_mul(0x846C_A68B);
    h ^= h >> 16;
    (h & 0x00FF_FFFF) as f32 / 16_777_216.0
}

/// One fragment's ray march through a volume.
#[derive(Debug, Clone, Copy)]
pub struct RayCaster<'a> {
    pub volume: &'a VolumeTexture,
    pub transfer: &'a TransferFunction,
    pub interpolation: Interpolation,
    pub clip_planes: &'a [ClipPlane],
    pub clip_mode: ClipMode,
    /// Texture-space advance per step.
    pub step: Vec3,
    /// Iteration bound; the compile-time unroll count on the assembly side.
    pub num_steps: u32,
    /// Global opacity blend factor.
    pub blend_factor: f32,
    /// Scales the dither offset; 1.0 gives the full one-step jitter.
    pub dither_scale: f32,
    /// Texture space to clip space, for first-hit depth recovery.
    pub depth_xform: Mat4,
}

impl RayCaster<'_> {
    /// Casts the ray for the fragment at `frag`, starting at `start` in
    /// texture space.
    ///
    /// Returns `None` when no sample contributed; the fragment must be
    /// discarded, which is distinct from compositing a fully transparent
    /// black pixel.
    #[must_use]
    pub fn cast(&self, frag: (u32, u32), start: Vec3) -> Option<FragmentOutput> {
        let dither = dither_hash(frag.0, frag.1) * self.dither_scale;
        let mut pos = start + self.step * dither;
        let mut state = RayState::new();

        for _ in 0..self.num_steps {
            if state.opacity >= ALPHA_SATURATION {
                break;
            }
            if !VolumeTexture::contains(pos) {
                break;
            }
            self.composite_sample(&mut state, pos);
            pos += self.step;
        }

        let depth = state.depth?;
        Some(FragmentOutput {
            colour: state.colour.extend(state.opacity),
            depth,
        })
    }

    /// Evaluates one sample and folds it into the accumulation state.
    fn composite_sample(&self, state: &mut RayState, pos: Vec3) {
        if self.clipped(pos) {
            return;
        }

        let raw = self.volume.sample(pos, self.interpolation);
        // NaN and threshold-clipped samples are rejected inside the
        // transfer function, before any compositing arithmetic.
        let Some(colour) = self.transfer.shade(raw) else {
            return;
        };

        let sample_alpha = 1.0 - (1.0 - raw.clamp(0.0, 1.0)).powf(self.blend_factor);
        let weight = (1.0 - state.opacity) * sample_alpha;
        state.colour += colour * weight;
        state.opacity += (1.0 - state.opacity) * sample_alpha;

        if state.depth.is_none() {
            state.depth = Some(self.project_depth(pos));
        }
    }

    /// Clip-plane membership for one sample position.
    fn clipped(&self, pos: Vec3) -> bool {
        let active = self.clip_planes.len() as u32;
        let clipped = self
            .clip_planes
            .iter()
            .filter(|plane| plane.clips(pos))
            .count() as u32;
        self.clip_mode.skips(clipped, active)
    }

    /// Projects a texture-space position to a [0, 1] window depth.
    fn project_depth(&self, pos: Vec3) -> f32 {
        let clip = self.depth_xform * pos.extend(1.0);
        let ndc_z = if clip.w.abs() < f32::EPSILON {
            clip.z
        } else {
            clip.z / clip.w
        };
        (ndc_z * 0.5 + 0.5).clamp(0.0, 1.0)
    }
}

/// Shades a single sample for the 2D slice path.
///
/// Shares the transfer chain with the 3D path, which is what keeps slice
/// and volume output consistent for the same data. `None` means discard.
#[must_use]
pub fn shade_slice(
    volume: &VolumeTexture,
    transfer: &TransferFunction,
    interpolation: Interpolation,
    pos: Vec3,
) -> Option<glam::Vec4> {
    if !VolumeTexture::contains(pos) {
        return None;
    }
    let raw = volume.sample(pos, interpolation);
    transfer.shade(raw).map(|rgb| rgb.extend(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caster<'a>(
        volume: &'a VolumeTexture,
        transfer: &'a TransferFunction,
        planes: &'a [ClipPlane],
    ) -> RayCaster<'a> {
        RayCaster {
            volume,
            transfer,
            interpolation: Interpolation::Nearest,
            clip_planes: planes,
            clip_mode: ClipMode::Intersection,
            step: Vec3::new(0.0, 0.0, 0.05),
            num_steps: 32,
            blend_factor: 2.0,
            dither_scale: 0.0,
            depth_xform: Mat4::IDENTITY,
        }
    }

    #[test]
    fn dither_is_deterministic_and_bounded() {
        for (x, y) in [(0, 0), (1, 0), (511, 640), (1920, 1080)] {
            let a = dither_hash(x, y);
            let b = dither_hash(x, y);
            assert_eq!(a, b);
            assert!((0.0..1.0).contains(&a), "dither {a} out of range");
        }
        assert_ne!(dither_hash(10, 20), dither_hash(11, 20));
    }

    #[test]
    fn empty_volume_yields_no_contribution() {
        // All-NaN data: every sample is rejected before compositing.
        let volume = VolumeTexture::filled([4, 4, 4], f32::NAN);
        let transfer = TransferFunction::default();
        let caster = caster(&volume, &transfer, &[]);
        assert_eq!(caster.cast((0, 0), Vec3::new(0.5, 0.5, 0.0)), None);
    }

    #[test]
    fn contributing_ray_reports_first_hit_depth() {
        let volume = VolumeTexture::filled([4, 4, 4], 0.8);
        let transfer = TransferFunction::default();
        let caster = caster(&volume, &transfer, &[]);
        let out = caster.cast((3, 7), Vec3::new(0.5, 0.5, 0.0)).unwrap();
        assert!(out.colour.w > 0.0);
        // First sample sits at z=0 -> ndc depth 0.5 under the identity transform.
        assert!((out.depth - 0.5).abs() < 1e-5);
    }

    #[test]
    fn opacity_is_monotone_and_bounded() {
        let volume = VolumeTexture::filled([4, 4, 4], 0.6);
        let transfer = TransferFunction::default();
        let caster = caster(&volume, &transfer, &[]);

        let mut state = RayState::new();
        let mut previous = 0.0;
        let mut pos = Vec3::new(0.5, 0.5, 0.0);
        for _ in 0..64 {
            caster.composite_sample(&mut state, pos);
            assert!(state.opacity >= previous);
            assert!((0.0..=1.0).contains(&state.opacity));
            previous = state.opacity;
            pos += caster.step;
        }
    }

    #[test]
    fn slice_shading_discards_outside_the_texture() {
        let volume = VolumeTexture::filled([4, 4, 1], 0.5);
        let transfer = TransferFunction::default();
        assert!(
            shade_slice(
                &volume,
                &transfer,
                Interpolation::Nearest,
                Vec3::new(0.5, 0.5, 0.0)
            )
            .is_some()
        );
        assert_eq!(
            shade_slice(
                &volume,
                &transfer,
                Interpolation::Nearest,
                Vec3::new(1.5, 0.5, 0.0)
            ),
            None
        );
    }
}
