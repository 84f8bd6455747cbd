//! Volume Ray-Casting Model
//!
//! The data types the compositor consumes: clip planes and combine modes,
//! the intensity transfer function (value-range transform, threshold
//! clipping, primary/negative colour maps), and a CPU-side volume texture.
//!
//! The compositing algorithm itself lives in [`compositor`]; it is the
//! reference semantics that both shipped shader backends realize.

pub mod compositor;

pub use compositor::{FragmentOutput, RayCaster, RayState, dither_hash, shade_slice};

use glam::{Vec3, Vec4};
use smallvec::SmallVec;

/// Accumulated opacity at which a ray stops marching.
pub const ALPHA_SATURATION: f32 = 0.95;

/// How multiple clip planes combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClipMode {
    /// Skip a sample only when *all* planes clip it.
    #[default]
    Intersection,
    /// Skip a sample when *any* plane clips it.
    Union,
    /// Skip a sample when *no* plane clips it.
    Complement,
}

impl ClipMode {
    /// Compile-time parameter spelling.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Intersection => "intersection",
            Self::Union => "union",
            Self::Complement => "complement",
        }
    }

    /// Whether a sample with `clipped` of `active` planes clipping it is
    /// skipped. With zero active planes no sample is ever skipped,
    /// whichever mode is configured.
    #[must_use]
    pub fn skips(self, clipped: u32, active: u32) -> bool {
        if active == 0 {
            return false;
        }
        match self {
            Self::Intersection => clipped == active,
            Self::Union => clipped > 0,
            Self::Complement => clipped == 0,
        }
    }
}

/// A half-space test in texture space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipPlane {
    pub normal: Vec3,
    pub offset: f32,
}

impl ClipPlane {
    #[must_use]
    pub fn new(normal: Vec3, offset: f32) -> Self {
        Self { normal, offset }
    }

    /// Plane equation as the vec4 uniform the shaders consume.
    #[must_use]
    pub fn as_vec4(&self) -> Vec4 {
        self.normal.extend(self.offset)
    }

    /// A sample is on the clipped side when the signed distance is negative.
    #[must_use]
    pub fn clips(&self, pos: Vec3) -> bool {
        self.normal.dot(pos) + self.offset < 0.0
    }
}

/// A conveniently sized clip-plane list (rarely more than a handful active).
pub type ClipPlanes = SmallVec<[ClipPlane; 8]>;

/// Scale+offset mapping texture-normalized intensities back to data units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoxelTransform {
    pub scale: f32,
    pub offset: f32,
}

impl Default for VoxelTransform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: 0.0,
        }
    }
}

impl VoxelTransform {
    #[must_use]
    pub fn apply(&self, normalized: f32) -> f32 {
        normalized * self.scale + self.offset
    }
}

/// An RGBA lookup table with linear interpolation between equally spaced
/// stops, the CPU mirror of a 1D colour-map texture.
#[derive(Debug, Clone, PartialEq)]
pub struct ColourMap {
    stops: Vec<Vec4>,
}

impl ColourMap {
    /// Requires at least two stops.
    #[must_use]
    pub fn new(stops: Vec<Vec4>) -> Self {
        assert!(stops.len() >= 2, "colour map needs at least two stops");
        Self { stops }
    }

    /// Black-to-white ramp.
    #[must_use]
    pub fn grayscale() -> Self {
        Self::new(vec![Vec4::new(0.0, 0.0, 0.0, 1.0), Vec4::ONE])
    }

    /// Samples at `t` in [0, 1]; out-of-range values clamp to the ends.
    #[must_use]
    pub fn sample(&self, t: f32) -> Vec4 {
        let t = t.clamp(0.0, 1.0);
        let scaled = t * (self.stops.len() - 1) as f32;
        let idx = (scaled.floor() as usize).min(self.stops.len() - 2);
        let frac = scaled - idx as f32;
        self.stops[idx].lerp(self.stops[idx + 1], frac)
    }
}

/// The full intensity-to-colour transform of one displayed image.
#[derive(Debug, Clone)]
pub struct TransferFunction {
    /// Primary colour map.
    pub cmap: ColourMap,
    /// Colour map for intensities below the zero point, when active.
    pub negative_cmap: Option<ColourMap>,
    /// Zero point in data units. The boundary is inclusive on the primary
    /// side: an intensity exactly here uses the primary map.
    pub zero_point: f32,
    /// Display range in data units, normalizing intensities for map lookup.
    pub display_range: (f32, f32),
    /// Clipping thresholds in data units.
    pub clip_range: (f32, f32),
    /// Inverted sense: keep only intensities *outside* the clip range.
    pub invert_clip: bool,
    /// Texture-normalized to data-unit transform.
    pub voxel_xform: VoxelTransform,
}

impl Default for TransferFunction {
    fn default() -> Self {
        Self {
            cmap: ColourMap::grayscale(),
            negative_cmap: None,
            zero_point: 0.0,
            display_range: (0.0, 1.0),
            clip_range: (f32::NEG_INFINITY, f32::INFINITY),
            invert_clip: false,
            voxel_xform: VoxelTransform::default(),
        }
    }
}

impl TransferFunction {
    /// Maps a raw texture-normalized intensity to a display colour.
    ///
    /// `None` means the sample contributes nothing: not-a-number values
    /// (missing data) and intensities outside the clip thresholds are
    /// rejected here, before any accumulation arithmetic can see them.
    #[must_use]
    pub fn shade(&self, raw: f32) -> Option<Vec3> {
        if raw.is_nan() {
            return None;
        }
        let data = self.voxel_xform.apply(raw);

        let (lo, hi) = self.clip_range;
        let inside = data >= lo && data <= hi;
        if inside == self.invert_clip {
            return None;
        }

        let colour = match &self.negative_cmap {
            Some(negative) if data < self.zero_point => {
                // Mirror below-zero intensities around the zero point so
                // both maps consume the same display range.
                negative.sample(self.normalize(2.0 * self.zero_point - data))
            }
            _ => self.cmap.sample(self.normalize(data)),
        };
        Some(colour.truncate())
    }

    fn normalize(&self, data: f32) -> f32 {
        let (lo, hi) = self.display_range;
        if (hi - lo).abs() < f32::EPSILON {
            return 0.0;
        }
        (data - lo) / (hi - lo)
    }
}

/// How the volume is sampled between voxel centres.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Interpolation {
    #[default]
    Nearest,
    Linear,
}

/// A CPU-side voxel array addressed in normalized [0, 1] texture space.
///
/// Supplied by the external image-loading layer; missing data is encoded as
/// NaN voxels and handled by [`TransferFunction::shade`].
#[derive(Debug, Clone)]
pub struct VolumeTexture {
    dims: [usize; 3],
    data: Vec<f32>,
}

impl VolumeTexture {
    /// `data` is X-major, then Y, then Z; its length must be the product of
    /// `dims`.
    #[must_use]
    pub fn new(dims: [usize; 3], data: Vec<f32>) -> Self {
        assert_eq!(
            data.len(),
            dims[0] * dims[1] * dims[2],
            "voxel data length must match dimensions"
        );
        Self { dims, data }
    }

    /// A volume filled with one value.
    #[must_use]
    pub fn filled(dims: [usize; 3], value: f32) -> Self {
        Self::new(dims, vec![value; dims[0] * dims[1] * dims[2]])
    }

    #[must_use]
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Mutable voxel access for tests and procedural sources.
    pub fn voxel_mut(&mut self, x: usize, y: usize, z: usize) -> &mut f32 {
        let idx = (z * self.dims[1] + y) * self.dims[0] + x;
        &mut self.data[idx]
    }

    #[must_use]
    pub fn voxel(&self, x: usize, y: usize, z: usize) -> f32 {
        let idx = (z * self.dims[1] + y) * self.dims[0] + x;
        self.data[idx]
    }

    /// Whether `pos` is inside the unit texture cube.
    #[must_use]
    pub fn contains(pos: Vec3) -> bool {
        pos.cmpge(Vec3::ZERO).all() && pos.cmple(Vec3::ONE).all()
    }

    /// Samples at a normalized position. Callers are expected to bound the
    /// traversal with [`VolumeTexture::contains`]; coordinates are clamped
    /// to the edge texel like a clamp-to-edge sampler.
    #[must_use]
    pub fn sample(&self, pos: Vec3, interpolation: Interpolation) -> f32 {
        match interpolation {
            Interpolation::Nearest => self.sample_nearest(pos),
            Interpolation::Linear => self.sample_linear(pos),
        }
    }

    fn texel_index(&self, pos: Vec3) -> [usize; 3] {
        let mut idx = [0usize; 3];
        for (axis, slot) in idx.iter_mut().enumerate() {
            let extent = self.dims[axis];
            let coord = (pos[axis] * extent as f32).floor() as isize;
            *slot = coord.clamp(0, extent as isize - 1) as usize;
        }
        idx
    }

    fn sample_nearest(&self, pos: Vec3) -> f32 {
        let [x, y, z] = self.texel_index(pos);
        self.voxel(x, y, z)
    }

    fn sample_linear(&self, pos: Vec3) -> f32 {
        let mut base = [0usize; 3];
        let mut frac = [0.0f32; 3];
        for axis in 0..3 {
            let extent = self.dims[axis];
            let coord = pos[axis].clamp(0.0, 1.0) * extent as f32 - 0.5;
            let floor = coord.floor();
            base[axis] = (floor as isize).clamp(0, extent as isize - 1) as usize;
            frac[axis] = (coord - floor).clamp(0.0, 1.0);
        }
        let upper = |axis: usize| (base[axis] + 1).min(self.dims[axis] - 1);

        let mut value = 0.0;
        for corner in 0..8 {
            let (cx, cy, cz) = (corner & 1, (corner >> 1) & 1, (corner >> 2) & 1);
            let x = if cx == 0 { base[0] } else { upper(0) };
            let y = if cy == 0 { base[1] } else { upper(1) };
            let z = if cz == 0 { base[2] } else { upper(2) };
            let weight = (if cx == 0 { 1.0 - frac[0] } else { frac[0] })
                * (if cy == 0 { 1.0 - frac[1] } else { frac[1] })
                * (if cz == 0 { 1.0 - frac[2] } else { frac[2] });
            value += weight * self.voxel(x, y, z);
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_mode_combines_membership_counts() {
        assert!(ClipMode::Intersection.skips(3, 3));
        assert!(!ClipMode::Intersection.skips(2, 3));
        assert!(ClipMode::Union.skips(1, 3));
        assert!(!ClipMode::Union.skips(0, 3));
        assert!(ClipMode::Complement.skips(0, 3));
        assert!(!ClipMode::Complement.skips(1, 3));
    }

    #[test]
    fn zero_planes_never_skip_in_any_mode() {
        for mode in [ClipMode::Intersection, ClipMode::Union, ClipMode::Complement] {
            assert!(!mode.skips(0, 0), "{mode:?} skipped with zero planes");
        }
    }

    #[test]
    fn transfer_rejects_nan_before_any_arithmetic() {
        let tf = TransferFunction::default();
        assert_eq!(tf.shade(f32::NAN), None);
        assert!(tf.shade(0.5).is_some());
    }

    #[test]
    fn clip_range_sense_is_invertible() {
        let tf = TransferFunction {
            clip_range: (0.2, 0.8),
            ..TransferFunction::default()
        };
        assert!(tf.shade(0.5).is_some());
        assert_eq!(tf.shade(0.9), None);

        let inverted = TransferFunction {
            invert_clip: true,
            ..tf
        };
        assert_eq!(inverted.shade(0.5), None);
        assert!(inverted.shade(0.9).is_some());
    }

    #[test]
    fn zero_point_boundary_is_inclusive_on_the_primary_side() {
        let primary = ColourMap::new(vec![Vec4::new(1.0, 0.0, 0.0, 1.0); 2]);
        let negative = ColourMap::new(vec![Vec4::new(0.0, 0.0, 1.0, 1.0); 2]);
        let tf = TransferFunction {
            cmap: primary,
            negative_cmap: Some(negative),
            zero_point: 0.5,
            ..TransferFunction::default()
        };
        // Exactly at the zero point: primary map.
        assert_eq!(tf.shade(0.5), Some(Vec3::new(1.0, 0.0, 0.0)));
        // Just below: negative map.
        assert_eq!(tf.shade(0.4999), Some(Vec3::new(0.0, 0.0, 1.0)));
    }

    #[test]
    fn colour_map_interpolates_between_stops() {
        let cmap = ColourMap::grayscale();
        let mid = cmap.sample(0.5);
        assert!((mid.x - 0.5).abs() < 1e-6);
        assert_eq!(cmap.sample(-1.0), Vec4::new(0.0, 0.0, 0.0, 1.0));
        assert_eq!(cmap.sample(2.0), Vec4::ONE);
    }

    #[test]
    fn volume_sampling_clamps_to_edge() {
        let mut volume = VolumeTexture::filled([2, 2, 2], 0.0);
        *volume.voxel_mut(1, 1, 1) = 1.0;
        assert_eq!(
            volume.sample(Vec3::new(1.0, 1.0, 1.0), Interpolation::Nearest),
            1.0
        );
        assert_eq!(
            volume.sample(Vec3::new(0.0, 0.0, 0.0), Interpolation::Nearest),
            0.0
        );
    }
}
