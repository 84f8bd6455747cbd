//! Logical Binding Model
//!
//! Backend-neutral symbolic names for everything a generated program binds:
//! uniforms, per-vertex attributes, inter-stage varyings, textures, and
//! named constants. Templates reference these through resolver markers; each
//! backend maps the markers onto its own declarations or register indices
//! and records the outcome in a [`BindingTable`].
//!
//! The marker format is `@<role>:<name>@`: short, unambiguous, and easy to
//! scan for without a full parse of the target language.

use rustc_hash::FxHashMap;

/// The role a logical name plays in the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingRole {
    /// Per-vertex input.
    Attribute,
    /// Per-draw value, uploadable without recompilation.
    Uniform,
    /// Vertex-to-fragment interpolated value.
    Varying,
    /// A bound texture image.
    Texture,
    /// A named constant register (assembly) / const declaration (structured).
    Constant,
}

impl BindingRole {
    /// Single-character marker tag.
    #[must_use]
    pub fn tag(self) -> char {
        match self {
            Self::Attribute => 'a',
            Self::Uniform => 'u',
            Self::Varying => 'v',
            Self::Texture => 't',
            Self::Constant => 'c',
        }
    }

    #[must_use]
    pub fn from_tag(tag: char) -> Option<Self> {
        match tag {
            'a' => Some(Self::Attribute),
            'u' => Some(Self::Uniform),
            'v' => Some(Self::Varying),
            't' => Some(Self::Texture),
            'c' => Some(Self::Constant),
            _ => None,
        }
    }
}

/// The declared value shape of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingType {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Mat4,
    Sampler1D,
    Sampler2D,
    Sampler3D,
}

impl BindingType {
    /// GLSL type keyword for structured declarations.
    #[must_use]
    pub fn glsl(self) -> &'static str {
        match self {
            Self::Float => "float",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Vec4 => "vec4",
            Self::Mat4 => "mat4",
            Self::Sampler1D => "sampler1D",
            Self::Sampler2D => "sampler2D",
            Self::Sampler3D => "sampler3D",
        }
    }

    /// Constant registers a value of this type occupies on the assembly backend.
    #[must_use]
    pub fn register_count(self) -> u32 {
        match self {
            Self::Mat4 => 4,
            _ => 1,
        }
    }
}

/// A logical name a template declares.
#[derive(Debug, Clone)]
pub struct BindingDecl {
    pub name: String,
    pub role: BindingRole,
    pub ty: BindingType,
}

impl BindingDecl {
    #[must_use]
    pub fn new(name: &str, role: BindingRole, ty: BindingType) -> Self {
        Self {
            name: name.to_string(),
            role,
            ty,
        }
    }

    /// The resolver marker this declaration expands to in template output.
    #[must_use]
    pub fn marker(&self) -> String {
        format!("@{}:{}@", self.role.tag(), self.name)
    }

    /// Whether the marker occurs anywhere in `source`.
    #[must_use]
    pub fn occurs_in(&self, source: &str) -> bool {
        source.contains(&self.marker())
    }
}

/// The backend-specific handle assigned to one logical name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingSlot {
    /// Structured backend: the synthesized declaration name.
    Declaration(String),
    /// Assembly backend: base index into the constant register file
    /// (matrices occupy `register_count` consecutive slots).
    ConstantRegister(u32),
    /// Assembly backend: generic vertex attribute slot.
    AttributeSlot(u32),
    /// Assembly backend: texture-coordinate interpolator slot, shared by the
    /// writing vertex stage and the reading fragment stage.
    TexCoordSlot(u32),
    /// Texture image unit, on both backends.
    TextureUnit(u32),
}

/// Per-program mapping from logical name to backend handle.
///
/// Built once per compiled program, then reused for every draw call using
/// that program.
#[derive(Debug, Clone, Default)]
pub struct BindingTable {
    entries: FxHashMap<String, BindingSlot>,
}

impl BindingTable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }

    pub fn insert(&mut self, name: &str, slot: BindingSlot) {
        self.entries.insert(name.to_string(), slot);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BindingSlot> {
        self.entries.get(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BindingSlot)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Scans `source` for any remaining `@role:name@` marker.
///
/// Used by the generators' final validation pass: a leftover marker means a
/// referenced name was never declared (or a backend skipped it).
#[must_use]
pub fn find_unresolved_marker(source: &str) -> Option<String> {
    let bytes = source.as_bytes();
    let mut i = 0;
    while let Some(start) = source[i..].find('@').map(|p| p + i) {
        // marker shape: '@' tag ':' ident '@'
        if start + 3 < bytes.len()
            && BindingRole::from_tag(bytes[start + 1] as char).is_some()
            && bytes[start + 2] == b':'
        {
            let rest = &source[start + 3..];
            let end = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            if end > 0 && rest[end..].starts_with('@') {
                return Some(rest[..end].to_string());
            }
        }
        i = start + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_round_trips_through_scan() {
        let decl = BindingDecl::new("clip_plane0", BindingRole::Uniform, BindingType::Vec4);
        let source = format!("DP3 r0.x, {}, $pos;", decl.marker());
        assert!(decl.occurs_in(&source));
        assert_eq!(
            find_unresolved_marker(&source),
            Some("clip_plane0".to_string())
        );
    }

    #[test]
    fn scan_ignores_plain_at_signs() {
        assert_eq!(find_unresolved_marker("email@example.com"), None);
        assert_eq!(find_unresolved_marker("@@"), None);
        assert_eq!(find_unresolved_marker("a @ b"), None);
    }

    #[test]
    fn matrix_consumes_four_registers() {
        assert_eq!(BindingType::Mat4.register_count(), 4);
        assert_eq!(BindingType::Vec4.register_count(), 1);
    }
}
