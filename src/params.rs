//! Shader Parameter System
//!
//! Provides the typed parameter sets that drive template expansion and
//! per-draw binding. A parameter is either a **compile-time constant**
//! (baked into generated code, participates in cache identity) or a
//! **runtime value** (supplied per draw call, never affects cache identity).
//!
//! # Cache identity
//!
//! Two parameter sets are equivalent iff every compile-time constant matches
//! exactly. [`ParameterSet::fingerprint`] hashes the sorted compile-time
//! subset with xxh3-128 at bit-level float identity, so the fingerprint is
//! stable across insertion order and process runs.

use glam::{Mat4, Vec3, Vec4};
use minijinja::value::Value;
use std::collections::BTreeMap;

/// The shape of a declared parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    /// A boolean toggle (conditional template blocks).
    Boolean,
    /// A single float or integer.
    Scalar,
    /// A 3- or 4-component vector.
    Vector,
    /// A 4x4 matrix.
    Matrix,
    /// A bound texture (dimensionality comes from the binding declaration).
    Texture,
}

/// When a parameter's value is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamStorage {
    /// Baked into generated source; changing it forces recompilation.
    CompileTime,
    /// Supplied per draw call through the binding table.
    Runtime,
}

/// A parameter a template declares it needs.
#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub name: String,
    pub kind: ParamKind,
    pub storage: ParamStorage,
}

impl ParamDecl {
    #[must_use]
    pub fn compile_time(name: &str, kind: ParamKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            storage: ParamStorage::CompileTime,
        }
    }

    #[must_use]
    pub fn runtime(name: &str, kind: ParamKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            storage: ParamStorage::Runtime,
        }
    }
}

/// A concrete parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f32),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
    Str(String),
}

impl ParamValue {
    /// Appends a stable byte encoding of this value to `buf`.
    ///
    /// Floats are encoded by bit pattern so `-0.0 != 0.0` and NaN payloads
    /// are preserved, matching the "matches exactly" equivalence rule.
    fn write_bytes(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Bool(b) => {
                buf.push(0);
                buf.push(u8::from(*b));
            }
            Self::Int(i) => {
                buf.push(1);
                buf.extend_from_slice(&i.to_le_bytes());
            }
            Self::Float(f) => {
                buf.push(2);
                buf.extend_from_slice(&f.to_bits().to_le_bytes());
            }
            Self::Vec3(v) => {
                buf.push(3);
                for c in v.to_array() {
                    buf.extend_from_slice(&c.to_bits().to_le_bytes());
                }
            }
            Self::Vec4(v) => {
                buf.push(4);
                for c in v.to_array() {
                    buf.extend_from_slice(&c.to_bits().to_le_bytes());
                }
            }
            Self::Mat4(m) => {
                buf.push(5);
                for c in m.to_cols_array() {
                    buf.extend_from_slice(&c.to_bits().to_le_bytes());
                }
            }
            Self::Str(s) => {
                buf.push(6);
                buf.extend_from_slice(s.as_bytes());
            }
        }
    }

    /// Converts to a template-engine value for directive evaluation.
    #[must_use]
    pub fn to_template_value(&self) -> Value {
        match self {
            Self::Bool(b) => Value::from(*b),
            Self::Int(i) => Value::from(*i),
            Self::Float(f) => Value::from(f64::from(*f)),
            Self::Vec3(v) => Value::from_serialize(v.to_array()),
            Self::Vec4(v) => Value::from_serialize(v.to_array()),
            Self::Mat4(m) => Value::from_serialize(m.to_cols_array()),
            Self::Str(s) => Value::from(s.as_str()),
        }
    }
}

/// A named parameter entry with its binding time.
#[derive(Debug, Clone)]
struct ParamEntry {
    value: ParamValue,
    storage: ParamStorage,
}

/// A mapping from parameter name to compile-time constant or runtime value.
///
/// Internally an ordered `Vec<(String, ParamEntry)>` kept sorted by name so
/// identical sets always fingerprint identically, the same structure the
/// define-set cache keys use.
#[derive(Debug, Clone, Default)]
pub struct ParameterSet {
    entries: Vec<(String, ParamEntry)>,
}

impl ParameterSet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Sets a compile-time constant (maintains sorted order).
    pub fn set_constant(&mut self, name: &str, value: ParamValue) {
        self.set(name, value, ParamStorage::CompileTime);
    }

    /// Sets a runtime value (maintains sorted order).
    pub fn set_runtime(&mut self, name: &str, value: ParamValue) {
        self.set(name, value, ParamStorage::Runtime);
    }

    fn set(&mut self, name: &str, value: ParamValue, storage: ParamStorage) {
        let entry = ParamEntry { value, storage };
        match self
            .entries
            .binary_search_by(|(k, _)| k.as_str().cmp(name))
        {
            Ok(idx) => self.entries[idx].1 = entry,
            Err(idx) => self.entries.insert(idx, (name.to_string(), entry)),
        }
    }

    /// Looks up a value regardless of binding time.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.entries
            .binary_search_by(|(k, _)| k.as_str().cmp(name))
            .ok()
            .map(|idx| &self.entries[idx].1.value)
    }

    /// Looks up a compile-time constant.
    #[must_use]
    pub fn get_constant(&self, name: &str) -> Option<&ParamValue> {
        self.entries
            .binary_search_by(|(k, _)| k.as_str().cmp(name))
            .ok()
            .and_then(|idx| {
                let entry = &self.entries[idx].1;
                (entry.storage == ParamStorage::CompileTime).then_some(&entry.value)
            })
    }

    /// Iterates the compile-time subset in sorted name order.
    pub fn compile_time(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().filter_map(|(name, entry)| {
            (entry.storage == ParamStorage::CompileTime).then_some((name.as_str(), &entry.value))
        })
    }

    /// Iterates the runtime subset in sorted name order.
    pub fn runtime(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.entries.iter().filter_map(|(name, entry)| {
            (entry.storage == ParamStorage::Runtime).then_some((name.as_str(), &entry.value))
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hashes the compile-time subset; runtime values never contribute.
    #[must_use]
    pub fn fingerprint(&self) -> u128 {
        let mut buf = Vec::with_capacity(self.entries.len() * 16);
        for (name, value) in self.compile_time() {
            buf.extend_from_slice(name.as_bytes());
            buf.push(0xFF);
            value.write_bytes(&mut buf);
            buf.push(0xFE);
        }
        xxhash_rust::xxh3::xxh3_128(&buf)
    }

    /// Converts the compile-time subset into a template rendering context.
    #[must_use]
    pub fn to_template_context(&self) -> BTreeMap<String, Value> {
        self.compile_time()
            .map(|(name, value)| (name.to_string(), value.to_template_value()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_ignores_insertion_order() {
        let mut a = ParameterSet::new();
        a.set_constant("num_steps", ParamValue::Int(64));
        a.set_constant("cubic_interp", ParamValue::Bool(false));

        let mut b = ParameterSet::new();
        b.set_constant("cubic_interp", ParamValue::Bool(false));
        b.set_constant("num_steps", ParamValue::Int(64));

        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_ignores_runtime_values() {
        let mut a = ParameterSet::new();
        a.set_constant("num_steps", ParamValue::Int(64));
        a.set_runtime("clip_params", ParamValue::Vec4(Vec4::ZERO));

        let mut b = ParameterSet::new();
        b.set_constant("num_steps", ParamValue::Int(64));
        b.set_runtime("clip_params", ParamValue::Vec4(Vec4::ONE));

        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_constants() {
        let mut a = ParameterSet::new();
        a.set_constant("num_steps", ParamValue::Int(64));

        let mut b = ParameterSet::new();
        b.set_constant("num_steps", ParamValue::Int(128));

        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn float_identity_is_bitwise() {
        let mut a = ParameterSet::new();
        a.set_constant("zero", ParamValue::Float(0.0));

        let mut b = ParameterSet::new();
        b.set_constant("zero", ParamValue::Float(-0.0));

        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn set_overwrites_existing_entry() {
        let mut params = ParameterSet::new();
        params.set_constant("num_steps", ParamValue::Int(64));
        params.set_constant("num_steps", ParamValue::Int(32));

        assert_eq!(params.len(), 1);
        assert_eq!(params.get("num_steps"), Some(&ParamValue::Int(32)));
    }
}
