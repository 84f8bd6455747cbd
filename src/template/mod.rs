//! Shader Template Registry
//!
//! Templates are named source fragments carrying inclusion directives and
//! template-control blocks, plus declarations of the logical parameters and
//! bindings they require. The registry is explicit process-scoped state:
//! populated once at startup (embedded sources plus programmatic
//! registration) and never mutated afterwards. It is passed explicitly to
//! the expander so the component stays testable in isolation.

pub mod expander;

pub use expander::{ExpandedSource, expand};

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::backend::ShaderStage;
use crate::binding::BindingDecl;
use crate::errors::{Result, VoxError};
use crate::params::ParamDecl;

/// An immutable named shader source template.
#[derive(Debug, Clone)]
pub struct ShaderTemplate {
    /// Registry key (filename-like, e.g. `glsl/volume3d.frag`).
    pub key: String,
    /// Raw source with `#include` directives and control blocks.
    pub source: String,
    /// The pipeline stage this template targets; `None` for chunks and
    /// routines that are only ever pulled into a stage template.
    pub stage: Option<ShaderStage>,
    /// Parameters the template requires.
    pub params: Vec<ParamDecl>,
    /// Logical names the template references through resolver markers.
    pub bindings: Vec<BindingDecl>,
}

impl ShaderTemplate {
    /// A full stage template with declared parameters and bindings.
    #[must_use]
    pub fn stage(
        key: &str,
        stage: ShaderStage,
        source: &str,
        params: Vec<ParamDecl>,
        bindings: Vec<BindingDecl>,
    ) -> Self {
        Self {
            key: key.to_string(),
            source: source.to_string(),
            stage: Some(stage),
            params,
            bindings,
        }
    }

    /// A bare fragment: an include chunk or an assembly routine.
    #[must_use]
    pub fn fragment(key: &str, source: &str) -> Self {
        Self {
            key: key.to_string(),
            source: source.to_string(),
            stage: None,
            params: Vec::new(),
            bindings: Vec::new(),
        }
    }

    /// A fragment that declares bindings of its own (assembly routines that
    /// sample textures or read uniforms directly).
    #[must_use]
    pub fn fragment_with_bindings(key: &str, source: &str, bindings: Vec<BindingDecl>) -> Self {
        Self {
            key: key.to_string(),
            source: source.to_string(),
            stage: None,
            params: Vec::new(),
            bindings,
        }
    }
}

/// Process-wide template store.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: FxHashMap<String, Arc<ShaderTemplate>>,
}

impl TemplateRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            templates: FxHashMap::default(),
        }
    }

    /// Registers a template. Startup-time only; later lookups assume the
    /// registry is frozen.
    pub fn register(&mut self, template: ShaderTemplate) {
        if self
            .templates
            .insert(template.key.clone(), Arc::new(template))
            .is_some()
        {
            log::warn!("template registered twice, replacing earlier entry");
        }
    }

    pub fn get(&self, key: &str) -> Result<&Arc<ShaderTemplate>> {
        self.templates
            .get(key)
            .ok_or_else(|| VoxError::TemplateNotFound(key.to_string()))
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.templates.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}
