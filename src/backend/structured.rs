//! Structured Backend
//!
//! Emitter for the C-like shading-language target. Resolution is mostly
//! identity: declarations are synthesized and prefixed into each stage, and
//! the binding table records declaration names as-is. Generation validates
//! that every referenced logical name was declared; a leftover resolver
//! marker is exactly an undeclared reference.

use super::{
    BackendKind, FinalProgramSource, ResolvedProgram, ShaderBackend, ShaderStage, StageInput,
};
use crate::binding::{
    BindingDecl, BindingRole, BindingSlot, BindingTable, find_unresolved_marker,
};
use crate::errors::{Result, VoxError};
use crate::params::ParameterSet;
use crate::template::TemplateRegistry;

/// Language version pragma prefixed to every generated stage.
const VERSION_HEADER: &str = "#version 120";

#[derive(Debug, Default)]
pub struct StructuredBackend;

impl StructuredBackend {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl ShaderBackend for StructuredBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Structured
    }

    fn resolve(
        &self,
        _registry: &TemplateRegistry,
        vertex: StageInput<'_>,
        fragment: StageInput<'_>,
        _params: &ParameterSet,
    ) -> Result<ResolvedProgram> {
        let decls = collect_decls(&[vertex.template, fragment.template]);
        let mut table = BindingTable::new();
        let mut texture_unit = 0u32;

        for decl in &decls {
            let in_vertex = decl.occurs_in(vertex.expanded.as_str());
            let in_fragment = decl.occurs_in(fragment.expanded.as_str());
            if !in_vertex && !in_fragment {
                continue;
            }
            let slot = if decl.role == BindingRole::Texture {
                let unit = texture_unit;
                texture_unit += 1;
                BindingSlot::TextureUnit(unit)
            } else {
                BindingSlot::Declaration(decl.name.clone())
            };
            table.insert(&decl.name, slot);
        }

        let vertex_out = build_stage(ShaderStage::Vertex, vertex.expanded.as_str(), &decls);
        let fragment_out = build_stage(ShaderStage::Fragment, fragment.expanded.as_str(), &decls);

        Ok(ResolvedProgram {
            vertex: vertex_out,
            fragment: fragment_out,
            bindings: table,
        })
    }

    fn generate(&self, resolved: ResolvedProgram) -> Result<(FinalProgramSource, BindingTable)> {
        for stage in [&resolved.vertex, &resolved.fragment] {
            if let Some(name) = find_unresolved_marker(stage) {
                return Err(VoxError::UnresolvedSymbol { name });
            }
        }
        Ok((
            FinalProgramSource {
                vertex: resolved.vertex,
                fragment: resolved.fragment,
            },
            resolved.bindings,
        ))
    }
}

/// Union of both stages' declarations, first occurrence wins on name clash.
fn collect_decls(templates: &[&crate::template::ShaderTemplate]) -> Vec<BindingDecl> {
    let mut decls: Vec<BindingDecl> = Vec::new();
    for template in templates {
        for decl in &template.bindings {
            if !decls.iter().any(|d| d.name == decl.name) {
                decls.push(decl.clone());
            }
        }
    }
    decls
}

/// Prefixes synthesized declarations and replaces markers with plain names.
fn build_stage(stage: ShaderStage, expanded: &str, decls: &[BindingDecl]) -> String {
    let mut header = String::new();
    header.push_str(VERSION_HEADER);
    header.push('\n');

    let mut body = expanded.to_string();
    for decl in decls {
        let used_here = decl.occurs_in(&body);
        if let Some(line) = declaration_line(stage, decl, used_here) {
            header.push_str(&line);
            header.push('\n');
        }
        if used_here {
            body = body.replace(&decl.marker(), &decl.name);
        }
    }

    header.push('\n');
    header.push_str(&body);
    header
}

/// The declaration a stage needs for one logical name, if any.
///
/// Varyings are declared in both stages whenever either side references
/// them, so the interface blocks always agree at link time. Attributes only
/// exist in the vertex stage.
fn declaration_line(stage: ShaderStage, decl: &BindingDecl, used_here: bool) -> Option<String> {
    let keyword = match decl.role {
        BindingRole::Attribute => {
            if stage != ShaderStage::Vertex || !used_here {
                return None;
            }
            "attribute"
        }
        BindingRole::Varying => "varying",
        BindingRole::Uniform | BindingRole::Constant | BindingRole::Texture => {
            if !used_here {
                return None;
            }
            "uniform"
        }
    };
    Some(format!("{keyword} {} {};", decl.ty.glsl(), decl.name))
}
