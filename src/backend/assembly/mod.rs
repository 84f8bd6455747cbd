//! Assembly Backend
//!
//! Emitter for the flat, register-indexed target. There is no control flow
//! and no real subroutine mechanism, so resolution and generation carry the
//! weight the structured backend gets for free:
//!
//! - named helper routines are textually inlined per call site ([`inline`])
//! - uniforms and constants become indexed constant registers
//! - varyings become shared texture-coordinate interpolator slots
//! - named temporaries get hardware registers with exact straight-line
//!   liveness ([`registers`])
//! - boolean tests lower to the compare/kill arithmetic idiom
//! - a hard instruction ceiling rejects programs the driver would refuse

pub mod inline;
pub mod registers;

pub use registers::{RegisterAllocation, TempAssignment, allocate_temporaries, count_instructions};

use rustc_hash::FxHashMap;

use super::{
    BackendKind, FinalProgramSource, ResolvedProgram, ShaderBackend, ShaderStage, StageInput,
};
use crate::binding::{
    BindingDecl, BindingRole, BindingSlot, BindingTable, find_unresolved_marker,
};
use crate::errors::{Result, VoxError};
use crate::params::ParameterSet;
use crate::template::TemplateRegistry;

/// Mnemonics the target hardware does not have. Seeing one in generated
/// code means a template leaked structured control flow into this backend.
const BRANCH_MNEMONICS: [&str; 10] = [
    "IF", "ELSE", "ENDIF", "REP", "ENDREP", "LOOP", "ENDLOOP", "BRA", "CAL", "RET",
];

/// Hardware resource ceilings for the assembly target.
///
/// Defaults follow the baseline limits of first-generation fragment-program
/// hardware; embedders with queried driver caps can widen them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssemblyLimits {
    pub max_temporaries: u32,
    pub max_constants: u32,
    pub max_texcoords: u32,
    pub max_attributes: u32,
    pub max_texture_units: u32,
    pub max_instructions: usize,
}

impl Default for AssemblyLimits {
    fn default() -> Self {
        Self {
            max_temporaries: 16,
            max_constants: 32,
            max_texcoords: 8,
            max_attributes: 16,
            max_texture_units: 8,
            max_instructions: 1024,
        }
    }
}

#[derive(Debug, Default)]
pub struct AssemblyBackend {
    limits: AssemblyLimits,
}

impl AssemblyBackend {
    #[must_use]
    pub fn new() -> Self {
        Self {
            limits: AssemblyLimits::default(),
        }
    }

    #[must_use]
    pub fn with_limits(limits: AssemblyLimits) -> Self {
        Self { limits }
    }

    #[must_use]
    pub fn limits(&self) -> &AssemblyLimits {
        &self.limits
    }
}

impl ShaderBackend for AssemblyBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Assembly
    }

    fn resolve(
        &self,
        registry: &TemplateRegistry,
        vertex: StageInput<'_>,
        fragment: StageInput<'_>,
        params: &ParameterSet,
    ) -> Result<ResolvedProgram> {
        // Routines first: their bodies may reference bindings of their own,
        // which must be visible before slots are assigned.
        let vertex_inlined = inline::inline_calls(
            registry,
            params,
            &vertex.template.key,
            vertex.expanded.as_str(),
        )?;
        let fragment_inlined = inline::inline_calls(
            registry,
            params,
            &fragment.template.key,
            fragment.expanded.as_str(),
        )?;

        let mut decls: Vec<BindingDecl> = Vec::new();
        let mut push_decls = |source: &[BindingDecl]| {
            for decl in source {
                if !decls.iter().any(|d| d.name == decl.name) {
                    decls.push(decl.clone());
                }
            }
        };
        push_decls(&vertex.template.bindings);
        push_decls(&fragment.template.bindings);
        for key in vertex_inlined
            .routines
            .iter()
            .chain(fragment_inlined.routines.iter())
        {
            push_decls(&registry.get(key)?.bindings);
        }

        let assigner = SlotAssigner::assign(
            &self.limits,
            &decls,
            &vertex_inlined.source,
            &fragment_inlined.source,
        )?;

        let vertex_out = assigner.apply(ShaderStage::Vertex, &vertex_inlined.source);
        let fragment_out = assigner.apply(ShaderStage::Fragment, &fragment_inlined.source);

        Ok(ResolvedProgram {
            vertex: vertex_out,
            fragment: fragment_out,
            bindings: assigner.table,
        })
    }

    fn generate(&self, resolved: ResolvedProgram) -> Result<(FinalProgramSource, BindingTable)> {
        let vertex = self.generate_stage(ShaderStage::Vertex, &resolved.vertex)?;
        let fragment = self.generate_stage(ShaderStage::Fragment, &resolved.fragment)?;
        Ok((FinalProgramSource { vertex, fragment }, resolved.bindings))
    }
}

impl AssemblyBackend {
    fn generate_stage(&self, stage: ShaderStage, source: &str) -> Result<String> {
        let stage_name = match stage {
            ShaderStage::Vertex => "vertex assembly",
            ShaderStage::Fragment => "fragment assembly",
        };

        let lowered = lower_pseudo_ops(stage_name, source)?;
        reject_branches(stage_name, &lowered)?;

        let (allocated, alloc) = allocate_temporaries(&lowered, self.limits.max_temporaries)?;
        if alloc.used_registers > self.limits.max_temporaries / 2 {
            log::debug!(
                "{stage_name}: register pressure {}/{}",
                alloc.used_registers,
                self.limits.max_temporaries
            );
        }

        let count = count_instructions(&allocated);
        if count > self.limits.max_instructions {
            return Err(VoxError::ProgramTooLarge {
                count,
                limit: self.limits.max_instructions,
            });
        }

        if let Some(name) = find_unresolved_marker(&allocated) {
            return Err(VoxError::UnresolvedSymbol { name });
        }
        Ok(allocated)
    }
}

/// Lowers boolean pseudo-instructions to the compare/kill arithmetic idiom.
///
/// - `SELGE dst, cond, a, b;` ("dst = cond >= 0 ? a : b") becomes
///   `CMP dst, cond, b, a;` (the hardware compare selects on `cond < 0`).
/// - `KILLT cond;` ("discard the fragment where cond < 0") becomes
///   `KIL cond;`.
fn lower_pseudo_ops(stage_name: &str, source: &str) -> Result<String> {
    let mut out = String::with_capacity(source.len());
    for line in source.lines() {
        let trimmed = line.trim();
        if let Some(rest) = trimmed.strip_prefix("SELGE") {
            let args = parse_operands(stage_name, "SELGE", rest, 4)?;
            out.push_str(&format!(
                "CMP {}, {}, {}, {};\n",
                args[0], args[1], args[3], args[2]
            ));
        } else if let Some(rest) = trimmed.strip_prefix("KILLT") {
            let args = parse_operands(stage_name, "KILLT", rest, 1)?;
            out.push_str(&format!("KIL {};\n", args[0]));
        } else {
            out.push_str(line);
            out.push('\n');
        }
    }
    Ok(out)
}

fn parse_operands<'a>(
    stage_name: &str,
    mnemonic: &str,
    rest: &'a str,
    expected: usize,
) -> Result<Vec<&'a str>> {
    let rest = rest.trim().trim_end_matches(';');
    let args: Vec<&str> = rest.split(',').map(str::trim).collect();
    if args.len() != expected || args.iter().any(|a| a.is_empty()) {
        return Err(VoxError::MalformedDirective {
            template: stage_name.to_string(),
            message: format!("{mnemonic} expects {expected} operands, got \"{rest}\""),
        });
    }
    Ok(args)
}

fn reject_branches(stage_name: &str, source: &str) -> Result<()> {
    for line in source.lines() {
        if !registers::is_instruction(line) {
            continue;
        }
        let mnemonic = line
            .trim()
            .split(|c: char| c.is_whitespace() || c == ';')
            .next()
            .unwrap_or("");
        if BRANCH_MNEMONICS.contains(&mnemonic) {
            return Err(VoxError::MalformedDirective {
                template: stage_name.to_string(),
                message: format!("control-flow mnemonic {mnemonic} has no assembly equivalent"),
            });
        }
    }
    Ok(())
}

// ─── Slot Assignment ─────────────────────────────────────────────────────────

/// Constant-register, attribute, interpolator, and texture-unit assignment
/// for one program, shared by both stages.
struct SlotAssigner {
    table: BindingTable,
    /// marker text -> per-stage replacement strategy
    replacements: FxHashMap<String, Replacement>,
    /// `PARAM` declarations per stage, in slot order.
    vertex_params: Vec<String>,
    fragment_params: Vec<String>,
}

enum Replacement {
    /// Same text in both stages (PARAM names, texture units, attributes).
    Uniform(String),
    /// Varyings: written by the vertex stage, read by the fragment stage.
    Varying { vertex: String, fragment: String },
}

impl SlotAssigner {
    fn assign(
        limits: &AssemblyLimits,
        decls: &[BindingDecl],
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self> {
        let mut table = BindingTable::new();
        let mut replacements = FxHashMap::default();
        let mut vertex_params = Vec::new();
        let mut fragment_params = Vec::new();

        let mut next_constant = 0u32;
        let mut next_attribute = 0u32;
        let mut next_texcoord = 0u32;
        let mut next_texture = 0u32;

        for decl in decls {
            let in_vertex = decl.occurs_in(vertex_source);
            let in_fragment = decl.occurs_in(fragment_source);
            if !in_vertex && !in_fragment {
                continue;
            }
            let marker = decl.marker();

            match decl.role {
                BindingRole::Uniform | BindingRole::Constant => {
                    let span = decl.ty.register_count();
                    if next_constant + span > limits.max_constants {
                        return Err(VoxError::RegisterExhausted {
                            file: "constant",
                            limit: limits.max_constants,
                        });
                    }
                    let base = next_constant;
                    next_constant += span;

                    let param = if span == 1 {
                        format!("PARAM {} = program.local[{base}];", decl.name)
                    } else {
                        format!(
                            "PARAM {}[{span}] = {{ program.local[{base}..{}] }};",
                            decl.name,
                            base + span - 1
                        )
                    };
                    if in_vertex {
                        vertex_params.push(param.clone());
                    }
                    if in_fragment {
                        fragment_params.push(param);
                    }
                    table.insert(&decl.name, BindingSlot::ConstantRegister(base));
                    replacements.insert(marker, Replacement::Uniform(decl.name.clone()));
                }
                BindingRole::Attribute => {
                    if next_attribute >= limits.max_attributes {
                        return Err(VoxError::RegisterExhausted {
                            file: "attribute",
                            limit: limits.max_attributes,
                        });
                    }
                    let slot = next_attribute;
                    next_attribute += 1;
                    table.insert(&decl.name, BindingSlot::AttributeSlot(slot));
                    replacements.insert(
                        marker,
                        Replacement::Uniform(format!("vertex.attrib[{slot}]")),
                    );
                }
                BindingRole::Varying => {
                    if next_texcoord >= limits.max_texcoords {
                        return Err(VoxError::RegisterExhausted {
                            file: "texcoord",
                            limit: limits.max_texcoords,
                        });
                    }
                    let slot = next_texcoord;
                    next_texcoord += 1;
                    table.insert(&decl.name, BindingSlot::TexCoordSlot(slot));
                    replacements.insert(
                        marker,
                        Replacement::Varying {
                            vertex: format!("result.texcoord[{slot}]"),
                            fragment: format!("fragment.texcoord[{slot}]"),
                        },
                    );
                }
                BindingRole::Texture => {
                    if next_texture >= limits.max_texture_units {
                        return Err(VoxError::RegisterExhausted {
                            file: "texture",
                            limit: limits.max_texture_units,
                        });
                    }
                    let unit = next_texture;
                    next_texture += 1;
                    table.insert(&decl.name, BindingSlot::TextureUnit(unit));
                    replacements
                        .insert(marker, Replacement::Uniform(format!("texture[{unit}]")));
                }
            }
        }

        Ok(Self {
            table,
            replacements,
            vertex_params,
            fragment_params,
        })
    }

    /// Substitutes markers and splices `PARAM` declarations after the header.
    fn apply(&self, stage: ShaderStage, source: &str) -> String {
        let mut body = source.to_string();
        for (marker, replacement) in &self.replacements {
            let text = match replacement {
                Replacement::Uniform(text) => text,
                Replacement::Varying { vertex, fragment } => match stage {
                    ShaderStage::Vertex => vertex,
                    ShaderStage::Fragment => fragment,
                },
            };
            body = body.replace(marker, text);
        }

        let params = match stage {
            ShaderStage::Vertex => &self.vertex_params,
            ShaderStage::Fragment => &self.fragment_params,
        };
        if params.is_empty() {
            return body;
        }

        let mut out = String::with_capacity(body.len() + params.len() * 48);
        let mut spliced = false;
        for line in body.lines() {
            out.push_str(line);
            out.push('\n');
            if !spliced && line.trim_start().starts_with("!!") {
                for param in params {
                    out.push_str(param);
                    out.push('\n');
                }
                spliced = true;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BindingType;
    use crate::template::{ExpandedSource, ShaderTemplate};

    fn stage_input<'a>(
        template: &'a ShaderTemplate,
        expanded: &'a ExpandedSource,
    ) -> StageInput<'a> {
        StageInput { template, expanded }
    }

    #[test]
    fn selge_lowers_to_cmp_with_swapped_arms() {
        let out = lower_pseudo_ops("fp", "SELGE $dst, $cond, $a, $b;\n").unwrap();
        assert_eq!(out, "CMP $dst, $cond, $b, $a;\n");
    }

    #[test]
    fn killt_lowers_to_kil() {
        let out = lower_pseudo_ops("fp", "KILLT $mask;\n").unwrap();
        assert_eq!(out, "KIL $mask;\n");
    }

    #[test]
    fn branch_mnemonics_are_rejected() {
        let err = reject_branches("fp", "IF GT.x;\nMOV a, b;\nENDIF;\n").unwrap_err();
        assert!(matches!(err, VoxError::MalformedDirective { .. }));
    }

    #[test]
    fn varyings_share_one_interpolator_slot_across_stages() {
        let vertex_tpl = ShaderTemplate::stage(
            "vp",
            ShaderStage::Vertex,
            "",
            Vec::new(),
            vec![
                BindingDecl::new("position", BindingRole::Attribute, BindingType::Vec4),
                BindingDecl::new("frag_texcoord", BindingRole::Varying, BindingType::Vec3),
            ],
        );
        let fragment_tpl = ShaderTemplate::stage(
            "fp",
            ShaderStage::Fragment,
            "",
            Vec::new(),
            vec![BindingDecl::new(
                "frag_texcoord",
                BindingRole::Varying,
                BindingType::Vec3,
            )],
        );
        let vertex_src = ExpandedSource {
            text: "!!ARBvp1.0\nMOV @v:frag_texcoord@, @a:position@;\nEND\n".to_string(),
        };
        let fragment_src = ExpandedSource {
            text: "!!ARBfp1.0\nMOV $p, @v:frag_texcoord@;\nMOV result.color, $p;\nEND\n"
                .to_string(),
        };

        let backend = AssemblyBackend::new();
        let resolved = backend
            .resolve(
                &TemplateRegistry::new(),
                stage_input(&vertex_tpl, &vertex_src),
                stage_input(&fragment_tpl, &fragment_src),
                &ParameterSet::new(),
            )
            .unwrap();

        assert!(resolved.vertex.contains("MOV result.texcoord[0], vertex.attrib[0];"));
        assert!(resolved.fragment.contains("MOV $p, fragment.texcoord[0];"));
        assert_eq!(
            resolved.bindings.get("frag_texcoord"),
            Some(&BindingSlot::TexCoordSlot(0))
        );
    }

    #[test]
    fn matrix_uniform_takes_four_consecutive_constant_registers() {
        let vertex_tpl = ShaderTemplate::stage(
            "vp",
            ShaderStage::Vertex,
            "",
            Vec::new(),
            vec![
                BindingDecl::new("scale", BindingRole::Uniform, BindingType::Vec4),
                BindingDecl::new("mvp", BindingRole::Uniform, BindingType::Mat4),
            ],
        );
        let fragment_tpl =
            ShaderTemplate::stage("fp", ShaderStage::Fragment, "", Vec::new(), Vec::new());
        let vertex_src = ExpandedSource {
            text: "!!ARBvp1.0\nDP4 $r.x, @u:mvp@[0], vertex.attrib[0];\nMUL $r, $r, @u:scale@;\nMOV result.position, $r;\nEND\n".to_string(),
        };
        let fragment_src = ExpandedSource {
            text: "!!ARBfp1.0\nMOV result.color, state.material.front.diffuse;\nEND\n"
                .to_string(),
        };

        let backend = AssemblyBackend::new();
        let resolved = backend
            .resolve(
                &TemplateRegistry::new(),
                stage_input(&vertex_tpl, &vertex_src),
                stage_input(&fragment_tpl, &fragment_src),
                &ParameterSet::new(),
            )
            .unwrap();

        assert_eq!(
            resolved.bindings.get("scale"),
            Some(&BindingSlot::ConstantRegister(0))
        );
        assert_eq!(
            resolved.bindings.get("mvp"),
            Some(&BindingSlot::ConstantRegister(1))
        );
        assert!(resolved
            .vertex
            .contains("PARAM mvp[4] = { program.local[1..4] };"));
    }

    #[test]
    fn constant_exhaustion_fails_rather_than_overflowing() {
        let limits = AssemblyLimits {
            max_constants: 2,
            ..AssemblyLimits::default()
        };
        let vertex_tpl = ShaderTemplate::stage(
            "vp",
            ShaderStage::Vertex,
            "",
            Vec::new(),
            vec![BindingDecl::new("mvp", BindingRole::Uniform, BindingType::Mat4)],
        );
        let fragment_tpl =
            ShaderTemplate::stage("fp", ShaderStage::Fragment, "", Vec::new(), Vec::new());
        let vertex_src = ExpandedSource {
            text: "!!ARBvp1.0\nDP4 $r.x, @u:mvp@[0], vertex.attrib[0];\nEND\n".to_string(),
        };
        let fragment_src = ExpandedSource {
            text: "!!ARBfp1.0\nEND\n".to_string(),
        };

        let backend = AssemblyBackend::with_limits(limits);
        let err = backend
            .resolve(
                &TemplateRegistry::new(),
                stage_input(&vertex_tpl, &vertex_src),
                stage_input(&fragment_tpl, &fragment_src),
                &ParameterSet::new(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            VoxError::RegisterExhausted {
                file: "constant",
                ..
            }
        ));
    }

    #[test]
    fn instruction_ceiling_is_enforced() {
        let backend = AssemblyBackend::with_limits(AssemblyLimits {
            max_instructions: 2,
            ..AssemblyLimits::default()
        });
        let resolved = ResolvedProgram {
            vertex: "!!ARBvp1.0\nMOV $a, vertex.attrib[0];\nMOV result.position, $a;\nEND\n"
                .to_string(),
            fragment:
                "!!ARBfp1.0\nMOV $a, fragment.texcoord[0];\nMOV $b, $a;\nMOV result.color, $b;\nEND\n"
                    .to_string(),
            bindings: BindingTable::new(),
        };
        let err = backend.generate(resolved).unwrap_err();
        assert!(matches!(err, VoxError::ProgramTooLarge { count: 3, limit: 2 }));
    }
}
