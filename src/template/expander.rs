//! Template Expander
//!
//! Turns a [`ShaderTemplate`] plus the compile-time subset of a
//! [`ParameterSet`] into flat, backend-agnostic source text.
//!
//! Expansion runs in two passes:
//!
//! 1. **Include resolution**: `#include "key"` lines are replaced by the
//!    referenced fragment's source, recursively, with the include stack
//!    tracked so cycles fail fast instead of recursing forever.
//! 2. **Directive evaluation**: the flattened text is rendered through the
//!    template engine against the compile-time parameters. Conditional
//!    blocks collapse, loops unroll (bounds are always compile-time
//!    integers, since the assembly backend has no branch or loop
//!    instructions),
//!    and `{{ name }}` placeholders become literal values or, via the
//!    `bind` map, resolver markers that the binding resolver fills in.
//!
//! Expansion is a pure function: identical `(template, parameters)` inputs
//! always yield byte-identical output.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use minijinja::value::Value;
use minijinja::{Environment, ErrorKind, UndefinedBehavior};

use super::{ShaderTemplate, TemplateRegistry};
use crate::errors::{Result, VoxError};
use crate::params::{ParamStorage, ParameterSet};

/// Flat source text with no remaining inclusion or control directives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedSource {
    pub text: String,
}

impl ExpandedSource {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

static EXPAND_ENV: OnceLock<Environment<'static>> = OnceLock::new();

fn get_env() -> &'static Environment<'static> {
    EXPAND_ENV.get_or_init(|| {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env
    })
}

/// Expands `template` against the compile-time subset of `params`.
///
/// Fails with [`VoxError::UnresolvedInclude`] / [`VoxError::CircularInclude`]
/// during include resolution, [`VoxError::MissingParameter`] when a declared
/// compile-time parameter is absent, and [`VoxError::MalformedDirective`]
/// when a control block does not parse or evaluate.
pub fn expand(
    registry: &TemplateRegistry,
    template: &ShaderTemplate,
    params: &ParameterSet,
) -> Result<ExpandedSource> {
    // Every declared compile-time parameter must be fully resolved before
    // expansion starts.
    for decl in &template.params {
        if decl.storage == ParamStorage::CompileTime && params.get_constant(&decl.name).is_none() {
            return Err(VoxError::MissingParameter {
                template: template.key.clone(),
                name: decl.name.clone(),
            });
        }
    }

    // Pass 1: flatten includes.
    let mut stack = Vec::new();
    let flat = resolve_includes(registry, &template.key, &template.source, &mut stack)?;

    // Pass 2: evaluate control directives.
    let mut context = params.to_template_context();
    let bind: BTreeMap<String, String> = template
        .bindings
        .iter()
        .map(|decl| (decl.name.clone(), decl.marker()))
        .collect();
    context.insert("bind".to_string(), Value::from_serialize(&bind));

    let rendered = get_env()
        .render_str(&flat, Value::from_serialize(&context))
        .map_err(|err| map_engine_error(&template.key, &err))?;

    // A directive that survives rendering means the template escaped it or
    // the engine was bypassed; either way the output is not flat.
    if rendered.contains("{%") || rendered.contains("{{") {
        return Err(VoxError::MalformedDirective {
            template: template.key.clone(),
            message: "control directives remain after expansion".to_string(),
        });
    }

    Ok(ExpandedSource { text: rendered })
}

fn map_engine_error(template: &str, err: &minijinja::Error) -> VoxError {
    match err.kind() {
        ErrorKind::UndefinedError => VoxError::MissingParameter {
            template: template.to_string(),
            name: err
                .detail()
                .map_or_else(|| err.to_string(), ToString::to_string),
        },
        _ => VoxError::MalformedDirective {
            template: template.to_string(),
            message: err.to_string(),
        },
    }
}

/// Recursively splices `#include "key"` lines, rejecting cycles.
fn resolve_includes(
    registry: &TemplateRegistry,
    key: &str,
    source: &str,
    stack: &mut Vec<String>,
) -> Result<String> {
    if stack.iter().any(|entry| entry == key) {
        let mut chain: Vec<&str> = stack.iter().map(String::as_str).collect();
        chain.push(key);
        return Err(VoxError::CircularInclude {
            chain: chain.join(" -> "),
        });
    }
    stack.push(key.to_string());

    let mut out = String::with_capacity(source.len());
    for line in source.lines() {
        if let Some(include_key) = parse_include(line) {
            let fragment =
                registry
                    .get(include_key)
                    .map_err(|_| VoxError::UnresolvedInclude {
                        template: key.to_string(),
                        include: include_key.to_string(),
                    })?;
            let inner = resolve_includes(registry, include_key, &fragment.source, stack)?;
            out.push_str(&inner);
            if !inner.ends_with('\n') {
                out.push('\n');
            }
        } else {
            out.push_str(line);
            out.push('\n');
        }
    }

    stack.pop();
    Ok(out)
}

/// Parses an `#include "key"` line; anything else returns `None`.
fn parse_include(line: &str) -> Option<&str> {
    let rest = line.trim().strip_prefix("#include")?;
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('"')?;
    let end = rest.find('"')?;
    let key = &rest[..end];
    // Trailing junk after the closing quote is not an include line.
    rest[end + 1..].trim().is_empty().then_some(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParamValue;

    fn registry_with(fragments: &[(&str, &str)]) -> TemplateRegistry {
        let mut registry = TemplateRegistry::new();
        for (key, source) in fragments {
            registry.register(ShaderTemplate::fragment(key, source));
        }
        registry
    }

    #[test]
    fn parse_include_accepts_quoted_keys() {
        assert_eq!(parse_include("#include \"glsl/common\""), Some("glsl/common"));
        assert_eq!(parse_include("  #include \"a\"  "), Some("a"));
        assert_eq!(parse_include("// #include \"a\""), None);
        assert_eq!(parse_include("#include \"a\" trailing"), None);
        assert_eq!(parse_include("#include a"), None);
    }

    #[test]
    fn includes_splice_recursively() {
        let registry = registry_with(&[("inner", "INNER"), ("outer", "A\n#include \"inner\"\nB")]);
        let template = ShaderTemplate::fragment("top", "#include \"outer\"");
        let out = expand(&registry, &template, &ParameterSet::new()).unwrap();
        assert_eq!(out.as_str(), "A\nINNER\nB\n");
    }

    #[test]
    fn circular_include_is_rejected() {
        let registry = registry_with(&[
            ("a", "#include \"b\""),
            ("b", "#include \"a\""),
        ]);
        let template = ShaderTemplate::fragment("top", "#include \"a\"");
        let err = expand(&registry, &template, &ParameterSet::new()).unwrap_err();
        match err {
            VoxError::CircularInclude { chain } => {
                assert!(chain.contains("a -> b -> a"), "unexpected chain: {chain}");
            }
            other => panic!("expected CircularInclude, got {other:?}"),
        }
    }

    #[test]
    fn unresolved_include_names_both_sides() {
        let registry = TemplateRegistry::new();
        let template = ShaderTemplate::fragment("top", "#include \"missing\"");
        let err = expand(&registry, &template, &ParameterSet::new()).unwrap_err();
        match err {
            VoxError::UnresolvedInclude { template, include } => {
                assert_eq!(template, "top");
                assert_eq!(include, "missing");
            }
            other => panic!("expected UnresolvedInclude, got {other:?}"),
        }
    }

    #[test]
    fn conditionals_and_loops_evaluate_against_constants() {
        let registry = TemplateRegistry::new();
        let template = ShaderTemplate::fragment(
            "t",
            "{% if enabled %}on{% endif %}\n{% for i in range(n) %}[{{ i }}]{% endfor %}\n",
        );
        let mut params = ParameterSet::new();
        params.set_constant("enabled", ParamValue::Bool(true));
        params.set_constant("n", ParamValue::Int(3));

        let out = expand(&registry, &template, &params).unwrap();
        // trim_blocks drops the newline after each block tag.
        assert_eq!(out.as_str(), "on[0][1][2]");
    }

    #[test]
    fn undefined_variable_maps_to_missing_parameter() {
        let registry = TemplateRegistry::new();
        let template = ShaderTemplate::fragment("t", "{{ nope }}");
        let err = expand(&registry, &template, &ParameterSet::new()).unwrap_err();
        assert!(matches!(err, VoxError::MissingParameter { .. }));
    }

    #[test]
    fn syntax_error_maps_to_malformed_directive() {
        let registry = TemplateRegistry::new();
        let template = ShaderTemplate::fragment("t", "{% if %}");
        let err = expand(&registry, &template, &ParameterSet::new()).unwrap_err();
        assert!(matches!(err, VoxError::MalformedDirective { .. }));
    }
}
