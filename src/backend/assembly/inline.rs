//! Subroutine Inlining
//!
//! The assembly target has no call/return, so named helper routines are
//! macro-expanded textually at each call site. A call line
//!
//! ```text
//! %call arb/shade_sample $texel, $colour, $alpha
//! ```
//!
//! splices the routine's body with every formal parameter name substituted
//! for the caller's actual argument text. Internal temporaries get a fresh
//! per-call-site namespace so two expansions of the same routine never
//! collide in the register allocator.
//!
//! Routine fragments live in the template registry and run through the
//! normal expander first, so their bodies may use the same compile-time
//! control blocks as stage templates. The first line of the expanded body
//! must be a `%routine <name> <formals>` header.

use crate::errors::{Result, VoxError};
use crate::params::ParameterSet;
use crate::template::{TemplateRegistry, expand};

/// Nested-expansion bound; a routine that still produces `%call` lines this
/// deep is recursive.
const MAX_INLINE_DEPTH: usize = 32;

/// Result of inlining one stage.
#[derive(Debug, Clone)]
pub struct InlineOutput {
    /// The stage source with every `%call` line replaced by routine bodies.
    pub source: String,
    /// Registry keys of every routine that was pulled in, in first-use order.
    pub routines: Vec<String>,
}

/// Expands every `%call` line in `source` until none remain.
pub fn inline_calls(
    registry: &TemplateRegistry,
    params: &ParameterSet,
    stage_key: &str,
    source: &str,
) -> Result<InlineOutput> {
    let mut current = source.to_string();
    let mut routines: Vec<String> = Vec::new();
    let mut call_site = 0u32;

    for _depth in 0..MAX_INLINE_DEPTH {
        if !current.contains("%call") {
            return Ok(InlineOutput {
                source: current,
                routines,
            });
        }

        let mut out = String::with_capacity(current.len());
        for line in current.lines() {
            let trimmed = line.trim();
            if let Some(rest) = trimmed.strip_prefix("%call") {
                let (key, actuals) = parse_call(stage_key, rest)?;
                let body = expand_routine(registry, params, stage_key, key, &actuals, call_site)?;
                call_site += 1;
                if !routines.iter().any(|k| k == key) {
                    routines.push(key.to_string());
                }
                out.push_str(&body);
            } else {
                out.push_str(line);
                out.push('\n');
            }
        }
        current = out;
    }

    Err(VoxError::CircularInclude {
        chain: format!("{stage_key}: routine expansion exceeded depth {MAX_INLINE_DEPTH}"),
    })
}

/// Splits `%call <key> <arg>, <arg>, ...` into key and argument texts.
fn parse_call<'a>(stage_key: &str, rest: &'a str) -> Result<(&'a str, Vec<&'a str>)> {
    let rest = rest.trim();
    let (key, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    if key.is_empty() {
        return Err(VoxError::MalformedDirective {
            template: stage_key.to_string(),
            message: "%call without a routine key".to_string(),
        });
    }
    let actuals: Vec<&str> = if args.trim().is_empty() {
        Vec::new()
    } else {
        args.split(',').map(str::trim).collect()
    };
    Ok((key, actuals))
}

/// Expands one routine template and substitutes one call site.
fn expand_routine(
    registry: &TemplateRegistry,
    params: &ParameterSet,
    stage_key: &str,
    key: &str,
    actuals: &[&str],
    call_site: u32,
) -> Result<String> {
    let template = registry.get(key).map_err(|_| VoxError::UnresolvedInclude {
        template: stage_key.to_string(),
        include: key.to_string(),
    })?;
    let expanded = expand(registry, template, params)?;

    let mut lines = expanded.as_str().lines();
    let header = lines
        .by_ref()
        .find(|l| !l.trim().is_empty() && !l.trim().starts_with('#'))
        .unwrap_or("");
    let formals = parse_routine_header(key, header)?;

    if formals.len() != actuals.len() {
        return Err(VoxError::MalformedDirective {
            template: stage_key.to_string(),
            message: format!(
                "routine {key} takes {} arguments, call supplies {}",
                formals.len(),
                actuals.len()
            ),
        });
    }

    let mut body = String::new();
    for line in lines {
        body.push_str(&substitute_tokens(line, &formals, actuals, call_site));
        body.push('\n');
    }
    Ok(body)
}

/// Parses `%routine <name> <formal>, <formal>, ...`, returning formal names
/// without their `$` sigil.
fn parse_routine_header<'a>(key: &str, header: &'a str) -> Result<Vec<&'a str>> {
    let rest = header
        .trim()
        .strip_prefix("%routine")
        .ok_or_else(|| VoxError::MalformedDirective {
            template: key.to_string(),
            message: "routine fragment must start with a %routine header".to_string(),
        })?;
    let rest = rest.trim();
    let (_name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    if args.trim().is_empty() {
        return Ok(Vec::new());
    }
    args.split(',')
        .map(|formal| {
            formal
                .trim()
                .strip_prefix('$')
                .ok_or_else(|| VoxError::MalformedDirective {
                    template: key.to_string(),
                    message: format!("routine formal \"{}\" must start with $", formal.trim()),
                })
        })
        .collect()
}

/// Rewrites every `$ident` token in `line`: formals become the caller's
/// argument text, everything else moves into the call site's namespace.
fn substitute_tokens(line: &str, formals: &[&str], actuals: &[&str], call_site: u32) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let start = i + 1;
        let mut end = start;
        while let Some(&(j, nc)) = chars.peek() {
            if nc.is_ascii_alphanumeric() || nc == '_' {
                end = j + nc.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        let ident = &line[start..end];
        if ident.is_empty() {
            out.push('$');
        } else if let Some(pos) = formals.iter().position(|f| *f == ident) {
            out.push_str(actuals[pos]);
        } else {
            out.push_str(&format!("$c{call_site}_{ident}"));
        }
    }
    out
}
