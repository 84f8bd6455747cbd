//! Temporary Register Allocation
//!
//! The assembly target exposes a small fixed pool of temporary registers.
//! Named temporaries (`$name` tokens) are assigned to hardware registers
//! first-fit over their live ranges. Generated programs are straight-line
//! code, so liveness is exact: a temporary is live from its first to its
//! last occurrence in program order, and a register is reusable as soon as
//! the interval ends.

use rustc_hash::FxHashMap;

use crate::errors::{Result, VoxError};

/// One temporary's assignment, exposed for static-analysis tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempAssignment {
    /// The logical temporary name (without the `$` sigil).
    pub name: String,
    /// The hardware register index it was assigned.
    pub register: u32,
    /// First instruction index that mentions the temporary.
    pub first_use: usize,
    /// Last instruction index that mentions the temporary.
    pub last_use: usize,
}

/// The full allocation outcome for one stage.
#[derive(Debug, Clone, Default)]
pub struct RegisterAllocation {
    pub assignments: Vec<TempAssignment>,
    /// Registers actually used (peak pressure).
    pub used_registers: u32,
}

/// Statement keywords that are declarations rather than instructions.
const DECLARATION_KEYWORDS: [&str; 7] = [
    "PARAM", "TEMP", "ATTRIB", "OUTPUT", "OPTION", "ALIAS", "ADDRESS",
];

/// True for a line that counts against the instruction ceiling.
#[must_use]
pub fn is_instruction(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("!!") {
        return false;
    }
    if trimmed == "END" {
        return false;
    }
    let keyword = trimmed
        .split(|c: char| c.is_whitespace() || c == ';')
        .next()
        .unwrap_or("");
    !DECLARATION_KEYWORDS.contains(&keyword)
}

/// Counts the instructions of an assembly program.
#[must_use]
pub fn count_instructions(source: &str) -> usize {
    source.lines().filter(|l| is_instruction(l)).count()
}

/// Assigns every `$name` temporary to a hardware register and rewrites the
/// source to use `R<index>` names, declaring the pool in a `TEMP` statement
/// after the program header.
///
/// Fails with [`VoxError::RegisterExhausted`] when more temporaries are
/// simultaneously live than the pool holds.
pub fn allocate_temporaries(
    source: &str,
    max_temporaries: u32,
) -> Result<(String, RegisterAllocation)> {
    // Live ranges, in instruction order.
    let mut order: Vec<String> = Vec::new();
    let mut ranges: FxHashMap<String, (usize, usize)> = FxHashMap::default();
    let mut instr_index = 0usize;
    for line in source.lines() {
        if !is_instruction(line) {
            continue;
        }
        for ident in temp_tokens(line) {
            ranges
                .entry(ident.to_string())
                .and_modify(|(_, last)| *last = instr_index)
                .or_insert_with(|| {
                    order.push(ident.to_string());
                    (instr_index, instr_index)
                });
        }
        instr_index += 1;
    }

    // Linear-scan first-fit over intervals sorted by first use.
    let mut active: Vec<(usize, u32)> = Vec::new(); // (last_use, register)
    let mut free: Vec<u32> = Vec::new();
    let mut next_register = 0u32;
    let mut assignments = Vec::with_capacity(order.len());
    let mut mapping: FxHashMap<String, u32> = FxHashMap::default();

    for name in &order {
        let (first_use, last_use) = ranges[name];

        // Expire intervals that ended strictly before this one starts.
        active.retain(|&(active_last, register)| {
            if active_last < first_use {
                free.push(register);
                false
            } else {
                true
            }
        });
        // Lowest-numbered free register first.
        free.sort_unstable();

        let register = if let Some(register) = free.first().copied() {
            free.remove(0);
            register
        } else if next_register < max_temporaries {
            let register = next_register;
            next_register += 1;
            register
        } else {
            return Err(VoxError::RegisterExhausted {
                file: "temporary",
                limit: max_temporaries,
            });
        };

        active.push((last_use, register));
        mapping.insert(name.clone(), register);
        assignments.push(TempAssignment {
            name: name.clone(),
            register,
            first_use,
            last_use,
        });
    }

    let rewritten = rewrite_temps(source, &mapping, next_register);
    Ok((
        rewritten,
        RegisterAllocation {
            assignments,
            used_registers: next_register,
        },
    ))
}

/// Extracts the `$ident` tokens of one line.
fn temp_tokens(line: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let bytes = line.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len()
                && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
            {
                end += 1;
            }
            if end > start {
                tokens.push(&line[start..end]);
            }
            i = end;
        } else {
            i += 1;
        }
    }
    tokens
}

/// Rewrites `$name` tokens to `R<index>` and declares the register pool.
fn rewrite_temps(source: &str, mapping: &FxHashMap<String, u32>, used: u32) -> String {
    let mut out = String::with_capacity(source.len());
    let mut temp_declared = used == 0;

    for line in source.lines() {
        let mut rewritten = String::with_capacity(line.len());
        let bytes = line.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'$' {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len()
                    && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_')
                {
                    end += 1;
                }
                if end > start {
                    let ident = &line[start..end];
                    match mapping.get(ident) {
                        Some(register) => rewritten.push_str(&format!("R{register}")),
                        None => rewritten.push_str(&line[i..end]),
                    }
                    i = end;
                    continue;
                }
                rewritten.push('$');
                i += 1;
            } else {
                // Copy one whole UTF-8 character.
                let ch_len = line[i..].chars().next().map_or(1, char::len_utf8);
                rewritten.push_str(&line[i..i + ch_len]);
                i += ch_len;
            }
        }

        out.push_str(&rewritten);
        out.push('\n');

        // Declare the pool right after the `!!` program header.
        if !temp_declared && line.trim_start().starts_with("!!") {
            let names: Vec<String> = (0..used).map(|r| format!("R{r}")).collect();
            out.push_str(&format!("TEMP {};\n", names.join(", ")));
            temp_declared = true;
        }
    }
    out
}
