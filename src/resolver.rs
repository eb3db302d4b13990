use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::debug;

use crate::encoder::{self, ValueAtom};
use crate::error::BuildError;
use crate::statement::{parse_literal, Statement, StatementKind};

/// Iteration cap for label resolution. Exceeding it means the layout is
/// oscillating and the build must abort rather than emit from an
/// unconverged table.
pub const MAX_PASSES: usize = 20;

/// Symbol name to resolved 16-bit value. Built up by the resolver, then
/// moved into the emitter and never mutated again.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolTable {
    map: HashMap<String, u16>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    pub fn get(&self, name: &str) -> Option<u16> {
        self.map.get(name).copied()
    }

    pub fn insert(&mut self, name: &str, value: u16) {
        self.map.insert(name.to_string(), value);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Evaluate a literal or a symbol reference.
    pub fn eval(&self, s: &str) -> Option<u16> {
        parse_literal(s).or_else(|| self.get(s.trim()))
    }
}

/// Resolve every label to a stable address by fixed-point iteration.
///
/// Instruction sizes depend on operand values (zero page vs absolute), and
/// operand values depend on label addresses, which depend on instruction
/// sizes. Each pass walks the statement list with the previous pass's
/// table; convergence is a pass that moves no label. Returns the frozen
/// table and the number of passes taken.
pub fn resolve(
    statements: &[Statement],
    root: &Path,
) -> Result<(SymbolTable, usize), BuildError> {
    let mut table = SymbolTable::new();
    // constants are compile-time literals; seed them before the first pass
    for stmt in statements {
        if let StatementKind::ConstantAssign { name, value } = &stmt.kind {
            table.insert(name, *value);
        }
    }
    for pass in 1..=MAX_PASSES {
        let (next, changes) = run_pass(statements, &table, root);
        table = next;
        debug!("pass {}: {} label changes", pass, changes);
        if changes == 0 {
            check_resolved(statements, &table)?;
            return Ok((table, pass));
        }
    }
    Err(BuildError::Convergence { passes: MAX_PASSES })
}

/// One layout pass. Labels bind to the running cursor; sizes come from the
/// previous pass's table so unresolved forward references bias wide.
fn run_pass(statements: &[Statement], prev: &SymbolTable, root: &Path) -> (SymbolTable, usize) {
    let mut next = prev.clone();
    let mut cursor: u32 = 0;
    let mut changes = 0;

    for stmt in statements {
        match &stmt.kind {
            StatementKind::ConstantAssign { name, value } => {
                // compile-time constants are never layout-dependent and
                // never count as changes
                next.insert(name, *value);
            }
            StatementKind::LabelDef { name } => {
                let addr = (cursor & 0xFFFF) as u16;
                if prev.get(name) != Some(addr) {
                    changes += 1;
                }
                next.insert(name, addr);
            }
            StatementKind::Org { addr } => cursor = *addr as u32,
            StatementKind::Byte { args } => cursor += args.len() as u32,
            StatementKind::Word { args } => cursor += 2 * args.len() as u32,
            StatementKind::IncludeBinary { path } => {
                cursor += binary_len(root, path);
            }
            StatementKind::Instruction { mnemonic, operand } => {
                cursor += encoder::instruction_size(mnemonic, operand, prev) as u32;
            }
        }
    }

    (next, changes)
}

/// Size of an included binary. A missing file counts as zero here; the
/// emitter reports the fatal error when it actually reads the file.
fn binary_len(root: &Path, path: &str) -> u32 {
    fs::metadata(root.join(path))
        .map(|m| m.len() as u32)
        .unwrap_or(0)
}

/// Every symbol referenced by a data directive or instruction operand must
/// be bound before emission starts.
fn check_resolved(statements: &[Statement], table: &SymbolTable) -> Result<(), BuildError> {
    let unresolved = |name: &str, stmt: &Statement| BuildError::UnresolvedSymbol {
        name: name.to_string(),
        line: stmt.text.clone(),
    };

    for stmt in statements {
        match &stmt.kind {
            StatementKind::Byte { args } | StatementKind::Word { args } => {
                for arg in args {
                    if table.eval(arg).is_none() {
                        return Err(unresolved(arg, stmt));
                    }
                }
            }
            StatementKind::Instruction { operand, .. } => {
                if let Some(form) = encoder::parse_operand(operand) {
                    if let Some(ValueAtom::Symbol(name)) = form.atom() {
                        if table.get(name).is_none() {
                            return Err(unresolved(name, stmt));
                        }
                    }
                }
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn parse_all(lines: &[&str]) -> Vec<Statement> {
        lines.iter().map(|l| Statement::parse(l).unwrap()).collect()
    }

    fn root() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    }

    #[test]
    fn test_resolve_simple_program() {
        let statements = parse_all(&[
            ".org $8000",
            "Reset:",
            "nop",
            "nop",
            "jmp Reset",
        ]);
        let (table, _) = resolve(&statements, &root()).unwrap();
        assert_eq!(table.get("Reset"), Some(0x8000));
    }

    #[test]
    fn test_resolve_seeds_constants_first() {
        // Buttons is defined after use; the constant still seeds the first
        // pass, so the load gets its zero page size immediately.
        let statements = parse_all(&[
            ".org $8000",
            "Start:",
            "lda Buttons",
            "After:",
            "Buttons=$00",
        ]);
        let (table, _) = resolve(&statements, &root()).unwrap();
        assert_eq!(table.get("Buttons"), Some(0x0000));
        assert_eq!(table.get("After"), Some(0x8002));
    }

    #[test]
    fn test_resolve_forward_reference_bias() {
        // Main jumps forward to a label that only settles in a later pass;
        // the jump holds its wide 3-byte form throughout.
        let statements = parse_all(&[
            ".org $8000",
            "Main:",
            "jmp Done",
            "nop",
            "Done:",
        ]);
        let (table, passes) = resolve(&statements, &root()).unwrap();
        assert_eq!(table.get("Main"), Some(0x8000));
        assert_eq!(table.get("Done"), Some(0x8004));
        assert!(passes >= 2);
    }

    #[test]
    fn test_resolve_is_a_fixed_point() {
        // replaying one more pass over the converged table moves nothing
        let statements = parse_all(&[
            "NmiReady=$05",
            ".org $8000",
            "Reset:",
            "lda #$00",
            "sta NmiReady",
            "Loop:",
            "bne Loop",
            "jmp Reset",
            ".org $FFFA",
            ".word Reset",
        ]);
        let (table, _) = resolve(&statements, &root()).unwrap();
        let (replayed, changes) = run_pass(&statements, &table, &root());
        assert_eq!(changes, 0);
        assert_eq!(replayed, table);
    }

    #[test]
    fn test_resolve_directive_sizes() {
        let statements = parse_all(&[
            ".org $8000",
            ".byte $01,$02,$03",
            "AfterBytes:",
            ".word $1234,AfterBytes",
            "AfterWords:",
        ]);
        let (table, _) = resolve(&statements, &root()).unwrap();
        assert_eq!(table.get("AfterBytes"), Some(0x8003));
        assert_eq!(table.get("AfterWords"), Some(0x8007));
    }

    #[test]
    fn test_resolve_rejects_undefined_symbol() {
        let statements = parse_all(&[".org $8000", "jmp Nowhere"]);
        let err = resolve(&statements, &root()).unwrap_err();
        match err {
            BuildError::UnresolvedSymbol { name, .. } => assert_eq!(name, "Nowhere"),
            other => panic!("expected UnresolvedSymbol, got {:?}", other),
        }
    }

    #[test]
    fn test_resolve_rejects_undefined_data_symbol() {
        let statements = parse_all(&[".org $FFFA", ".word Reset"]);
        assert!(matches!(
            resolve(&statements, &root()),
            Err(BuildError::UnresolvedSymbol { .. })
        ));
    }

    #[test]
    fn test_missing_incbin_sizes_zero() {
        // resolution proceeds; the emitter turns the missing file into a
        // fatal error
        let statements = parse_all(&[
            ".org $8000",
            ".incbin \"no/such/file.bin\"",
            "After:",
        ]);
        let (table, _) = resolve(&statements, &root()).unwrap();
        assert_eq!(table.get("After"), Some(0x8000));
    }
}
