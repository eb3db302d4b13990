use lazy_static::lazy_static;
use regex::Regex;

use crate::error::BuildError;

/// One normalized source line, classified.
///
/// The original line text is kept for diagnostics; errors always quote it.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: StatementKind,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    LabelDef { name: String },
    ConstantAssign { name: String, value: u16 },
    Org { addr: u16 },
    Byte { args: Vec<String> },
    Word { args: Vec<String> },
    IncludeBinary { path: String },
    Instruction { mnemonic: String, operand: String },
}

impl Statement {
    /// Classify one normalized line. Comments and blank lines are gone by
    /// the time a line reaches here (see `source`).
    pub fn parse(line: &str) -> Result<Statement, BuildError> {
        lazy_static! {
            static ref LABEL_RE: Regex = Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*):$").unwrap();
            static ref ASSIGN_RE: Regex = Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*) *= *(.+)$").unwrap();
            static ref INCBIN_RE: Regex = Regex::new(r#"^\.incbin +"([^"]+)"$"#).unwrap();
            static ref INSTRUCTION_RE: Regex = Regex::new(r"^([A-Za-z]{3})(?: +(.*))?$").unwrap();
        }

        let kind = if line.contains('=') && !line.starts_with('.') {
            let cap = ASSIGN_RE
                .captures(line)
                .ok_or_else(|| BuildError::syntax(line, "malformed constant assignment"))?;
            let value = parse_literal(&cap[2]).ok_or_else(|| {
                BuildError::syntax(line, "constant value is not a 16-bit literal")
            })?;
            StatementKind::ConstantAssign {
                name: cap[1].to_string(),
                value,
            }
        } else if let Some(cap) = LABEL_RE.captures(line) {
            StatementKind::LabelDef {
                name: cap[1].to_string(),
            }
        } else if let Some(rest) = line.strip_prefix(".org") {
            let addr = parse_literal(rest.trim())
                .ok_or_else(|| BuildError::syntax(line, "malformed org literal"))?;
            StatementKind::Org { addr }
        } else if let Some(rest) = line.strip_prefix(".byte") {
            StatementKind::Byte {
                args: split_args(line, rest)?,
            }
        } else if let Some(rest) = line.strip_prefix(".word") {
            StatementKind::Word {
                args: split_args(line, rest)?,
            }
        } else if line.starts_with(".incbin") {
            let cap = INCBIN_RE
                .captures(line)
                .ok_or_else(|| BuildError::syntax(line, "malformed incbin directive"))?;
            StatementKind::IncludeBinary {
                path: cap[1].to_string(),
            }
        } else if line.starts_with(".include") {
            // Includes are flattened by the source normalizer before parsing.
            return Err(BuildError::syntax(line, "include not flattened"));
        } else if line.starts_with('.') {
            return Err(BuildError::syntax(line, "unknown directive"));
        } else if let Some(cap) = INSTRUCTION_RE.captures(line) {
            StatementKind::Instruction {
                mnemonic: cap[1].to_ascii_uppercase(),
                operand: cap.get(2).map(|m| m.as_str().trim().to_string()).unwrap_or_default(),
            }
        } else {
            return Err(BuildError::syntax(line, "unrecognized statement"));
        };

        Ok(Statement {
            kind,
            text: line.to_string(),
        })
    }
}

fn split_args(line: &str, rest: &str) -> Result<Vec<String>, BuildError> {
    let args: Vec<String> = rest
        .trim()
        .split(',')
        .map(|a| a.trim().to_string())
        .collect();
    if args.iter().any(|a| a.is_empty()) {
        return Err(BuildError::syntax(line, "empty data argument"));
    }
    Ok(args)
}

/// Parse an integer literal: `$` hex, `%` binary, or decimal. Values must
/// fit in 16 bits.
pub fn parse_literal(s: &str) -> Option<u16> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('$') {
        u16::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = s.strip_prefix('%') {
        u16::from_str_radix(bin, 2).ok()
    } else {
        s.parse::<u16>().ok()
    }
}

#[cfg(test)]
mod tests {
    use itertools::izip;

    use super::*;

    #[test]
    fn test_parse_literal() {
        let inputs = vec!["$8000", "$00", "%00000101", "42", "0"];
        let expected = vec![0x8000u16, 0x00, 0b101, 42, 0];
        for (input, value) in izip!(inputs, expected) {
            assert_eq!(parse_literal(input), Some(value), "literal {}", input);
        }
        for bad in ["$GG", "$12345", "%2", "65536", "start", ""] {
            assert_eq!(parse_literal(bad), None, "literal {}", bad);
        }
    }

    #[test]
    fn test_parse_label_and_constant() {
        let stmt = Statement::parse("Reset:").unwrap();
        assert_eq!(
            stmt.kind,
            StatementKind::LabelDef {
                name: "Reset".to_string()
            }
        );

        let stmt = Statement::parse("PPUCTRL=$2000").unwrap();
        assert_eq!(
            stmt.kind,
            StatementKind::ConstantAssign {
                name: "PPUCTRL".to_string(),
                value: 0x2000
            }
        );
        assert_eq!(stmt.text, "PPUCTRL=$2000");

        // a constant must be a literal, never layout-dependent
        assert!(Statement::parse("Vector=Reset").is_err());
    }

    #[test]
    fn test_parse_directives() {
        let codes = vec![
            ".org $8000",
            ".byte $01,$02,3",
            ".word Reset,$FFFA",
            ".incbin \"assets/game.chr\"",
        ];
        let kinds = vec![
            StatementKind::Org { addr: 0x8000 },
            StatementKind::Byte {
                args: vec!["$01".to_string(), "$02".to_string(), "3".to_string()],
            },
            StatementKind::Word {
                args: vec!["Reset".to_string(), "$FFFA".to_string()],
            },
            StatementKind::IncludeBinary {
                path: "assets/game.chr".to_string(),
            },
        ];
        for (code, kind) in izip!(codes, kinds) {
            assert_eq!(Statement::parse(code).unwrap().kind, kind, "{}", code);
        }
    }

    #[test]
    fn test_parse_instruction() {
        let codes = vec!["lda #$01", "STA $2007", "jmp (Vector)", "rts"];
        let kinds = vec![
            StatementKind::Instruction {
                mnemonic: "LDA".to_string(),
                operand: "#$01".to_string(),
            },
            StatementKind::Instruction {
                mnemonic: "STA".to_string(),
                operand: "$2007".to_string(),
            },
            StatementKind::Instruction {
                mnemonic: "JMP".to_string(),
                operand: "(Vector)".to_string(),
            },
            StatementKind::Instruction {
                mnemonic: "RTS".to_string(),
                operand: String::new(),
            },
        ];
        for (code, kind) in izip!(codes, kinds) {
            assert_eq!(Statement::parse(code).unwrap().kind, kind, "{}", code);
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in [
            ".org $GG",
            ".org",
            ".byte",
            ".byte $01,,$02",
            ".incbin game.chr",
            ".segment \"CODE\"",
            "count=Reset",
        ] {
            assert!(Statement::parse(bad).is_err(), "{}", bad);
        }
    }
}
