use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

use crate::resolver::SymbolTable;
use crate::statement::parse_literal;

// (opcode byte, mnemonic, addr mode) - official opcodes only.
// Ref: http://www.obelisk.me.uk/6502/reference.html
const OPCODE_TABLE: &'static [(u8, Opcode, AddrMode)] = {
    use AddrMode::*;
    use Opcode::*;
    &[
        // ADC
        (0x69, ADC, Immediate),
        (0x65, ADC, ZeroPage),
        (0x75, ADC, ZeroPageX),
        (0x6D, ADC, Absolute),
        (0x7D, ADC, AbsoluteX),
        (0x79, ADC, AbsoluteY),
        (0x61, ADC, IndexedIndirect),
        (0x71, ADC, IndirectIndexed),
        // AND
        (0x29, AND, Immediate),
        (0x25, AND, ZeroPage),
        (0x35, AND, ZeroPageX),
        (0x2D, AND, Absolute),
        (0x3D, AND, AbsoluteX),
        (0x39, AND, AbsoluteY),
        (0x21, AND, IndexedIndirect),
        (0x31, AND, IndirectIndexed),
        // ASL
        (0x0A, ASL, Implicit),
        (0x06, ASL, ZeroPage),
        (0x16, ASL, ZeroPageX),
        (0x0E, ASL, Absolute),
        (0x1E, ASL, AbsoluteX),
        // BCC
        (0x90, BCC, Relative),
        // BCS
        (0xB0, BCS, Relative),
        // BEQ
        (0xF0, BEQ, Relative),
        // BIT
        (0x24, BIT, ZeroPage),
        (0x2C, BIT, Absolute),
        // BMI
        (0x30, BMI, Relative),
        // BNE
        (0xD0, BNE, Relative),
        // BPL
        (0x10, BPL, Relative),
        // BRK
        (0x00, BRK, Implicit),
        // BVC
        (0x50, BVC, Relative),
        // BVS
        (0x70, BVS, Relative),
        // CLC
        (0x18, CLC, Implicit),
        // CLD
        (0xD8, CLD, Implicit),
        // CLI
        (0x58, CLI, Implicit),
        // CLV
        (0xB8, CLV, Implicit),
        // CMP
        (0xC9, CMP, Immediate),
        (0xC5, CMP, ZeroPage),
        (0xD5, CMP, ZeroPageX),
        (0xCD, CMP, Absolute),
        (0xDD, CMP, AbsoluteX),
        (0xD9, CMP, AbsoluteY),
        (0xC1, CMP, IndexedIndirect),
        (0xD1, CMP, IndirectIndexed),
        // CPX
        (0xE0, CPX, Immediate),
        (0xE4, CPX, ZeroPage),
        (0xEC, CPX, Absolute),
        // CPY
        (0xC0, CPY, Immediate),
        (0xC4, CPY, ZeroPage),
        (0xCC, CPY, Absolute),
        // DEC
        (0xC6, DEC, ZeroPage),
        (0xD6, DEC, ZeroPageX),
        (0xCE, DEC, Absolute),
        (0xDE, DEC, AbsoluteX),
        // DEX
        (0xCA, DEX, Implicit),
        // DEY
        (0x88, DEY, Implicit),
        // EOR
        (0x49, EOR, Immediate),
        (0x45, EOR, ZeroPage),
        (0x55, EOR, ZeroPageX),
        (0x4D, EOR, Absolute),
        (0x5D, EOR, AbsoluteX),
        (0x59, EOR, AbsoluteY),
        (0x41, EOR, IndexedIndirect),
        (0x51, EOR, IndirectIndexed),
        // INC
        (0xE6, INC, ZeroPage),
        (0xF6, INC, ZeroPageX),
        (0xEE, INC, Absolute),
        (0xFE, INC, AbsoluteX),
        // INX
        (0xE8, INX, Implicit),
        // INY
        (0xC8, INY, Implicit),
        // JMP
        (0x4C, JMP, Absolute),
        (0x6C, JMP, Indirect),
        // JSR
        (0x20, JSR, Absolute),
        // LDA
        (0xA9, LDA, Immediate),
        (0xA5, LDA, ZeroPage),
        (0xB5, LDA, ZeroPageX),
        (0xAD, LDA, Absolute),
        (0xBD, LDA, AbsoluteX),
        (0xB9, LDA, AbsoluteY),
        (0xA1, LDA, IndexedIndirect),
        (0xB1, LDA, IndirectIndexed),
        // LDX
        (0xA2, LDX, Immediate),
        (0xA6, LDX, ZeroPage),
        (0xB6, LDX, ZeroPageY),
        (0xAE, LDX, Absolute),
        (0xBE, LDX, AbsoluteY),
        // LDY
        (0xA0, LDY, Immediate),
        (0xA4, LDY, ZeroPage),
        (0xB4, LDY, ZeroPageX),
        (0xAC, LDY, Absolute),
        (0xBC, LDY, AbsoluteX),
        // LSR
        (0x4A, LSR, Implicit),
        (0x46, LSR, ZeroPage),
        (0x56, LSR, ZeroPageX),
        (0x4E, LSR, Absolute),
        (0x5E, LSR, AbsoluteX),
        // NOP
        (0xEA, NOP, Implicit),
        // ORA
        (0x09, ORA, Immediate),
        (0x05, ORA, ZeroPage),
        (0x15, ORA, ZeroPageX),
        (0x0D, ORA, Absolute),
        (0x1D, ORA, AbsoluteX),
        (0x19, ORA, AbsoluteY),
        (0x01, ORA, IndexedIndirect),
        (0x11, ORA, IndirectIndexed),
        // PHA
        (0x48, PHA, Implicit),
        // PHP
        (0x08, PHP, Implicit),
        // PLA
        (0x68, PLA, Implicit),
        // PLP
        (0x28, PLP, Implicit),
        // ROL
        (0x2A, ROL, Implicit),
        (0x26, ROL, ZeroPage),
        (0x36, ROL, ZeroPageX),
        (0x2E, ROL, Absolute),
        (0x3E, ROL, AbsoluteX),
        // ROR
        (0x6A, ROR, Implicit),
        (0x66, ROR, ZeroPage),
        (0x76, ROR, ZeroPageX),
        (0x6E, ROR, Absolute),
        (0x7E, ROR, AbsoluteX),
        // RTI
        (0x40, RTI, Implicit),
        // RTS
        (0x60, RTS, Implicit),
        // SBC
        (0xE9, SBC, Immediate),
        (0xE5, SBC, ZeroPage),
        (0xF5, SBC, ZeroPageX),
        (0xED, SBC, Absolute),
        (0xFD, SBC, AbsoluteX),
        (0xF9, SBC, AbsoluteY),
        (0xE1, SBC, IndexedIndirect),
        (0xF1, SBC, IndirectIndexed),
        // SEC
        (0x38, SEC, Implicit),
        // SED
        (0xF8, SED, Implicit),
        // SEI
        (0x78, SEI, Implicit),
        // STA
        (0x85, STA, ZeroPage),
        (0x95, STA, ZeroPageX),
        (0x8D, STA, Absolute),
        (0x9D, STA, AbsoluteX),
        (0x99, STA, AbsoluteY),
        (0x81, STA, IndexedIndirect),
        (0x91, STA, IndirectIndexed),
        // STX
        (0x86, STX, ZeroPage),
        (0x96, STX, ZeroPageY),
        (0x8E, STX, Absolute),
        // STY
        (0x84, STY, ZeroPage),
        (0x94, STY, ZeroPageX),
        (0x8C, STY, Absolute),
        // TAX
        (0xAA, TAX, Implicit),
        // TAY
        (0xA8, TAY, Implicit),
        // TSX
        (0xBA, TSX, Implicit),
        // TXA
        (0x8A, TXA, Implicit),
        // TXS
        (0x9A, TXS, Implicit),
        // TYA
        (0x98, TYA, Implicit),
    ]
};

lazy_static! {
    static ref ENCODINGS: HashMap<(Opcode, AddrMode), u8> = OPCODE_TABLE
        .iter()
        .map(|(byte, opcode, mode)| ((*opcode, *mode), *byte))
        .collect();
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Opcode {
    ADC,
    AND,
    ASL,
    BCC,
    BCS,
    BEQ,
    BIT,
    BMI,
    BNE,
    BPL,
    BRK,
    BVC,
    BVS,
    CLC,
    CLD,
    CLI,
    CLV,
    CMP,
    CPX,
    CPY,
    DEC,
    DEX,
    DEY,
    EOR,
    INC,
    INX,
    INY,
    JMP,
    JSR,
    LDA,
    LDX,
    LDY,
    LSR,
    NOP,
    ORA,
    PHA,
    PHP,
    PLA,
    PLP,
    ROL,
    ROR,
    RTI,
    RTS,
    SBC,
    SEC,
    SED,
    SEI,
    STA,
    STX,
    STY,
    TAX,
    TAY,
    TSX,
    TXA,
    TXS,
    TYA,
}

impl Opcode {
    pub fn parse(mnemonic: &str) -> Option<Opcode> {
        use Opcode::*;
        let m = match mnemonic.to_ascii_uppercase().as_str() {
            "ADC" => ADC,
            "AND" => AND,
            "ASL" => ASL,
            "BCC" => BCC,
            "BCS" => BCS,
            "BEQ" => BEQ,
            "BIT" => BIT,
            "BMI" => BMI,
            "BNE" => BNE,
            "BPL" => BPL,
            "BRK" => BRK,
            "BVC" => BVC,
            "BVS" => BVS,
            "CLC" => CLC,
            "CLD" => CLD,
            "CLI" => CLI,
            "CLV" => CLV,
            "CMP" => CMP,
            "CPX" => CPX,
            "CPY" => CPY,
            "DEC" => DEC,
            "DEX" => DEX,
            "DEY" => DEY,
            "EOR" => EOR,
            "INC" => INC,
            "INX" => INX,
            "INY" => INY,
            "JMP" => JMP,
            "JSR" => JSR,
            "LDA" => LDA,
            "LDX" => LDX,
            "LDY" => LDY,
            "LSR" => LSR,
            "NOP" => NOP,
            "ORA" => ORA,
            "PHA" => PHA,
            "PHP" => PHP,
            "PLA" => PLA,
            "PLP" => PLP,
            "ROL" => ROL,
            "ROR" => ROR,
            "RTI" => RTI,
            "RTS" => RTS,
            "SBC" => SBC,
            "SEC" => SEC,
            "SED" => SED,
            "SEI" => SEI,
            "STA" => STA,
            "STX" => STX,
            "STY" => STY,
            "TAX" => TAX,
            "TAY" => TAY,
            "TSX" => TSX,
            "TXA" => TXA,
            "TXS" => TXS,
            "TYA" => TYA,
            _ => return None,
        };
        Some(m)
    }

    pub fn is_branch(&self) -> bool {
        use Opcode::*;
        matches!(self, BCC | BCS | BEQ | BMI | BNE | BPL | BVC | BVS)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddrMode {
    Implicit,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndexedIndirect,
    IndirectIndexed,
    Relative,
}

impl AddrMode {
    fn name(&self) -> &'static str {
        match self {
            Self::Implicit => "implied",
            Self::Immediate => "immediate",
            Self::ZeroPage => "zero page",
            Self::ZeroPageX => "zero page,X",
            Self::ZeroPageY => "zero page,Y",
            Self::Absolute => "absolute",
            Self::AbsoluteX => "absolute,X",
            Self::AbsoluteY => "absolute,Y",
            Self::Indirect => "indirect",
            Self::IndexedIndirect => "indexed indirect",
            Self::IndirectIndexed => "indirect indexed",
            Self::Relative => "relative",
        }
    }
}

fn has_mode(opcode: Opcode, mode: AddrMode) -> bool {
    ENCODINGS.contains_key(&(opcode, mode))
}

/// A parsed operand, before values are resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum OperandForm {
    None,
    Immediate(ValueAtom),
    Plain(ValueAtom),
    IndexedX(ValueAtom),
    IndexedY(ValueAtom),
    Indirect(ValueAtom),
    IndexedIndirect(ValueAtom),
    IndirectIndexed(ValueAtom),
}

impl OperandForm {
    pub fn atom(&self) -> Option<&ValueAtom> {
        match self {
            OperandForm::None => None,
            OperandForm::Immediate(a)
            | OperandForm::Plain(a)
            | OperandForm::IndexedX(a)
            | OperandForm::IndexedY(a)
            | OperandForm::Indirect(a)
            | OperandForm::IndexedIndirect(a)
            | OperandForm::IndirectIndexed(a) => Some(a),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValueAtom {
    Literal(u16),
    Symbol(String),
}

pub fn parse_operand(operand: &str) -> Option<OperandForm> {
    lazy_static! {
        static ref IMMEDIATE_RE: Regex = Regex::new(r"^#(.+)$").unwrap();
        static ref INDEXED_INDIRECT_RE: Regex =
            Regex::new(r"(?i)^\(([^,()]+) *, *x\)$").unwrap();
        static ref INDIRECT_INDEXED_RE: Regex =
            Regex::new(r"(?i)^\(([^,()]+)\) *, *y$").unwrap();
        static ref INDIRECT_RE: Regex = Regex::new(r"^\(([^,()]+)\)$").unwrap();
        static ref INDEXED_X_RE: Regex = Regex::new(r"(?i)^([^,()]+) *, *x$").unwrap();
        static ref INDEXED_Y_RE: Regex = Regex::new(r"(?i)^([^,()]+) *, *y$").unwrap();
    }

    if operand.is_empty() {
        Some(OperandForm::None)
    } else if let Some(cap) = IMMEDIATE_RE.captures(operand) {
        Some(OperandForm::Immediate(classify_atom(&cap[1])?))
    } else if let Some(cap) = INDEXED_INDIRECT_RE.captures(operand) {
        Some(OperandForm::IndexedIndirect(classify_atom(&cap[1])?))
    } else if let Some(cap) = INDIRECT_INDEXED_RE.captures(operand) {
        Some(OperandForm::IndirectIndexed(classify_atom(&cap[1])?))
    } else if let Some(cap) = INDIRECT_RE.captures(operand) {
        Some(OperandForm::Indirect(classify_atom(&cap[1])?))
    } else if let Some(cap) = INDEXED_X_RE.captures(operand) {
        Some(OperandForm::IndexedX(classify_atom(&cap[1])?))
    } else if let Some(cap) = INDEXED_Y_RE.captures(operand) {
        Some(OperandForm::IndexedY(classify_atom(&cap[1])?))
    } else {
        Some(OperandForm::Plain(classify_atom(operand)?))
    }
}

fn classify_atom(s: &str) -> Option<ValueAtom> {
    lazy_static! {
        static ref SYMBOL_RE: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    }
    let s = s.trim();
    if let Some(value) = parse_literal(s) {
        Some(ValueAtom::Literal(value))
    } else if SYMBOL_RE.is_match(s) {
        Some(ValueAtom::Symbol(s.to_string()))
    } else {
        None
    }
}

fn eval_atom(atom: &ValueAtom, symbols: &SymbolTable) -> Option<u16> {
    match atom {
        ValueAtom::Literal(value) => Some(*value),
        ValueAtom::Symbol(name) => symbols.get(name),
    }
}

/// Predicted size of one instruction in bytes.
///
/// The resolver calls this every pass with the previous pass's table, so
/// forward references must bias wide: growing an address in a later pass is
/// recoverable, shrinking after apparent convergence is not. Mode selection
/// here must agree exactly with `encode`, which shares the same operand
/// parser and opcode table.
pub fn instruction_size(mnemonic: &str, operand: &str, symbols: &SymbolTable) -> u8 {
    let opcode = Opcode::parse(mnemonic);
    if opcode.map(|op| op.is_branch()).unwrap_or(false) {
        return 2;
    }
    if operand.is_empty() {
        return 1;
    }
    // An opcode that a zero-page mode cannot be confirmed for encodes wide.
    let zp_fits = |mode: AddrMode, atom: &ValueAtom| match eval_atom(atom, symbols) {
        Some(value) => value < 256 && opcode.map(|op| has_mode(op, mode)).unwrap_or(true),
        None => false,
    };
    match parse_operand(operand) {
        Some(OperandForm::None) => 1,
        Some(OperandForm::Immediate(_)) => 2,
        Some(OperandForm::IndexedIndirect(_)) | Some(OperandForm::IndirectIndexed(_)) => 2,
        Some(OperandForm::Indirect(_)) => 3,
        Some(OperandForm::Plain(atom)) => {
            if zp_fits(AddrMode::ZeroPage, &atom) {
                2
            } else {
                3
            }
        }
        Some(OperandForm::IndexedX(atom)) => {
            if zp_fits(AddrMode::ZeroPageX, &atom) {
                2
            } else {
                3
            }
        }
        Some(OperandForm::IndexedY(atom)) => {
            if zp_fits(AddrMode::ZeroPageY, &atom) {
                2
            } else {
                3
            }
        }
        // Malformed operands size wide; emission reports the real error.
        None => 3,
    }
}

/// Encode one instruction at `addr` into its exact opcode bytes.
///
/// Fails on unknown mnemonics, malformed or unresolved operands,
/// unsupported mnemonic/mode combinations, and branch displacements
/// outside [-128, 127].
pub fn encode(
    mnemonic: &str,
    operand: &str,
    addr: u16,
    symbols: &SymbolTable,
) -> Result<Vec<u8>, String> {
    enum Payload {
        None,
        Byte(u8),
        Word(u16),
    }

    let opcode = Opcode::parse(mnemonic)
        .ok_or_else(|| format!("unrecognized mnemonic '{}'", mnemonic))?;
    let form = parse_operand(operand)
        .ok_or_else(|| format!("malformed operand '{}'", operand))?;

    let resolve = |atom: &ValueAtom| -> Result<u16, String> {
        match atom {
            ValueAtom::Literal(value) => Ok(*value),
            ValueAtom::Symbol(name) => symbols
                .get(name)
                .ok_or_else(|| format!("unknown symbol '{}'", name)),
        }
    };
    let byte_sized = |value: u16, what: &str| -> Result<u8, String> {
        if value > 0xFF {
            Err(format!("{} ${:04X} does not fit in one byte", what, value))
        } else {
            Ok(value as u8)
        }
    };

    let (mode, payload) = match &form {
        OperandForm::None => (AddrMode::Implicit, Payload::None),
        OperandForm::Immediate(atom) => {
            let value = resolve(atom)?;
            (
                AddrMode::Immediate,
                Payload::Byte(byte_sized(value, "immediate value")?),
            )
        }
        OperandForm::Plain(atom) => {
            let value = resolve(atom)?;
            if opcode.is_branch() {
                // Displacement is relative to the address after the 2-byte
                // branch instruction.
                let disp = value as i32 - (addr as i32 + 2);
                if disp < -128 || disp > 127 {
                    return Err(format!("branch target out of range ({:+})", disp));
                }
                (AddrMode::Relative, Payload::Byte(disp as i8 as u8))
            } else if value < 256 && has_mode(opcode, AddrMode::ZeroPage) {
                (AddrMode::ZeroPage, Payload::Byte(value as u8))
            } else {
                (AddrMode::Absolute, Payload::Word(value))
            }
        }
        OperandForm::IndexedX(atom) => {
            let value = resolve(atom)?;
            if value < 256 && has_mode(opcode, AddrMode::ZeroPageX) {
                (AddrMode::ZeroPageX, Payload::Byte(value as u8))
            } else {
                (AddrMode::AbsoluteX, Payload::Word(value))
            }
        }
        OperandForm::IndexedY(atom) => {
            let value = resolve(atom)?;
            if value < 256 && has_mode(opcode, AddrMode::ZeroPageY) {
                (AddrMode::ZeroPageY, Payload::Byte(value as u8))
            } else {
                (AddrMode::AbsoluteY, Payload::Word(value))
            }
        }
        OperandForm::Indirect(atom) => (AddrMode::Indirect, Payload::Word(resolve(atom)?)),
        OperandForm::IndexedIndirect(atom) => {
            let value = resolve(atom)?;
            (
                AddrMode::IndexedIndirect,
                Payload::Byte(byte_sized(value, "indirect address")?),
            )
        }
        OperandForm::IndirectIndexed(atom) => {
            let value = resolve(atom)?;
            (
                AddrMode::IndirectIndexed,
                Payload::Byte(byte_sized(value, "indirect address")?),
            )
        }
    };

    let opcode_byte = ENCODINGS.get(&(opcode, mode)).ok_or_else(|| {
        format!("{:?} does not support {} addressing", opcode, mode.name())
    })?;
    let mut bytes = vec![*opcode_byte];
    match payload {
        Payload::None => {}
        Payload::Byte(b) => bytes.push(b),
        Payload::Word(w) => bytes.extend_from_slice(&w.to_le_bytes()),
    }
    Ok(bytes)
}
