use std::fs;
use std::path::Path;

use log::warn;

use crate::encoder;
use crate::error::BuildError;
use crate::resolver::SymbolTable;
use crate::statement::{Statement, StatementKind};

pub const IMAGE_SIZE: usize = 65536;

/// The full 64KB address space plus per-address written flags and running
/// min/max bookkeeping. Owned by the emitter while it writes; read-only
/// once handed to the packager.
pub struct MemoryImage {
    bytes: Vec<u8>,
    written: Vec<bool>,
    min_addr: usize,
    max_addr: usize,
}

impl MemoryImage {
    pub fn new() -> MemoryImage {
        MemoryImage {
            bytes: vec![0; IMAGE_SIZE],
            written: vec![false; IMAGE_SIZE],
            min_addr: IMAGE_SIZE,
            max_addr: 0,
        }
    }

    fn write(&mut self, addr: u32, value: u8) {
        let addr = addr as usize;
        if addr >= IMAGE_SIZE {
            warn!("dropping write of ${:02X} beyond $FFFF", value);
            return;
        }
        self.bytes[addr] = value;
        self.written[addr] = true;
        if addr < self.min_addr {
            self.min_addr = addr;
        }
        if addr > self.max_addr {
            self.max_addr = addr;
        }
    }

    pub fn byte(&self, addr: u16) -> u8 {
        self.bytes[addr as usize]
    }

    pub fn is_written(&self, addr: u16) -> bool {
        self.written[addr as usize]
    }

    pub fn slice(&self, start: usize, end: usize) -> &[u8] {
        &self.bytes[start..end]
    }

    /// Lowest and highest written address, if anything was written at all.
    pub fn written_range(&self) -> Option<(u16, u16)> {
        if self.min_addr == IMAGE_SIZE {
            None
        } else {
            Some((self.min_addr as u16, self.max_addr as u16))
        }
    }
}

impl Default for MemoryImage {
    fn default() -> Self {
        MemoryImage::new()
    }
}

/// Final pass: walk the statements once more with the converged table and
/// write real bytes into the image.
///
/// The resolver has already bound every referenced symbol, so evaluation
/// failures here are build bugs surfaced as errors, not panics. Each
/// instruction's emitted length is checked against its resolved size; a
/// mismatch would silently shift every later address, so it aborts the
/// build instead.
pub fn emit(
    statements: &[Statement],
    symbols: SymbolTable,
    root: &Path,
) -> Result<MemoryImage, BuildError> {
    let mut image = MemoryImage::new();
    let mut cursor: u32 = 0;

    for stmt in statements {
        match &stmt.kind {
            StatementKind::LabelDef { .. } | StatementKind::ConstantAssign { .. } => {}
            StatementKind::Org { addr } => cursor = *addr as u32,
            StatementKind::Byte { args } => {
                for arg in args {
                    let value = eval_arg(arg, &symbols, stmt)?;
                    if value > 0xFF {
                        return Err(BuildError::syntax(
                            &stmt.text,
                            format!("byte value ${:04X} does not fit in one byte", value),
                        ));
                    }
                    image.write(cursor, value as u8);
                    cursor += 1;
                }
            }
            StatementKind::Word { args } => {
                for arg in args {
                    let value = eval_arg(arg, &symbols, stmt)?;
                    for byte in value.to_le_bytes() {
                        image.write(cursor, byte);
                        cursor += 1;
                    }
                }
            }
            StatementKind::IncludeBinary { path } => {
                let full = root.join(path);
                let content = fs::read(&full).map_err(|e| BuildError::io(full, e))?;
                for byte in content {
                    image.write(cursor, byte);
                    cursor += 1;
                }
            }
            StatementKind::Instruction { mnemonic, operand } => {
                let addr = (cursor & 0xFFFF) as u16;
                let bytes = encoder::encode(mnemonic, operand, addr, &symbols).map_err(
                    |reason| BuildError::Encoding {
                        line: stmt.text.clone(),
                        addr,
                        reason,
                    },
                )?;
                let resolved = encoder::instruction_size(mnemonic, operand, &symbols) as usize;
                if bytes.len() != resolved {
                    return Err(BuildError::Encoding {
                        line: stmt.text.clone(),
                        addr,
                        reason: format!(
                            "emitted {} bytes where {} were resolved",
                            bytes.len(),
                            resolved
                        ),
                    });
                }
                for byte in bytes {
                    image.write(cursor, byte);
                    cursor += 1;
                }
            }
        }
    }

    Ok(image)
}

fn eval_arg(arg: &str, symbols: &SymbolTable, stmt: &Statement) -> Result<u16, BuildError> {
    symbols.eval(arg).ok_or_else(|| BuildError::UnresolvedSymbol {
        name: arg.to_string(),
        line: stmt.text.clone(),
    })
}
