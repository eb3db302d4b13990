use std::fs;
use std::path::Path;

use bitflags::bitflags;
use log::warn;

use crate::emitter::MemoryImage;
use crate::error::BuildError;

pub const HEADER_SIZE: usize = 16;
pub const PRG_BANK_SIZE: usize = 16384;
pub const CHR_BANK_SIZE: usize = 8192;
/// NROM: two fixed 16KB PRG banks mapped at [$8000, $10000).
pub const PRG_ROM_SIZE: usize = 2 * PRG_BANK_SIZE;
pub const CHR_ROM_SIZE: usize = CHR_BANK_SIZE;
pub const PRG_ROM_START: usize = 0x8000;
pub const ROM_SIZE: usize = HEADER_SIZE + PRG_ROM_SIZE + CHR_ROM_SIZE;

const NES_TAG: [u8; 4] = [0x4E, 0x45, 0x53, 0x1A];
const MAPPER_ID: u8 = 0;

bitflags! {
    // iNES flags 6
    // 7  bit  0
    // ---- ----
    // NNNN FTBM
    // |||| |||+- Mirroring (0: horizontal; 1: vertical)
    // |||| ||+-- Battery-backed PRG RAM at $6000-$7FFF
    // |||| |+--- 512-byte trainer before PRG data
    // |||| +---- Four-screen VRAM
    // ++++------ Lower nibble of mapper number
    // Ref: https://www.nesdev.org/wiki/INES
    pub struct RomFlags: u8 {
        const MIRROR_VERTICAL = 0b0000_0001;
        const BATTERY         = 0b0000_0010;
        const TRAINER         = 0b0000_0100;
        const FOUR_SCREEN     = 0b0000_1000;
    }
}

/// The fixed 16-byte iNES header for this cartridge layout: 32KB PRG,
/// 8KB CHR, mapper 0, vertical mirroring, 9 reserved zero bytes.
pub fn header() -> [u8; HEADER_SIZE] {
    let mut header = [0u8; HEADER_SIZE];
    header[..4].copy_from_slice(&NES_TAG);
    header[4] = (PRG_ROM_SIZE / PRG_BANK_SIZE) as u8;
    header[5] = (CHR_ROM_SIZE / CHR_BANK_SIZE) as u8;
    header[6] = (MAPPER_ID & 0x0F) << 4 | RomFlags::MIRROR_VERTICAL.bits();
    header
}

/// Assemble the final cartridge bytes: header, the [$8000, $10000) slice
/// of the memory image, then the CHR data. Unwritten PRG bytes stay zero.
/// CHR data of the wrong length is padded or cut to exactly one bank.
pub fn package(image: &MemoryImage, chr: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ROM_SIZE);
    out.extend_from_slice(&header());
    out.extend_from_slice(image.slice(PRG_ROM_START, PRG_ROM_START + PRG_ROM_SIZE));
    if chr.len() != CHR_ROM_SIZE {
        warn!(
            "tile data is {} bytes, adjusting to {}",
            chr.len(),
            CHR_ROM_SIZE
        );
    }
    let take = chr.len().min(CHR_ROM_SIZE);
    out.extend_from_slice(&chr[..take]);
    out.resize(ROM_SIZE, 0);
    out
}

/// Read a prebuilt CHR asset. Missing art must not block a code build:
/// any read failure degrades to a blank bank with a warning.
pub fn load_tile_asset(path: &Path) -> Vec<u8> {
    match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("{}: {}; using blank tile bank", path.display(), e);
            vec![0; CHR_ROM_SIZE]
        }
    }
}

/// Write the finished image, truncating any previous file. Packaging is
/// done entirely in memory first, so a failed build never leaves a
/// partial file behind.
pub fn write_rom(path: &Path, bytes: &[u8]) -> Result<(), BuildError> {
    fs::write(path, bytes).map_err(|e| BuildError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = header();
        assert_eq!(&header[..4], &[0x4E, 0x45, 0x53, 0x1A]);
        assert_eq!(header[4], 2); // 32KB PRG
        assert_eq!(header[5], 1); // 8KB CHR
        assert_eq!(header[6], 0x01); // mapper 0, vertical mirroring
        assert_eq!(&header[7..], &[0u8; 9]);
    }

    #[test]
    fn test_package_shape() {
        let image = MemoryImage::new();
        let rom = package(&image, &vec![0xAB; CHR_ROM_SIZE]);
        assert_eq!(rom.len(), ROM_SIZE);
        assert_eq!(rom.len(), 16 + 32768 + 8192);
        assert_eq!(&rom[..4], &NES_TAG);
        assert_eq!(rom[HEADER_SIZE], 0); // unwritten PRG is zero
        assert_eq!(rom[HEADER_SIZE + PRG_ROM_SIZE], 0xAB);
    }

    #[test]
    fn test_package_pads_short_chr() {
        let image = MemoryImage::new();
        let rom = package(&image, &[0xCD; 16]);
        assert_eq!(rom.len(), ROM_SIZE);
        assert_eq!(rom[HEADER_SIZE + PRG_ROM_SIZE], 0xCD);
        assert_eq!(rom[HEADER_SIZE + PRG_ROM_SIZE + 16], 0x00);
    }

    #[test]
    fn test_package_cuts_long_chr() {
        let image = MemoryImage::new();
        let rom = package(&image, &vec![0xEF; CHR_ROM_SIZE + 100]);
        assert_eq!(rom.len(), ROM_SIZE);
        assert_eq!(*rom.last().unwrap(), 0xEF);
    }
}
