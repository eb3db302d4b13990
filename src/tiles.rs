use crate::error::BuildError;

pub const TILE_SIZE: usize = 8;
pub const TILE_BYTES: usize = 16;
pub const TILES_PER_BANK: usize = 256;

/// One 8x8 pattern of 2-bit palette indices.
///
/// Source form is 8 rows of 8 symbols: `.`=0, `X`=1, `O`=2, `#`=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TilePattern {
    pixels: [[u8; TILE_SIZE]; TILE_SIZE],
}

impl TilePattern {
    pub fn blank() -> TilePattern {
        TilePattern {
            pixels: [[0; TILE_SIZE]; TILE_SIZE],
        }
    }

    pub fn from_pixels(pixels: [[u8; TILE_SIZE]; TILE_SIZE]) -> TilePattern {
        TilePattern { pixels }
    }

    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        self.pixels[y][x]
    }

    /// Parse 8 rows of 8 pattern symbols.
    pub fn parse(rows: &[&str]) -> Result<TilePattern, BuildError> {
        if rows.len() != TILE_SIZE {
            return Err(BuildError::syntax(
                &rows.join("/"),
                format!("tile pattern has {} rows, expected {}", rows.len(), TILE_SIZE),
            ));
        }
        let mut pixels = [[0u8; TILE_SIZE]; TILE_SIZE];
        for (y, row) in rows.iter().enumerate() {
            if row.chars().count() != TILE_SIZE {
                return Err(BuildError::syntax(
                    row,
                    format!("tile row has {} symbols, expected {}", row.chars().count(), TILE_SIZE),
                ));
            }
            for (x, symbol) in row.chars().enumerate() {
                pixels[y][x] = match symbol {
                    '.' => 0,
                    'X' => 1,
                    'O' => 2,
                    '#' => 3,
                    other => {
                        return Err(BuildError::syntax(
                            row,
                            format!("unknown pattern symbol '{}'", other),
                        ))
                    }
                };
            }
        }
        Ok(TilePattern { pixels })
    }

    /// Encode into the planar CHR layout: 8 low-plane bytes then 8
    /// high-plane bytes, MSB = leftmost pixel.
    pub fn encode(&self) -> [u8; TILE_BYTES] {
        let mut out = [0u8; TILE_BYTES];
        for (y, row) in self.pixels.iter().enumerate() {
            let mut low = 0u8;
            let mut high = 0u8;
            for (x, &index) in row.iter().enumerate() {
                if index & 1 != 0 {
                    low |= 1 << (7 - x);
                }
                if index & 2 != 0 {
                    high |= 1 << (7 - x);
                }
            }
            out[y] = low;
            out[y + TILE_SIZE] = high;
        }
        out
    }

    /// Rebuild the 2-bit pattern from 16 planar bytes.
    pub fn decode(bytes: &[u8; TILE_BYTES]) -> TilePattern {
        let mut pixels = [[0u8; TILE_SIZE]; TILE_SIZE];
        for y in 0..TILE_SIZE {
            let low = bytes[y];
            let high = bytes[y + TILE_SIZE];
            for x in 0..TILE_SIZE {
                let bit = 7 - x;
                pixels[y][x] = ((low >> bit) & 1) | (((high >> bit) & 1) << 1);
            }
        }
        TilePattern { pixels }
    }
}

/// Concatenate the background and sprite banks into one CHR asset,
/// padding each bank to 256 tiles with blank (all-transparent) tiles.
pub fn encode_banks(
    background: &[TilePattern],
    sprites: &[TilePattern],
) -> Result<Vec<u8>, BuildError> {
    let mut out = Vec::with_capacity(2 * TILES_PER_BANK * TILE_BYTES);
    for (name, bank) in [("background", background), ("sprite", sprites)] {
        if bank.len() > TILES_PER_BANK {
            return Err(BuildError::syntax(
                name,
                format!("{} bank holds {} tiles, limit is {}", name, bank.len(), TILES_PER_BANK),
            ));
        }
        for tile in bank {
            out.extend_from_slice(&tile.encode());
        }
        for _ in bank.len()..TILES_PER_BANK {
            out.extend_from_slice(&TilePattern::blank().encode());
        }
    }
    Ok(out)
}

/// Parse a pattern file: 8-line tile blocks separated by blank lines,
/// `;` comments allowed, and a `.bank 1` line switching subsequent tiles
/// into the sprite bank.
pub fn parse_pattern_file(
    text: &str,
) -> Result<(Vec<TilePattern>, Vec<TilePattern>), BuildError> {
    let mut banks: [Vec<TilePattern>; 2] = [Vec::new(), Vec::new()];
    let mut current = 0;
    let mut block: Vec<&str> = Vec::new();

    let mut flush = |block: &mut Vec<&str>, bank: usize| -> Result<(), BuildError> {
        if !block.is_empty() {
            banks[bank].push(TilePattern::parse(block)?);
            block.clear();
        }
        Ok(())
    };

    for raw in text.lines() {
        let line = match raw.find(';') {
            Some(i) => raw[..i].trim(),
            None => raw.trim(),
        };
        if line.is_empty() {
            flush(&mut block, current)?;
        } else if let Some(rest) = line.strip_prefix(".bank") {
            flush(&mut block, current)?;
            current = match rest.trim() {
                "0" => 0,
                "1" => 1,
                other => {
                    return Err(BuildError::syntax(
                        line,
                        format!("unknown tile bank '{}'", other),
                    ))
                }
            };
        } else {
            block.push(line);
            if block.len() == TILE_SIZE {
                flush(&mut block, current)?;
            }
        }
    }
    flush(&mut block, current)?;

    let [background, sprites] = banks;
    Ok((background, sprites))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACK_V: [&str; 8] = [
        ".X....X.",
        ".X....X.",
        ".X....X.",
        ".X....X.",
        ".X....X.",
        ".X....X.",
        ".X....X.",
        ".X....X.",
    ];

    #[test]
    fn test_encode_blank_tile() {
        assert_eq!(TilePattern::blank().encode(), [0u8; TILE_BYTES]);
    }

    #[test]
    fn test_encode_low_plane_only() {
        // color 1 sets only the low plane; leftmost pixel is the MSB
        let tile = TilePattern::parse(&TRACK_V).unwrap();
        let bytes = tile.encode();
        assert_eq!(&bytes[..8], &[0b0100_0010; 8]);
        assert_eq!(&bytes[8..], &[0u8; 8]);
    }

    #[test]
    fn test_encode_both_planes() {
        let mut rows = ["........"; 8];
        rows[0] = "#O.X...#";
        let tile = TilePattern::parse(&rows).unwrap();
        let bytes = tile.encode();
        // low bit: # and X -> pixels 0, 3, 7
        assert_eq!(bytes[0], 0b1001_0001);
        // high bit: # and O -> pixels 0, 1, 7
        assert_eq!(bytes[8], 0b1100_0001);
        assert_eq!(bytes[1], 0);
        assert_eq!(bytes[9], 0);
    }

    #[test]
    fn test_parse_rejects_bad_patterns() {
        assert!(TilePattern::parse(&["........"; 7]).is_err());
        let mut rows = ["........"; 8];
        rows[3] = ".......";
        assert!(TilePattern::parse(&rows).is_err());
        rows[3] = "....Z...";
        assert!(TilePattern::parse(&rows).is_err());
    }

    #[test]
    fn test_round_trip_random_patterns() {
        // deterministic xorshift so failures reproduce
        let mut state: u32 = 0x2F6E_2B1D;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state
        };
        for _ in 0..64 {
            let mut pixels = [[0u8; TILE_SIZE]; TILE_SIZE];
            for row in pixels.iter_mut() {
                for px in row.iter_mut() {
                    *px = (next() & 0b11) as u8;
                }
            }
            let tile = TilePattern::from_pixels(pixels);
            assert_eq!(TilePattern::decode(&tile.encode()), tile);
        }
    }

    #[test]
    fn test_encode_banks_pads_to_8k() {
        let track = TilePattern::parse(&TRACK_V).unwrap();
        let chr = encode_banks(&[TilePattern::blank(), track], &[track]).unwrap();
        assert_eq!(chr.len(), 8192);
        // tile 1 of the background bank
        assert_eq!(&chr[16..24], &[0b0100_0010; 8]);
        // tile 0 of the sprite bank starts at 4096
        assert_eq!(&chr[4096..4104], &[0b0100_0010; 8]);
        // padding is fully transparent
        assert_eq!(&chr[32..48], &[0u8; 16]);
    }

    #[test]
    fn test_encode_banks_rejects_overflow() {
        let too_many = vec![TilePattern::blank(); TILES_PER_BANK + 1];
        assert!(encode_banks(&too_many, &[]).is_err());
    }

    #[test]
    fn test_parse_pattern_file() {
        let text = "\
; background tiles
........
........
........
........
........
........
........
........

.X....X.
.X....X.
.X....X.
.X....X.
.X....X.
.X....X.
.X....X.
.X....X.
.bank 1
#######.  ; sprite 0
#######.
#######.
#######.
#######.
#######.
#######.
#######.
";
        let (background, sprites) = parse_pattern_file(text).unwrap();
        assert_eq!(background.len(), 2);
        assert_eq!(sprites.len(), 1);
        assert_eq!(background[0], TilePattern::blank());
        assert_eq!(background[1], TilePattern::parse(&TRACK_V).unwrap());
        assert_eq!(sprites[0].pixel(0, 0), 3);
        assert_eq!(sprites[0].pixel(7, 0), 0);
    }

    #[test]
    fn test_parse_pattern_file_rejects_short_block() {
        let text = "........\n........\n";
        assert!(parse_pattern_file(text).is_err());
    }
}
