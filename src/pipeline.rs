use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::emitter;
use crate::error::BuildError;
use crate::resolver;
use crate::rom;
use crate::source;
use crate::statement::Statement;
use crate::tiles;

/// Inputs for one build run. All paths are plain files; `.incbin` paths
/// resolve against `root`, which defaults to the source file's directory.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub source: PathBuf,
    pub output: PathBuf,
    pub chr_asset: Option<PathBuf>,
    pub tile_patterns: Option<PathBuf>,
    pub root: Option<PathBuf>,
}

/// What a successful run produced, for logging and tests.
#[derive(Debug)]
pub struct BuildReport {
    pub passes: usize,
    pub written_range: Option<(u16, u16)>,
    pub output_len: usize,
}

/// Run the whole pipeline: normalize, resolve, emit, package, write.
///
/// Each stage consumes the previous stage's output; the symbol table is
/// frozen once the resolver hands it over, and the memory image is
/// read-only once the packager gets it. The first fatal error aborts with
/// no output file written.
pub fn build(config: &BuildConfig) -> Result<BuildReport, BuildError> {
    let root = config
        .root
        .clone()
        .or_else(|| config.source.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));

    let lines = source::load_source(&config.source)?;
    let statements = lines
        .iter()
        .map(|line| Statement::parse(line))
        .collect::<Result<Vec<_>, _>>()?;
    info!("parsed {} statements", statements.len());

    let (symbols, passes) = resolver::resolve(&statements, &root)?;
    info!("{} symbols converged after {} passes", symbols.len(), passes);

    let image = emitter::emit(&statements, symbols, &root)?;
    if let Some((min, max)) = image.written_range() {
        info!("emitted [{:#06x}, {:#06x}]", min, max);
    }

    let chr = tile_data(config)?;
    let bytes = rom::package(&image, &chr);
    rom::write_rom(&config.output, &bytes)?;
    info!("wrote {} ({} bytes)", config.output.display(), bytes.len());

    Ok(BuildReport {
        passes,
        written_range: image.written_range(),
        output_len: bytes.len(),
    })
}

/// Pick the CHR source: compile a pattern file, read a prebuilt asset, or
/// fall back to a blank bank. Missing tile art only warns; a pattern file
/// that fails to parse is still fatal.
fn tile_data(config: &BuildConfig) -> Result<Vec<u8>, BuildError> {
    if let Some(patterns) = &config.tile_patterns {
        match fs::read_to_string(patterns) {
            Ok(text) => {
                let (background, sprites) = tiles::parse_pattern_file(&text)?;
                info!(
                    "encoded {} background and {} sprite tiles",
                    background.len(),
                    sprites.len()
                );
                tiles::encode_banks(&background, &sprites)
            }
            Err(e) => {
                warn!(
                    "{}: {}; using blank tile bank",
                    patterns.display(),
                    e
                );
                Ok(vec![0; rom::CHR_ROM_SIZE])
            }
        }
    } else if let Some(asset) = &config.chr_asset {
        Ok(rom::load_tile_asset(asset))
    } else {
        warn!("no tile asset given; using blank tile bank");
        Ok(vec![0; rom::CHR_ROM_SIZE])
    }
}
