use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use log::{error, info, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use nesbuild::error::BuildError;
use nesbuild::tiles;

/// Compile a tile pattern file into a raw CHR asset.
#[derive(Parser, Debug)]
#[command(name = "makechr", about = "Compile tile patterns into a CHR bank")]
struct Args {
    /// Pattern file: 8-line tile blocks, `.bank 1` starts the sprite bank
    patterns: PathBuf,
    /// Output CHR file (8192 bytes)
    out: PathBuf,
    #[arg(long = "log", value_parser = <LevelFilter as FromStr>::from_str, default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,
}

fn run(args: &Args) -> Result<(), BuildError> {
    let text = std::fs::read_to_string(&args.patterns)
        .map_err(|e| BuildError::io(args.patterns.as_path(), e))?;
    let (background, sprites) = tiles::parse_pattern_file(&text)?;
    let chr = tiles::encode_banks(&background, &sprites)?;
    std::fs::write(&args.out, &chr).map_err(|e| BuildError::io(args.out.as_path(), e))?;
    info!(
        "wrote {} ({} background, {} sprite tiles)",
        args.out.display(),
        background.len(),
        sprites.len()
    );
    Ok(())
}

fn main() {
    let args = Args::parse();

    TermLogger::init(
        args.log_level,
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .expect("could not set up logging");

    if let Err(e) = run(&args) {
        error!("{}", e);
        std::process::exit(1);
    }
}
