use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use log::{error, LevelFilter};
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use nesbuild::pipeline::{self, BuildConfig};

#[derive(Parser, Debug)]
#[command(
    name = "nesbuild",
    about = "6502 assembler and NROM cartridge builder"
)]
struct Args {
    /// Assembly source file; includes resolve against its directory
    source: PathBuf,
    /// Output cartridge image (.nes)
    out: PathBuf,
    /// Prebuilt CHR tile asset; a blank bank substitutes when missing
    #[arg(long, conflicts_with = "tiles")]
    chr: Option<PathBuf>,
    /// Tile pattern file compiled into the CHR bank
    #[arg(long)]
    tiles: Option<PathBuf>,
    /// Project root for .incbin paths; defaults to the source directory
    #[arg(long)]
    root: Option<PathBuf>,
    #[arg(long = "log", value_parser = <LevelFilter as FromStr>::from_str, default_value_t = LevelFilter::Info)]
    log_level: LevelFilter,
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

    let config = BuildConfig {
        source: args.source,
        output: args.out,
        chr_asset: args.chr,
        tile_patterns: args.tiles,
        root: args.root,
    };
    if let Err(e) = pipeline::build(&config) {
        error!("{}", e);
        std::process::exit(1);
    }
}
