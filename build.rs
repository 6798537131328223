//! Renders the `letsbake(1)` man page from the clap definition.
//!
//! The page lands in `OUT_DIR/letsbake.1` so release packaging can install it
//! next to the binary without a separate docs step.

use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

const WATCHED: [&str; 3] = ["build.rs", "src/cli/mod.rs", "Cargo.toml"];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    for path in WATCHED {
        writeln!(stdout, "cargo:rerun-if-changed={path}")?;
    }

    let out_dir = env::var_os("OUT_DIR")
        .map(PathBuf::from)
        .ok_or("OUT_DIR was not set")?;
    let page = out_dir.join("letsbake.1");

    let mut writer = BufWriter::new(File::create(&page)?);
    Man::new(cli::Cli::command()).render(&mut writer)?;
    writer.flush()?;
    Ok(())
}
