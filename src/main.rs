use anyhow::Result;
use blockduino_core::cli::Args;
use clap::Parser;

fn main() -> Result<()> {
    let args = Args::parse();
    blockduino_core::run_cli(&args)
}
