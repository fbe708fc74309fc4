pub mod assembler;
pub mod blocks;
pub mod boards;
pub mod cli;
pub mod fragments;
pub mod pins;
pub mod workspace;

use anyhow::{anyhow, bail, Result};
use assembler::{Assembler, AssemblyOutput, Diagnostics};
use boards::Catalog;
use std::path::{Path, PathBuf};
use workspace::Program;

pub fn run_cli(args: &cli::Args) -> Result<()> {
    if args.list_boards {
        let catalog = Catalog::builtin();
        for id in catalog.ids() {
            let profile = catalog.lookup(id).expect("registered id");
            println!("{:<20} {}", id, profile.name);
        }
        return Ok(());
    }

    let Some(input) = &args.input else {
        bail!("Missing workspace INPUT path.");
    };
    let input = canonicalize_file(input)?;
    let program = Program::parse_file(&input)?;
    let output = assemble_program(&program, args.board.as_deref())?;

    report_warnings(&output);
    if let Some(path) = &args.warnings_json {
        std::fs::write(path, warnings_report(&output).to_string())?;
    }

    match &args.output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, output.code.as_bytes())?;
        }
        None => print!("{}", output.code),
    }
    Ok(())
}

/// Runs one full assembly pass over an already-loaded program. An explicit
/// `board` selection is applied first; a board the catalog does not know is a
/// caller error.
pub fn assemble_program(program: &Program, board: Option<&str>) -> Result<AssemblyOutput> {
    let registry = blocks::builtin_registry();
    let mut catalog = Catalog::builtin();
    let mut diagnostics = Diagnostics::default();
    if let Some(id) = board {
        assembler::select_board(&mut catalog, id, program, &registry, &mut diagnostics)
            .map_err(|e| anyhow!("{} Use --list-boards to see the registered profiles.", e))?;
    }
    let mut assembler = Assembler::new(&registry);
    assembler
        .assemble_with(program, &mut catalog, diagnostics)
        .map_err(|e| anyhow!("Assembly failed: {}", e))
}

/// Convenience for callers holding workspace XML in memory.
pub fn assemble_source(source: &str, board: Option<&str>) -> Result<AssemblyOutput> {
    let program = Program::parse_str(source)?;
    assemble_program(&program, board)
}

fn report_warnings(output: &AssemblyOutput) {
    for warning in output.diagnostics.block_warnings() {
        eprintln!("[warn] block '{}': {}", warning.block_id, warning.message);
    }
    for warning in output.diagnostics.program_warnings() {
        eprintln!("[warn] program: {}", warning);
    }
}

fn warnings_report(output: &AssemblyOutput) -> serde_json::Value {
    serde_json::json!({
        "board": output.board_id,
        "block_warnings": output
            .diagnostics
            .block_warnings()
            .map(|w| {
                serde_json::json!({
                    "block": w.block_id,
                    "tag": w.tag,
                    "message": w.message,
                })
            })
            .collect::<Vec<_>>(),
        "program_warnings": output.diagnostics.program_warnings(),
    })
}

pub fn canonicalize_file(path: &Path) -> Result<PathBuf> {
    if !path.exists() || !path.is_file() {
        return Err(anyhow!("Input file not found: '{}'.", path.display()));
    }
    Ok(path.canonicalize()?)
}
