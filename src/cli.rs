use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "blockduino",
    about = "Assembles a visual block workspace into a single Arduino C sketch."
)]
pub struct Args {
    #[arg(value_name = "INPUT", required_unless_present = "list_boards")]
    pub input: Option<PathBuf>,

    #[arg(value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    #[arg(
        long,
        value_name = "ID",
        help = "Board profile to assemble for (default: uno)."
    )]
    pub board: Option<String>,

    #[arg(long, help = "List the registered board profiles and exit.")]
    pub list_boards: bool,

    #[arg(
        long,
        value_name = "PATH",
        help = "Write block and program warnings as a JSON report to this path."
    )]
    pub warnings_json: Option<PathBuf>,
}
