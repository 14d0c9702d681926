use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use darshan_parser::error::DarshanError;
use darshan_parser::{parse_log, ParseConfig};

/// Parse and summarize a Darshan I/O characterization log.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the Darshan log to parse.
    path: PathBuf,
    /// Print per-record lines (default when no other block flag is given).
    #[arg(long)]
    base: bool,
    /// Print the per-module totals block.
    #[arg(long)]
    total: bool,
    /// Print the per-module file tally block.
    #[arg(long)]
    file: bool,
    /// Print the per-module performance block.
    #[arg(long)]
    perf: bool,
    /// Shorthand for --base --total --file --perf --show-incomplete.
    #[arg(long)]
    all: bool,
    /// Downgrade a partial (truncated) module from a fatal error to a warning.
    #[arg(long)]
    show_incomplete: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let any_block = cli.base || cli.total || cli.file || cli.perf || cli.all;
    let config = ParseConfig {
        base: cli.all || cli.base || !any_block,
        total: cli.all || cli.total,
        file: cli.all || cli.file,
        perf: cli.all || cli.perf,
        show_incomplete: cli.all || cli.show_incomplete,
    };

    match parse_log(&cli.path, &config) {
        Ok(lines) => {
            let mut out = lines.join("\n");
            out.push('\n');
            print!("{out}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("darshan-parser: {err}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

fn exit_code_for(err: &DarshanError) -> u8 {
    match err {
        DarshanError::UsageError(_) => 1,
        DarshanError::OpenError(_)
        | DarshanError::FormatError(_)
        | DarshanError::UnsupportedVersion(_)
        | DarshanError::PartialModuleData(_)
        | DarshanError::DecodeError { .. }
        | DarshanError::MalformedRank { .. }
        | DarshanError::OutOfMemory => 2,
    }
}
