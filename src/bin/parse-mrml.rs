//! Print the tract map of a Slicer MRML file, created by manually adding fiber clusters to a tract hierarchy, as JSON.

use clap::Parser;

use std::path::PathBuf;
use std::process::ExitCode;

use tractmap::{init_tracing, read_mrml, Verbosity};

#[derive(Parser, Debug)]
#[command(name = "parse-mrml", version, about)]
struct Args {
    /// The MRML file
    filename: PathBuf,

    /// Minimise logging
    #[arg(long)]
    quiet: bool,

    /// Maximise logging
    #[arg(long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_tracing(Verbosity::from_flags(args.verbose, args.quiet)) {
        eprintln!("Failed to initialise logging: {}", e);
        return ExitCode::FAILURE;
    }

    match read_mrml(&args.filename).and_then(|map| map.to_json()) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Failed to parse {}: {}", args.filename.display(), e);
            ExitCode::FAILURE
        }
    }
}
