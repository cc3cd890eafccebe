//! icx CLI entrypoint

use clap::Parser;

use iconify::cli::{self as commands, Cli};
use iconify::output;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = cli.execute() {
        output::error(&format!("Error: {:#}", e));
        if let Some(hint) = commands::hint(&e) {
            eprintln!("{}", hint);
        }
        std::process::exit(1);
    }
}
