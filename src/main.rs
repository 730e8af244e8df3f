//! reqspan CLI entry point.

use reqspan_lib::cli::{self, Cli};
use reqspan_lib::core::Result;

fn main() -> Result<()> {
    // Parse command-line arguments
    let cli = Cli::parse_args();

    // Execute the command
    cli::execute(cli)
}
