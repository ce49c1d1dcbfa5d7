mod backend;
mod cli;
mod engine;
mod error;
mod model;
mod orchestrator;
mod text_output;
#[cfg(feature = "tui")]
mod tui;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_text = args.command.is_some();

    match cli::run(args).await {
        Ok(()) => {
            // Explicitly exit in text mode; an abandoned task thread is not waited for.
            if is_text {
                std::process::exit(0);
            }
            Ok(())
        }
        Err(e) => Err(e),
    }
}
