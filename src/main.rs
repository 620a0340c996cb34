//! Pinstream CLI entry point

use std::process::ExitCode;

use clap::Parser;

use pinstream::cli::{Cli, Commands};
use pinstream::commands::{run_connections, run_prune, run_watch, CommandContext};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pinstream=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run() {
        Ok(output) => {
            print!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    }
}

fn run() -> pinstream::Result<String> {
    let cli = Cli::parse();
    let ctx = CommandContext::from_cli(cli.format, cli.verbose);

    match &cli.command {
        Commands::Watch(args) => run_watch(args, &ctx),
        Commands::Connections(args) => run_connections(args, &ctx),
        Commands::Prune(args) => run_prune(args, &ctx),
    }
}
