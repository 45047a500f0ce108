use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::clean::{cmd_clean, CleanArgs};

#[derive(Parser)]
#[command(
    name = "rulesift",
    version,
    about = "Generalize, merge and rank a cache of verified rewrite rules"
)]
struct Cli {
    #[command(flatten)]
    clean: CleanArgs,
    /// Log every weakening step (overridden by RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    cmd_clean(cli.clean);
}
