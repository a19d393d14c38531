//! podd binary entry point.

use clap::{Parser, Subcommand};
use podd::{DaemonConfig, ServeArgs};

#[derive(Parser)]
#[command(name = "podd", about = "podgrid daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API until interrupted.
    Serve(ServeArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            let config = DaemonConfig::load(&args)?;
            podd::init_tracing(config.log_json);
            podd::run(config).await
        }
    }
}
