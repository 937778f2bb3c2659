mod cli;
mod server;

use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    relaybox::observability::init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => server::run(args.config, args.api_addr).await?,
        Commands::CheckConfig(args) => server::check_config(args.config)?,
        Commands::Push(args) => server::push(args.file, args.addr, args.timeout_secs).await?,
    }

    Ok(())
}
