use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "relaybox")]
#[command(about = "Relay landed files to SFTP destinations by filename prefix", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the relay: directory watcher, TCP receiver and operator API
    Run(RunArgs),
    /// Load and validate a configuration, then print it with credentials masked
    CheckConfig(CheckConfigArgs),
    /// Push one file to a running relay's TCP receiver
    Push(PushArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Configuration file (defaults to RELAYBOX_CONFIG, then config/relaybox.json)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Operator API address; overrides `api_addr` from the configuration
    #[arg(long)]
    pub api_addr: Option<SocketAddr>,
}

#[derive(clap::Args, Debug)]
pub struct CheckConfigArgs {
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
pub struct PushArgs {
    /// File to send
    pub file: PathBuf,

    /// Receiver address
    #[arg(long)]
    pub addr: SocketAddr,

    /// Idle timeout in seconds for every network step
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::try_parse_from(["relaybox", "run", "--config", "relay.json", "--api-addr", "127.0.0.1:5001"])
            .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.config, Some(PathBuf::from("relay.json")));
                assert_eq!(args.api_addr, Some("127.0.0.1:5001".parse().unwrap()));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_parse_push_requires_addr() {
        assert!(Cli::try_parse_from(["relaybox", "push", "a.bin"]).is_err());
        let cli = Cli::try_parse_from(["relaybox", "push", "a.bin", "--addr", "10.0.0.5:8000"]).unwrap();
        assert!(matches!(cli.command, Commands::Push(ref args) if args.timeout_secs == 30));
    }
}
