use std::net::SocketAddr;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single session on stdin/stdout.
    Console(ConsoleArgs),
    /// Serve sessions to TCP clients, all sharing one store.
    Serve(ServeArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Start with an empty store instead of the built-in seed names.
    #[arg(long)]
    pub no_seed: bool,

    /// Artificial delay applied to every store call, in milliseconds.
    #[arg(long, default_value_t = 0)]
    pub latency_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct ConsoleArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Socket address to bind to. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:5000")]
    pub listen: SocketAddr,

    #[command(flatten)]
    pub store: StoreArgs,
}
