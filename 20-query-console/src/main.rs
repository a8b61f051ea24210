use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::{io::BufReader, net::TcpListener};
use tracing::{error, info, warn};

use query_console::{
    cli::{Cli, Command, StoreArgs},
    commands, connection,
    error::TransportError,
    server::Server,
    session::Session,
    store::{MemoryStore, RecordStore, SEED_NAMES},
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    // Logs go to stderr; stdout carries the console protocol.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn open_store(args: &StoreArgs) -> Result<Arc<MemoryStore>> {
    let store = MemoryStore::with_latency(Duration::from_millis(args.latency_ms));
    let seed: &[&str] = if args.no_seed { &[] } else { SEED_NAMES };
    store
        .initialize(seed)
        .await
        .context("failed to initialize record store")?;
    info!(seeded = seed.len(), "record store ready");
    Ok(Arc::new(store))
}

fn console_exit_code(result: &std::result::Result<(), TransportError>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            error!(error = %err, "console session failed");
            1
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let registry = commands::standard_registry::<MemoryStore>()
        .context("failed to build command registry")?;
    let registry = Arc::new(registry);

    match cli.command {
        Command::Console(args) => {
            let store = open_store(&args.store).await?;
            let (session, outbound) = Session::new(1, store, registry);
            let stdin = BufReader::new(tokio::io::stdin());
            let result = connection::serve(stdin, tokio::io::stdout(), session, outbound).await;
            // Exit on every path: the blocking stdin reader would otherwise
            // hold runtime shutdown until the next newline arrives.
            std::process::exit(console_exit_code(&result));
        }
        Command::Serve(args) => {
            let store = open_store(&args.store).await?;
            let listener = TcpListener::bind(args.listen)
                .await
                .with_context(|| format!("failed to bind {}", args.listen))?;
            let server = Server::new(listener, store, registry);
            let addr = server.local_addr()?;
            info!("listening on {}", addr);
            if let Err(err) = server.run_until_ctrl_c().await {
                warn!("server exited with error: {err:?}");
                return Err(err);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn console_exit_code_is_nonzero_on_transport_failure() {
        assert_eq!(console_exit_code(&Ok(())), 0);

        let broken = TransportError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "stdout closed"));
        assert_eq!(console_exit_code(&Err(broken)), 1);
    }
}
