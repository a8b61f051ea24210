use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{info, warn};

use crate::{
    connection,
    registry::Registry,
    session::{Session, SessionId},
    store::RecordStore,
};

/// Accepts TCP connections and runs an independent session for each one.
/// Every session shares the same store and registry.
pub struct Server<S> {
    listener: TcpListener,
    store: Arc<S>,
    registry: Arc<Registry<S>>,
    next_id: SessionId,
}

impl<S: RecordStore> Server<S> {
    pub fn new(listener: TcpListener, store: Arc<S>, registry: Arc<Registry<S>>) -> Self {
        Self {
            listener,
            store,
            registry,
            next_id: 1,
        }
    }

    fn allocate_session_id(&mut self) -> SessionId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run_until<F>(mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        loop {
            let accept_result = select! {
                _ = &mut shutdown => {
                    info!("server shutting down");
                    break;
                }
                accept_result = self.listener.accept() => accept_result,
            };
            self.handle_accept_result(accept_result);
        }

        Ok(())
    }

    fn handle_accept_result(&mut self, result: std::io::Result<(TcpStream, SocketAddr)>) {
        match result {
            Ok((stream, peer)) => {
                let id = self.allocate_session_id();
                spawn_session(id, stream, peer, &self.store, &self.registry);
            }
            Err(err) => warn!(error = ?err, "failed to accept connection"),
        }
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn spawn_session<S: RecordStore>(
    id: SessionId,
    stream: TcpStream,
    peer: SocketAddr,
    store: &Arc<S>,
    registry: &Arc<Registry<S>>,
) {
    let (session, outbound) = Session::new(id, Arc::clone(store), Arc::clone(registry));
    info!(session = id, %peer, "client connected");

    tokio::spawn(async move {
        let (reader, writer) = stream.into_split();
        match connection::serve(BufReader::new(reader), writer, session, outbound).await {
            Ok(()) => info!(session = id, %peer, "client disconnected"),
            Err(err) => warn!(session = id, %peer, error = %err, "session closed with error"),
        }
    });
}
