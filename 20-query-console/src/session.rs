//! Per-connection command processing.
//!
//! A [`Session`] turns raw input lines into command invocations and queues
//! the resulting output on its [`Outbox`]. It never performs I/O itself:
//! [`crate::connection::serve`] owns the transport and drains the matching
//! [`Outbound`] receiver.
//!
//! `on_line` is synchronous. Handlers that need the store spawn the call as
//! a pending operation and return immediately, so a slow store never holds
//! up the next line. Each pending operation produces one batch of lines,
//! queued in a single send, which keeps multi-line results contiguous even
//! when several operations finish at once.

use std::{
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, warn};

use crate::{
    error::CommandError,
    registry::Registry,
    render,
    store::RecordStore,
};

pub const GREETING: &str = "DB query system. Type 'help' for help.";

pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// Quit requested or input exhausted; queued output is still flushed.
    Closing,
    Closed,
}

/// Sending half of a session's output. Cloned into every pending operation.
///
/// Once closed, sends are silently discarded.
#[derive(Clone)]
pub struct Outbox {
    tx: mpsc::UnboundedSender<Vec<String>>,
    open: Arc<AtomicBool>,
}

impl Outbox {
    fn send(&self, lines: Vec<String>) {
        if lines.is_empty() || !self.is_open() {
            return;
        }
        // The receiver only goes away with the transport; late output is dropped.
        let _ = self.tx.send(lines);
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}

/// Receiving half of a session's output: one `Vec` per atomic batch of lines.
pub struct Outbound {
    rx: mpsc::UnboundedReceiver<Vec<String>>,
}

impl Outbound {
    pub async fn recv(&mut self) -> Option<Vec<String>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Vec<String>> {
        self.rx.try_recv().ok()
    }
}

pub struct Session<S> {
    id: SessionId,
    state: SessionState,
    store: Arc<S>,
    registry: Arc<Registry<S>>,
    outbox: Outbox,
    pending: Vec<JoinHandle<()>>,
}

impl<S: RecordStore> Session<S> {
    /// `id` only tags log events; whoever accepts connections hands it out.
    pub fn new(id: SessionId, store: Arc<S>, registry: Arc<Registry<S>>) -> (Self, Outbound) {
        let (tx, rx) = mpsc::unbounded_channel();
        let outbox = Outbox {
            tx,
            open: Arc::new(AtomicBool::new(true)),
        };
        let session = Self {
            id,
            state: SessionState::Active,
            store,
            registry,
            outbox,
            pending: Vec::new(),
        };
        (session, Outbound { rx })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<Registry<S>> {
        &self.registry
    }

    /// Number of spawned store operations that have not finished yet.
    pub fn pending(&self) -> usize {
        self.pending
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    pub fn greet(&self) {
        self.send_line(GREETING);
    }

    pub fn send_line(&self, line: impl Into<String>) {
        self.outbox.send(vec![line.into()]);
    }

    /// Processes one line of input. Never fails: every error is rendered as
    /// a single output line and the session keeps serving.
    pub fn on_line(&mut self, raw: &str) {
        if self.state != SessionState::Active {
            debug!(session = self.id, state = ?self.state, "ignoring input on inactive session");
            return;
        }

        let mut tokens = raw.split_whitespace();
        let Some(name) = tokens.next() else {
            return;
        };
        let name = name.to_lowercase();
        let args: Vec<String> = tokens.map(str::to_string).collect();

        if let Err(err) = self.dispatch(&name, &args) {
            debug!(session = self.id, command = %name, error = %err, "command rejected");
            self.send_line(render::error(&err.to_string()));
        }
    }

    /// Reports an input line that was cut off for exceeding `limit` bytes.
    pub fn on_oversized_line(&mut self, limit: usize) {
        if self.state != SessionState::Active {
            return;
        }
        debug!(session = self.id, limit, "rejecting oversized line");
        self.send_line(render::error(&format!("line too long (limit {limit} bytes)")));
    }

    fn dispatch(&mut self, name: &str, args: &[String]) -> Result<(), CommandError> {
        let registry = Arc::clone(&self.registry);
        let command = registry.lookup(name)?;
        command.check_arity(args)?;
        debug!(session = self.id, command = command.name(), ?args, "dispatching");
        (command.handler())(self, args)
    }

    /// Runs `operation` in the background and queues its lines once it
    /// resolves. If the session has closed by then, the lines are dropped;
    /// the operation itself always runs to completion.
    pub fn spawn_pending<F>(&mut self, operation: F)
    where
        F: Future<Output = Vec<String>> + Send + 'static,
    {
        self.pending.retain(|handle| !handle.is_finished());

        let outbox = self.outbox.clone();
        let session = self.id;
        let handle = tokio::spawn(async move {
            let lines = operation.await;
            if outbox.is_open() {
                outbox.send(lines);
            } else {
                debug!(session, "dropping output of operation finished after close");
            }
        });
        self.pending.push(handle);
    }

    /// Stops accepting input. Already queued output is still delivered.
    pub fn request_close(&mut self) {
        if self.state == SessionState::Active {
            debug!(session = self.id, "session closing");
            self.state = SessionState::Closing;
        }
    }

    /// The transport is gone: nothing further is accepted or written.
    pub fn transport_closed(&mut self) {
        self.state = SessionState::Closed;
        self.outbox.close();
        debug!(session = self.id, "session closed");
    }

    /// Waits for every pending operation to finish.
    pub async fn settle(&mut self) {
        for handle in self.pending.drain(..) {
            if let Err(err) = handle.await {
                warn!(session = self.id, error = ?err, "pending operation panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{commands, store::MemoryStore};

    fn session() -> (Session<MemoryStore>, Outbound) {
        let registry = commands::standard_registry().expect("registry");
        Session::new(1, Arc::new(MemoryStore::new()), Arc::new(registry))
    }

    #[tokio::test]
    async fn greeting_is_queued() {
        let (session, mut outbound) = session();
        session.greet();
        assert_eq!(outbound.try_recv(), Some(vec![GREETING.to_string()]));
    }

    #[tokio::test]
    async fn closing_session_ignores_input() {
        let (mut session, mut outbound) = session();
        session.request_close();
        session.on_line("help");

        assert_eq!(session.state(), SessionState::Closing);
        assert_eq!(outbound.try_recv(), None);
    }

    #[tokio::test]
    async fn output_after_transport_close_is_dropped() {
        let (mut session, mut outbound) = session();
        session.transport_closed();
        session.spawn_pending(async { vec!["late".to_string()] });
        session.settle().await;

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(outbound.try_recv(), None);
    }

    #[tokio::test]
    async fn oversized_lines_are_reported_while_active() {
        let (mut session, mut outbound) = session();
        session.on_oversized_line(16);
        assert_eq!(
            outbound.try_recv(),
            Some(vec!["Error: line too long (limit 16 bytes)".to_string()])
        );
        assert_eq!(session.state(), SessionState::Active);

        session.request_close();
        session.on_oversized_line(16);
        assert_eq!(outbound.try_recv(), None);
    }
}
