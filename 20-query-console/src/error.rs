use std::io;

use thiserror::Error;

/// Failures raised while dispatching a single line. The session renders these
/// as `Error: <message>` and keeps serving.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("no such command.")]
    UnknownCommand(String),

    #[error("{command} takes {expected} ({given} given)")]
    Arguments {
        command: String,
        expected: String,
        given: usize,
    },
}

/// Failures reported by a [`crate::store::RecordStore`]. Rendered as
/// `Failure: <message>`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("no such table: records")]
    Uninitialized,

    #[error("{0}")]
    Backend(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("command '{0}' is already registered")]
    DuplicateCommand(String),
}

/// Fatal to the session that hit it, and only to that session.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport i/o failed: {0}")]
    Io(#[from] io::Error),
}
