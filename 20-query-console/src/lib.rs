//! Line-oriented query console over a small record store.
//!
//! Each module owns one concern:
//!
//! - [`store`] defines the asynchronous [`store::RecordStore`] contract and
//!   the in-memory [`store::MemoryStore`] behind it.
//! - [`registry`] maps command names to handlers and usage strings.
//! - [`commands`] implements `help`, `quit`, `find` and `add`.
//! - [`session`] is the per-connection state machine: it tokenizes lines,
//!   dispatches them and queues output, never blocking on the store.
//! - [`render`] formats results into protocol lines.
//! - [`connection`] drives a session over any buffered reader/writer pair.
//! - [`server`] accepts TCP clients and gives each its own session.
//! - [`cli`] parses the command-line interface.

pub mod cli;
pub mod commands;
pub mod connection;
pub mod error;
pub mod registry;
pub mod render;
pub mod server;
pub mod session;
pub mod store;
