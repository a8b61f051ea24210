//! The console's built-in commands.
//!
//! Adding a command means writing a [`Handler`](crate::registry::Handler)
//! and registering it in [`standard_registry`].

use std::sync::Arc;

use tracing::{debug, info};

use crate::{
    error::{CommandError, RegistryError},
    registry::{Command, Param, Registry},
    render,
    session::Session,
    store::RecordStore,
};

pub const HELP_USAGE: &str = "help [command]: List commands, or show help on the given command";
pub const QUIT_USAGE: &str = "quit: Quit this session";
pub const FIND_USAGE: &str = "find <text>: Find all of the names containing the given text";
pub const ADD_USAGE: &str = "add <first> <last>: Add a new name to the system";

pub fn standard_registry<S: RecordStore>() -> Result<Registry<S>, RegistryError> {
    let mut registry = Registry::new();
    registry.register(Command::new(
        "help",
        &[Param::Optional("command")],
        HELP_USAGE,
        help::<S>,
    ))?;
    registry.register(Command::new("quit", &[], QUIT_USAGE, quit::<S>))?;
    registry.register(Command::new(
        "find",
        &[Param::Required("text")],
        FIND_USAGE,
        find::<S>,
    ))?;
    registry.register(Command::new(
        "add",
        &[Param::Required("first"), Param::Required("last")],
        ADD_USAGE,
        add::<S>,
    ))?;
    Ok(registry)
}

fn help<S: RecordStore>(session: &mut Session<S>, args: &[String]) -> Result<(), CommandError> {
    let registry = Arc::clone(session.registry());
    match args.first() {
        Some(name) => {
            let command = registry.lookup(name)?;
            session.send_line(command.usage());
        }
        None => {
            let names: Vec<&str> = registry.names().collect();
            session.send_line(format!("Valid commands: {}", names.join(" ")));
        }
    }
    Ok(())
}

fn quit<S: RecordStore>(session: &mut Session<S>, _args: &[String]) -> Result<(), CommandError> {
    session.send_line("Goodbye.");
    session.request_close();
    Ok(())
}

// Arity is checked before any handler runs, so positional indexing is safe.
fn find<S: RecordStore>(session: &mut Session<S>, args: &[String]) -> Result<(), CommandError> {
    let text = args[0].clone();
    let store = Arc::clone(session.store());
    session.spawn_pending(async move {
        render::find_result(store.find_by_prefix(&text).await)
    });
    Ok(())
}

fn add<S: RecordStore>(session: &mut Session<S>, args: &[String]) -> Result<(), CommandError> {
    let name = title_case(&format!("{} {}", args[0], args[1]));
    let store = Arc::clone(session.store());
    let id = session.id();
    session.spawn_pending(async move {
        match store.insert(&name).await {
            Ok(record) => {
                info!(session = id, id = record.id, name = %record.name, "record added");
                render::find_result(store.find_by_prefix(&record.name).await)
            }
            Err(err) => {
                debug!(session = id, error = %err, "insert failed");
                vec![render::failure(&err.to_string())]
            }
        }
    });
    Ok(())
}

/// Upper-cases the first letter of each whitespace-separated word and
/// lower-cases the rest.
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
