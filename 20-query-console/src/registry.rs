//! Name → handler table consulted by every session.
//!
//! A [`Registry`] is built once at startup and shared read-only between
//! sessions behind an `Arc`. Names are stored lower-cased in a `BTreeMap`, so
//! lookups are case-insensitive and [`Registry::names`] comes out in
//! lexicographic order, which is what `help` prints.

use std::{collections::BTreeMap, fmt};

use crate::{
    error::{CommandError, RegistryError},
    session::Session,
    store::RecordStore,
};

/// Entry point of a command. Runs synchronously inside `on_line`; anything
/// that has to wait on the store is handed to [`Session::spawn_pending`].
pub type Handler<S> = fn(&mut Session<S>, &[String]) -> Result<(), CommandError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Required(&'static str),
    Optional(&'static str),
}

pub struct Command<S> {
    name: &'static str,
    params: &'static [Param],
    usage: &'static str,
    handler: Handler<S>,
}

impl<S> Command<S> {
    pub fn new(
        name: &'static str,
        params: &'static [Param],
        usage: &'static str,
        handler: Handler<S>,
    ) -> Self {
        Self {
            name,
            params,
            usage,
            handler,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn params(&self) -> &'static [Param] {
        self.params
    }

    pub fn usage(&self) -> &'static str {
        self.usage
    }

    pub fn handler(&self) -> Handler<S> {
        self.handler
    }

    /// Rejects argument lists the handler cannot accept.
    pub fn check_arity(&self, args: &[String]) -> Result<(), CommandError> {
        let required = self
            .params
            .iter()
            .filter(|param| matches!(param, Param::Required(_)))
            .count();
        let max = self.params.len();

        if (required..=max).contains(&args.len()) {
            return Ok(());
        }

        Err(CommandError::Arguments {
            command: self.name.to_string(),
            expected: describe_arity(required, max, args.len()),
            given: args.len(),
        })
    }
}

/// Wording names the bound that `given` missed.
fn describe_arity(required: usize, max: usize, given: usize) -> String {
    let plural = |n: usize| if n == 1 { "argument" } else { "arguments" };
    if required == max {
        if max == 0 {
            "no arguments".to_string()
        } else {
            format!("exactly {max} {}", plural(max))
        }
    } else if given < required {
        format!("at least {required} {}", plural(required))
    } else {
        format!("at most {max} {}", plural(max))
    }
}

impl<S> fmt::Debug for Command<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("usage", &self.usage)
            .finish()
    }
}

pub struct Registry<S> {
    commands: BTreeMap<String, Command<S>>,
}

impl<S: RecordStore> Registry<S> {
    pub fn new() -> Self {
        Self {
            commands: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, command: Command<S>) -> Result<(), RegistryError> {
        let key = command.name.to_lowercase();
        if self.commands.contains_key(&key) {
            return Err(RegistryError::DuplicateCommand(key));
        }
        self.commands.insert(key, command);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&Command<S>, CommandError> {
        self.commands
            .get(&name.to_lowercase())
            .ok_or_else(|| CommandError::UnknownCommand(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl<S: RecordStore> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}
