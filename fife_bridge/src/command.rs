//! Script to simulation RPC: a fixed-shape command record plus the table of
//! handlers the simulation side exposes.

mod builtin;

pub use builtin::{
    register_builtin_commands, EnqueueAction, SetVisual, StartMovement, ENQUEUE_ACTION, SET_VISUAL,
    START_MOVEMENT,
};

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use crate::view::{ImageCache, View};
use crate::world::{ObjectId, World};

/// One command issued by a script through `FIFE_ExecCommand`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInfo {
    pub object: ObjectId,
    pub command_id: u64,
    pub params: [i64; 4],
    pub string_param: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("command id {0} is already registered")]
    DuplicateId(u64),
    #[error("object {0} does not exist")]
    UnknownObject(ObjectId),
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
}

/// Simulation state a command may touch. Only built while the runner is
/// dispatching inside its own turn.
pub struct CommandContext<'a> {
    pub world: &'a mut World,
    pub view: &'a mut dyn View,
    pub images: &'a mut ImageCache,
}

pub trait Command {
    fn execute(
        &mut self,
        ctx: &mut CommandContext<'_>,
        info: &CommandInfo,
    ) -> Result<(), CommandError>;
}

impl<F> Command for F
where
    F: FnMut(&mut CommandContext<'_>, &CommandInfo) -> Result<(), CommandError>,
{
    fn execute(
        &mut self,
        ctx: &mut CommandContext<'_>,
        info: &CommandInfo,
    ) -> Result<(), CommandError> {
        self(ctx, info)
    }
}

#[derive(Default)]
pub struct CommandTable {
    handlers: BTreeMap<u64, Box<dyn Command>>,
}

impl fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandTable")
            .field("ids", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a handler. An id that is already taken is reported and the
    /// existing handler is kept.
    pub fn register<C>(&mut self, id: u64, handler: C) -> Result<(), CommandError>
    where
        C: Command + 'static,
    {
        if self.handlers.contains_key(&id) {
            return Err(CommandError::DuplicateId(id));
        }
        self.handlers.insert(id, Box::new(handler));
        Ok(())
    }

    /// Install a handler, replacing any previous one. Returns whether a
    /// handler was replaced.
    pub fn replace<C>(&mut self, id: u64, handler: C) -> bool
    where
        C: Command + 'static,
    {
        self.handlers.insert(id, Box::new(handler)).is_some()
    }

    pub fn contains(&self, id: u64) -> bool {
        self.handlers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the handler for `info.command_id`; `None` when no handler is
    /// registered under that id.
    pub fn dispatch(
        &mut self,
        ctx: &mut CommandContext<'_>,
        info: &CommandInfo,
    ) -> Option<Result<(), CommandError>> {
        let handler = self.handlers.get_mut(&info.command_id)?;
        Some(handler.execute(ctx, info))
    }
}
