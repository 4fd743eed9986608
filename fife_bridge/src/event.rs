//! Immutable event envelopes exchanged between the simulation and the
//! scripting thread.
//!
//! An [`Event`] carries a type tag, a numeric code, the tick of the clock
//! that created it and an optional payload. Payloads are shared behind an
//! [`Arc`], so cloning an event never duplicates the payload itself.

use std::sync::Arc;

use thiserror::Error;

use crate::command::CommandInfo;
use crate::script::ScriptSource;
use crate::world::ObjectInfo;

/// Type tags grouping event codes by origin.
pub mod kind {
    pub const CONTROL: u8 = 0;
    pub const SCRIPT: u8 = 1;
    pub const WORLD: u8 = 2;
    pub const COMMAND: u8 = 3;
}

/// Event codes understood by the bridge endpoints.
pub mod code {
    /// Heartbeat carrying the simulation tick as its creation tick.
    pub const HEARTBEAT: u16 = 0x0001;
    /// Run a script described by a [`ScriptSource`](crate::ScriptSource).
    pub const EXEC: u16 = 0x0002;
    /// Run a script file; payload is a script source or a path string.
    pub const EXEC_FILE: u16 = 0x0003;
    /// Run literal source text; payload is a script source or a string.
    pub const EXEC_STRING: u16 = 0x0004;
    /// Announce a non-static world object to the script side.
    pub const NEW_OBJECT: u16 = 0x0005;
    /// Script to simulation command record.
    pub const EXEC_COMMAND: u16 = 0x0006;
    /// Reserved sentinel; the receiving loop stops after processing it.
    pub const SHUTDOWN: u16 = 0xFFFF;
}

/// Closed set of payloads the bridge carries.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Script(ScriptSource),
    Command(CommandInfo),
    Object(ObjectInfo),
    Text(String),
}

impl Payload {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Payload::Script(_) => ScriptSource::KIND,
            Payload::Command(_) => CommandInfo::KIND,
            Payload::Object(_) => ObjectInfo::KIND,
            Payload::Text(_) => String::KIND,
        }
    }
}

/// Implemented by every type that can be read back out of a [`Payload`].
pub trait PayloadType: Sized {
    const KIND: &'static str;

    fn from_payload(payload: &Payload) -> Option<&Self>;

    fn into_payload(self) -> Payload;
}

impl PayloadType for ScriptSource {
    const KIND: &'static str = "script";

    fn from_payload(payload: &Payload) -> Option<&Self> {
        match payload {
            Payload::Script(source) => Some(source),
            _ => None,
        }
    }

    fn into_payload(self) -> Payload {
        Payload::Script(self)
    }
}

impl PayloadType for CommandInfo {
    const KIND: &'static str = "command";

    fn from_payload(payload: &Payload) -> Option<&Self> {
        match payload {
            Payload::Command(info) => Some(info),
            _ => None,
        }
    }

    fn into_payload(self) -> Payload {
        Payload::Command(self)
    }
}

impl PayloadType for ObjectInfo {
    const KIND: &'static str = "object";

    fn from_payload(payload: &Payload) -> Option<&Self> {
        match payload {
            Payload::Object(info) => Some(info),
            _ => None,
        }
    }

    fn into_payload(self) -> Payload {
        Payload::Object(self)
    }
}

impl PayloadType for String {
    const KIND: &'static str = "text";

    fn from_payload(payload: &Payload) -> Option<&Self> {
        match payload {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    fn into_payload(self) -> Payload {
        Payload::Text(self)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("payload type mismatch: expected {expected}, found {found}")]
    PayloadTypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

#[derive(Debug, Clone)]
pub struct Event {
    kind: u8,
    code: u16,
    tick: u32,
    payload: Option<Arc<Payload>>,
}

impl Event {
    pub fn new(kind: u8, code: u16, tick: u32) -> Self {
        Self {
            kind,
            code,
            tick,
            payload: None,
        }
    }

    pub fn with_payload<T: PayloadType>(kind: u8, code: u16, tick: u32, payload: T) -> Self {
        Self {
            kind,
            code,
            tick,
            payload: Some(Arc::new(payload.into_payload())),
        }
    }

    pub fn shutdown(tick: u32) -> Self {
        Self::new(kind::CONTROL, code::SHUTDOWN, tick)
    }

    pub fn kind(&self) -> u8 {
        self.kind
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn tick(&self) -> u32 {
        self.tick
    }

    pub fn is_shutdown(&self) -> bool {
        self.code == code::SHUTDOWN
    }

    /// Borrow the payload as `T`, failing when the stored kind differs.
    pub fn get<T: PayloadType>(&self) -> Result<&T, EventError> {
        let payload = self
            .payload
            .as_deref()
            .ok_or(EventError::PayloadTypeMismatch {
                expected: T::KIND,
                found: "none",
            })?;
        T::from_payload(payload).ok_or(EventError::PayloadTypeMismatch {
            expected: T::KIND,
            found: payload.kind_name(),
        })
    }

    #[cfg(test)]
    pub(crate) fn shares_payload_with(&self, other: &Event) -> bool {
        match (&self.payload, &other.payload) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}
