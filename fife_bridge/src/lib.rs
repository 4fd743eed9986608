pub mod bridge;
pub mod command;
pub mod event;
pub mod runner;
pub mod script;
pub mod sleep;
pub mod slave;
pub mod view;
pub mod world;

pub use bridge::{AsyncBridge, BridgeError, BridgeId, BridgeStats, Drain, Endpoint};
pub use command::{
    register_builtin_commands, Command, CommandContext, CommandError, CommandInfo, CommandTable,
    EnqueueAction, SetVisual, StartMovement, ENQUEUE_ACTION, SET_VISUAL, START_MOVEMENT,
};
pub use event::{code, kind, Event, EventError, Payload, PayloadType};
pub use runner::{DispatchStats, Runner, RunnerError, RunnerState};
pub use script::ScriptSource;
pub use sleep::{ScriptHandle, SleepQueue, Sleeping};
pub use slave::{ScriptingSlave, SlaveError, LOOP_YIELD};
pub use view::{ImageCache, RecordingView, View, Visual, VisualId};
pub use world::{
    Elevation, Layer, Movement, ObjectId, ObjectInfo, Point, World, WorldError, WorldObject,
};
