//! Script-side endpoint. A [`ScriptingSlave`] owns one Lua state for the
//! whole life of its thread and only ever learns the time from heartbeat
//! events.

mod guard;
mod object;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::rc::Rc;
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use mlua::{Function, Lua, LuaOptions, RegistryKey, StdLib, Table, Value};
use thiserror::Error;

use crate::bridge::{AsyncBridge, BridgeStats, Drain, Endpoint};
use crate::command::CommandInfo;
use crate::event::{code, kind, Event, EventError};
use crate::script::ScriptSource;
use crate::sleep::{ScriptHandle, SleepQueue};
use crate::world::ObjectInfo;

use guard::{CallStack, StackGuard};
use object::{object_id, LuaObject};

/// Pause between loop iterations.
pub const LOOP_YIELD: Duration = Duration::from_millis(1);

#[derive(Debug, Error)]
pub enum SlaveError {
    #[error("initialising Lua runtime: {0}")]
    Lua(#[from] mlua::Error),
}

/// State shared between the slave and the natives it installs in Lua.
struct SlaveCore {
    bridge: AsyncBridge,
    sleeping: SleepQueue,
    handles: HashMap<ScriptHandle, RegistryKey>,
    next_handle: ScriptHandle,
}

impl SlaveCore {
    /// Handles stay registered for the life of the thread, like the Lua
    /// references they keep alive. Once the counter wraps, ids still in use
    /// are skipped.
    fn register(&mut self, key: RegistryKey) -> ScriptHandle {
        let mut handle = self.next_handle;
        while self.handles.contains_key(&handle) {
            handle = handle.wrapping_add(1).max(1);
        }
        self.next_handle = handle.wrapping_add(1).max(1);
        self.handles.insert(handle, key);
        handle
    }
}

pub struct ScriptingSlave {
    lua: Lua,
    core: Rc<RefCell<SlaveCore>>,
    frames: CallStack,
}

impl ScriptingSlave {
    /// Create the interpreter and install the `FIFE_*` natives. `bridge` is
    /// normally already paired with the runner's endpoint.
    pub fn new(bridge: AsyncBridge) -> Result<Self, SlaveError> {
        let lua = Lua::new_with(
            StdLib::MATH | StdLib::TABLE | StdLib::PACKAGE | StdLib::STRING,
            LuaOptions::default(),
        )?;
        let core = Rc::new(RefCell::new(SlaveCore {
            bridge,
            sleeping: SleepQueue::new(),
            handles: HashMap::new(),
            next_handle: 1,
        }));
        let frames = CallStack::new();
        install_natives(&lua, core.clone(), frames.clone())?;
        Ok(ScriptingSlave { lua, core, frames })
    }

    pub fn tick(&self) -> u32 {
        self.core.borrow().bridge.tick()
    }

    pub fn stats(&self) -> BridgeStats {
        self.core.borrow().bridge.stats()
    }

    pub fn sleeping(&self) -> usize {
        self.core.borrow().sleeping.len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.core.borrow().bridge.is_shut_down()
    }

    /// One loop iteration: drain, wake, flush.
    pub fn step(&mut self) -> Drain {
        let drained = self.process_events();
        if drained == Drain::Shutdown {
            return drained;
        }
        self.wake_them();
        self.send_events();
        drained
    }

    /// Run until a shutdown sentinel is processed. Returns the last tick
    /// seen, which the spawning thread reports as its exit code.
    pub fn run(&mut self) -> u32 {
        debug!(target: "slave_thread", "entering scripting loop");
        while self.step() != Drain::Shutdown {
            thread::sleep(LOOP_YIELD);
        }
        debug!(target: "slave_thread", "leaving scripting loop at tick {}", self.tick());
        self.tick()
    }

    /// Fire every sleeper due at the current tick, earliest first.
    pub fn wake_them(&mut self) -> usize {
        let (now, due) = {
            let mut core = self.core.borrow_mut();
            let now = core.bridge.tick();
            (now, core.sleeping.take_due(now))
        };
        for entry in &due {
            self.on_wake(entry.handle, entry.overslept(now));
        }
        due.len()
    }

    fn on_wake(&self, handle: ScriptHandle, overslept: u32) {
        let _frame = StackGuard::enter(&self.frames, format!("onWake#{handle}"));
        if let Err(err) = self.call_on_wake(handle, overslept) {
            warn!(
                target: "scripting_slave",
                "onWake called into invalid code: {err}"
            );
        }
    }

    fn call_on_wake(&self, handle: ScriptHandle, overslept: u32) -> mlua::Result<()> {
        let target: Table = {
            let core = self.core.borrow();
            let key = core.handles.get(&handle).ok_or_else(|| {
                mlua::Error::RuntimeError(format!("unknown script handle {handle}"))
            })?;
            self.lua.registry_value(key)?
        };
        let on_wake: Function = target.get("onWake")?;
        on_wake.call::<_, ()>((target, overslept))
    }

    fn process_exec(&mut self, event: &Event) {
        let source = match exec_source(event) {
            Ok(source) => source,
            Err(err) => {
                warn!(target: "scripting_slave", "malformed exec event: {err}");
                return;
            }
        };
        let _frame = StackGuard::enter(&self.frames, source.chunk_name());
        if let Err(err) = self.run_source(&source) {
            warn!(
                target: "scripting_slave",
                "couldn't execute script sent by map runner: {err}"
            );
        }
    }

    fn run_source(&self, source: &ScriptSource) -> mlua::Result<()> {
        match source {
            ScriptSource::File(path) => {
                let text = fs::read_to_string(path).map_err(mlua::Error::external)?;
                self.lua.load(&text).set_name(source.chunk_name()).exec()
            }
            ScriptSource::Text(text) => self
                .lua
                .load(text.as_str())
                .set_name(source.chunk_name())
                .exec(),
        }
    }

    fn process_new_object(&mut self, event: &Event) {
        let info = match event.get::<ObjectInfo>() {
            Ok(info) => info.clone(),
            Err(err) => {
                warn!(target: "scripting_slave", "malformed new-object event: {err}");
                return;
            }
        };
        let _frame = StackGuard::enter(&self.frames, format!("AddObject#{}", info.id));
        let result = self
            .lua
            .globals()
            .get::<_, Function>("AddObject")
            .and_then(|add| add.call::<_, ()>(LuaObject::new(info)));
        if let Err(err) = result {
            warn!(
                target: "scripting_slave",
                "couldn't announce object to the ruleset: {err}"
            );
        }
    }
}

impl Endpoint for ScriptingSlave {
    fn with_bridge<R>(&mut self, f: impl FnOnce(&mut AsyncBridge) -> R) -> R {
        f(&mut self.core.borrow_mut().bridge)
    }

    fn process_event(&mut self, event: &Event) {
        match event.code() {
            code::HEARTBEAT => self.core.borrow_mut().bridge.set_tick(event.tick()),
            code::EXEC | code::EXEC_FILE | code::EXEC_STRING => self.process_exec(event),
            code::NEW_OBJECT => self.process_new_object(event),
            _ => self.with_bridge(|bridge| bridge.process_base_event(event)),
        }
    }
}

fn exec_source(event: &Event) -> Result<ScriptSource, EventError> {
    let script = event.get::<ScriptSource>().cloned();
    match event.code() {
        code::EXEC_FILE => script.or_else(|_| event.get::<String>().map(ScriptSource::from_file)),
        code::EXEC_STRING => {
            script.or_else(|_| event.get::<String>().map(ScriptSource::from_text))
        }
        _ => script,
    }
}

fn install_natives(lua: &Lua, core: Rc<RefCell<SlaveCore>>, frames: CallStack) -> mlua::Result<()> {
    let globals = lua.globals();

    let register_core = core.clone();
    globals.set(
        "FIFE_RegisterObject",
        lua.create_function(move |lua, value: Value| {
            if value.is_nil() {
                return Err(mlua::Error::RuntimeError(
                    "FIFE_RegisterObject expects a value".to_string(),
                ));
            }
            let key = lua.create_registry_value(value)?;
            Ok(register_core.borrow_mut().register(key))
        })?,
    )?;

    let sleep_core = core.clone();
    let sleep_frames = frames.clone();
    globals.set(
        "FIFE_Sleep",
        lua.create_function(move |_, (handle, ticks): (ScriptHandle, u32)| {
            let mut core = sleep_core.borrow_mut();
            if !core.handles.contains_key(&handle) {
                warn!(
                    target: "scripting_slave",
                    "FIFE_Sleep on unregistered handle {handle} from {}",
                    sleep_frames.describe()
                );
                return Ok(false);
            }
            let now = core.bridge.tick();
            let scheduled = core.sleeping.schedule(handle, now, ticks);
            if !scheduled {
                debug!(
                    target: "scripting_slave",
                    "lua table {handle} is already sleeping ({})",
                    sleep_frames.describe()
                );
            }
            Ok(scheduled)
        })?,
    )?;

    let command_core = core.clone();
    globals.set(
        "FIFE_ExecCommand",
        lua.create_function(
            move |_,
                  (object, command_id, p0, p1, p2, p3, text): (
                Value,
                u64,
                i64,
                i64,
                i64,
                i64,
                String,
            )| {
                let info = CommandInfo {
                    object: object_id(&object)?,
                    command_id,
                    params: [p0, p1, p2, p3],
                    string_param: text,
                };
                let mut core = command_core.borrow_mut();
                let event = core.bridge.event_with(kind::COMMAND, code::EXEC_COMMAND, info);
                core.bridge.send_event(event);
                Ok(())
            },
        )?,
    )?;

    let ticks_core = core;
    globals.set(
        "FIFE_GetTicks",
        lua.create_function(move |_, ()| Ok(ticks_core.borrow().bridge.tick()))?,
    )?;

    Ok(())
}
