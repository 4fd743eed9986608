//! Simulation-side endpoint. The [`Runner`] owns the world, spawns the
//! scripting thread and is the only place script commands touch simulation
//! state: they are dispatched synchronously inside [`Runner::turn`].

use std::thread::{self, JoinHandle};

use log::{debug, error, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::bridge::{AsyncBridge, BridgeError, BridgeStats, Drain, Endpoint};
use crate::command::{Command, CommandContext, CommandError, CommandInfo, CommandTable};
use crate::event::{code, kind, Event};
use crate::script::ScriptSource;
use crate::slave::ScriptingSlave;
use crate::view::{ImageCache, View, Visual};
use crate::world::World;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("scripting thread is already running")]
    AlreadyRunning,
    #[error("scripting thread is not running")]
    NotRunning,
    #[error("elevation {0} does not exist")]
    UnknownElevation(usize),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    #[error(transparent)]
    Command(#[from] CommandError),
    #[error("spawning scripting thread: {0}")]
    Spawn(#[source] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerState {
    Idle,
    ScriptRunning,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub dispatched: u64,
    pub unknown_commands: u64,
    pub failed_commands: u64,
}

pub struct Runner<V: View> {
    bridge: AsyncBridge,
    world: World,
    view: V,
    images: ImageCache,
    commands: CommandTable,
    ruleset: Option<ScriptSource>,
    worker: Option<JoinHandle<u32>>,
    dispatch: DispatchStats,
}

impl<V: View> Runner<V> {
    pub fn new(world: World, view: V) -> Self {
        Runner {
            bridge: AsyncBridge::new(),
            world,
            view,
            images: ImageCache::new(),
            commands: CommandTable::new(),
            ruleset: None,
            worker: None,
            dispatch: DispatchStats::default(),
        }
    }

    /// Script sent to the scripting thread first on every `start()`.
    pub fn set_ruleset(&mut self, ruleset: ScriptSource) {
        self.ruleset = Some(ruleset);
    }

    pub fn state(&self) -> RunnerState {
        if self.worker.is_some() {
            RunnerState::ScriptRunning
        } else {
            RunnerState::Idle
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Ticks elapsed since the runner was created, one per `turn()`.
    pub fn tick(&self) -> u32 {
        self.bridge.tick()
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn bridge_stats(&self) -> BridgeStats {
        self.bridge.stats()
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatch
    }

    /// Expose a command to scripts. Ids must be unique.
    pub fn register_command<C>(&mut self, id: u64, handler: C) -> Result<(), RunnerError>
    where
        C: Command + 'static,
    {
        self.commands.register(id, handler)?;
        Ok(())
    }

    /// Expose a command, replacing any handler already bound to `id`.
    pub fn replace_command<C>(&mut self, id: u64, handler: C) -> bool
    where
        C: Command + 'static,
    {
        let replaced = self.commands.replace(id, handler);
        if replaced {
            warn!(target: "map_runner", "command id {id} was re-registered");
        }
        replaced
    }

    pub fn commands_mut(&mut self) -> &mut CommandTable {
        &mut self.commands
    }

    /// Spawn the scripting thread, send it the ruleset and announce every
    /// non-static object in world traversal order.
    pub fn start(&mut self) -> Result<(), RunnerError> {
        if self.worker.is_some() {
            return Err(RunnerError::AlreadyRunning);
        }

        let mut slave_bridge = AsyncBridge::new();
        self.bridge.pair(&mut slave_bridge)?;
        let worker = match thread::Builder::new()
            .name("scripting_slave".to_string())
            .spawn(move || slave_thread(slave_bridge))
        {
            Ok(worker) => worker,
            Err(err) => {
                self.bridge.unlink();
                return Err(RunnerError::Spawn(err));
            }
        };

        let mut announced = 0;
        match self.ruleset.clone() {
            Some(ruleset) => {
                let bootstrap = self.bridge.event_with(kind::SCRIPT, code::EXEC, ruleset);
                self.bridge.send_event(bootstrap);
                for info in self.world.dynamic_objects() {
                    let event = self.bridge.event_with(kind::WORLD, code::NEW_OBJECT, info);
                    self.bridge.send_event(event);
                    announced += 1;
                }
            }
            None => warn!(target: "map_runner", "no ruleset set; objects are not announced"),
        }
        self.bridge.send_events();
        self.worker = Some(worker);
        info!(
            target: "map_runner",
            "scripting thread started; announced {announced} objects"
        );
        Ok(())
    }

    /// Advance the clock, send a heartbeat, flush, then dispatch whatever
    /// commands the scripting thread has flushed so far.
    pub fn turn(&mut self) -> Drain {
        let tick = self.bridge.tick().wrapping_add(1);
        self.bridge.set_tick(tick);
        let heartbeat = self.bridge.event(kind::CONTROL, code::HEARTBEAT);
        self.bridge.send_event(heartbeat);
        self.bridge.send_events();
        self.process_events()
    }

    /// Show every visual on `elevation` and tell the ruleset about it. The
    /// activation event goes out with the next flush.
    pub fn activate_elevation(&mut self, elevation: usize) -> Result<usize, RunnerError> {
        let shown = self.display_elevation(elevation)?;
        let activate = self.bridge.event_with(
            kind::SCRIPT,
            code::EXEC_STRING,
            format!("ActivateElevation({elevation})"),
        );
        self.bridge.send_event(activate);
        Ok(shown)
    }

    /// Hand every object with a visual location on `elevation` to the view.
    /// Returns the number of visuals added.
    pub fn display_elevation(&mut self, elevation: usize) -> Result<usize, RunnerError> {
        let level = self
            .world
            .elevations
            .get_mut(elevation)
            .ok_or(RunnerError::UnknownElevation(elevation))?;
        let mut visuals = 0;
        let mut objects = 0;
        for layer in &mut level.layers {
            for object in &mut layer.objects {
                objects += 1;
                let Some(location) = object.visual.as_deref() else {
                    continue;
                };
                let Some(image) = self.images.add_image_from_location(location) else {
                    continue;
                };
                let visual_id = self.view.add_visual(Visual {
                    object: object.id,
                    image,
                    location: location.to_string(),
                    elevation,
                    position: object.position,
                });
                object.visual_id = Some(visual_id);
                visuals += 1;
                debug!(
                    target: "map_runner",
                    "adding visual for object {} image:{image} location:{location}",
                    object.id
                );
            }
        }
        info!(
            target: "map_runner",
            "displaying {visuals} visuals from {objects} objects on elevation {elevation}"
        );
        Ok(visuals)
    }

    /// Send the shutdown sentinel and wait for the scripting thread.
    ///
    /// There is no timeout: a script stuck inside a long native call keeps
    /// this join waiting indefinitely.
    pub fn stop(&mut self) -> Result<(), RunnerError> {
        let worker = self.worker.take().ok_or(RunnerError::NotRunning)?;
        self.bridge.send_shutdown();
        match worker.join() {
            Ok(result) => info!(target: "map_runner", "scripting thread returned {result}"),
            Err(_) => error!(target: "map_runner", "scripting thread panicked"),
        }
        let lost = self.bridge.clear_queue();
        if lost > 0 {
            info!(target: "map_runner", "discarded {lost} queued events after stop");
        }
        self.bridge.unlink();
        Ok(())
    }

    fn do_command(&mut self, info: &CommandInfo) {
        let mut ctx = CommandContext {
            world: &mut self.world,
            view: &mut self.view,
            images: &mut self.images,
        };
        match self.commands.dispatch(&mut ctx, info) {
            Some(Ok(())) => self.dispatch.dispatched += 1,
            Some(Err(err)) => {
                self.dispatch.failed_commands += 1;
                warn!(
                    target: "map_runner",
                    "command {} on object {} failed: {err}",
                    info.command_id,
                    info.object
                );
            }
            None => {
                self.dispatch.unknown_commands += 1;
                warn!(
                    target: "map_runner",
                    "script requested unknown command {}",
                    info.command_id
                );
            }
        }
    }
}

impl<V: View> Endpoint for Runner<V> {
    fn with_bridge<R>(&mut self, f: impl FnOnce(&mut AsyncBridge) -> R) -> R {
        f(&mut self.bridge)
    }

    fn process_event(&mut self, event: &Event) {
        match event.code() {
            code::EXEC_COMMAND => match event.get::<CommandInfo>() {
                Ok(info) => self.do_command(info),
                Err(err) => warn!(target: "map_runner", "malformed command event: {err}"),
            },
            _ => self.bridge.process_base_event(event),
        }
    }
}

impl<V: View> Drop for Runner<V> {
    fn drop(&mut self) {
        if self.worker.is_some() {
            if let Err(err) = self.stop() {
                error!(target: "map_runner", "stopping scripting thread on drop: {err}");
            }
        }
    }
}

fn slave_thread(bridge: AsyncBridge) -> u32 {
    debug!(target: "slave_thread", "entering ScriptingSlave::run()");
    let result = match ScriptingSlave::new(bridge) {
        Ok(mut slave) => slave.run(),
        Err(err) => {
            error!(target: "slave_thread", "{err}");
            0
        }
    };
    debug!(target: "slave_thread", "leaving ScriptingSlave::run()");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::view::RecordingView;
    use crate::world::{Elevation, Layer, Point, WorldObject};

    fn object(id: u64, visual: Option<&str>) -> WorldObject {
        WorldObject {
            id,
            name: format!("object{id}"),
            is_static: visual.is_some(),
            position: Point { x: id as i64, y: 0 },
            visual: visual.map(str::to_string),
            visual_id: None,
            movement: None,
            actions: Default::default(),
        }
    }

    fn runner() -> Runner<RecordingView> {
        let world = World {
            elevations: vec![Elevation {
                layers: vec![Layer {
                    objects: vec![
                        object(1, Some("gfx/wall.png")),
                        object(2, None),
                        object(3, Some("gfx/wall.png")),
                    ],
                }],
            }],
        };
        Runner::new(world, RecordingView::new())
    }

    #[test]
    fn idle_runner_rejects_stop_and_drops_heartbeats() {
        let mut runner = runner();
        assert_eq!(runner.state(), RunnerState::Idle);
        assert!(matches!(runner.stop(), Err(RunnerError::NotRunning)));
        assert_eq!(runner.turn(), Drain::Processed(0));
        assert_eq!(runner.tick(), 1);
        assert_eq!(runner.bridge_stats().dropped, 1);
    }

    #[test]
    fn display_elevation_adds_visuals_and_rejects_unknown_levels() {
        let mut runner = runner();
        assert_eq!(runner.display_elevation(0).expect("elevation 0"), 2);
        assert_eq!(runner.view().visuals().len(), 2);
        assert_eq!(runner.view().visuals()[0].image, runner.view().visuals()[1].image);
        assert_eq!(runner.world().object(3).and_then(|o| o.visual_id), Some(2));
        assert!(matches!(
            runner.activate_elevation(4),
            Err(RunnerError::UnknownElevation(4))
        ));
    }

    #[test]
    fn duplicate_command_ids_are_reported() {
        fn noop(_: &mut CommandContext<'_>, _: &CommandInfo) -> Result<(), CommandError> {
            Ok(())
        }

        let mut runner = runner();
        runner.register_command(9, noop).expect("first registration");
        assert!(matches!(
            runner.register_command(9, noop),
            Err(RunnerError::Command(CommandError::DuplicateId(9)))
        ));
        assert!(runner.replace_command(9, noop));
    }

    #[test]
    fn start_twice_is_rejected_and_stop_allows_restart() {
        let mut runner = runner();
        runner.set_ruleset(ScriptSource::from_text("function AddObject(obj) end"));
        runner.start().expect("first start");
        assert_eq!(runner.state(), RunnerState::ScriptRunning);
        assert!(matches!(runner.start(), Err(RunnerError::AlreadyRunning)));
        runner.turn();
        runner.stop().expect("stop");
        assert!(!runner.is_running());

        runner.start().expect("restart after stop");
        runner.stop().expect("second stop");
    }
}
