use log::debug;

use super::{Command, CommandContext, CommandError, CommandInfo, CommandTable};
use crate::view::Visual;
use crate::world::{Movement, Point};

pub const SET_VISUAL: u64 = 1;
pub const START_MOVEMENT: u64 = 2;
pub const ENQUEUE_ACTION: u64 = 3;

/// Register the commands every map host exposes to its ruleset.
pub fn register_builtin_commands(table: &mut CommandTable) -> Result<(), CommandError> {
    table.register(SET_VISUAL, SetVisual)?;
    table.register(START_MOVEMENT, StartMovement)?;
    table.register(ENQUEUE_ACTION, EnqueueAction)?;
    Ok(())
}

/// Swap an object's visual for the location in `string_param`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SetVisual;

impl Command for SetVisual {
    fn execute(
        &mut self,
        ctx: &mut CommandContext<'_>,
        info: &CommandInfo,
    ) -> Result<(), CommandError> {
        let location = info.string_param.trim();
        let image = ctx
            .images
            .add_image_from_location(location)
            .ok_or_else(|| CommandError::InvalidParams("empty visual location".to_string()))?;
        let elevation = ctx
            .world
            .elevations
            .iter()
            .position(|elevation| {
                elevation
                    .layers
                    .iter()
                    .any(|layer| layer.objects.iter().any(|o| o.id == info.object))
            })
            .ok_or(CommandError::UnknownObject(info.object))?;
        let object = ctx
            .world
            .object_mut(info.object)
            .ok_or(CommandError::UnknownObject(info.object))?;
        object.visual = Some(location.to_string());
        let visual_id = ctx.view.add_visual(Visual {
            object: object.id,
            image,
            location: location.to_string(),
            elevation,
            position: object.position,
        });
        object.visual_id = Some(visual_id);
        debug!(target: "commands", "object {} now shows {location}", info.object);
        Ok(())
    }
}

/// Walk an object toward `(params[0], params[1])` at `params[2]` tiles per
/// tick (at least one).
#[derive(Debug, Default, Clone, Copy)]
pub struct StartMovement;

impl Command for StartMovement {
    fn execute(
        &mut self,
        ctx: &mut CommandContext<'_>,
        info: &CommandInfo,
    ) -> Result<(), CommandError> {
        let speed = info.params[2];
        if speed < 0 {
            return Err(CommandError::InvalidParams(format!(
                "negative speed {speed}"
            )));
        }
        let object = ctx
            .world
            .object_mut(info.object)
            .ok_or(CommandError::UnknownObject(info.object))?;
        object.movement = Some(Movement {
            target: Point {
                x: info.params[0],
                y: info.params[1],
            },
            speed: speed.max(1),
        });
        Ok(())
    }
}

/// Append `string_param` to an object's action queue.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnqueueAction;

impl Command for EnqueueAction {
    fn execute(
        &mut self,
        ctx: &mut CommandContext<'_>,
        info: &CommandInfo,
    ) -> Result<(), CommandError> {
        let action = info.string_param.trim();
        if action.is_empty() {
            return Err(CommandError::InvalidParams("empty action".to_string()));
        }
        let object = ctx
            .world
            .object_mut(info.object)
            .ok_or(CommandError::UnknownObject(info.object))?;
        object.actions.push_back(action.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::view::{ImageCache, RecordingView};
    use crate::world::{Elevation, Layer, World, WorldObject};

    fn world() -> World {
        World {
            elevations: vec![
                Elevation::default(),
                Elevation {
                    layers: vec![Layer {
                        objects: vec![WorldObject {
                            id: 11,
                            name: "guard".to_string(),
                            is_static: false,
                            position: Point { x: 4, y: 4 },
                            visual: None,
                            visual_id: None,
                            movement: None,
                            actions: VecDeque::new(),
                        }],
                    }],
                },
            ],
        }
    }

    fn info(command_id: u64, params: [i64; 4], text: &str) -> CommandInfo {
        CommandInfo {
            object: 11,
            command_id,
            params,
            string_param: text.to_string(),
        }
    }

    #[test]
    fn builtin_commands_mutate_the_world() {
        let mut table = CommandTable::new();
        register_builtin_commands(&mut table).expect("builtins register once");
        assert_eq!(
            register_builtin_commands(&mut table),
            Err(CommandError::DuplicateId(SET_VISUAL))
        );

        let mut world = world();
        let mut view = RecordingView::new();
        let mut images = ImageCache::new();
        let mut ctx = CommandContext {
            world: &mut world,
            view: &mut view,
            images: &mut images,
        };

        let results = [
            table.dispatch(&mut ctx, &info(SET_VISUAL, [0; 4], "gfx/guard_alert.png")),
            table.dispatch(&mut ctx, &info(START_MOVEMENT, [8, 2, 3, 0], "")),
            table.dispatch(&mut ctx, &info(ENQUEUE_ACTION, [0; 4], "bark")),
        ];
        assert!(results.iter().all(|result| *result == Some(Ok(()))));

        let guard = world.object(11).expect("guard");
        assert_eq!(guard.visual.as_deref(), Some("gfx/guard_alert.png"));
        assert_eq!(guard.visual_id, Some(1));
        assert_eq!(
            guard.movement,
            Some(Movement {
                target: Point { x: 8, y: 2 },
                speed: 3,
            })
        );
        assert_eq!(guard.actions, VecDeque::from(vec!["bark".to_string()]));
        assert_eq!(view.visuals()[0].elevation, 1);
    }

    #[test]
    fn script_supplied_extreme_targets_keep_the_world_stepping() {
        let mut world = world();
        world.object_mut(11).expect("guard").position = Point { x: -7, y: 0 };
        let mut view = RecordingView::new();
        let mut images = ImageCache::new();
        let mut ctx = CommandContext {
            world: &mut world,
            view: &mut view,
            images: &mut images,
        };
        assert_eq!(
            StartMovement.execute(&mut ctx, &info(START_MOVEMENT, [i64::MAX, 0, 1, 0], "")),
            Ok(())
        );

        assert_eq!(world.advance(), 1);
        assert_eq!(world.object(11).map(|o| o.position), Some(Point { x: -6, y: 0 }));
    }

    #[test]
    fn builtin_commands_reject_bad_input() {
        let mut world = world();
        let mut view = RecordingView::new();
        let mut images = ImageCache::new();
        let mut ctx = CommandContext {
            world: &mut world,
            view: &mut view,
            images: &mut images,
        };

        let mut missing = info(ENQUEUE_ACTION, [0; 4], "bark");
        missing.object = 99;
        assert_eq!(
            EnqueueAction.execute(&mut ctx, &missing),
            Err(CommandError::UnknownObject(99))
        );
        assert!(matches!(
            SetVisual.execute(&mut ctx, &info(SET_VISUAL, [0; 4], "  ")),
            Err(CommandError::InvalidParams(_))
        ));
        assert!(matches!(
            StartMovement.execute(&mut ctx, &info(START_MOVEMENT, [1, 1, -2, 0], "")),
            Err(CommandError::InvalidParams(_))
        ));
    }
}
