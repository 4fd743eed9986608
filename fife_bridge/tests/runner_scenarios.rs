use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use fife_bridge::{
    register_builtin_commands, CommandContext, CommandError, CommandInfo, Elevation, Layer, Point,
    RecordingView, Runner, RunnerState, ScriptSource, World, WorldObject, ENQUEUE_ACTION,
};

const REPORT: u64 = 7;
const WOKE: u64 = 8;
const ACTIVATED: u64 = 9;

type Reports = Rc<RefCell<Vec<CommandInfo>>>;

fn object(id: u64, name: &str, is_static: bool) -> WorldObject {
    WorldObject {
        id,
        name: name.to_string(),
        is_static,
        position: Point { x: id as i64, y: 1 },
        visual: Some(format!("gfx/{name}.png")),
        visual_id: None,
        movement: None,
        actions: VecDeque::new(),
    }
}

/// Three dynamic objects spread over two elevations plus one static wall.
fn world() -> World {
    World {
        elevations: vec![
            Elevation {
                layers: vec![
                    Layer {
                        objects: vec![object(10, "guard", false), object(11, "wall", true)],
                    },
                    Layer {
                        objects: vec![object(12, "dog", false)],
                    },
                ],
            },
            Elevation {
                layers: vec![Layer {
                    objects: vec![object(20, "crow", false)],
                }],
            },
        ],
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn runner_with(ruleset: &str) -> (Runner<RecordingView>, Reports) {
    init_logging();
    let mut runner = Runner::new(world(), RecordingView::new());
    runner.set_ruleset(ScriptSource::from_text(ruleset));
    let reports: Reports = Rc::new(RefCell::new(Vec::new()));
    for id in [REPORT, WOKE, ACTIVATED] {
        let sink = reports.clone();
        runner
            .register_command(
                id,
                move |_: &mut CommandContext<'_>, info: &CommandInfo| -> Result<(), CommandError> {
                    sink.borrow_mut().push(info.clone());
                    Ok(())
                },
            )
            .expect("unique command id");
    }
    (runner, reports)
}

fn turn_until(
    runner: &mut Runner<RecordingView>,
    mut done: impl FnMut(&Runner<RecordingView>) -> bool,
) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        runner.turn();
        if done(runner) {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn objects_are_announced_in_traversal_order_before_the_first_heartbeat() {
    let (mut runner, reports) = runner_with(
        r#"
        function AddObject(obj)
            FIFE_ExecCommand(obj, 7, FIFE_GetTicks(), obj.elevation, 0, 0, obj.name)
        end
        "#,
    );
    runner.start().expect("start");
    assert!(turn_until(&mut runner, |_| reports.borrow().len() >= 3));
    runner.stop().expect("stop");

    let seen: Vec<(u64, i64, i64, String)> = reports
        .borrow()
        .iter()
        .map(|info| (info.object, info.params[0], info.params[1], info.string_param.clone()))
        .collect();
    assert_eq!(
        seen,
        vec![
            (10, 0, 0, "guard".to_string()),
            (12, 0, 0, "dog".to_string()),
            (20, 0, 1, "crow".to_string()),
        ]
    );
    let stats = runner.dispatch_stats();
    assert_eq!(stats.dispatched, 3);
    assert_eq!(stats.unknown_commands, 0);
}

#[test]
fn stop_returns_while_a_script_is_sleeping() {
    let (mut runner, reports) = runner_with(
        r#"
        Guard = {}
        Guard.__index = Guard
        function Guard:onWake(overslept)
            FIFE_ExecCommand(self.id, 8, overslept, 0, 0, 0, "woke")
        end
        function AddObject(obj)
            local t = setmetatable({ id = obj.id }, Guard)
            t.handle = FIFE_RegisterObject(t)
            FIFE_Sleep(t.handle, 1000)
            FIFE_ExecCommand(obj, 7, 0, 0, 0, 0, "sleeping")
        end
        "#,
    );
    runner.start().expect("start");
    assert!(turn_until(&mut runner, |_| reports.borrow().len() >= 3));

    let started = Instant::now();
    runner.stop().expect("stop");
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(runner.state(), RunnerState::Idle);
    assert!(reports
        .borrow()
        .iter()
        .all(|info| info.command_id == REPORT));
}

#[test]
fn sleepers_wake_on_the_runner_clock() {
    let (mut runner, reports) = runner_with(
        r#"
        Dog = {}
        Dog.__index = Dog
        function Dog:onWake(overslept)
            FIFE_ExecCommand(self.id, 8, FIFE_GetTicks(), overslept, 0, 0, "woke")
        end
        function AddObject(obj)
            if obj.name == "dog" then
                local t = setmetatable({ id = obj.id }, Dog)
                FIFE_Sleep(FIFE_RegisterObject(t), 3)
            end
        end
        "#,
    );
    runner.start().expect("start");
    assert!(turn_until(&mut runner, |_| !reports.borrow().is_empty()));
    runner.stop().expect("stop");

    let reports = reports.borrow();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].command_id, WOKE);
    assert_eq!(reports[0].object, 12);
    assert!(reports[0].params[0] >= 3);
    assert_eq!(reports[0].params[0] - 3, reports[0].params[1]);
}

#[test]
fn activating_an_elevation_shows_it_and_notifies_the_ruleset() {
    let (mut runner, reports) = runner_with(
        r#"
        function AddObject(obj) end
        function ActivateElevation(n)
            FIFE_ExecCommand(0, 9, n, 0, 0, 0, "activated")
        end
        "#,
    );
    runner.start().expect("start");
    assert_eq!(runner.activate_elevation(1).expect("elevation 1"), 1);
    assert_eq!(runner.view().visuals()[0].location, "gfx/crow.png");
    assert!(turn_until(&mut runner, |_| !reports.borrow().is_empty()));
    runner.stop().expect("stop");

    let reports = reports.borrow();
    assert_eq!(reports[0].command_id, ACTIVATED);
    assert_eq!(reports[0].params[0], 1);
}

#[test]
fn builtin_commands_run_inside_the_turn() {
    init_logging();
    let mut runner = Runner::new(world(), RecordingView::new());
    register_builtin_commands(runner.commands_mut()).expect("builtins");
    runner.set_ruleset(ScriptSource::from_text(
        r#"
        function AddObject(obj)
            FIFE_ExecCommand(obj, 3, 0, 0, 0, 0, "patrol")
            FIFE_ExecCommand(obj, 2, 15, 1, 2, 0, "")
        end
        "#,
    ));
    runner.start().expect("start");
    assert!(turn_until(&mut runner, |runner| runner.dispatch_stats().dispatched >= 6));
    runner.stop().expect("stop");

    let guard = runner.world().object(10).expect("guard");
    assert_eq!(guard.actions, VecDeque::from(vec!["patrol".to_string()]));
    assert!(guard.movement.is_some());
    assert!(runner.world().object(11).expect("wall").actions.is_empty());
    assert_eq!(runner.dispatch_stats().failed_commands, 0);

    let moved = runner.world_mut().advance();
    assert_eq!(moved, 3);
    assert!(runner.commands_mut().contains(ENQUEUE_ACTION));
}

#[test]
fn unknown_commands_are_counted_not_fatal() {
    let (mut runner, reports) = runner_with(
        r#"
        function AddObject(obj)
            FIFE_ExecCommand(obj, 99, 0, 0, 0, 0, "")
            FIFE_ExecCommand(obj, 7, 0, 0, 0, 0, "after")
        end
        "#,
    );
    runner.start().expect("start");
    assert!(turn_until(&mut runner, |_| reports.borrow().len() >= 3));
    runner.stop().expect("stop");
    assert_eq!(runner.dispatch_stats().unknown_commands, 3);
}

#[test]
fn the_runner_can_be_restarted() {
    let (mut runner, reports) = runner_with(
        "function AddObject(obj) FIFE_ExecCommand(obj, 7, 0, 0, 0, 0, obj.name) end",
    );
    runner.start().expect("first start");
    assert!(turn_until(&mut runner, |_| reports.borrow().len() >= 3));
    runner.stop().expect("first stop");

    runner.start().expect("second start");
    assert!(turn_until(&mut runner, |_| reports.borrow().len() >= 6));
    runner.stop().expect("second stop");
    assert!(runner.bridge_stats().lost <= runner.bridge_stats().flushed);
}
