use std::collections::VecDeque;
use std::fs;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use fife_bridge::{
    register_builtin_commands, BridgeStats, DispatchStats, ObjectId, Point, RecordingView, Runner,
    Visual, World, WorldObject,
};
use log::info;
use serde::Serialize;

use crate::cli::RunArgs;

#[derive(Serialize)]
struct RunReport<'a> {
    turns: u32,
    final_tick: u32,
    elevation: usize,
    objects: Vec<ObjectReport<'a>>,
    visuals: &'a [Visual],
    bridge: BridgeStats,
    commands: DispatchStats,
}

#[derive(Serialize)]
struct ObjectReport<'a> {
    id: ObjectId,
    name: &'a str,
    position: Point,
    visual: Option<&'a str>,
    moving: bool,
    actions: &'a VecDeque<String>,
}

pub fn execute(args: RunArgs) -> Result<()> {
    let RunArgs {
        map,
        ruleset,
        turns,
        tick_ms,
        elevation,
        report_json,
        verbose: _,
    } = args;

    let world =
        World::from_json_file(&map).with_context(|| format!("loading map {}", map.display()))?;
    info!(
        target: "map_runner",
        "loaded {} with {} elevations",
        map.display(),
        world.elevation_count()
    );

    let mut runner = Runner::new(world, RecordingView::new());
    register_builtin_commands(runner.commands_mut()).context("registering built-in commands")?;
    runner.set_ruleset(ruleset);
    runner.start().context("starting scripting thread")?;
    let shown = runner
        .activate_elevation(elevation)
        .with_context(|| format!("activating elevation {elevation}"))?;
    info!(target: "map_runner", "elevation {elevation} active with {shown} visuals");

    let pause = Duration::from_millis(tick_ms);
    for _ in 0..turns {
        runner.turn();
        runner.world_mut().advance();
        thread::sleep(pause);
    }
    runner.stop().context("stopping scripting thread")?;

    let report = RunReport {
        turns,
        final_tick: runner.tick(),
        elevation,
        objects: runner.world().objects().map(object_report).collect(),
        visuals: runner.view().visuals(),
        bridge: runner.bridge_stats(),
        commands: runner.dispatch_stats(),
    };

    if let Some(path) = report_json.as_ref() {
        let json = serde_json::to_string_pretty(&report).context("serializing run report")?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
        println!("Run report written to {}", path.display());
    }

    println!(
        "Ran {} turns: {} commands dispatched ({} unknown, {} failed), {} visuals, {} events lost",
        report.turns,
        report.commands.dispatched,
        report.commands.unknown_commands,
        report.commands.failed_commands,
        report.visuals.len(),
        report.bridge.lost
    );
    Ok(())
}

fn object_report(object: &WorldObject) -> ObjectReport<'_> {
    ObjectReport {
        id: object.id,
        name: &object.name,
        position: object.position,
        visual: object.visual.as_deref(),
        moving: object.movement.is_some(),
        actions: &object.actions,
    }
}
