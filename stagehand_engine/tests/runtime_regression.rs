use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result};
use serde::Deserialize;
use tempfile::tempdir;

#[derive(Debug, Deserialize)]
struct EventLogReport {
    events: Vec<EventEntry>,
    failures: Vec<FailureEntry>,
}

#[derive(Debug, Deserialize)]
struct EventEntry {
    tick: u64,
    context: String,
    message: String,
}

#[derive(Debug, Deserialize)]
struct FailureEntry {
    frame: u64,
    context: String,
    label: Option<String>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WorldReport {
    camera: CameraEntry,
    entities: Vec<EntityEntry>,
}

#[derive(Debug, Deserialize)]
struct CameraEntry {
    position: Position,
}

#[derive(Debug, Deserialize)]
struct EntityEntry {
    name: String,
    position: Position,
    opacity: f32,
}

#[derive(Debug, Deserialize)]
struct Position {
    x: f32,
    y: f32,
}

fn scripts_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scripts")
}

fn path_arg(path: &Path) -> Result<&str> {
    path.to_str()
        .with_context(|| format!("{} is not valid UTF-8", path.display()))
}

fn run_engine(args: &[&str]) -> Result<Output> {
    Command::new(env!("CARGO_BIN_EXE_stagehand_engine"))
        .args(args)
        .output()
        .context("executing stagehand_engine")
}

fn transcript(output: &Output) -> String {
    let mut transcript = String::from_utf8_lossy(&output.stdout).to_string();
    transcript.push_str(&String::from_utf8_lossy(&output.stderr));
    transcript
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

#[test]
fn bundled_scripts_regression() -> Result<()> {
    let scripts = scripts_dir();
    let temp_dir = tempdir().context("creating temporary directory for reports")?;
    let events_path = temp_dir.path().join("events.json");
    let world_path = temp_dir.path().join("world.json");

    let game = scripts.join("game.lua");
    let dock = scripts.join("dock.lua");
    let menu = scripts.join("pause_menu.lua");
    let output = run_engine(&[
        "--game-script",
        path_arg(&game)?,
        "--map-script",
        path_arg(&dock)?,
        "--pause-script",
        path_arg(&menu)?,
        "--ticks",
        "200",
        "--tick-ms",
        "16",
        "--choose",
        "0",
        "--pause-at",
        "120",
        "--event-log-json",
        path_arg(&events_path)?,
        "--world-json",
        path_arg(&world_path)?,
    ])?;
    assert!(
        output.status.success(),
        "stagehand_engine exited with {:?}: {}",
        output.status,
        transcript(&output)
    );

    let report: EventLogReport = read_json(&events_path)?;
    assert!(
        report.failures.is_empty(),
        "unexpected failures: {:?}",
        report.failures
    );
    let messages: Vec<&str> = report.events.iter().map(|e| e.message.as_str()).collect();
    for expected in [
        "game.start",
        "map.load dock",
        "dock.enter",
        "game.answer aye",
        "dock.crate_at 120,0",
        "dock.crate_gone",
        "menu.open",
        "menu.close",
    ] {
        assert!(
            messages.contains(&expected),
            "missing event {expected:?} in {messages:?}"
        );
    }
    assert!(messages.iter().any(|m| m.starts_with("game.heartbeat")));

    let arrived = report
        .events
        .iter()
        .find(|e| e.message == "dock.crate_at 120,0")
        .context("crate arrival event")?;
    assert_eq!(arrived.context, "MAP");
    assert_eq!(arrived.tick, 800);

    let menu_open = report
        .events
        .iter()
        .find(|e| e.message == "menu.open")
        .context("menu open event")?;
    assert_eq!(menu_open.context, "PAUSE");

    let world: WorldReport = read_json(&world_path)?;
    assert_eq!(world.entities.len(), 1);
    assert_eq!(world.entities[0].name, "narrator");
    assert_eq!(world.entities[0].position.x, 0.0);
    assert_eq!(world.entities[0].position.y, 0.0);
    assert_eq!(world.entities[0].opacity, 1.0);
    assert_eq!(world.camera.position.x, 120.0);
    Ok(())
}

#[test]
fn failing_script_is_reported_not_fatal() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary directory for scripts")?;
    let script = temp_dir.path().join("broken.lua");
    fs::write(
        &script,
        "log('before')\nwait(32)\nerror('lost the map')\n",
    )
    .context("writing broken script")?;
    let helper = temp_dir.path().join("steady.lua");
    fs::write(&helper, "for i = 1, 5 do wait() end\nlog('steady done')\n")
        .context("writing steady script")?;
    let events_path = temp_dir.path().join("reports").join("events.json");

    let output = run_engine(&[
        "--game-script",
        path_arg(&helper)?,
        "--map-script",
        path_arg(&script)?,
        "--ticks",
        "10",
        "--event-log-json",
        path_arg(&events_path)?,
    ])?;
    assert!(
        output.status.success(),
        "stagehand_engine exited with {:?}: {}",
        output.status,
        transcript(&output)
    );
    assert!(transcript(&output).contains("Script failures:"));

    let report: EventLogReport = read_json(&events_path)?;
    assert_eq!(report.failures.len(), 1);
    let failure = &report.failures[0];
    assert_eq!(failure.context, "MAP");
    assert_eq!(failure.label.as_deref(), Some("broken.lua"));
    assert_eq!(failure.frame, 2);
    assert!(failure.message.contains("lost the map"));

    let messages: Vec<&str> = report.events.iter().map(|e| e.message.as_str()).collect();
    assert!(messages.contains(&"before"));
    assert!(messages.contains(&"steady done"));
    Ok(())
}

#[test]
fn exec_chunks_run_in_the_global_context() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary directory for reports")?;
    let events_path = temp_dir.path().join("events.json");
    let output = run_engine(&[
        "--exec",
        "wait(100); log('woke ' .. ticks())",
        "--exec",
        "start_script(function() error('child exploded') end)",
        "--ticks",
        "10",
        "--event-log-json",
        path_arg(&events_path)?,
    ])?;
    assert!(
        output.status.success(),
        "stagehand_engine exited with {:?}: {}",
        output.status,
        transcript(&output)
    );

    let report: EventLogReport = read_json(&events_path)?;
    let woke = report
        .events
        .iter()
        .find(|e| e.message == "woke 112")
        .context("exec chunk event")?;
    assert_eq!(woke.context, "GLOBAL");
    assert_eq!(woke.tick, 112);

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].context, "GLOBAL");
    assert_eq!(report.failures[0].frame, 0);
    assert!(report.failures[0].message.contains("child exploded"));
    Ok(())
}

#[test]
fn missing_script_fails_the_run() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary directory")?;
    let missing = temp_dir.path().join("nope.lua");
    let output = run_engine(&["--game-script", path_arg(&missing)?, "--ticks", "1"])?;
    assert!(!output.status.success());
    assert!(
        transcript(&output).contains("nope.lua"),
        "error should name the script: {}",
        transcript(&output)
    );
    Ok(())
}
