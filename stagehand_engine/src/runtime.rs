use std::{fs, path::Path};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use stagehand_script::{ContextTag, ScriptEvent};

use crate::cli::EngineConfig;
use crate::engine::{Engine, RunSummary, ScriptFailure};

#[derive(Serialize)]
struct EventLogReport<'a> {
    events: &'a [ScriptEvent],
    failures: &'a [ScriptFailure],
}

pub fn execute(config: EngineConfig) -> Result<RunSummary> {
    let mut engine = Engine::new(&config)?;
    let EngineConfig {
        game_script,
        map_script,
        map_name,
        pause_script,
        exec,
        ticks,
        tick_ms,
        choose,
        pause_at,
        resume_at,
        event_log_json,
        world_json,
        verbose: _,
    } = config;

    if resume_at.is_some() && pause_at.is_none() {
        warn!("--resume-at has no effect without --pause-at");
    }

    if let Some(path) = game_script.as_deref() {
        engine
            .schedule_file(ContextTag::Global, path)
            .with_context(|| format!("loading game script {}", path.display()))?;
    }
    for (index, code) in exec.iter().enumerate() {
        let name = format!("exec{}", index + 1);
        engine
            .schedule_code(ContextTag::Global, &name, code)
            .with_context(|| format!("running --exec chunk {}", index + 1))?;
    }
    if let Some(path) = pause_script.as_deref() {
        engine
            .schedule_file(ContextTag::PauseMenu, path)
            .with_context(|| format!("loading pause script {}", path.display()))?;
    }
    if map_script.is_some() || map_name.is_some() {
        let name = map_name.unwrap_or_else(|| "map".to_string());
        engine
            .load_map(&name, map_script.as_deref())
            .with_context(|| format!("loading map {name}"))?;
    }

    info!("simulating {ticks} ticks of {tick_ms} ms");
    for frame in 1..=ticks {
        if pause_at == Some(frame) {
            engine.set_paused(true);
        }
        if resume_at == Some(frame) {
            engine.set_paused(false);
        }
        engine.tick();
        if let Some(index) = choose {
            engine.auto_choose(index);
        }
    }

    if engine.is_paused() {
        warn!("run ended with the game still paused");
    }
    if !engine.failures().is_empty() {
        warn!("{} script failures recorded", engine.failures().len());
    }
    info!(
        "{} script events, {} entities alive",
        engine.events().len(),
        engine.world().entity_count()
    );

    let summary = engine.summary();
    if let Some(path) = event_log_json.as_ref() {
        let report = EventLogReport {
            events: &summary.events,
            failures: &summary.failures,
        };
        persist_json(path, &report, "event log")?;
    }
    if let Some(path) = world_json.as_ref() {
        persist_json(path, &summary.world, "world snapshot")?;
    }

    println!(
        "Simulated {} ticks: game {} ms, window {} ms{}",
        summary.frames,
        summary.ticks,
        summary.window_ticks,
        if summary.paused { " (paused)" } else { "" }
    );
    if let Some(map) = &summary.map {
        println!("Map: {map}");
    }
    println!(
        "Script events: {} | entities: {}",
        summary.events.len(),
        summary.world.entities.len()
    );
    if !summary.failures.is_empty() {
        println!("\nScript failures:");
        for failure in &summary.failures {
            println!(
                "  - frame {:>4} [{}] {}: {}",
                failure.frame,
                failure.context,
                failure.label.as_deref().unwrap_or("<host>"),
                failure.message
            );
        }
    }

    Ok(summary)
}

fn persist_json<T: Serialize>(path: &Path, value: &T, what: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
    }
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("serializing {what} to JSON"))?;
    fs::write(path, json).with_context(|| format!("writing {what} to {}", path.display()))?;
    println!("Saved {what} to {}", path.display());
    Ok(())
}
