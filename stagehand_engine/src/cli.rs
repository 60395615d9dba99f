use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    about = "Runs Lua gameplay scripts against a fixed-step simulation clock",
    version
)]
pub struct Args {
    /// Lua script started in the global context
    #[arg(long)]
    pub game_script: Option<PathBuf>,

    /// Lua script started in the map context after the map loads
    #[arg(long)]
    pub map_script: Option<PathBuf>,

    /// Name reported for the loaded map (defaults to the map script's stem)
    #[arg(long)]
    pub map_name: Option<String>,

    /// Lua script started in the pause-menu context
    #[arg(long)]
    pub pause_script: Option<PathBuf>,

    /// Inline Lua chunk started in the global context (repeatable)
    #[arg(long = "exec", value_name = "LUA")]
    pub exec: Vec<String>,

    /// Number of logic ticks to simulate
    #[arg(long, default_value_t = 120)]
    pub ticks: u64,

    /// Milliseconds the clock advances per tick
    #[arg(long, default_value_t = 16)]
    pub tick_ms: u64,

    /// Automatically select this choice (0-based) on every open dialog
    #[arg(long, value_name = "INDEX")]
    pub choose: Option<usize>,

    /// Pause the game before this tick (1-based)
    #[arg(long, value_name = "TICK")]
    pub pause_at: Option<u64>,

    /// Resume the game before this tick (1-based)
    #[arg(long, value_name = "TICK")]
    pub resume_at: Option<u64>,

    /// Path to write the script event log and failures as JSON
    #[arg(long)]
    pub event_log_json: Option<PathBuf>,

    /// Path to write the final world snapshot as JSON
    #[arg(long)]
    pub world_json: Option<PathBuf>,

    /// Enable debug logging of cothread and command lifecycles
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub game_script: Option<PathBuf>,
    pub map_script: Option<PathBuf>,
    pub map_name: Option<String>,
    pub pause_script: Option<PathBuf>,
    pub exec: Vec<String>,
    pub ticks: u64,
    pub tick_ms: u64,
    pub choose: Option<usize>,
    pub pause_at: Option<u64>,
    pub resume_at: Option<u64>,
    pub event_log_json: Option<PathBuf>,
    pub world_json: Option<PathBuf>,
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            game_script: None,
            map_script: None,
            map_name: None,
            pause_script: None,
            exec: Vec::new(),
            ticks: 120,
            tick_ms: 16,
            choose: None,
            pause_at: None,
            resume_at: None,
            event_log_json: None,
            world_json: None,
            verbose: false,
        }
    }
}

pub fn parse() -> Result<EngineConfig> {
    let args = Args::parse();
    args.into_config()
}

impl Args {
    fn into_config(self) -> Result<EngineConfig> {
        if self.tick_ms == 0 {
            bail!("--tick-ms must be greater than zero");
        }
        if let (Some(pause), Some(resume)) = (self.pause_at, self.resume_at) {
            if resume <= pause {
                bail!("--resume-at ({resume}) must come after --pause-at ({pause})");
            }
        }
        if self.game_script.is_none()
            && self.map_script.is_none()
            && self.pause_script.is_none()
            && self.exec.is_empty()
        {
            bail!("nothing to run: pass --game-script, --map-script, --pause-script or --exec");
        }

        let map_name = self.map_name.or_else(|| {
            self.map_script
                .as_ref()
                .and_then(|path| path.file_stem())
                .and_then(|stem| stem.to_str())
                .map(str::to_string)
        });

        Ok(EngineConfig {
            game_script: self.game_script,
            map_script: self.map_script,
            map_name,
            pause_script: self.pause_script,
            exec: self.exec,
            ticks: self.ticks,
            tick_ms: self.tick_ms,
            choose: self.choose,
            pause_at: self.pause_at,
            resume_at: self.resume_at,
            event_log_json: self.event_log_json,
            world_json: self.world_json,
            verbose: self.verbose,
        })
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Args;

    #[test]
    fn map_name_defaults_to_script_stem() {
        let args = Args::parse_from(["stagehand_engine", "--map-script", "maps/dock.lua"]);
        let config = args.into_config().expect("valid arguments");
        assert_eq!(config.map_name.as_deref(), Some("dock"));
        assert_eq!(config.ticks, 120);
    }

    #[test]
    fn rejects_resume_before_pause() {
        let args = Args::parse_from([
            "stagehand_engine",
            "--game-script",
            "game.lua",
            "--pause-at",
            "10",
            "--resume-at",
            "5",
        ]);
        assert!(args.into_config().is_err());
    }

    #[test]
    fn exec_chunks_count_as_scripts() {
        let args = Args::parse_from([
            "stagehand_engine",
            "--exec",
            "log('one')",
            "--exec",
            "log('two')",
        ]);
        let config = args.into_config().expect("inline chunks are enough");
        assert_eq!(config.exec, vec!["log('one')", "log('two')"]);
        assert!(config.map_name.is_none());
    }

    #[test]
    fn requires_a_script() {
        let args = Args::parse_from(["stagehand_engine", "--ticks", "5"]);
        assert!(args.into_config().is_err());
    }
}
