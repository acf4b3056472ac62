use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::ducking::DuckingConfig;
use crate::playback::PlayerCommand;
use crate::podcast::ITUNES_BASE_URL;

pub const DEFAULT_LIST_LIMIT: usize = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: Option<PathBuf>,
    pub player: PlayerCommand,
    pub tts: Option<String>,
    pub activity_file: Option<PathBuf>,
    pub directory_url: String,
    pub ducking: DuckingConfig,
    pub list_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            player: PlayerCommand::default(),
            tts: None,
            activity_file: None,
            directory_url: ITUNES_BASE_URL.to_string(),
            ducking: DuckingConfig::default(),
            list_limit: DEFAULT_LIST_LIMIT,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let mut config = Config::default();
        if let Some(path) = var("PODBUTLER_DB") {
            config.db_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = var("PODBUTLER_PLAYER") {
            match PlayerCommand::parse(&raw) {
                Some(player) => config.player = player,
                None => warn!("ignoring empty PODBUTLER_PLAYER"),
            }
        }
        config.tts = var("PODBUTLER_TTS");
        config.activity_file = var("PODBUTLER_ACTIVITY_FILE").map(PathBuf::from);
        if let Some(url) = var("PODBUTLER_DIRECTORY_URL") {
            config.directory_url = url;
        }
        if let Some(ms) = parse_var::<u64>(&var, "PODBUTLER_IDLE_TICK_MS").filter(|ms| *ms > 0) {
            config.ducking.tick = Duration::from_millis(ms);
        }
        if let Some(threshold) =
            parse_var::<u32>(&var, "PODBUTLER_IDLE_THRESHOLD").filter(|value| *value > 0)
        {
            config.ducking.idle_threshold = threshold;
        }
        if let Some(skill_id) = var("PODBUTLER_SKILL_ID") {
            config.ducking.skill_id = skill_id;
        }
        if let Some(limit) = parse_var::<usize>(&var, "PODBUTLER_LIST_LIMIT").filter(|n| *n > 0) {
            config.list_limit = limit;
        }
        config
    }
}

fn parse_var<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(%key, value = %raw, "ignoring unparsable setting");
            None
        }
    }
}
