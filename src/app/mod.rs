mod episode;
mod intent;
mod skill;


use std::io::BufRead;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::db::Database;
use crate::ducking::{ActivitySignal, DuckingSupervisor, FileActivitySignal, IdleSignal};
use crate::http::HttpFetcher;
use crate::ledger::{PlaybackLedger, parse_offset, podcast_of_history_key, position_key};
use crate::paths::database_file_path;
use crate::playback::{PlaybackController, PlayerCommand, ProcessBackendFactory};
use crate::podcast::{DirectoryClient, ItunesDirectory};
use crate::speech::{CommandSpeaker, ConsoleSpeaker, Speaker};

use self::episode::{
    format_clock, format_last_seen_display, format_published, format_resume_column, truncate,
};
use self::intent::parse_intent;
use self::skill::{Flow, PodcastSkill};

pub fn run(cli: Cli) -> Result<()> {
    let config = apply_overrides(Config::from_env(), &cli);
    let db = open_db(&config)?;

    match cli.command {
        Some(Command::Episodes { show }) => run_episodes(db, &config, &show.join(" "))?,
        Some(Command::History) => run_history(&db)?,
        Some(Command::Run) | None => run_session(db, &config)?,
    }

    Ok(())
}

fn apply_overrides(mut config: Config, cli: &Cli) -> Config {
    if let Some(db) = &cli.db {
        config.db_path = Some(db.clone());
    }
    if let Some(player) = cli.player.as_deref() {
        match PlayerCommand::parse(player) {
            Some(player) => config.player = player,
            None => warn!("ignoring empty --player"),
        }
    }
    if let Some(tts) = &cli.tts {
        config.tts = Some(tts.clone());
    }
    if let Some(activity_file) = &cli.activity_file {
        config.activity_file = Some(activity_file.clone());
    }
    config
}

fn run_session(db: Database, config: &Config) -> Result<()> {
    let speaker = build_speaker(config);
    let controller = Arc::new(Mutex::new(PlaybackController::new(
        PlaybackLedger::new(Box::new(db)),
        Box::new(ProcessBackendFactory::new(config.player.clone())),
        speaker.clone(),
    )));
    let signal: Arc<dyn ActivitySignal> = match &config.activity_file {
        Some(path) => Arc::new(FileActivitySignal::new(path)),
        None => Arc::new(IdleSignal),
    };
    let ducking = DuckingSupervisor::new(controller.clone(), signal, config.ducking.clone());
    let skill = PodcastSkill::new(
        controller,
        directory(config),
        speaker,
        ducking,
        config.list_limit,
    );

    info!(
        player = config.player.program(),
        "session started, reading intents from stdin"
    );
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("failed reading intent from stdin")?;
        let Some(intent) = parse_intent(&line) else {
            continue;
        };
        if skill.handle(intent) == Flow::Quit {
            break;
        }
    }

    skill.shutdown();
    info!("session ended");
    Ok(())
}

fn run_episodes(db: Database, config: &Config, show: &str) -> Result<()> {
    if show.trim().is_empty() {
        println!("Name a show, e.g. `podbutler episodes the daily`.");
        return Ok(());
    }
    let podcast = directory(config)
        .resolve(show)
        .with_context(|| format!("could not resolve \"{show}\""))?;
    if podcast.is_empty() {
        println!("{} has no episodes.", podcast.title);
        return Ok(());
    }

    let ledger = PlaybackLedger::new(Box::new(db));
    let last_played = ledger
        .get_last_episode(&podcast.url)
        .and_then(|guid| podcast.find_by_guid(&guid))
        .and_then(|episode| podcast.index_of(episode));

    println!("{} ({})", podcast.title, podcast.url);
    println!("{:<4} {:<2} {:<56} {:<12} {:<10}", "#", "", "TITLE", "PUBLISHED", "RESUME");
    for (index, episode) in podcast.episodes.iter().enumerate() {
        let marker = if last_played == Some(index) {
            ">"
        } else {
            ""
        };
        let resume = ledger.get_position(&podcast.url, &episode.guid);
        println!(
            "{:<4} {:<2} {:<56} {:<12} {:<10}",
            index,
            marker,
            truncate(&episode.title, 56),
            format_published(episode.published.as_ref()),
            format_resume_column(resume)
        );
    }
    Ok(())
}

fn run_history(db: &Database) -> Result<()> {
    let entries = db.list_settings()?;
    let histories: Vec<_> = entries
        .iter()
        .filter_map(|entry| podcast_of_history_key(&entry.key).map(|url| (url, entry)))
        .collect();
    if histories.is_empty() {
        println!("No listening history yet. Run `podbutler run` and listen to a show first.");
        return Ok(());
    }

    println!("{:<48} {:<32} {:<10} {:<28}", "PODCAST", "EPISODE", "AT", "LAST PLAYED");
    for (url, entry) in histories {
        let wanted = position_key(url, &entry.value);
        let offset = entries
            .iter()
            .find(|candidate| candidate.key == wanted)
            .and_then(|candidate| parse_offset(&candidate.value))
            .unwrap_or_default();
        println!(
            "{:<48} {:<32} {:<10} {:<28}",
            truncate(url, 48),
            truncate(&entry.value, 32),
            format_clock(offset),
            format_last_seen_display(&entry.updated_at)
        );
    }
    Ok(())
}

fn build_speaker(config: &Config) -> Arc<dyn Speaker> {
    if let Some(command_line) = config.tts.as_deref() {
        match CommandSpeaker::from_command_line(command_line) {
            Some(speaker) => return Arc::new(speaker),
            None => warn!("ignoring empty speech command"),
        }
    }
    Arc::new(ConsoleSpeaker)
}

fn directory(config: &Config) -> Box<dyn DirectoryClient> {
    Box::new(ItunesDirectory::new(
        config.directory_url.clone(),
        HttpFetcher::default(),
    ))
}

fn open_db(config: &Config) -> Result<Database> {
    let db_path = match &config.db_path {
        Some(path) => path.clone(),
        None => database_file_path()?,
    };
    let db = Database::open(&db_path)?;
    db.migrate()?;
    Ok(db)
}
