//! Spoken responses. Every user-facing reply is a [`Dialog`] rendered by a
//! [`Speaker`]; playback announcements additionally wait for the speaker to
//! finish because speech and podcast audio share one output.

use std::io::Write;
use std::process::{Child, Command as ProcessCommand, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dialog {
    Playing {
        episode_title: String,
    },
    Resume {
        episode_title: String,
    },
    NoPodcastAction {
        action: String,
    },
    NoPodcastFound {
        show: String,
    },
    NotSure,
    NoMoreEpisodes,
    NoEarlierEpisodes,
    NoEpisodes {
        show: String,
    },
    EpisodeList {
        show: String,
        titles: Vec<String>,
    },
    PodcastInfo {
        show: String,
        episode_count: usize,
        latest_title: Option<String>,
    },
    NowPlaying {
        episode_title: String,
        elapsed: Duration,
        paused: bool,
    },
    PlaybackFailed {
        episode_title: String,
    },
}

impl Dialog {
    pub fn template_id(&self) -> &'static str {
        match self {
            Dialog::Playing { .. } => "playing",
            Dialog::Resume { .. } => "resume",
            Dialog::NoPodcastAction { .. } => "no.podcast.action",
            Dialog::NoPodcastFound { .. } => "no.podcast.found",
            Dialog::NotSure => "not.sure",
            Dialog::NoMoreEpisodes => "no.episodes",
            Dialog::NoEarlierEpisodes => "no.episodes.first",
            Dialog::NoEpisodes { .. } => "no.episodes.available",
            Dialog::EpisodeList { .. } => "episode.list",
            Dialog::PodcastInfo { .. } => "podcast.info",
            Dialog::NowPlaying { .. } => "now.playing",
            Dialog::PlaybackFailed { .. } => "playback.failed",
        }
    }

    pub fn render(&self) -> String {
        match self {
            Dialog::Playing { episode_title } => format!("Playing {episode_title}."),
            Dialog::Resume { episode_title } => {
                format!("Resuming {episode_title} where you left off.")
            }
            Dialog::NoPodcastAction { action } => {
                format!("There's no podcast to {action}. Tell me which show you mean.")
            }
            Dialog::NoPodcastFound { show } => format!("I couldn't find a podcast called {show}."),
            Dialog::NotSure => "I'm not sure which podcast you mean.".to_string(),
            Dialog::NoMoreEpisodes => "There are no newer episodes.".to_string(),
            Dialog::NoEarlierEpisodes => "There are no earlier episodes.".to_string(),
            Dialog::NoEpisodes { show } => format!("{show} doesn't have any episodes yet."),
            Dialog::EpisodeList { show, titles } => {
                if titles.is_empty() {
                    return format!("{show} doesn't have any episodes yet.");
                }
                format!("The latest episodes of {show} are: {}.", titles.join("; "))
            }
            Dialog::PodcastInfo {
                show,
                episode_count,
                latest_title,
            } => match latest_title {
                Some(latest) => format!(
                    "{show} has {episode_count} episode{}. The latest is {latest}.",
                    plural(*episode_count)
                ),
                None => format!("{show} has no episodes."),
            },
            Dialog::NowPlaying {
                episode_title,
                elapsed,
                paused,
            } => {
                let verb = if *paused { "Paused on" } else { "Now playing" };
                format!("{verb} {episode_title}, {} in.", spoken_duration(*elapsed))
            }
            Dialog::PlaybackFailed { episode_title } => {
                format!("Sorry, I couldn't play {episode_title}.")
            }
        }
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}

pub(crate) fn spoken_duration(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    match (hours, minutes) {
        (0, 0) => format!("{seconds} second{}", plural(seconds as usize)),
        (0, _) => format!("{minutes} minute{}", plural(minutes as usize)),
        _ => format!(
            "{hours} hour{} {minutes} minute{}",
            plural(hours as usize),
            plural(minutes as usize)
        ),
    }
}

pub trait Speaker: Send + Sync {
    /// Starts speaking and returns without waiting for the audio to finish.
    fn speak(&self, dialog: &Dialog);

    /// Blocks until everything passed to [`Speaker::speak`] has been rendered.
    fn wait_until_spoken(&self);
}

#[derive(Debug, Default)]
pub struct ConsoleSpeaker;

impl Speaker for ConsoleSpeaker {
    fn speak(&self, dialog: &Dialog) {
        debug!(template = dialog.template_id(), "speak");
        println!("{}", dialog.render());
    }

    fn wait_until_spoken(&self) {
        let _ = std::io::stdout().flush();
    }
}

/// Pipes each utterance to an external text-to-speech program on stdin, e.g.
/// `espeak` or `say`. The line is also echoed to stdout.
pub struct CommandSpeaker {
    program: String,
    args: Vec<String>,
    pending: Mutex<Vec<Child>>,
}

impl CommandSpeaker {
    pub fn from_command_line(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            pending: Mutex::new(Vec::new()),
        })
    }

    fn spawn(&self, text: &str) -> Result<Child> {
        let mut child = ProcessCommand::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to launch {}", self.program))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(text.as_bytes())
                .context("failed writing to speech program")?;
        }
        Ok(child)
    }
}

impl Speaker for CommandSpeaker {
    fn speak(&self, dialog: &Dialog) {
        let text = dialog.render();
        println!("{text}");
        // Utterances are queued behind each other, never overlapped.
        self.wait_until_spoken();
        match self.spawn(&text) {
            Ok(child) => self.pending.lock().push(child),
            Err(err) => warn!(template = dialog.template_id(), "speech failed: {err:#}"),
        }
    }

    fn wait_until_spoken(&self) {
        let children: Vec<Child> = std::mem::take(&mut *self.pending.lock());
        for mut child in children {
            if let Err(err) = child.wait() {
                warn!("failed waiting on speech program: {err}");
            }
        }
    }
}
