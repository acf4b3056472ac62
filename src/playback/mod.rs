mod backend;
mod controller;
#[cfg(test)]
pub(crate) mod testing;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use thiserror::Error;

pub use backend::{PlayerCommand, ProcessBackendFactory};
pub use controller::PlaybackController;

/// Single audio output. At most one instance is open at any time.
pub trait AudioBackend: Send {
    fn play(&mut self) -> Result<()>;
    fn pause(&mut self, paused: bool) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    fn time(&mut self) -> Duration;
    fn set_time(&mut self, position: Duration) -> Result<()>;
    fn is_playing(&mut self) -> bool;
}

pub trait BackendFactory: Send {
    fn open(&self, url: &str) -> Result<Box<dyn AudioBackend>>;
}

pub type SharedController = Arc<Mutex<PlaybackController>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodcastAction {
    Pause,
    Resume,
    NextEpisode,
    PreviousEpisode,
    ListEpisodes,
    Describe,
}

impl fmt::Display for PodcastAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PodcastAction::Pause => "pause",
            PodcastAction::Resume => "resume playing",
            PodcastAction::NextEpisode => "play the next episode for",
            PodcastAction::PreviousEpisode => "play the previous episode for",
            PodcastAction::ListEpisodes => "list episodes for",
            PodcastAction::Describe => "describe",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("no active podcast to {0}")]
    NoActivePodcast(PodcastAction),

    #[error("no newer episodes")]
    NoMoreEpisodes,

    #[error("no earlier episodes")]
    NoEarlierEpisodes,

    #[error("{0} has no episodes")]
    NoEpisodes(String),

    #[error("audio backend failed for \"{episode_title}\": {cause:#}")]
    Backend {
        episode_title: String,
        cause: anyhow::Error,
    },
}
