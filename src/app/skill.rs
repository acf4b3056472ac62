use std::sync::Arc;

use tracing::{debug, info, warn};

use super::episode::latest_titles;
use super::intent::Intent;
use crate::ducking::DuckingSupervisor;
use crate::playback::{PlaybackError, PlayerState, PodcastAction, SharedController};
use crate::podcast::{DirectoryClient, DirectoryError, Podcast};
use crate::speech::{Dialog, Speaker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Quit,
}

/// Entry points for every recognised intent. Errors never leave a handler;
/// each one is spoken as a dialog instead.
///
/// Handlers that touch playback end ducking before locking the controller,
/// since the idle timer takes the ducking state lock before the controller.
pub(crate) struct PodcastSkill {
    controller: SharedController,
    directory: Box<dyn DirectoryClient>,
    speaker: Arc<dyn Speaker>,
    ducking: DuckingSupervisor,
    list_limit: usize,
}

impl PodcastSkill {
    pub(crate) fn new(
        controller: SharedController,
        directory: Box<dyn DirectoryClient>,
        speaker: Arc<dyn Speaker>,
        ducking: DuckingSupervisor,
        list_limit: usize,
    ) -> Self {
        Self {
            controller,
            directory,
            speaker,
            ducking,
            list_limit,
        }
    }

    pub(crate) fn handle(&self, intent: Intent) -> Flow {
        debug!(?intent, "handling intent");
        match intent {
            Intent::Listen { show, utterance } => self.listen(show.as_deref(), &utterance),
            Intent::NextEpisode { show } => self.step(show.as_deref(), true),
            Intent::PreviousEpisode { show } => self.step(show.as_deref(), false),
            Intent::Pause => self.pause(),
            Intent::Resume => self.resume(),
            Intent::Stop => self.stop(),
            Intent::List { show } => self.list(show.as_deref()),
            Intent::Info { show } => self.info(show.as_deref()),
            Intent::CompetingActivityStarted => self.ducking.on_competing_activity_started(),
            Intent::Unknown(utterance) => {
                debug!(%utterance, "unrecognised utterance");
                self.speak(Dialog::NotSure);
            }
            Intent::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    /// Stops playback and cancels any pending auto-resume.
    pub(crate) fn shutdown(&self) {
        self.ducking.end_ducking();
        self.controller.lock().stop();
    }

    #[cfg(test)]
    pub(crate) fn is_ducking(&self) -> bool {
        self.ducking.is_ducking()
    }

    fn listen(&self, show: Option<&str>, utterance: &str) {
        let Some(show) = show else {
            debug!(%utterance, "listen without a show name");
            self.speak(Dialog::NotSure);
            return;
        };
        let Some(podcast) = self.resolve(show) else {
            return;
        };

        self.ducking.end_ducking();
        let result = self.controller.lock().listen(podcast);
        match result {
            Ok(episode) => info!(%show, episode = %episode.title, "listening"),
            Err(err) => self.report(err),
        }
    }

    fn step(&self, show: Option<&str>, newer: bool) {
        let podcast_override = match show {
            Some(show) => match self.resolve(show) {
                Some(podcast) => Some(podcast),
                None => return,
            },
            None => None,
        };

        self.ducking.end_ducking();
        let result = {
            let mut controller = self.controller.lock();
            if newer {
                controller.next_episode(podcast_override)
            } else {
                controller.previous_episode(podcast_override)
            }
        };
        if let Err(err) = result {
            self.report(err);
        }
    }

    fn pause(&self) {
        self.ducking.end_ducking();
        let result = self.controller.lock().pause();
        if let Err(err) = result {
            self.report(err);
        }
    }

    fn resume(&self) {
        self.ducking.end_ducking();
        let result = self.controller.lock().resume();
        if let Err(err) = result {
            self.report(err);
        }
    }

    fn stop(&self) {
        self.ducking.end_ducking();
        if !self.controller.lock().stop() {
            debug!("stop requested with nothing playing");
        }
    }

    fn list(&self, show: Option<&str>) {
        let Some(podcast) = self.named_or_current(show, PodcastAction::ListEpisodes) else {
            return;
        };
        if podcast.is_empty() {
            self.speak(Dialog::NoEpisodes {
                show: podcast.title,
            });
            return;
        }
        let titles = latest_titles(
            podcast.episodes.iter().map(|episode| episode.title.clone()),
            self.list_limit,
        );
        self.speak(Dialog::EpisodeList {
            show: podcast.title,
            titles,
        });
    }

    fn info(&self, show: Option<&str>) {
        let Some(podcast) = self.named_or_current(show, PodcastAction::Describe) else {
            return;
        };
        self.speak(Dialog::PodcastInfo {
            show: podcast.title.clone(),
            episode_count: podcast.len(),
            latest_title: podcast.latest().map(|episode| episode.title.clone()),
        });

        let now_playing = {
            let mut controller = self.controller.lock();
            let elapsed = controller.elapsed();
            let same_show = controller
                .current_podcast()
                .is_some_and(|current| current.url == podcast.url);
            match (same_show, controller.current_episode(), elapsed) {
                (true, Some(episode), Some(elapsed)) => Some(Dialog::NowPlaying {
                    episode_title: episode.title.clone(),
                    elapsed,
                    paused: controller.state() == PlayerState::Paused,
                }),
                _ => None,
            }
        };
        if let Some(dialog) = now_playing {
            self.speak(dialog);
        }
    }

    /// The named show when one is given, otherwise the podcast of the
    /// current session. Speaks the reason when neither is available.
    fn named_or_current(&self, show: Option<&str>, action: PodcastAction) -> Option<Podcast> {
        if let Some(show) = show {
            return self.resolve(show);
        }
        let current = self.controller.lock().current_podcast().cloned();
        if current.is_none() {
            debug!(%action, "no show named and nothing playing");
            self.speak(Dialog::NotSure);
        }
        current
    }

    fn resolve(&self, show: &str) -> Option<Podcast> {
        match self.directory.resolve(show) {
            Ok(podcast) => Some(podcast),
            Err(err) => {
                match &err {
                    DirectoryError::NotFound(_) => info!(%show, "no podcast matched"),
                    _ => warn!(%show, "podcast lookup failed: {err}"),
                }
                self.speak(Dialog::NoPodcastFound {
                    show: show.to_string(),
                });
                None
            }
        }
    }

    fn report(&self, err: PlaybackError) {
        debug!("reporting playback error: {err}");
        let dialog = match err {
            PlaybackError::NoActivePodcast(action) => Dialog::NoPodcastAction {
                action: action.to_string(),
            },
            PlaybackError::NoMoreEpisodes => Dialog::NoMoreEpisodes,
            PlaybackError::NoEarlierEpisodes => Dialog::NoEarlierEpisodes,
            PlaybackError::NoEpisodes(show) => Dialog::NoEpisodes { show },
            PlaybackError::Backend { episode_title, .. } => {
                Dialog::PlaybackFailed { episode_title }
            }
        };
        self.speak(dialog);
    }

    fn speak(&self, dialog: Dialog) {
        self.speaker.speak(&dialog);
    }
}
