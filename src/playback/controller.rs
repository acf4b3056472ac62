use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::{AudioBackend, BackendFactory, PlaybackError, PlayerState, PodcastAction};
use crate::ledger::PlaybackLedger;
use crate::podcast::{Episode, Podcast};
use crate::speech::{Dialog, Speaker};

struct PlaybackSession {
    podcast: Podcast,
    episode: Episode,
    backend: Box<dyn AudioBackend>,
    paused: bool,
}

/// Episodes are ordered newest first, so "next" steps to the newer episode
/// at the lower index and "previous" to the older one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Newer,
    Older,
}

/// Owns the single playback session and writes resume state through the
/// ledger on every pause and stop.
pub struct PlaybackController {
    ledger: PlaybackLedger,
    backends: Box<dyn BackendFactory>,
    speaker: Arc<dyn Speaker>,
    session: Option<PlaybackSession>,
}

impl PlaybackController {
    pub fn new(
        ledger: PlaybackLedger,
        backends: Box<dyn BackendFactory>,
        speaker: Arc<dyn Speaker>,
    ) -> Self {
        Self {
            ledger,
            backends,
            speaker,
            session: None,
        }
    }

    pub fn state(&self) -> PlayerState {
        match &self.session {
            None => PlayerState::Idle,
            Some(session) if session.paused => PlayerState::Paused,
            Some(_) => PlayerState::Playing,
        }
    }

    /// True only while a session is unpaused and the backend is still
    /// producing audio.
    pub fn is_playing(&mut self) -> bool {
        match self.session.as_mut() {
            Some(session) if !session.paused => session.backend.is_playing(),
            _ => false,
        }
    }

    pub fn current_podcast(&self) -> Option<&Podcast> {
        self.session.as_ref().map(|session| &session.podcast)
    }

    pub fn current_episode(&self) -> Option<&Episode> {
        self.session.as_ref().map(|session| &session.episode)
    }

    pub fn elapsed(&mut self) -> Option<Duration> {
        self.session.as_mut().map(|session| session.backend.time())
    }

    #[cfg(test)]
    pub fn ledger(&self) -> &PlaybackLedger {
        &self.ledger
    }

    /// Plays the show's last played episode, or its newest one when no
    /// history is recorded or the recorded episode left the feed.
    pub fn listen(&mut self, podcast: Podcast) -> Result<Episode, PlaybackError> {
        let index = self.reference_index(&podcast)?;
        let episode = podcast
            .episode_at(index)
            .cloned()
            .ok_or_else(|| PlaybackError::NoEpisodes(podcast.title.clone()))?;
        self.play(podcast, episode.clone())?;
        Ok(episode)
    }

    pub fn play(&mut self, podcast: Podcast, episode: Episode) -> Result<(), PlaybackError> {
        if self.session.is_some() {
            self.stop();
        }

        let offset = self.ledger.get_position(&podcast.url, &episode.guid);
        info!(
            podcast = %podcast.title,
            guid = %episode.guid,
            offset_secs = offset.as_secs_f64(),
            "starting episode {}",
            episode.title
        );

        let announcement = if offset.is_zero() {
            Dialog::Playing {
                episode_title: episode.title.clone(),
            }
        } else {
            Dialog::Resume {
                episode_title: episode.title.clone(),
            }
        };
        self.speaker.speak(&announcement);
        self.speaker.wait_until_spoken();

        let backend = match self.start_backend(&episode.enclosure_url, offset) {
            Ok(backend) => backend,
            Err(cause) => {
                error!(url = %episode.enclosure_url, "playback failed to start: {cause:#}");
                self.session = None;
                return Err(PlaybackError::Backend {
                    episode_title: episode.title,
                    cause,
                });
            }
        };

        self.ledger.set_last_episode(&podcast.url, &episode.guid);
        self.session = Some(PlaybackSession {
            podcast,
            episode,
            backend,
            paused: false,
        });
        Ok(())
    }

    fn start_backend(
        &self,
        url: &str,
        offset: Duration,
    ) -> anyhow::Result<Box<dyn AudioBackend>> {
        let mut backend = self.backends.open(url)?;
        let started = backend.set_time(offset).and_then(|()| backend.play());
        if let Err(err) = started {
            let _ = backend.stop();
            return Err(err);
        }
        Ok(backend)
    }

    pub fn pause(&mut self) -> Result<(), PlaybackError> {
        let Some(session) = self.session.as_mut() else {
            return Err(PlaybackError::NoActivePodcast(PodcastAction::Pause));
        };
        if session.paused {
            debug!("pause ignored, already paused");
            return Ok(());
        }
        if let Err(cause) = session.backend.pause(true) {
            return Err(self.abandon_session(cause));
        }
        session.paused = true;
        let offset = session.backend.time();
        self.ledger
            .set_position(&session.podcast.url, &session.episode.guid, offset);
        info!(guid = %session.episode.guid, offset_secs = offset.as_secs_f64(), "paused");
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), PlaybackError> {
        let Some(session) = self.session.as_mut() else {
            return Err(PlaybackError::NoActivePodcast(PodcastAction::Resume));
        };
        if !session.paused {
            debug!("resume ignored, already playing");
            return Ok(());
        }
        if let Err(cause) = session.backend.pause(false) {
            return Err(self.abandon_session(cause));
        }
        session.paused = false;
        info!(guid = %session.episode.guid, "resumed");
        Ok(())
    }

    /// Flushes the position and halts playback. Returns false when there
    /// was nothing to stop.
    pub fn stop(&mut self) -> bool {
        let Some(mut session) = self.session.take() else {
            debug!("stop ignored, nothing playing");
            return false;
        };
        let offset = session.backend.time();
        self.ledger
            .set_position(&session.podcast.url, &session.episode.guid, offset);
        if let Err(err) = session.backend.stop() {
            warn!("backend failed to stop cleanly: {err:#}");
        }
        info!(guid = %session.episode.guid, offset_secs = offset.as_secs_f64(), "stopped");
        true
    }

    pub fn next_episode(
        &mut self,
        podcast_override: Option<Podcast>,
    ) -> Result<Episode, PlaybackError> {
        self.step(podcast_override, Direction::Newer)
    }

    pub fn previous_episode(
        &mut self,
        podcast_override: Option<Podcast>,
    ) -> Result<Episode, PlaybackError> {
        self.step(podcast_override, Direction::Older)
    }

    fn step(
        &mut self,
        podcast_override: Option<Podcast>,
        direction: Direction,
    ) -> Result<Episode, PlaybackError> {
        let podcast = match podcast_override {
            Some(podcast) => podcast,
            None => {
                let action = match direction {
                    Direction::Newer => PodcastAction::NextEpisode,
                    Direction::Older => PodcastAction::PreviousEpisode,
                };
                self.current_podcast()
                    .cloned()
                    .ok_or(PlaybackError::NoActivePodcast(action))?
            }
        };

        let reference = self.reference_index(&podcast)?;
        let target = match direction {
            Direction::Newer => reference
                .checked_sub(1)
                .ok_or(PlaybackError::NoMoreEpisodes)?,
            Direction::Older => Some(reference + 1)
                .filter(|index| *index < podcast.len())
                .ok_or(PlaybackError::NoEarlierEpisodes)?,
        };
        let episode = podcast
            .episode_at(target)
            .cloned()
            .ok_or_else(|| PlaybackError::NoEpisodes(podcast.title.clone()))?;
        debug!(?direction, reference, target, "stepping episode");

        self.stop();
        self.play(podcast, episode.clone())?;
        Ok(episode)
    }

    fn reference_index(&self, podcast: &Podcast) -> Result<usize, PlaybackError> {
        if podcast.is_empty() {
            return Err(PlaybackError::NoEpisodes(podcast.title.clone()));
        }
        let Some(guid) = self.ledger.get_last_episode(&podcast.url) else {
            return Ok(0);
        };
        Ok(podcast.index_of_guid(&guid).unwrap_or_else(|| {
            warn!(%guid, podcast = %podcast.url, "last played episode left the feed");
            0
        }))
    }

    fn abandon_session(&mut self, cause: anyhow::Error) -> PlaybackError {
        let episode_title = match self.session.take() {
            Some(mut session) => {
                let offset = session.backend.time();
                self.ledger
                    .set_position(&session.podcast.url, &session.episode.guid, offset);
                let _ = session.backend.stop();
                session.episode.title
            }
            None => String::new(),
        };
        error!(episode = %episode_title, "backend control failed: {cause:#}");
        PlaybackError::Backend {
            episode_title,
            cause,
        }
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{MemoryStore, PlaybackLedger, SettingsStore, position_key};
    use crate::playback::testing::{BackendCall, FakeAudio, controller_with};
    use crate::podcast::sample_podcast;
    use crate::speech::recording::{RecordingSpeaker, SpeechEvent};

    const FEED: &str = "https://feeds.example/x";

    fn show_x() -> Podcast {
        sample_podcast(FEED, "X", &["e0", "e1", "e2"])
    }

    fn episode(podcast: &Podcast, guid: &str) -> Episode {
        podcast.find_by_guid(guid).cloned().expect("episode exists")
    }

    fn setup() -> (PlaybackController, FakeAudio, RecordingSpeaker) {
        let speaker = RecordingSpeaker::default();
        let audio = FakeAudio::observing(&speaker);
        let controller = controller_with(&audio, &speaker, PlaybackLedger::in_memory());
        (controller, audio, speaker)
    }

    #[test]
    fn pause_after_play_stores_backend_elapsed_time() {
        let (mut controller, audio, _) = setup();
        let podcast = show_x();
        controller
            .play(podcast.clone(), episode(&podcast, "e1"))
            .expect("play");
        audio.advance(Duration::from_millis(42_250));

        controller.pause().expect("pause");

        assert_eq!(controller.state(), PlayerState::Paused);
        assert_eq!(
            controller.ledger().get_position(FEED, "e1"),
            Duration::from_millis(42_250)
        );
    }

    #[test]
    fn announcement_is_fully_spoken_before_backend_opens() {
        let (mut controller, audio, speaker) = setup();
        let podcast = show_x();
        controller
            .play(podcast.clone(), episode(&podcast, "e0"))
            .expect("play");

        let events = speaker.events.lock().clone();
        assert_eq!(
            events,
            vec![
                SpeechEvent::Spoke(Dialog::Playing {
                    episode_title: "Episode e0".into()
                }),
                SpeechEvent::Waited,
            ]
        );
        assert_eq!(audio.speech_seen_at_open(), vec![2]);
    }

    #[test]
    fn stored_offset_resumes_with_resume_dialog() {
        let mut store = MemoryStore::new();
        store
            .set(&position_key(FEED, "e1"), "125")
            .expect("seed offset");
        let speaker = RecordingSpeaker::default();
        let audio = FakeAudio::new();
        let mut controller =
            controller_with(&audio, &speaker, PlaybackLedger::new(Box::new(store)));
        let podcast = show_x();

        controller
            .play(podcast.clone(), episode(&podcast, "e1"))
            .expect("play");

        assert_eq!(speaker.template_ids(), vec!["resume"]);
        assert_eq!(
            audio.calls(),
            vec![
                BackendCall::Open(format!("{FEED}/media/e1.mp3")),
                BackendCall::SetTime(Duration::from_secs(125)),
                BackendCall::Play,
            ]
        );
        assert_eq!(controller.ledger().get_last_episode(FEED).as_deref(), Some("e1"));
    }

    #[test]
    fn play_replaces_existing_session_after_flushing_it() {
        let (mut controller, audio, _) = setup();
        let podcast = show_x();
        controller
            .play(podcast.clone(), episode(&podcast, "e0"))
            .expect("first play");
        audio.advance(Duration::from_secs(30));

        controller
            .play(podcast.clone(), episode(&podcast, "e2"))
            .expect("second play");

        assert_eq!(controller.ledger().get_position(FEED, "e0"), Duration::from_secs(30));
        assert_eq!(controller.current_episode().map(|ep| ep.guid.as_str()), Some("e2"));
        assert_eq!(audio.count(&BackendCall::Stop), 1);
        assert_eq!(controller.state(), PlayerState::Playing);
    }

    #[test]
    fn stop_twice_is_idempotent_and_writes_once() {
        let speaker = RecordingSpeaker::default();
        let audio = FakeAudio::new();
        let store = MemoryStore::new();
        let mut controller = controller_with(&audio, &speaker, PlaybackLedger::new(Box::new(store)));
        let podcast = show_x();
        controller
            .play(podcast.clone(), episode(&podcast, "e0"))
            .expect("play");
        audio.advance(Duration::from_secs(7));

        assert!(controller.stop());
        let stops = audio.count(&BackendCall::Stop);
        let position = controller.ledger().get_position(FEED, "e0");
        assert!(!controller.stop());

        assert_eq!(controller.state(), PlayerState::Idle);
        assert_eq!(audio.count(&BackendCall::Stop), stops);
        assert_eq!(position, Duration::from_secs(7));
    }

    #[test]
    fn second_stop_performs_no_ledger_writes() {
        struct CountingStore {
            inner: MemoryStore,
            writes: std::sync::Arc<std::sync::atomic::AtomicUsize>,
        }
        impl SettingsStore for CountingStore {
            fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
                self.inner.get(key)
            }
            fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
                self.writes
                    .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                self.inner.set(key, value)
            }
        }

        let writes = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let store = CountingStore {
            inner: MemoryStore::new(),
            writes: writes.clone(),
        };
        let speaker = RecordingSpeaker::default();
        let audio = FakeAudio::new();
        let mut controller = controller_with(&audio, &speaker, PlaybackLedger::new(Box::new(store)));
        let podcast = show_x();
        controller
            .play(podcast.clone(), episode(&podcast, "e0"))
            .expect("play");
        controller.stop();
        let after_first = writes.load(std::sync::atomic::Ordering::SeqCst);

        assert!(!controller.stop());
        assert_eq!(writes.load(std::sync::atomic::Ordering::SeqCst), after_first);
    }

    #[test]
    fn resume_without_session_reports_no_active_podcast() {
        let (mut controller, audio, _) = setup();

        let err = controller.resume().expect_err("nothing to resume");

        assert!(matches!(
            err,
            PlaybackError::NoActivePodcast(PodcastAction::Resume)
        ));
        assert!(audio.calls().is_empty());
    }

    #[test]
    fn pause_and_resume_are_noops_in_matching_state() {
        let (mut controller, audio, _) = setup();
        let podcast = show_x();
        controller
            .play(podcast.clone(), episode(&podcast, "e0"))
            .expect("play");
        controller.resume().expect("resume while playing");
        controller.pause().expect("pause");
        controller.pause().expect("second pause");
        controller.resume().expect("resume");

        assert_eq!(audio.count(&BackendCall::Pause(true)), 1);
        assert_eq!(audio.count(&BackendCall::Pause(false)), 1);
        assert_eq!(controller.state(), PlayerState::Playing);
    }

    #[test]
    fn backend_failure_on_start_resets_to_idle() {
        let (mut controller, audio, _) = setup();
        let podcast = show_x();
        audio.set_fail_play(true);

        let err = controller
            .play(podcast.clone(), episode(&podcast, "e0"))
            .expect_err("play should fail");

        assert!(matches!(err, PlaybackError::Backend { .. }));
        assert_eq!(controller.state(), PlayerState::Idle);
        assert!(controller.current_podcast().is_none());
        assert_eq!(audio.count(&BackendCall::Stop), 1);
        assert_eq!(controller.ledger().get_last_episode(FEED), None);

        audio.set_fail_play(false);
        controller
            .play(podcast.clone(), episode(&podcast, "e0"))
            .expect("recovers on next play");
        assert_eq!(controller.state(), PlayerState::Playing);
    }

    #[test]
    fn newest_episode_has_no_next_but_has_previous() {
        let (mut controller, _, speaker) = setup();
        let podcast = show_x();
        let first = controller.listen(podcast.clone()).expect("listen");
        assert_eq!(first.guid, "e0");

        let err = controller.next_episode(None).expect_err("e0 is newest");
        assert!(matches!(err, PlaybackError::NoMoreEpisodes));
        assert_eq!(controller.current_episode().map(|ep| ep.guid.as_str()), Some("e0"));
        assert_eq!(controller.state(), PlayerState::Playing);

        let previous = controller.previous_episode(None).expect("previous");
        assert_eq!(previous.guid, "e1");
        assert_eq!(speaker.template_ids(), vec!["playing", "playing"]);
    }

    #[test]
    fn next_then_previous_round_trips() {
        let (mut controller, _, _) = setup();
        let podcast = show_x();
        controller
            .play(podcast.clone(), episode(&podcast, "e1"))
            .expect("play");

        assert_eq!(controller.next_episode(None).expect("next").guid, "e0");
        assert_eq!(
            controller.previous_episode(None).expect("previous").guid,
            "e1"
        );
    }

    #[test]
    fn oldest_episode_has_no_earlier_episode() {
        let (mut controller, audio, _) = setup();
        let podcast = show_x();
        controller
            .play(podcast.clone(), episode(&podcast, "e2"))
            .expect("play");
        audio.clear_calls();

        let err = controller.previous_episode(None).expect_err("e2 is oldest");

        assert!(matches!(err, PlaybackError::NoEarlierEpisodes));
        assert!(audio.calls().is_empty());
        assert_eq!(controller.state(), PlayerState::Playing);
    }

    #[test]
    fn navigation_without_podcast_reports_action() {
        let (mut controller, _, _) = setup();
        assert!(matches!(
            controller.next_episode(None),
            Err(PlaybackError::NoActivePodcast(PodcastAction::NextEpisode))
        ));
        assert!(matches!(
            controller.previous_episode(None),
            Err(PlaybackError::NoActivePodcast(PodcastAction::PreviousEpisode))
        ));
    }

    #[test]
    fn override_uses_that_podcasts_history() {
        let (mut controller, _, _) = setup();
        let other = sample_podcast("https://feeds.example/y", "Y", &["y0", "y1", "y2"]);
        controller
            .play(other.clone(), episode(&other, "y2"))
            .expect("play y2");
        let x = show_x();
        controller
            .play(x.clone(), episode(&x, "e0"))
            .expect("play e0");

        let next = controller.next_episode(Some(other)).expect("next on Y");

        assert_eq!(next.guid, "y1");
        assert_eq!(
            controller.current_podcast().map(|podcast| podcast.url.as_str()),
            Some("https://feeds.example/y")
        );
    }

    #[test]
    fn pruned_history_falls_back_to_newest_episode() {
        let (mut controller, _, _) = setup();
        let original = sample_podcast(FEED, "X", &["old", "e0", "e1"]);
        controller
            .play(original.clone(), episode(&original, "old"))
            .expect("play");
        controller.stop();

        let refreshed = show_x();
        let episode = controller
            .previous_episode(Some(refreshed.clone()))
            .expect("falls back to index 0");
        assert_eq!(episode.guid, "e1");

        controller.stop();
        let listened = controller
            .listen(sample_podcast(FEED, "X", &["n0", "n1"]))
            .expect("listen falls back");
        assert_eq!(listened.guid, "n0");
    }

    #[test]
    fn empty_feed_is_reported_without_touching_backend() {
        let (mut controller, audio, _) = setup();
        let empty = sample_podcast(FEED, "Empty", &[]);

        assert!(matches!(
            controller.listen(empty.clone()),
            Err(PlaybackError::NoEpisodes(ref show)) if show == "Empty"
        ));
        assert!(matches!(
            controller.previous_episode(Some(empty)),
            Err(PlaybackError::NoEpisodes(_))
        ));
        assert!(audio.calls().is_empty());
    }
}
