use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use parking_lot::Mutex;

use super::{AudioBackend, BackendFactory, PlaybackController};
use crate::ledger::PlaybackLedger;
use crate::speech::recording::RecordingSpeaker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BackendCall {
    Open(String),
    Play,
    Pause(bool),
    Stop,
    SetTime(Duration),
}

/// Shared handle onto every fake backend opened through [`FakeAudio::factory`].
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeAudio {
    calls: Arc<Mutex<Vec<BackendCall>>>,
    clock: Arc<Mutex<Duration>>,
    playing: Arc<AtomicBool>,
    fail_play: Arc<AtomicBool>,
    speaker: Option<RecordingSpeaker>,
    speech_seen_at_open: Arc<Mutex<Vec<usize>>>,
}

impl FakeAudio {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records how many speech events had happened each time a backend is
    /// opened, to check announcement ordering.
    pub(crate) fn observing(speaker: &RecordingSpeaker) -> Self {
        Self {
            speaker: Some(speaker.clone()),
            ..Self::default()
        }
    }

    pub(crate) fn factory(&self) -> Box<dyn BackendFactory> {
        Box::new(FakeFactory {
            audio: self.clone(),
        })
    }

    pub(crate) fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub(crate) fn count(&self, call: &BackendCall) -> usize {
        self.calls.lock().iter().filter(|seen| *seen == call).count()
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.clock.lock() += by;
    }

    pub(crate) fn set_fail_play(&self, fail: bool) {
        self.fail_play.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn finish_track(&self) {
        self.playing.store(false, Ordering::SeqCst);
    }

    pub(crate) fn speech_seen_at_open(&self) -> Vec<usize> {
        self.speech_seen_at_open.lock().clone()
    }
}

struct FakeFactory {
    audio: FakeAudio,
}

impl BackendFactory for FakeFactory {
    fn open(&self, url: &str) -> Result<Box<dyn AudioBackend>> {
        if let Some(speaker) = &self.audio.speaker {
            let seen = speaker.events.lock().len();
            self.audio.speech_seen_at_open.lock().push(seen);
        }
        self.audio
            .calls
            .lock()
            .push(BackendCall::Open(url.to_string()));
        *self.audio.clock.lock() = Duration::ZERO;
        Ok(Box::new(FakeBackend {
            audio: self.audio.clone(),
        }))
    }
}

struct FakeBackend {
    audio: FakeAudio,
}

impl AudioBackend for FakeBackend {
    fn play(&mut self) -> Result<()> {
        self.audio.calls.lock().push(BackendCall::Play);
        if self.audio.fail_play.load(Ordering::SeqCst) {
            return Err(anyhow!("output device unavailable"));
        }
        self.audio.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn pause(&mut self, paused: bool) -> Result<()> {
        self.audio.calls.lock().push(BackendCall::Pause(paused));
        self.audio.playing.store(!paused, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.audio.calls.lock().push(BackendCall::Stop);
        self.audio.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn time(&mut self) -> Duration {
        *self.audio.clock.lock()
    }

    fn set_time(&mut self, position: Duration) -> Result<()> {
        self.audio.calls.lock().push(BackendCall::SetTime(position));
        *self.audio.clock.lock() = position;
        Ok(())
    }

    fn is_playing(&mut self) -> bool {
        self.audio.playing.load(Ordering::SeqCst)
    }
}

pub(crate) fn controller_with(
    audio: &FakeAudio,
    speaker: &RecordingSpeaker,
    ledger: PlaybackLedger,
) -> PlaybackController {
    PlaybackController::new(ledger, audio.factory(), Arc::new(speaker.clone()))
}
