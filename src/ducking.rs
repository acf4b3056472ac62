//! Auto-ducking: pause podcast audio while a competing voice capture is in
//! the foreground and resume once the foreground has been idle for a number
//! of consecutive polls.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::playback::SharedController;

pub const DEFAULT_IDLE_TICK: Duration = Duration::from_secs(1);
pub const DEFAULT_IDLE_THRESHOLD: u32 = 5;
pub const DEFAULT_SKILL_ID: &str = "PodcastButlerSkill";

/// Polled source for the id of the component currently owning the
/// foreground. An empty id means nothing does.
pub trait ActivitySignal: Send + Sync {
    fn active_component_id(&self) -> Result<String>;
}

/// Reads the active component id from a file that the host rewrites. A
/// missing file reads as idle.
pub struct FileActivitySignal {
    path: PathBuf,
}

impl FileActivitySignal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ActivitySignal for FileActivitySignal {
    fn active_component_id(&self) -> Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(raw.trim().to_string()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(err) => Err(err)
                .with_context(|| format!("failed to read activity file {}", self.path.display())),
        }
    }
}

/// Used when the host exposes no foreground signal: always idle.
#[derive(Debug, Default)]
pub struct IdleSignal;

impl ActivitySignal for IdleSignal {
    fn active_component_id(&self) -> Result<String> {
        Ok(String::new())
    }
}

#[derive(Debug, Clone)]
pub struct DuckingConfig {
    pub tick: Duration,
    pub idle_threshold: u32,
    pub skill_id: String,
}

impl Default for DuckingConfig {
    fn default() -> Self {
        Self {
            tick: DEFAULT_IDLE_TICK,
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
            skill_id: DEFAULT_SKILL_ID.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    Continue,
    Stop,
}

/// Runs a callback on a fixed period on its own thread until the callback
/// returns [`TickControl::Stop`] or the timer is cancelled. Ticks never
/// overlap.
pub struct RepeatingTimer {
    cancel_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RepeatingTimer {
    pub fn start<F>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> TickControl + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = bounded::<()>(1);
        let handle = thread::spawn(move || {
            loop {
                match cancel_rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => {
                        if tick() == TickControl::Stop {
                            break;
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });
        Self {
            cancel_tx: Some(cancel_tx),
            handle: Some(handle),
        }
    }

    #[cfg(test)]
    pub fn is_finished(&self) -> bool {
        self.handle
            .as_ref()
            .is_none_or(|handle| handle.is_finished())
    }

    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            let _ = handle.join();
        }
    }
}

impl Drop for RepeatingTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Debug, Default)]
struct DuckState {
    ducking: bool,
    idle_count: u32,
}

/// Everything a tick needs; cloned into the timer thread.
#[derive(Clone)]
struct IdleCheck {
    state: Arc<Mutex<DuckState>>,
    controller: SharedController,
    signal: Arc<dyn ActivitySignal>,
    config: DuckingConfig,
}

impl IdleCheck {
    fn tick(&self) -> TickControl {
        let mut state = self.state.lock();
        if !state.ducking {
            return TickControl::Stop;
        }

        let active = match self.signal.active_component_id() {
            Ok(active) => active,
            Err(err) => {
                warn!("activity poll failed, skipping tick: {err:#}");
                return TickControl::Continue;
            }
        };

        if active.is_empty() || active == self.config.skill_id {
            state.idle_count += 1;
            debug!(idle_count = state.idle_count, "foreground idle");
            if state.idle_count >= self.config.idle_threshold {
                state.ducking = false;
                state.idle_count = 0;
                info!("foreground idle, resuming podcast");
                if let Err(err) = self.controller.lock().resume() {
                    warn!("auto-resume failed: {err}");
                }
                return TickControl::Stop;
            }
        } else {
            if state.idle_count > 0 {
                debug!(%active, "foreground busy, idle count reset");
            }
            state.idle_count = 0;
        }
        TickControl::Continue
    }
}

pub struct DuckingSupervisor {
    check: IdleCheck,
    timer: Mutex<Option<RepeatingTimer>>,
}

impl DuckingSupervisor {
    pub fn new(
        controller: SharedController,
        signal: Arc<dyn ActivitySignal>,
        config: DuckingConfig,
    ) -> Self {
        Self {
            check: IdleCheck {
                state: Arc::new(Mutex::new(DuckState::default())),
                controller,
                signal,
                config,
            },
            timer: Mutex::new(None),
        }
    }

    #[cfg(test)]
    pub fn is_ducking(&self) -> bool {
        self.check.state.lock().ducking
    }

    #[cfg(test)]
    pub fn idle_count(&self) -> u32 {
        self.check.state.lock().idle_count
    }

    /// Pauses playing audio and starts polling for the foreground to go
    /// idle. Does nothing unless audio is actually playing.
    pub fn on_competing_activity_started(&self) {
        {
            let mut state = self.check.state.lock();
            let mut controller = self.check.controller.lock();
            if !controller.is_playing() {
                debug!("competing activity started, nothing playing");
                return;
            }
            if let Err(err) = controller.pause() {
                warn!("failed to duck playback: {err}");
                return;
            }
            state.ducking = true;
            state.idle_count = 0;
            info!("competing activity started, podcast ducked");
        }

        let previous = self.timer.lock().take();
        drop(previous);

        let check = self.check.clone();
        let timer = RepeatingTimer::start(self.check.config.tick, move || check.tick());
        *self.timer.lock() = Some(timer);
    }

    /// One idle poll, as run by the timer.
    #[cfg(test)]
    pub fn check_for_idle(&self) -> TickControl {
        let control = self.check.tick();
        if control == TickControl::Stop {
            self.cancel_timer();
        }
        control
    }

    /// Stops any auto-resume in progress without touching playback.
    pub fn end_ducking(&self) {
        {
            let mut state = self.check.state.lock();
            if state.ducking {
                debug!("ducking ended by user command");
            }
            state.ducking = false;
            state.idle_count = 0;
        }
        self.cancel_timer();
    }

    fn cancel_timer(&self) {
        let timer = self.timer.lock().take();
        if let Some(mut timer) = timer {
            timer.cancel();
        }
    }

    #[cfg(test)]
    fn timer_running(&self) -> bool {
        self.timer
            .lock()
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }
}

impl Drop for DuckingSupervisor {
    fn drop(&mut self) {
        self.end_ducking();
    }
}
