use std::process::{Child, Command as ProcessCommand, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, warn};

use super::{AudioBackend, BackendFactory};

pub const DEFAULT_PLAYER: &str = "mpv --no-video --really-quiet --start={start} {url}";

/// External player invocation. `{url}` and `{start}` (seconds) are
/// substituted per argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerCommand {
    program: String,
    args: Vec<String>,
}

impl PlayerCommand {
    pub fn parse(command_line: &str) -> Option<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        let mut args: Vec<String> = parts.collect();
        if !args.iter().any(|arg| arg.contains("{url}")) {
            args.push("{url}".to_string());
        }
        Some(Self { program, args })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub(crate) fn render_args(&self, url: &str, start: Duration) -> Vec<String> {
        let start = format!("{:.3}", start.as_secs_f64());
        self.args
            .iter()
            .map(|arg| arg.replace("{url}", url).replace("{start}", &start))
            .collect()
    }

    fn spawn(&self, url: &str, start: Duration) -> Result<Child> {
        let args = self.render_args(url, start);
        debug!(program = %self.program, ?args, "launching player");
        ProcessCommand::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to launch {}", self.program))
    }
}

impl Default for PlayerCommand {
    fn default() -> Self {
        Self::parse(DEFAULT_PLAYER).unwrap_or_else(|| Self {
            program: "mpv".to_string(),
            args: vec!["{url}".to_string()],
        })
    }
}

pub struct ProcessBackendFactory {
    command: PlayerCommand,
}

impl ProcessBackendFactory {
    pub fn new(command: PlayerCommand) -> Self {
        Self { command }
    }
}

impl BackendFactory for ProcessBackendFactory {
    fn open(&self, url: &str) -> Result<Box<dyn AudioBackend>> {
        Ok(Box::new(ProcessBackend::new(self.command.clone(), url)))
    }
}

/// Plays one URL through an external player process. Elapsed time is the
/// start offset plus wall-clock time spent unpaused.
pub struct ProcessBackend {
    command: PlayerCommand,
    url: String,
    child: Option<Child>,
    offset: Duration,
    running_since: Option<Instant>,
    paused: bool,
}

impl ProcessBackend {
    pub fn new(command: PlayerCommand, url: &str) -> Self {
        Self {
            command,
            url: url.to_string(),
            child: None,
            offset: Duration::ZERO,
            running_since: None,
            paused: false,
        }
    }

    fn launch(&mut self) -> Result<()> {
        self.child = Some(self.command.spawn(&self.url, self.offset)?);
        self.running_since = Some(Instant::now());
        self.paused = false;
        Ok(())
    }

    fn clock(&self) -> Duration {
        self.offset
            + self
                .running_since
                .map(|since| since.elapsed())
                .unwrap_or_default()
    }

    fn freeze_clock(&mut self) {
        self.offset = self.clock();
        self.running_since = None;
    }

    fn kill_child(&mut self) {
        if let Some(mut child) = self.child.take() {
            #[cfg(unix)]
            if self.paused {
                let _ = signal_child(&child, libc::SIGCONT);
            }
            if let Err(err) = child.kill() {
                debug!("player already gone: {err}");
            }
            let _ = child.wait();
        }
    }

    /// Polls the player and reaps it once it has exited, so its pid is never
    /// signalled again and the clock stops. A clean exit means the track
    /// played to the end, which rewinds the position to the start.
    fn child_alive(&mut self) -> bool {
        let status = match self.child.as_mut().map(Child::try_wait) {
            None => return false,
            Some(Ok(None)) => return true,
            Some(Ok(Some(status))) => status,
            Some(Err(err)) => {
                warn!("failed polling player: {err}");
                self.freeze_clock();
                self.kill_child();
                return false;
            }
        };
        self.child = None;
        self.paused = false;
        if status.success() {
            debug!(url = %self.url, "player reached the end of the track");
            self.offset = Duration::ZERO;
            self.running_since = None;
        } else {
            debug!(%status, url = %self.url, "player exited early");
            self.freeze_clock();
        }
        false
    }
}

#[cfg(unix)]
fn signal_child(child: &Child, signal: libc::c_int) -> Result<()> {
    let pid = child.id() as libc::pid_t;
    if unsafe { libc::kill(pid, signal) } != 0 {
        return Err(anyhow!(
            "failed to signal player {pid}: {}",
            std::io::Error::last_os_error()
        ));
    }
    Ok(())
}

impl AudioBackend for ProcessBackend {
    fn play(&mut self) -> Result<()> {
        if self.paused && self.child.is_some() {
            return self.pause(false);
        }
        if self.child_alive() {
            return Ok(());
        }
        self.launch()
    }

    fn pause(&mut self, paused: bool) -> Result<()> {
        if paused == self.paused {
            return Ok(());
        }
        let alive = self.child_alive();
        if paused {
            self.freeze_clock();
            #[cfg(unix)]
            if alive && let Some(child) = self.child.as_ref() {
                signal_child(child, libc::SIGSTOP)?;
            }
            #[cfg(not(unix))]
            self.kill_child();
            self.paused = true;
            return Ok(());
        }

        match self.child.as_ref() {
            #[cfg(unix)]
            Some(child) => {
                signal_child(child, libc::SIGCONT)?;
                self.running_since = Some(Instant::now());
                self.paused = false;
                Ok(())
            }
            _ => self.launch(),
        }
    }

    fn stop(&mut self) -> Result<()> {
        self.child_alive();
        self.freeze_clock();
        self.kill_child();
        self.paused = false;
        Ok(())
    }

    fn time(&mut self) -> Duration {
        self.child_alive();
        self.clock()
    }

    fn set_time(&mut self, position: Duration) -> Result<()> {
        let relaunch = self.child_alive() && !self.paused;
        self.kill_child();
        self.offset = position;
        self.running_since = None;
        if relaunch {
            self.launch()?;
        }
        Ok(())
    }

    fn is_playing(&mut self) -> bool {
        !self.paused && self.child_alive()
    }
}

impl Drop for ProcessBackend {
    fn drop(&mut self) {
        self.kill_child();
    }
}
