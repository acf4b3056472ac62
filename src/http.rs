use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP status {status}{detail}")]
    Status { status: u16, detail: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("response decode failed: {0}")]
    Decode(#[from] std::io::Error),

    #[error("request failed after {attempts} attempt(s): {last}")]
    Exhausted { attempts: usize, last: Box<HttpError> },
}

impl HttpError {
    #[cfg(test)]
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Status { status, .. } => Some(*status),
            HttpError::Exhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    connect_timeout: Duration,
    read_timeout: Duration,
    attempts: usize,
    retry_delay: Duration,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(3),
            read_timeout: Duration::from_secs(10),
            attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

fn should_retry_http_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..=599).contains(&status)
}

impl HttpFetcher {
    #[cfg(test)]
    pub fn new(
        connect_timeout: Duration,
        read_timeout: Duration,
        attempts: usize,
        retry_delay: Duration,
    ) -> Self {
        Self {
            connect_timeout,
            read_timeout,
            attempts: attempts.max(1),
            retry_delay,
        }
    }

    pub fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Result<String, HttpError> {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(self.connect_timeout)
            .timeout_read(self.read_timeout)
            .timeout_write(self.read_timeout)
            .build();

        let mut attempt = 1;
        loop {
            let mut request = agent.get(url);
            for (key, value) in query {
                request = request.query(key, value);
            }

            let err = match request.call() {
                Ok(response) => return Ok(response.into_string()?),
                Err(ureq::Error::Status(status, response)) => {
                    let body = response.into_string().ok().unwrap_or_default();
                    let body = body.trim();
                    let detail = if body.is_empty() {
                        String::new()
                    } else {
                        format!(" ({})", body.chars().take(240).collect::<String>())
                    };
                    let err = HttpError::Status { status, detail };
                    if !should_retry_http_status(status) {
                        return Err(err);
                    }
                    err
                }
                Err(ureq::Error::Transport(transport)) => {
                    HttpError::Transport(transport.to_string())
                }
            };

            if attempt >= self.attempts {
                return Err(HttpError::Exhausted {
                    attempts: self.attempts,
                    last: Box::new(err),
                });
            }
            warn!(%url, attempt, "retrying request: {err}");
            thread::sleep(self.retry_delay);
            attempt += 1;
            debug!(%url, attempt, "sending request");
        }
    }
}
