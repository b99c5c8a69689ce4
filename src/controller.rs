#![forbid(unsafe_code)]

//! Client-side lifecycle of a single lookup.
//!
//! [`RequestController`] is the only writer of [`RequestState`]. Presentation
//! code reads snapshots and calls [`RequestController::submit`],
//! [`RequestController::clear`] or the `open_*` actions.
//!
//! Overlapping submissions are not cancelled. Each one gets a token from a
//! monotonically increasing counter and a response is applied only if its
//! token is still the latest one issued; anything else is dropped as stale.

use std::{future::Future, io, process::Command};

use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::record::{VideoRecord, normalize};
use crate::upstream::lookup_url;

pub const GENERIC_FAILURE: &str = "Failed to fetch video information";
const DOWNLOAD_PATH: &str = "api/download";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    raw_url: String,
}

impl LookupRequest {
    /// Only rejects blank input. The URL itself is passed on as typed; the
    /// upstream resolver decides whether it is a usable link.
    pub fn new(raw_url: &str) -> Result<Self, SubmitError> {
        if raw_url.trim().is_empty() {
            return Err(SubmitError::EmptyUrl);
        }
        Ok(Self {
            raw_url: raw_url.to_string(),
        })
    }

    pub fn raw_url(&self) -> &str {
        &self.raw_url
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RequestState {
    #[default]
    Idle,
    InFlight {
        request: LookupRequest,
    },
    Resolved {
        record: VideoRecord,
    },
    Failed {
        reason: String,
    },
}

impl RequestState {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::InFlight { .. })
    }

    pub fn record(&self) -> Option<&VideoRecord> {
        match self {
            Self::Resolved { record } => Some(record),
            _ => None,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Please enter a video URL")]
    EmptyUrl,
}

/// What a settled submission did to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settled {
    Resolved(VideoRecord),
    Failed(String),
    /// A newer submission (or a clear) happened first; state was left alone.
    Stale,
}

/// Transient, user-facing notification derived from a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Validation(String),
    Failure(String),
    Success(String),
}

impl Settled {
    pub fn notice(&self) -> Option<Notice> {
        match self {
            Self::Resolved(_) => Some(Notice::Success("Video information loaded".to_string())),
            Self::Failed(reason) => Some(Notice::Failure(reason.clone())),
            Self::Stale => None,
        }
    }
}

impl SubmitError {
    pub fn notice(&self) -> Notice {
        Notice::Validation(self.to_string())
    }
}

/// Raw answer from the proxy endpoint. Non-2xx statuses are still replies;
/// only transport-level problems become [`TransportError`].
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyReply {
    pub status: u16,
    pub body: Value,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("could not reach the proxy: {0}")]
    Unreachable(String),
    #[error("proxy sent an unreadable body: {0}")]
    InvalidBody(String),
    #[error("request task failed: {0}")]
    Task(String),
}

/// Carries one lookup to the proxy endpoint.
pub trait ProxyTransport: Send + Sync {
    fn fetch(
        &self,
        raw_url: &str,
    ) -> impl Future<Output = Result<ProxyReply, TransportError>> + Send;
}

/// Side effect used by `open_video` / `open_audio` to hand a URL to the user.
pub trait MediaOpener {
    fn open(&self, url: &str) -> io::Result<()>;
}

/// Hands URLs to the platform's default handler.
pub struct SystemOpener;

impl MediaOpener for SystemOpener {
    fn open(&self, url: &str) -> io::Result<()> {
        let mut command = if cfg!(target_os = "windows") {
            let mut command = Command::new("cmd");
            command.args(["/C", "start", ""]);
            command
        } else if cfg!(target_os = "macos") {
            Command::new("open")
        } else {
            Command::new("xdg-open")
        };
        let status = command.arg(url).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!("opener exited with {status}")))
        }
    }
}

/// [`ProxyTransport`] that issues `GET <base>/api/download?url=...` with a
/// blocking `ureq` agent on the blocking pool.
#[derive(Clone)]
pub struct HttpProxyTransport {
    agent: ureq::Agent,
    endpoint: Url,
}

impl HttpProxyTransport {
    pub fn new(proxy_base_url: &Url) -> Result<Self, url::ParseError> {
        let mut base = proxy_base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self {
            agent: ureq::Agent::new(),
            endpoint: base.join(DOWNLOAD_PATH)?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl ProxyTransport for HttpProxyTransport {
    fn fetch(
        &self,
        raw_url: &str,
    ) -> impl Future<Output = Result<ProxyReply, TransportError>> + Send {
        let agent = self.agent.clone();
        let target = lookup_url(&self.endpoint, raw_url);
        async move {
            tokio::task::spawn_blocking(move || fetch_blocking(&agent, &target))
                .await
                .map_err(|err| TransportError::Task(err.to_string()))?
        }
    }
}

fn fetch_blocking(agent: &ureq::Agent, target: &Url) -> Result<ProxyReply, TransportError> {
    let response = match agent.request_url("GET", target).call() {
        Ok(response) => response,
        Err(ureq::Error::Status(_, response)) => response,
        Err(ureq::Error::Transport(transport)) => {
            return Err(TransportError::Unreachable(transport.to_string()));
        }
    };
    let status = response.status();
    let body = response
        .into_json::<Value>()
        .map_err(|err| TransportError::InvalidBody(err.to_string()))?;
    Ok(ProxyReply { status, body })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Ticket(u64);

#[derive(Default)]
struct Slot {
    state: RequestState,
    latest_token: u64,
}

pub struct RequestController<T> {
    transport: T,
    slot: Mutex<Slot>,
}

impl<T: ProxyTransport> RequestController<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            slot: Mutex::new(Slot::default()),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn state(&self) -> RequestState {
        self.slot.lock().state.clone()
    }

    pub fn current_record(&self) -> Option<VideoRecord> {
        self.slot.lock().state.record().cloned()
    }

    /// Runs one lookup. Blank input is rejected before any network call and
    /// leaves the state untouched. Otherwise the previous result is dropped,
    /// the controller goes InFlight and exactly one proxy call is made.
    pub async fn submit(&self, raw_url: &str) -> Result<Settled, SubmitError> {
        let (ticket, request) = self.begin(raw_url)?;
        let outcome = self.transport.fetch(request.raw_url()).await;
        Ok(self.settle(ticket, outcome))
    }

    /// Back to Idle. Any lookup still in flight becomes stale.
    pub fn clear(&self) {
        let mut slot = self.slot.lock();
        slot.latest_token += 1;
        slot.state = RequestState::Idle;
    }

    /// Returns `Ok(false)` when there is no resolved video link to open.
    pub fn open_video(&self, opener: &impl MediaOpener) -> io::Result<bool> {
        let url = self
            .current_record()
            .and_then(|record| record.media.video_url);
        open_if_present(url, opener)
    }

    /// Same as [`Self::open_video`] for the audio track.
    pub fn open_audio(&self, opener: &impl MediaOpener) -> io::Result<bool> {
        let url = self
            .current_record()
            .and_then(|record| record.media.audio_url);
        open_if_present(url, opener)
    }

    fn begin(&self, raw_url: &str) -> Result<(Ticket, LookupRequest), SubmitError> {
        let request = LookupRequest::new(raw_url)?;
        let mut slot = self.slot.lock();
        slot.latest_token += 1;
        slot.state = RequestState::InFlight {
            request: request.clone(),
        };
        Ok((Ticket(slot.latest_token), request))
    }

    fn settle(&self, ticket: Ticket, outcome: Result<ProxyReply, TransportError>) -> Settled {
        let settled = match outcome {
            Ok(reply) => match interpret(reply) {
                Ok(record) => Settled::Resolved(record),
                Err(reason) => Settled::Failed(reason),
            },
            Err(err) => {
                log::warn!("lookup transport failed: {err}");
                Settled::Failed(format!("{GENERIC_FAILURE}: {err}"))
            }
        };

        let mut slot = self.slot.lock();
        if slot.latest_token != ticket.0 {
            log::debug!(
                "discarding stale response (token {} < latest {})",
                ticket.0,
                slot.latest_token
            );
            return Settled::Stale;
        }
        slot.state = match &settled {
            Settled::Resolved(record) => RequestState::Resolved {
                record: record.clone(),
            },
            Settled::Failed(reason) => RequestState::Failed {
                reason: reason.clone(),
            },
            Settled::Stale => return Settled::Stale,
        };
        settled
    }
}

fn open_if_present(url: Option<String>, opener: &impl MediaOpener) -> io::Result<bool> {
    match url {
        Some(url) => opener.open(&url).map(|()| true),
        None => Ok(false),
    }
}

/// Maps a proxy reply to a record or a human-readable failure reason.
fn interpret(reply: ProxyReply) -> Result<VideoRecord, String> {
    let ProxyReply { status, body } = reply;
    if !(200..300).contains(&status) {
        return Err(text_field(&body, "error")
            .unwrap_or_else(|| format!("{GENERIC_FAILURE} (HTTP {status})")));
    }
    if !envelope_succeeded(&body) {
        return Err(text_field(&body, "message")
            .or_else(|| text_field(&body, "error"))
            .unwrap_or_else(|| GENERIC_FAILURE.to_string()));
    }
    let result = body.get("result").unwrap_or(&Value::Null);
    normalize(result).map_err(|err| format!("Unexpected response from server: {err}"))
}

fn envelope_succeeded(body: &Value) -> bool {
    match body.get("status") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => {
            matches!(text.trim().to_ascii_lowercase().as_str(), "true" | "ok" | "success")
        }
        _ => false,
    }
}

fn text_field(body: &Value, key: &str) -> Option<String> {
    body.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}
