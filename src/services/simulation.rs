//! Remote simulation service.
//!
//! [`SimulationService`] is the seam the pipeline talks to; [`OdysseyClient`]
//! is the HTTP implementation used in production. Tests substitute their own.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

use crate::models::job::{JobId, JobState, JobStatus, Recording, StreamId};
use crate::models::script::Script;

/// Upper bound for one API round trip.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Asynchronous notifications a session may push to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A video frame arrived on a live stream.
    FrameArrived { width: u32, height: u32 },
    /// A stream became available.
    StreamStarted { stream_id: StreamId },
    /// A status query observed a new job state.
    JobStateChanged { job_id: JobId, state: JobState },
}

/// Sending half of the event channel; the caller drains the receiver.
pub type EventSender = mpsc::UnboundedSender<SessionEvent>;

/// How a service implementation releases its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    Disconnect,
    Close,
    /// Nothing to release.
    None,
}

#[async_trait]
pub trait SimulationService: Send + Sync {
    /// Open the session, optionally registering an event sink.
    async fn connect(&self, events: Option<EventSender>) -> Result<(), ServiceError>;

    /// Submit a script; a single round trip returning the new job id.
    async fn submit(&self, script: &Script, portrait: bool) -> Result<JobId, ServiceError>;

    /// Query the current status of a job.
    async fn poll(&self, job_id: &JobId) -> Result<JobStatus, ServiceError>;

    /// Resolve a stream into a downloadable recording.
    async fn fetch_recording(&self, stream_id: &StreamId) -> Result<Recording, ServiceError>;

    /// Begin a live stream from an opening prompt. Frames are pushed as
    /// [`SessionEvent::FrameArrived`].
    async fn start_stream(&self, _prompt: &str, _portrait: bool) -> Result<StreamId, ServiceError> {
        Err(ServiceError::Unsupported("start_stream"))
    }

    /// Steer the live stream.
    async fn interact(&self, _prompt: &str) -> Result<(), ServiceError> {
        Err(ServiceError::Unsupported("interact"))
    }

    async fn end_stream(&self) -> Result<(), ServiceError> {
        Err(ServiceError::Unsupported("end_stream"))
    }

    /// Teardown capability this implementation exposes.
    fn teardown(&self) -> Teardown {
        Teardown::None
    }

    async fn disconnect(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Simulation service rejected the credentials: {0}")]
    Auth(String),

    #[error("Connection to simulation service failed: {0}")]
    Connection(String),

    #[error("Simulation service returned {status}: {body}")]
    Api { status: StatusCode, body: String },

    #[error("Unexpected simulation service response: {0}")]
    Decode(String),

    #[error("Invalid simulation service URL {0}")]
    InvalidUrl(String),

    #[error("No open simulation session")]
    NotConnected,

    #[error("No live stream is running")]
    NoActiveStream,

    #[error("Simulation service does not support {0}")]
    Unsupported(&'static str),
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ServiceError::Decode(e.to_string())
        } else {
            ServiceError::Connection(e.to_string())
        }
    }
}

#[derive(Serialize)]
struct SimulateRequest<'a> {
    script: &'a Script,
    portrait: bool,
}

#[derive(Deserialize)]
struct SimulateResponse {
    job_id: JobId,
}

#[derive(Deserialize)]
struct SessionResponse {
    session_id: String,
}

#[derive(Serialize)]
struct StreamRequest<'a> {
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    portrait: Option<bool>,
}

#[derive(Deserialize)]
struct FrameInfo {
    width: u32,
    height: u32,
}

#[derive(Deserialize)]
struct StreamStartResponse {
    stream_id: StreamId,
    #[serde(default)]
    frame: Option<FrameInfo>,
}

#[derive(Deserialize)]
struct InteractResponse {
    #[serde(default)]
    frame: Option<FrameInfo>,
}

#[derive(Default)]
struct SessionState {
    session_id: Option<String>,
    stream_id: Option<StreamId>,
    events: Option<EventSender>,
    last_state: Option<JobState>,
}

/// HTTP client for the Odyssey simulation API.
pub struct OdysseyClient {
    http: Client,
    base_url: String,
    api_key: String,
    request_timeout: Duration,
    state: Mutex<SessionState>,
}

impl OdysseyClient {
    pub fn new(http: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Bound every API round trip, response body included.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// `{base}/v1/{segments...}`, each segment percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ServiceError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| ServiceError::InvalidUrl(format!("{}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| ServiceError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .push("v1")
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
    }

    async fn session_id(&self) -> Result<String, ServiceError> {
        self.state
            .lock()
            .await
            .session_id
            .clone()
            .ok_or(ServiceError::NotConnected)
    }

    async fn emit(&self, event: SessionEvent) {
        let state = self.state.lock().await;
        if let Some(events) = &state.events {
            // Receiver gone means the caller stopped listening.
            let _ = events.send(event);
        }
    }

    async fn emit_frame(&self, frame: Option<FrameInfo>) {
        if let Some(FrameInfo { width, height }) = frame {
            self.emit(SessionEvent::FrameArrived { width, height }).await;
        }
    }
}

/// Map non-success statuses onto the error taxonomy.
async fn check(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ServiceError::Auth(if body.is_empty() {
            status.to_string()
        } else {
            body
        })),
        _ => Err(ServiceError::Api { status, body }),
    }
}

#[async_trait]
impl SimulationService for OdysseyClient {
    async fn connect(&self, events: Option<EventSender>) -> Result<(), ServiceError> {
        let response = self
            .request(Method::POST, self.endpoint(&["sessions"])?)
            .send()
            .await?;
        let session: SessionResponse = check(response).await?.json().await?;

        tracing::debug!(session_id = %session.session_id, "Simulation session opened");

        let mut state = self.state.lock().await;
        state.session_id = Some(session.session_id);
        state.events = events;
        Ok(())
    }

    async fn submit(&self, script: &Script, portrait: bool) -> Result<JobId, ServiceError> {
        let response = self
            .request(Method::POST, self.endpoint(&["simulations"])?)
            .json(&SimulateRequest { script, portrait })
            .send()
            .await?;
        let created: SimulateResponse = check(response).await?.json().await?;
        Ok(created.job_id)
    }

    async fn poll(&self, job_id: &JobId) -> Result<JobStatus, ServiceError> {
        let response = self
            .request(Method::GET, self.endpoint(&["simulations", &job_id.0])?)
            .send()
            .await?;
        let status: JobStatus = check(response).await?.json().await?;

        let changed = {
            let mut state = self.state.lock().await;
            let changed = state.last_state != Some(status.status);
            state.last_state = Some(status.status);
            changed
        };
        if changed {
            self.emit(SessionEvent::JobStateChanged {
                job_id: job_id.clone(),
                state: status.status,
            })
            .await;
            if status.status == JobState::Completed {
                for stream in &status.streams {
                    self.emit(SessionEvent::StreamStarted {
                        stream_id: stream.stream_id.clone(),
                    })
                    .await;
                }
            }
        }

        Ok(status)
    }

    async fn fetch_recording(&self, stream_id: &StreamId) -> Result<Recording, ServiceError> {
        let response = self
            .request(Method::GET, self.endpoint(&["recordings", &stream_id.0])?)
            .send()
            .await?;
        Ok(check(response).await?.json().await?)
    }

    async fn start_stream(&self, prompt: &str, portrait: bool) -> Result<StreamId, ServiceError> {
        let session_id = self.session_id().await?;
        let response = self
            .request(Method::POST, self.endpoint(&["sessions", &session_id, "stream"])?)
            .json(&StreamRequest {
                prompt,
                portrait: Some(portrait),
            })
            .send()
            .await?;
        let started: StreamStartResponse = check(response).await?.json().await?;

        tracing::info!(stream_id = %started.stream_id, portrait, "Live stream started");
        self.state.lock().await.stream_id = Some(started.stream_id.clone());
        self.emit(SessionEvent::StreamStarted {
            stream_id: started.stream_id.clone(),
        })
        .await;
        self.emit_frame(started.frame).await;

        Ok(started.stream_id)
    }

    async fn interact(&self, prompt: &str) -> Result<(), ServiceError> {
        let session_id = self.session_id().await?;
        if self.state.lock().await.stream_id.is_none() {
            return Err(ServiceError::NoActiveStream);
        }

        let response = self
            .request(
                Method::POST,
                self.endpoint(&["sessions", &session_id, "stream", "interact"])?,
            )
            .json(&StreamRequest {
                prompt,
                portrait: None,
            })
            .send()
            .await?;
        let reply: InteractResponse = check(response).await?.json().await?;
        self.emit_frame(reply.frame).await;
        Ok(())
    }

    async fn end_stream(&self) -> Result<(), ServiceError> {
        let session_id = self.session_id().await?;
        let Some(stream_id) = self.state.lock().await.stream_id.take() else {
            return Err(ServiceError::NoActiveStream);
        };

        let response = self
            .request(
                Method::POST,
                self.endpoint(&["sessions", &session_id, "stream", "end"])?,
            )
            .send()
            .await?;
        check(response).await?;

        tracing::info!(stream_id = %stream_id, "Live stream ended");
        Ok(())
    }

    fn teardown(&self) -> Teardown {
        Teardown::Disconnect
    }

    async fn disconnect(&self) -> Result<(), ServiceError> {
        let session_id = {
            let mut state = self.state.lock().await;
            state.events = None;
            state.last_state = None;
            state.stream_id = None;
            state.session_id.take()
        };

        // Never connected, or already released.
        let Some(session_id) = session_id else {
            return Ok(());
        };

        let response = self
            .request(Method::DELETE, self.endpoint(&["sessions", &session_id])?)
            .send()
            .await?;
        check(response).await?;

        tracing::debug!(session_id = %session_id, "Simulation session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> OdysseyClient {
        OdysseyClient::new(Client::new(), base, "key")
    }

    #[test]
    fn test_endpoint_escapes_ids() {
        let url = client("http://sim.local").endpoint(&["recordings", "clip/7?x=1#f"]).unwrap();
        assert_eq!(url.as_str(), "http://sim.local/v1/recordings/clip%2F7%3Fx=1%23f");
        assert_eq!(url.path_segments().unwrap().count(), 3);
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let url = client("https://sim.local/api/").endpoint(&["simulations", "job_1"]).unwrap();
        assert_eq!(url.as_str(), "https://sim.local/api/v1/simulations/job_1");
    }

    #[test]
    fn test_endpoint_rejects_bad_base() {
        let err = client("not a url").endpoint(&["sessions"]).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidUrl(_)));
    }

    #[tokio::test]
    async fn test_stream_operations_need_a_session() {
        let client = client("http://127.0.0.1:9");
        assert!(matches!(
            client.start_stream("A cat", true).await,
            Err(ServiceError::NotConnected)
        ));
        assert!(matches!(client.interact("Pet the cat").await, Err(ServiceError::NotConnected)));
        assert!(matches!(client.end_stream().await, Err(ServiceError::NotConnected)));
    }
}
