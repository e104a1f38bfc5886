//! Test doubles for the pipeline collaborators and a local asset server

#![allow(dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;

use story_reel::app_state::AppState;
use story_reel::config::PipelineConfig;
use story_reel::models::job::{JobId, JobStatus, Recording, StreamId};
use story_reel::models::media::{MediaAsset, MediaKind, NarrationText, OutputLayout};
use story_reel::models::script::Script;
use story_reel::pipeline::Pipeline;
use story_reel::services::muxer::{MuxError, Muxer};
use story_reel::services::narration::{SpeechSettings, SpeechSynthesizer, SynthesisError};
use story_reel::services::poller::PollPolicy;
use story_reel::services::retriever::{AssetRetriever, StreamSelection};
use story_reel::services::simulation::{
    EventSender, ServiceError, SessionEvent, SimulationService, Teardown,
};

/// Pipeline stage a test double should fail at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Submit,
    Poll,
    FetchRecording,
    Download,
    Synthesize,
    Mux,
    /// Live streaming only; not part of a render.
    Interact,
}

pub const ALL_STAGES: &[Stage] = &[
    Stage::Connect,
    Stage::Submit,
    Stage::Poll,
    Stage::FetchRecording,
    Stage::Download,
    Stage::Synthesize,
    Stage::Mux,
];

// ── Simulation service ─────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct SimulationCalls {
    pub connect: AtomicUsize,
    pub submit: AtomicUsize,
    pub poll: AtomicUsize,
    pub fetch_recording: AtomicUsize,
    pub disconnect: AtomicUsize,
}

impl SimulationCalls {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Scripted simulation service. Replays `statuses` (the last one repeats)
/// and resolves every stream to `{video_base}/{stream_id}.mp4`.
pub struct MockSimulation {
    statuses: Mutex<VecDeque<JobStatus>>,
    video_base: String,
    fail_at: Option<Stage>,
    events: Mutex<Option<EventSender>>,
    pub calls: SimulationCalls,
    pub submitted: Mutex<Vec<(Script, bool)>>,
    /// Live stream calls in order, with the (tokio) time they were made.
    pub stream_calls: Mutex<Vec<(String, tokio::time::Instant)>>,
}

impl MockSimulation {
    pub fn new(statuses: Vec<JobStatus>, video_base: &str) -> Self {
        Self {
            statuses: Mutex::new(statuses.into()),
            video_base: video_base.trim_end_matches('/').to_string(),
            fail_at: None,
            events: Mutex::new(None),
            calls: SimulationCalls::default(),
            submitted: Mutex::new(Vec::new()),
            stream_calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_at(mut self, stage: Stage) -> Self {
        self.fail_at = Some(stage);
        self
    }

    fn fails(&self, stage: Stage) -> bool {
        self.fail_at == Some(stage)
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(events) = self.events.lock().unwrap().as_ref() {
            let _ = events.send(event);
        }
    }

    pub fn disconnects(&self) -> usize {
        SimulationCalls::get(&self.calls.disconnect)
    }

    pub fn stream_log(&self) -> Vec<String> {
        self.stream_calls
            .lock()
            .unwrap()
            .iter()
            .map(|(call, _)| call.clone())
            .collect()
    }

    fn record_stream_call(&self, call: String) {
        self.stream_calls
            .lock()
            .unwrap()
            .push((call, tokio::time::Instant::now()));
    }
}

#[async_trait]
impl SimulationService for MockSimulation {
    async fn connect(&self, events: Option<EventSender>) -> Result<(), ServiceError> {
        self.calls.connect.fetch_add(1, Ordering::SeqCst);
        if self.fails(Stage::Connect) {
            return Err(ServiceError::Auth("invalid api key".to_string()));
        }
        *self.events.lock().unwrap() = events;
        Ok(())
    }

    async fn submit(&self, script: &Script, portrait: bool) -> Result<JobId, ServiceError> {
        self.calls.submit.fetch_add(1, Ordering::SeqCst);
        if self.fails(Stage::Submit) {
            return Err(ServiceError::Connection("connection reset by peer".to_string()));
        }
        self.submitted.lock().unwrap().push((script.clone(), portrait));
        Ok(JobId("job_test".to_string()))
    }

    async fn poll(&self, _job_id: &JobId) -> Result<JobStatus, ServiceError> {
        self.calls.poll.fetch_add(1, Ordering::SeqCst);
        if self.fails(Stage::Poll) {
            return Err(ServiceError::Connection("timed out".to_string()));
        }
        let status = {
            let mut statuses = self.statuses.lock().unwrap();
            if statuses.len() > 1 {
                statuses.pop_front().unwrap()
            } else {
                statuses.front().cloned().unwrap()
            }
        };
        for stream in &status.streams {
            self.emit(SessionEvent::StreamStarted {
                stream_id: stream.stream_id.clone(),
            });
        }
        Ok(status)
    }

    async fn fetch_recording(&self, stream_id: &StreamId) -> Result<Recording, ServiceError> {
        self.calls.fetch_recording.fetch_add(1, Ordering::SeqCst);
        if self.fails(Stage::FetchRecording) {
            return Err(ServiceError::Api {
                status: reqwest::StatusCode::NOT_FOUND,
                body: "no such stream".to_string(),
            });
        }
        Ok(Recording {
            video_url: format!("{}/{}.mp4", self.video_base, stream_id),
        })
    }

    async fn start_stream(&self, prompt: &str, portrait: bool) -> Result<StreamId, ServiceError> {
        self.record_stream_call(format!("start:{prompt}:{portrait}"));
        let stream_id = StreamId("live_1".to_string());
        self.emit(SessionEvent::StreamStarted {
            stream_id: stream_id.clone(),
        });
        self.emit(SessionEvent::FrameArrived {
            width: 1280,
            height: 704,
        });
        Ok(stream_id)
    }

    async fn interact(&self, prompt: &str) -> Result<(), ServiceError> {
        self.record_stream_call(format!("interact:{prompt}"));
        if self.fails(Stage::Interact) {
            return Err(ServiceError::Connection("stream dropped".to_string()));
        }
        self.emit(SessionEvent::FrameArrived {
            width: 1280,
            height: 704,
        });
        Ok(())
    }

    async fn end_stream(&self) -> Result<(), ServiceError> {
        self.record_stream_call("end".to_string());
        Ok(())
    }

    fn teardown(&self) -> Teardown {
        Teardown::Disconnect
    }

    async fn disconnect(&self) -> Result<(), ServiceError> {
        self.calls.disconnect.fetch_add(1, Ordering::SeqCst);
        *self.events.lock().unwrap() = None;
        Ok(())
    }
}

// ── Speech synthesizer ─────────────────────────────────────────────

/// Writes a fixed audio payload instead of calling a TTS backend.
pub struct MockSpeech {
    audio: Vec<u8>,
    fail: bool,
    pub calls: AtomicUsize,
    pub texts: Mutex<Vec<String>>,
}

impl MockSpeech {
    pub fn new() -> Self {
        Self {
            audio: b"ID3 fake mp3 narration".to_vec(),
            fail: false,
            calls: AtomicUsize::new(0),
            texts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSpeech {
    async fn synthesize(
        &self,
        text: &NarrationText,
        _settings: &SpeechSettings,
        dest: &Path,
    ) -> Result<MediaAsset, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SynthesisError::Backend("voice unavailable".to_string()));
        }
        self.texts.lock().unwrap().push(text.as_str().to_string());

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.unwrap();
        }
        tokio::fs::write(dest, &self.audio).await.unwrap();
        Ok(MediaAsset {
            kind: MediaKind::Audio,
            path: dest.to_path_buf(),
            bytes: self.audio.len() as u64,
        })
    }
}

// ── Muxer ──────────────────────────────────────────────────────────

/// Records each mux call and writes a placeholder output file.
pub struct MockMuxer {
    fail: bool,
    pub calls: Mutex<Vec<(PathBuf, PathBuf, PathBuf)>>,
}

impl MockMuxer {
    pub fn new() -> Self {
        Self {
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<(PathBuf, PathBuf, PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Muxer for MockMuxer {
    async fn mux(&self, video: &Path, audio: &Path, output: &Path) -> Result<(), MuxError> {
        self.calls
            .lock()
            .unwrap()
            .push((video.to_path_buf(), audio.to_path_buf(), output.to_path_buf()));
        if self.fail {
            return Err(MuxError::Spawn {
                program: "ffmpeg".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "ffmpeg not installed"),
            });
        }
        tokio::fs::write(output, b"muxed").await.unwrap();
        Ok(())
    }
}

// ── Asset server ───────────────────────────────────────────────────

struct AssetState {
    body: Vec<u8>,
    hits: AtomicUsize,
}

/// Local HTTP server serving one payload under `/videos/*`
/// and failing every request under `/broken/*`.
pub struct AssetServer {
    pub addr: SocketAddr,
    state: Arc<AssetState>,
}

impl AssetServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }
}

async fn serve_video(State(state): State<Arc<AssetState>>) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    (
        StatusCode::OK,
        [("content-type", "video/mp4")],
        state.body.clone(),
    )
}

async fn serve_broken(State(state): State<Arc<AssetState>>) -> impl IntoResponse {
    state.hits.fetch_add(1, Ordering::SeqCst);
    (StatusCode::INTERNAL_SERVER_ERROR, "storage backend unavailable")
}

pub async fn spawn_asset_server(body: Vec<u8>) -> AssetServer {
    let state = Arc::new(AssetState {
        body,
        hits: AtomicUsize::new(0),
    });
    let app = Router::new()
        .route("/videos/{name}", get(serve_video))
        .route("/broken/{name}", get(serve_broken))
        .with_state(Arc::clone(&state));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    AssetServer { addr, state }
}

// ── Pipeline wiring ────────────────────────────────────────────────

pub fn test_config(output_dir: &Path) -> PipelineConfig {
    PipelineConfig {
        poll: PollPolicy {
            interval: Duration::from_millis(10),
            max_attempts: Some(50),
            deadline: None,
        },
        layout: OutputLayout::new(output_dir),
        streams: StreamSelection::First,
        chunk_bytes: 4096,
        ..PipelineConfig::default()
    }
}

pub fn build_pipeline(
    simulation: Arc<MockSimulation>,
    speech: Arc<MockSpeech>,
    muxer: Arc<MockMuxer>,
    config: PipelineConfig,
) -> Pipeline {
    let retriever = AssetRetriever::new(reqwest::Client::new(), config.chunk_bytes);
    let state = AppState::new(simulation, speech, muxer, retriever);
    Pipeline::new(state, config)
}
