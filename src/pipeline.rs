//! Render pipeline: submit → poll → (download ∥ narrate) → mux.

use chrono::Utc;
use tracing::Instrument;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::config::PipelineConfig;
use crate::models::job::{Job, JobId, Recording, StreamRef};
use crate::models::media::{MediaAsset, NarrationText, RenderOutcome, RenderReport};
use crate::models::script::Script;
use crate::services::{
    muxer::MuxError,
    narration::SynthesisError,
    poller::{PollError, PollOutcome, StatusPoller},
    retriever::DownloadError,
    session,
    simulation::{EventSender, ServiceError},
    submitter,
};

/// One narrated render.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub script: Script,
    pub portrait: bool,
    pub narration: NarrationText,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error(transparent)]
    Mux(#[from] MuxError),
}

/// What the remote phase produced before the session was released.
enum RemoteResult {
    Completed {
        job: Job,
        recordings: Vec<(StreamRef, Recording)>,
    },
    Cancelled(JobId),
}

pub struct Pipeline {
    state: AppState,
    config: PipelineConfig,
    poller: StatusPoller,
    events: Option<EventSender>,
}

impl Pipeline {
    pub fn new(state: AppState, config: PipelineConfig) -> Self {
        let poller = StatusPoller::new(config.poll.clone());
        Self {
            state,
            config,
            poller,
            events: None,
        }
    }

    /// Forward service events (frames, stream starts, state changes) to `events`.
    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run(&self, request: RenderRequest) -> Result<RenderOutcome, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("render", %run_id);
        metrics::counter!("render_runs_total").increment(1);

        let result = self.run_inner(run_id, request).instrument(span).await;
        match &result {
            Ok(RenderOutcome::Rendered(_)) => {}
            Ok(RenderOutcome::Cancelled { .. }) => {
                metrics::counter!("render_runs_cancelled").increment(1);
            }
            Err(_) => metrics::counter!("render_runs_failed").increment(1),
        }
        result
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        request: RenderRequest,
    ) -> Result<RenderOutcome, PipelineError> {
        let started_at = Utc::now();
        let RenderRequest {
            script,
            portrait,
            narration,
        } = request;

        // Checked before a simulation is paid for.
        if narration.is_blank() {
            return Err(SynthesisError::EmptyText.into());
        }

        let remote = session::with_session::<_, PipelineError, _, _>(
            self.state.simulation.clone(),
            self.events.clone(),
            |service| async move {
                let job = submitter::submit(service.as_ref(), script, portrait).await?;
                match self.poller.wait(service.as_ref(), &job.job_id).await? {
                    PollOutcome::Cancelled => Ok(RemoteResult::Cancelled(job.job_id)),
                    PollOutcome::Completed(streams) => {
                        let recordings = self
                            .state
                            .retriever
                            .resolve(service.as_ref(), &streams, self.config.streams)
                            .await?;
                        Ok(RemoteResult::Completed { job, recordings })
                    }
                }
            },
        )
        .await?;

        let (job, recordings) = match remote {
            RemoteResult::Completed { job, recordings } => (job, recordings),
            RemoteResult::Cancelled(job_id) => {
                tracing::warn!(job_id = %job_id, "Render stopped, simulation was cancelled");
                return Ok(RenderOutcome::Cancelled { job_id });
            }
        };

        let layout = &self.config.layout;
        let narration_path = layout.narration();

        let downloads = async {
            let mut assets: Vec<MediaAsset> = Vec::with_capacity(recordings.len());
            for (index, (_, recording)) in recordings.iter().enumerate() {
                let asset = self
                    .state
                    .retriever
                    .download(&recording.video_url, &layout.raw_video(index))
                    .await?;
                assets.push(asset);
            }
            Ok::<_, PipelineError>(assets)
        };
        let narrate = async {
            let asset = self
                .state
                .speech
                .synthesize(&narration, &self.config.speech, &narration_path)
                .await?;
            Ok::<_, PipelineError>(asset)
        };
        let (raw_videos, narration_asset) = tokio::try_join!(downloads, narrate)?;

        let mut final_videos = Vec::with_capacity(raw_videos.len());
        for (index, video) in raw_videos.iter().enumerate() {
            let output = layout.final_video(index);
            self.state
                .muxer
                .mux(&video.path, &narration_asset.path, &output)
                .await?;
            final_videos.push(output);
        }

        tracing::info!(
            job_id = %job.job_id,
            outputs = final_videos.len(),
            "Render finished"
        );

        Ok(RenderOutcome::Rendered(RenderReport {
            run_id,
            job_id: job.job_id,
            streams: recordings
                .into_iter()
                .map(|(stream, _)| stream.stream_id)
                .collect(),
            raw_videos,
            narration: narration_asset,
            final_videos,
            started_at,
            finished_at: Utc::now(),
        }))
    }
}
