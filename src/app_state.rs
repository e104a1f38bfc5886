use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::config::AppConfig;
use crate::services::{
    muxer::{FfmpegMuxer, Muxer},
    narration::{OpenAiSpeechClient, SpeechSynthesizer},
    retriever::AssetRetriever,
    simulation::{OdysseyClient, SimulationService},
};

/// The collaborators a pipeline run talks to.
#[derive(Clone)]
pub struct AppState {
    pub simulation: Arc<dyn SimulationService>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub muxer: Arc<dyn Muxer>,
    pub retriever: Arc<AssetRetriever>,
}

impl AppState {
    pub fn new(
        simulation: Arc<dyn SimulationService>,
        speech: Arc<dyn SpeechSynthesizer>,
        muxer: Arc<dyn Muxer>,
        retriever: AssetRetriever,
    ) -> Self {
        Self {
            simulation,
            speech,
            muxer,
            retriever: Arc::new(retriever),
        }
    }

    /// Production wiring: HTTP clients for both services, ffmpeg for muxing.
    pub fn from_config(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .user_agent(concat!("story-reel/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let simulation = OdysseyClient::new(
            http.clone(),
            &config.odyssey_base_url,
            &config.odyssey_api_key,
        )
        .with_request_timeout(Duration::from_secs(config.render_request_timeout_secs));
        let speech = OpenAiSpeechClient::new(
            http.clone(),
            &config.openai_base_url,
            &config.openai_api_key,
            config.render_download_chunk_bytes,
        );
        let muxer = FfmpegMuxer::new(&config.ffmpeg_path, &config.ffprobe_path);
        let retriever = AssetRetriever::new(http, config.render_download_chunk_bytes);

        Ok(Self::new(
            Arc::new(simulation),
            Arc::new(speech),
            Arc::new(muxer),
            retriever,
        ))
    }
}
