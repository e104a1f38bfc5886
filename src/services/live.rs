//! Interactive streaming: play a script on a live stream instead of rendering a job.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{sleep_until, Instant};

use super::session;
use super::simulation::{EventSender, ServiceError, SimulationService};
use crate::models::job::StreamId;
use crate::models::script::{Action, Script};

/// What a live playback did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveReport {
    pub stream_id: StreamId,
    pub interactions: usize,
    pub elapsed_ms: u64,
}

/// Start the stream with the script's opening prompt, send each `interact`
/// at its timestamp and end the stream at the closing timestamp.
///
/// The session is connected first and released on every exit path. Frames
/// and stream starts are delivered on `events`.
pub async fn play(
    service: Arc<dyn SimulationService>,
    events: Option<EventSender>,
    script: &Script,
    portrait: bool,
) -> Result<LiveReport, ServiceError> {
    session::with_session::<_, ServiceError, _, _>(service, events, |service| async move {
        let started = Instant::now();
        let mut stream_id = None;
        let mut interactions = 0;

        for directive in script.directives() {
            sleep_until(started + Duration::from_millis(directive.timestamp_ms)).await;

            match &directive.action {
                Action::Start(prompt) => {
                    stream_id = Some(service.start_stream(&prompt.prompt, portrait).await?);
                }
                Action::Interact(prompt) => {
                    tracing::debug!(at_ms = directive.timestamp_ms, prompt = %prompt.prompt, "Interacting");
                    service.interact(&prompt.prompt).await?;
                    interactions += 1;
                }
                Action::End(_) => service.end_stream().await?,
            }
        }

        // A validated script always opens with `start`.
        let stream_id = stream_id.ok_or(ServiceError::NoActiveStream)?;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(stream_id = %stream_id, interactions, elapsed_ms, "Live playback finished");

        Ok(LiveReport {
            stream_id,
            interactions,
            elapsed_ms,
        })
    })
    .await
}
