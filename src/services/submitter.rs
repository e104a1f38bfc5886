use super::simulation::{ServiceError, SimulationService};
use crate::models::job::Job;
use crate::models::script::Script;

/// Submit a validated script as a new simulation job.
///
/// `Script` values are validated on construction, so malformed scripts never
/// reach the service. One round trip, no retries.
pub async fn submit(
    service: &dyn SimulationService,
    script: Script,
    portrait: bool,
) -> Result<Job, ServiceError> {
    tracing::info!(
        directives = script.len(),
        duration_ms = script.duration_ms(),
        portrait,
        "Submitting simulation"
    );

    let job_id = service.submit(&script, portrait).await?;

    tracing::info!(job_id = %job_id, "Simulation started");

    Ok(Job {
        job_id,
        script,
        portrait,
    })
}
