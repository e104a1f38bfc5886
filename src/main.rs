use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use story_reel::{
    app_state::AppState,
    config::AppConfig,
    models::{
        media::{NarrationText, OutputLayout, RenderOutcome},
        script::Script,
    },
    pipeline::{Pipeline, RenderRequest},
    services::{live, simulation::SessionEvent},
};

#[derive(Parser, Debug)]
#[command(name = "story-reel")]
#[command(about = "Render a simulated scene script into a narrated video", long_about = None)]
struct Args {
    /// JSON scene script: `[{"timestamp_ms": 0, "start": {"prompt": "..."}}, ...]`
    #[arg(short, long)]
    script: PathBuf,

    /// Narration text
    #[arg(short, long, conflicts_with = "narration_file")]
    narration: Option<String>,

    /// File containing the narration text
    #[arg(long)]
    narration_file: Option<PathBuf>,

    /// Render in portrait orientation
    #[arg(long)]
    portrait: bool,

    /// Play the script on a live stream instead of rendering a narrated video
    #[arg(long, conflicts_with_all = ["narration", "narration_file"])]
    live: bool,

    /// Override RENDER_OUTPUT_DIR
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    // Credentials are checked before any network activity.
    let config = AppConfig::from_env().context("Failed to load configuration")?;

    describe_metrics();

    let script_json = tokio::fs::read_to_string(&args.script)
        .await
        .with_context(|| format!("Failed to read script {}", args.script.display()))?;
    let script: Script = serde_json::from_str(&script_json)
        .with_context(|| format!("Invalid script {}", args.script.display()))?;

    let mut pipeline_config = config.pipeline();
    if let Some(dir) = args.output_dir {
        pipeline_config.layout = OutputLayout::new(dir);
    }

    let state = AppState::from_config(&config).context("Failed to build HTTP client")?;

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let events_task = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                SessionEvent::FrameArrived { width, height } => {
                    tracing::info!("Frame: {width}x{height}")
                }
                SessionEvent::StreamStarted { stream_id } => {
                    tracing::info!(stream_id = %stream_id, "Stream ready")
                }
                SessionEvent::JobStateChanged { job_id, state } => {
                    tracing::info!(job_id = %job_id, state = %state, "Simulation state changed")
                }
            }
        }
    });

    if args.live {
        tracing::info!(directives = script.len(), portrait = args.portrait, "Starting live stream");
        let result = live::play(
            state.simulation.clone(),
            Some(events_tx),
            &script,
            args.portrait,
        )
        .await;
        events_task.await.ok();

        return match result {
            Ok(report) => {
                println!("{}", serde_json::to_string_pretty(&report)?);
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Live stream failed");
                std::process::exit(1);
            }
        };
    }

    let narration = match (args.narration, args.narration_file) {
        (Some(text), _) => text,
        (None, Some(path)) => tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read narration {}", path.display()))?,
        (None, None) => anyhow::bail!("Either --narration or --narration-file must be provided"),
    };

    let pipeline = Pipeline::new(state, pipeline_config).with_events(events_tx);

    tracing::info!(
        directives = script.len(),
        output_dir = %pipeline.config().layout.root().display(),
        "Starting render"
    );

    let outcome = pipeline
        .run(RenderRequest {
            script,
            portrait: args.portrait,
            narration: NarrationText::new(narration),
        })
        .await;

    // Dropping the pipeline closes the event channel.
    drop(pipeline);
    events_task.await.ok();

    match outcome {
        Ok(RenderOutcome::Rendered(report)) => {
            for path in &report.final_videos {
                tracing::info!(path = %path.display(), "Done");
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Ok(RenderOutcome::Cancelled { job_id }) => {
            tracing::warn!(job_id = %job_id, "Simulation was cancelled");
            std::process::exit(2);
        }
        Err(e) => {
            tracing::error!(error = %e, "Render failed");
            std::process::exit(1);
        }
    }
}

fn describe_metrics() {
    metrics::describe_counter!("render_runs_total", "Render runs started");
    metrics::describe_counter!("render_runs_failed", "Render runs that ended in an error");
    metrics::describe_counter!("render_runs_cancelled", "Render runs whose simulation was cancelled");
    metrics::describe_counter!("simulation_polls_total", "Simulation status queries issued");
    metrics::describe_histogram!(
        "simulation_wait_seconds",
        "Time from first status query to job completion"
    );
    metrics::describe_counter!("asset_download_bytes_total", "Bytes of video downloaded");
    metrics::describe_counter!("narration_bytes_total", "Bytes of narration audio written");
}
