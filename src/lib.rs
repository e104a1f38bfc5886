//! Narrated video rendering from remote simulation jobs.
//!
//! A multi-scene script is submitted to the simulation service and polled
//! until the job finishes. The resulting recording is downloaded while the
//! narration is synthesized, and ffmpeg muxes the two into the final video.

pub mod app_state;
pub mod config;
pub mod models;
pub mod pipeline;
pub mod services;
