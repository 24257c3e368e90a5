use std::sync::PoisonError;

use actix_web::web;
use anyhow::{Context, Result};
use bird_cctv::{
    AppConfig, AppState, CliArgs, FramePipeline, SummaryReader, model, server, telemetry,
};
use clap::Parser;
use tracing::info;
use video_ingest::CaptureDevice;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    telemetry::init_tracing()?;
    telemetry::init_metrics_recorder()?;

    let config = AppConfig::from_args(CliArgs::parse());
    info!("Video source: {}", config.capture.source);
    info!("Tracking labels: {}", config.labels_display());

    let detector = model::build_detector(&config)?;
    let device = CaptureDevice::from_settings(&config.capture);
    let pipeline = FramePipeline::new(Box::new(device), detector, config.recovery)
        .context("failed to start the frame pipeline")?;
    let detection_enabled = pipeline.detection_enabled();
    let model_status = model::model_status(&config, detection_enabled);
    info!("Model: {model_status}");

    let summary = SummaryReader::new(pipeline.snapshot());
    let pipeline = pipeline.into_shared();

    let state = web::Data::new(AppState {
        pipeline: pipeline.clone(),
        summary,
        labels_display: config.labels_display(),
        model_status,
        detection_enabled,
        jpeg_quality: config.jpeg_quality,
    });

    let served = actix_web::rt::System::new().block_on(server::serve(state, &config.bind));

    pipeline
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .release();

    served.with_context(|| format!("HTTP server on {} failed", config.bind))
}
