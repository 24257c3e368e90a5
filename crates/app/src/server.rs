//! Actix Web routes: dashboard, MJPEG feed, detection summary, health and metrics.
//!
//! `/video_feed` pulls frames on the blocking thread pool so camera reads and
//! inference never stall the async workers. The stream ends when the pipeline
//! stops producing frames or the client disconnects.

use actix_web::{
    App, HttpResponse, HttpServer,
    http::header,
    web::{self, Bytes},
};
use async_stream::stream;
use serde::Serialize;
use tracing::{error, info};

use crate::{
    html::dashboard::{self, DashboardView},
    pipeline::SharedPipeline,
    stream::{MJPEG_BOUNDARY, StreamPublisher, mjpeg_part},
    summary::SummaryReader,
    telemetry,
};

/// Shared state backing HTTP handlers.
pub struct AppState {
    pub pipeline: SharedPipeline,
    pub summary: SummaryReader,
    pub labels_display: String,
    pub model_status: String,
    pub detection_enabled: bool,
    pub jpeg_quality: u8,
}

#[derive(Serialize)]
struct Health<'a> {
    status: &'static str,
    camera_active: bool,
    labels: &'a str,
    detection_enabled: bool,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index_route))
        .route("/video_feed", web::get().to(video_feed_handler))
        .route("/api/detections", web::get().to(detections_handler))
        .route("/healthz", web::get().to(health_handler))
        .route("/metrics", web::get().to(metrics_handler));
}

/// Serve until the server is shut down (SIGINT/SIGTERM are handled by actix).
pub async fn serve(state: web::Data<AppState>, bind: &str) -> std::io::Result<()> {
    let server = HttpServer::new(move || App::new().app_data(state.clone()).configure(configure))
        .bind(bind)?
        .run();
    info!("Listening on http://{bind}");
    server.await
}

async fn index_route(state: web::Data<AppState>) -> HttpResponse {
    let view = DashboardView {
        labels_display: &state.labels_display,
        model_status: &state.model_status,
        detection_enabled: state.detection_enabled,
    };
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(dashboard::render(&view, &state.summary.snapshot()))
}

async fn video_feed_handler(state: web::Data<AppState>) -> HttpResponse {
    let pipeline = state.pipeline.clone();
    let quality = state.jpeg_quality;
    let body = stream! {
        let mut publisher = StreamPublisher::new(pipeline, quality);
        loop {
            let pulled = web::block(move || {
                let payload = publisher.next();
                (publisher, payload)
            })
            .await;
            let payload = match pulled {
                Ok((returned, payload)) => {
                    publisher = returned;
                    payload
                }
                Err(err) => {
                    error!("Frame pull failed: {err}");
                    break;
                }
            };
            match payload {
                Some(jpeg) => yield Ok::<Bytes, actix_web::Error>(Bytes::from(mjpeg_part(&jpeg))),
                None => break,
            }
        }
    };

    HttpResponse::Ok()
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={MJPEG_BOUNDARY}"),
        ))
        .insert_header((header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"))
        .insert_header((header::PRAGMA, "no-cache"))
        .insert_header((header::EXPIRES, "0"))
        .streaming(body)
}

async fn detections_handler(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(state.summary.snapshot())
}

async fn health_handler(state: web::Data<AppState>) -> HttpResponse {
    let summary = state.summary.snapshot();
    HttpResponse::Ok().json(Health {
        status: "ok",
        camera_active: summary.last_updated.is_some(),
        labels: &state.labels_display,
        detection_enabled: state.detection_enabled,
    })
}

async fn metrics_handler() -> HttpResponse {
    match telemetry::prometheus_handle() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().body("metrics recorder not installed"),
    }
}
