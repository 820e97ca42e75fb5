//! # Interview Coach Backend - Main Application Entry Point
//!
//! Relays recorded interview answers to a speech-to-text service and an LLM, and sends
//! scored coaching feedback back to the browser.
//!
//! ## Application Architecture:
//! - **config**: layered configuration (defaults, config.toml, environment)
//! - **state**: shared sessions, pipeline collaborators and metrics
//! - **audio**: chunk buffering, sessions and normalization to 16 kHz mono WAV
//! - **transcription**: remote speech-to-text client
//! - **feedback**: LLM analysis, score and improvement extraction, fallback report
//! - **pipeline**: the per-recording orchestrator and its event types
//! - **websocket**: the streaming event channel (`/ws`)
//! - **handlers**: HTTP endpoints, including the one-shot `POST /process_video`
//! - **health / middleware**: monitoring endpoints and request metrics
//! - **error**: pipeline and HTTP error types

mod audio;
mod config;
mod error;
mod feedback;
mod handlers;
mod health;
mod middleware;
mod pipeline;
mod state;
#[cfg(test)]
mod testing;
mod transcription;
mod websocket;

use actix_cors::Cors;
use actix_web::http::header;
use actix_web::middleware::DefaultHeaders;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use crate::config::AppConfig;
use crate::state::AppState;
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// The main application entry point.
///
/// ## What this function does:
/// 1. **Loads configuration** and fails fast when the LLM credentials are missing
/// 2. **Sets up logging**
/// 3. **Builds shared state**: session registry and pipeline collaborators
/// 4. **Configures the HTTP server** with CORS, tracing, metrics and routes
/// 5. **Handles graceful shutdown** on SIGINT/SIGTERM
#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting interview-coach-backend v{}", env!("CARGO_PKG_VERSION"));
    info!(
        llm_model = %config.llm.model,
        transcription_model = %config.transcription.model,
        ffmpeg = config.ffmpeg_path().unwrap_or("disabled"),
        "Configuration loaded: {}:{}",
        config.server.host,
        config.server.port
    );

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let app_state = AppState::from_config(config)?;

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::MetricsMiddleware)
            .wrap(cors())
            .wrap(cross_origin_headers())
            .wrap(TracingLogger::default())
            .configure(handlers::configure_routes)
    })
    .disable_signals()
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
            }
        }
        _ = shutdown_signal() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Browser clients are served from another origin, so every origin is allowed.
fn cors() -> Cors {
    Cors::default()
        .allow_any_origin()
        .send_wildcard()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_header(header::CONTENT_TYPE)
        .max_age(3600)
}

/// Cross-origin headers for responses to requests without an `Origin` header, which
/// the CORS middleware leaves untouched.
fn cross_origin_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .add((header::ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"))
        .add((header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"))
}

/// Initialize the tracing (logging) system.
///
/// ## Environment Variables:
/// - `RUST_LOG`: controls what gets logged; defaults to
///   "interview_coach_backend=debug,actix_web=info"
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "interview_coach_backend=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Resolves on SIGINT (Ctrl+C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received SIGINT");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::app_state;
    use actix_web::http::Method;
    use actix_web::test;

    #[actix_web::test]
    async fn test_non_browser_responses_carry_cors_headers() {
        let state = app_state(Ok("hi".to_string()), Ok("Score: 80".to_string()));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .wrap(middleware::MetricsMiddleware)
                .wrap(cross_origin_headers())
                .configure(handlers::configure_routes),
        )
        .await;

        let req = test::TestRequest::default()
            .method(Method::OPTIONS)
            .uri("/process_video")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        assert_eq!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
        assert_eq!(
            resp.headers().get(header::ACCESS_CONTROL_ALLOW_METHODS).unwrap(),
            "POST, OPTIONS"
        );

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_HEADERS).unwrap(), "Content-Type");
    }

    #[actix_web::test]
    async fn test_browser_preflight_is_answered() {
        let state = app_state(Ok("hi".to_string()), Ok("Score: 80".to_string()));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .wrap(cors())
                .wrap(cross_origin_headers())
                .configure(handlers::configure_routes),
        )
        .await;

        let req = test::TestRequest::default()
            .method(Method::OPTIONS)
            .uri("/process_video")
            .insert_header((header::ORIGIN, "http://localhost:3000"))
            .insert_header((header::ACCESS_CONTROL_REQUEST_METHOD, "POST"))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert!(resp.status().is_success());
        assert_eq!(resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
    }
}
