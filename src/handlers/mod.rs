pub mod config;
pub mod process_video;

pub use config::*;
pub use process_video::*;

use crate::{health, websocket};
use actix_web::{http::Method, web};

/// Every route the server exposes.
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/health", web::get().to(health::health_check))
            .route("/metrics", web::get().to(health::detailed_metrics))
            .route("/config", web::get().to(get_config)),
    )
    .route("/health", web::get().to(health::health_check))
    .route("/ws", web::get().to(websocket::interview_socket))
    .service(
        web::resource("/process_video")
            .route(web::post().to(process_video))
            .route(web::method(Method::OPTIONS).to(preflight)),
    );
}
