use crate::{error::AppResult, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;

/// Placeholder shown instead of any configured secret.
const REDACTED: &str = "[redacted]";

fn redact(secret: &str) -> Option<&'static str> {
    (!secret.is_empty()).then_some(REDACTED)
}

pub async fn get_config(state: web::Data<AppState>) -> AppResult<HttpResponse> {
    let config = state.get_config();

    Ok(HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "config": {
            "server": {
                "host": config.server.host,
                "port": config.server.port,
                "max_frame_bytes": config.server.max_frame_bytes
            },
            "llm": {
                "api_url": config.llm.api_url,
                "api_key": redact(&config.llm.api_key),
                "model": config.llm.model,
                "temperature": config.llm.temperature,
                "max_tokens": config.llm.max_tokens,
                "timeout_secs": config.llm.timeout_secs
            },
            "transcription": {
                "api_url": config.transcription.api_url,
                "api_key": redact(config.transcription_api_key()),
                "model": config.transcription.model,
                "language": config.transcription.language,
                "timeout_secs": config.transcription.timeout_secs
            },
            "audio": {
                "sample_rate": config.audio.sample_rate,
                "default_format": config.audio.default_format,
                "ffmpeg_path": config.ffmpeg_path(),
                "max_buffer_bytes": config.audio.max_buffer_bytes
            },
            "performance": {
                "max_concurrent_sessions": config.performance.max_concurrent_sessions,
                "max_upload_bytes": config.performance.max_upload_bytes
            }
        }
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::app_state;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_secrets_are_redacted() {
        let state = app_state(Ok("hi".to_string()), Ok("Score: 80".to_string()));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/api/v1/config", web::get().to(get_config)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/config").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["config"]["llm"]["api_key"], REDACTED);
        assert_eq!(body["config"]["transcription"]["api_key"], REDACTED);
        assert_eq!(body["config"]["audio"]["default_format"], "webm");
        assert!(!body.to_string().contains("test-key"));
    }
}
