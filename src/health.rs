use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::process;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let config = state.get_config();
    let uptime_seconds = state.get_uptime_seconds();
    let active_sessions = state.sessions.active_session_count();

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "service": {
            "name": "interview-coach-backend",
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "metrics": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": ratio(metrics.error_count, metrics.request_count),
            "active_sessions": active_sessions,
            "sessions_by_stage": state.sessions.stage_counts()
        },
        "pipeline": {
            "runs": metrics.pipeline_runs,
            "fallback_reports": metrics.fallback_reports,
            "busy_rejections": metrics.busy_rejections
        },
        "collaborators": {
            "transcription": {
                "model": config.transcription.model,
                "language": config.transcription.language,
                "timeout_secs": config.transcription.timeout_secs
            },
            "llm": {
                "model": config.llm.model,
                "timeout_secs": config.llm.timeout_secs
            },
            "transcoder": {
                "ffmpeg_enabled": config.ffmpeg_path().is_some()
            }
        },
        "memory": get_memory_info(),
        "system": get_system_status(active_sessions, state.sessions.max_concurrent_sessions())
    }))
}

pub async fn detailed_metrics(state: web::Data<AppState>) -> HttpResponse {
    let metrics = state.get_metrics_snapshot();
    let uptime_seconds = state.get_uptime_seconds();

    let endpoint_stats: Vec<_> = metrics
        .endpoint_metrics
        .iter()
        .map(|(endpoint, metric)| {
            json!({
                "endpoint": endpoint,
                "request_count": metric.request_count,
                "error_count": metric.error_count,
                "error_rate": metric.error_rate(),
                "average_duration_ms": metric.average_duration_ms(),
                "total_duration_ms": metric.total_duration_ms
            })
        })
        .collect();

    HttpResponse::Ok().json(json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": uptime_seconds,
        "overall": {
            "total_requests": metrics.request_count,
            "total_errors": metrics.error_count,
            "error_rate": ratio(metrics.error_count, metrics.request_count),
            "active_sessions": state.sessions.active_session_count(),
            "requests_per_second": ratio(metrics.request_count, uptime_seconds)
        },
        "pipeline": {
            "runs": metrics.pipeline_runs,
            "fallback_reports": metrics.fallback_reports,
            "fallback_rate": ratio(metrics.fallback_reports, metrics.pipeline_runs),
            "busy_rejections": metrics.busy_rejections
        },
        "endpoints": endpoint_stats,
        "sessions": state.sessions.summaries(),
        "memory": get_memory_info(),
        "performance": {
            "max_concurrent_sessions": state.get_config().performance.max_concurrent_sessions,
            "max_upload_bytes": state.get_config().performance.max_upload_bytes
        }
    }))
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator > 0 {
        numerator as f64 / denominator as f64
    } else {
        0.0
    }
}

#[cfg(target_os = "linux")]
fn get_memory_info() -> serde_json::Value {
    let Ok(status) = std::fs::read_to_string(format!("/proc/{}/status", process::id())) else {
        return json!({ "available": false });
    };

    let read_kb = |prefix: &str| -> u64 {
        status
            .lines()
            .find(|line| line.starts_with(prefix))
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|kb| kb.parse::<u64>().ok())
            .unwrap_or(0)
            * 1024
    };

    json!({
        "resident_memory_bytes": read_kb("VmRSS:"),
        "virtual_memory_bytes": read_kb("VmSize:"),
        "available": true
    })
}

#[cfg(not(target_os = "linux"))]
fn get_memory_info() -> serde_json::Value {
    json!({
        "pid": process::id(),
        "available": false,
        "note": "Memory info not available on this platform"
    })
}

fn get_system_status(active_sessions: usize, max_sessions: usize) -> serde_json::Value {
    let session_usage = ratio(active_sessions as u64, max_sessions as u64);

    let status = if session_usage > 0.9 {
        "high_load"
    } else if session_usage > 0.7 {
        "moderate_load"
    } else {
        "normal"
    };

    json!({
        "status": status,
        "session_usage_percent": (session_usage * 100.0).round(),
        "max_sessions": max_sessions,
        "current_sessions": active_sessions,
        "load_warnings": if session_usage > 0.8 {
            vec!["High session usage - consider increasing max_concurrent_sessions"]
        } else {
            vec![]
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::app_state;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_health_reports_sessions_and_pipeline() {
        let state = app_state(Ok("hi".to_string()), Ok("Score: 90".to_string()));
        state.sessions.create_session().unwrap();
        state.record_pipeline_run(true);

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["status"], "healthy");
        assert_eq!(body["metrics"]["active_sessions"], 1);
        assert_eq!(body["metrics"]["sessions_by_stage"]["idle"], 1);
        assert_eq!(body["pipeline"]["fallback_reports"], 1);
    }

    #[actix_web::test]
    async fn test_detailed_metrics_lists_sessions() {
        let state = app_state(Ok("hi".to_string()), Ok("Score: 90".to_string()));
        let session = state.sessions.create_session().unwrap();
        session.append_chunk(&[0u8; 32]).unwrap();

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state))
                .route("/api/v1/metrics", web::get().to(detailed_metrics)),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/v1/metrics").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        let sessions = body["sessions"].as_array().expect("session list");
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0]["session_id"], session.session_id.as_str());
        assert_eq!(sessions[0]["stage"], "receiving");
        assert_eq!(sessions[0]["buffered_bytes"], 32);
        assert_eq!(sessions[0]["chunks_received"], 1);
    }

    #[actix_web::test]
    async fn test_system_status_thresholds() {
        assert_eq!(get_system_status(95, 100)["status"], "high_load");
        assert_eq!(get_system_status(75, 100)["status"], "moderate_load");
        assert_eq!(get_system_status(1, 100)["status"], "normal");
    }
}
