//! Liveness and readiness probes. Readiness reports each dependency the
//! dispatch pipeline needs: the notification store and the queue transport.

use actix_web::{http::StatusCode, web, HttpResponse};
use serde::Serialize;

use crate::db::{self, DbPool};
use crate::queue::QueueGateway;

#[derive(Serialize)]
pub struct LivenessResponse {
    status: &'static str,
}

#[derive(Serialize)]
pub struct ReadinessResponse {
    status: &'static str,
    checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    database: &'static str,
    queue: &'static str,
}

/// Process liveness; 200 as long as the server accepts requests
pub async fn liveness() -> HttpResponse {
    HttpResponse::Ok().json(LivenessResponse { status: "ok" })
}

/// Dependency readiness; 503 until both the notification store and the
/// queue transport respond
pub async fn readiness(
    pool: web::Data<DbPool>,
    queue: web::Data<dyn QueueGateway>,
) -> HttpResponse {
    let db_ok = db::ping(pool.get_ref()).await;
    let queue_ok = queue.healthy().await;
    let ready = db_ok && queue_ok;

    let response = ReadinessResponse {
        status: if ready { "ready" } else { "not_ready" },
        checks: ReadinessChecks {
            database: if db_ok { "ok" } else { "error" },
            queue: if queue_ok { "ok" } else { "error" },
        },
    };

    let http_status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    HttpResponse::build(http_status).json(response)
}
