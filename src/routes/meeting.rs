use actix_web::{web, HttpResponse};

use crate::error::AppResult;
use crate::models::MeetingNotificationItem;
use crate::routes::email::validate_application;
use crate::services::DispatchOrchestrator;

/// POST /v1/meetinginvite/queue/{application}
pub async fn queue_meeting(
    orchestrator: web::Data<DispatchOrchestrator>,
    path: web::Path<String>,
    items: web::Json<Vec<MeetingNotificationItem>>,
) -> AppResult<HttpResponse> {
    let application = path.into_inner();
    validate_application(&application)?;

    let receipts = orchestrator.enqueue_meeting(&application, &items).await?;
    Ok(HttpResponse::Accepted().json(receipts))
}

/// POST /v1/meetinginvite/send/{application}
pub async fn send_meeting(
    orchestrator: web::Data<DispatchOrchestrator>,
    path: web::Path<String>,
    items: web::Json<Vec<MeetingNotificationItem>>,
) -> AppResult<HttpResponse> {
    let application = path.into_inner();
    validate_application(&application)?;

    let receipts = orchestrator.send_meeting(&application, &items).await?;
    Ok(HttpResponse::Ok().json(receipts))
}

/// Configure meeting-invite routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/v1/meetinginvite")
            .route("/queue/{application}", web::post().to(queue_meeting))
            .route("/send/{application}", web::post().to(send_meeting)),
    );
}
