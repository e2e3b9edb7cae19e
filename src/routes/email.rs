use actix_web::{web, HttpResponse};

use crate::error::{AppError, AppResult};
use crate::models::EmailNotificationItem;
use crate::services::DispatchOrchestrator;

/// POST /v1/email/queue/{application}
/// Persists the items and queues them for asynchronous delivery.
pub async fn queue_email(
    orchestrator: web::Data<DispatchOrchestrator>,
    path: web::Path<String>,
    items: web::Json<Vec<EmailNotificationItem>>,
) -> AppResult<HttpResponse> {
    let application = path.into_inner();
    validate_application(&application)?;

    let receipts = orchestrator.enqueue_email(&application, &items).await?;
    Ok(HttpResponse::Accepted().json(receipts))
}

/// POST /v1/email/send/{application}
/// Persists the items and dispatches them within the request; the response
/// carries terminal statuses.
pub async fn send_email(
    orchestrator: web::Data<DispatchOrchestrator>,
    path: web::Path<String>,
    items: web::Json<Vec<EmailNotificationItem>>,
) -> AppResult<HttpResponse> {
    let application = path.into_inner();
    validate_application(&application)?;

    let receipts = orchestrator.send_email(&application, &items).await?;
    Ok(HttpResponse::Ok().json(receipts))
}

pub(crate) fn validate_application(application: &str) -> AppResult<()> {
    if application.trim().is_empty() {
        return Err(AppError::Validation(
            "Application name must not be blank".to_string(),
        ));
    }
    Ok(())
}

/// Configure email routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/v1/email")
            .route("/queue/{application}", web::post().to(queue_email))
            .route("/send/{application}", web::post().to(send_email)),
    );
}
