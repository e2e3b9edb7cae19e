use actix_web::{web, HttpResponse};

use crate::error::AppResult;
use crate::models::NotificationReportFilter;
use crate::routes::email::validate_application;
use crate::services::ReportService;

/// POST /v1/report/notifications
/// Filtered, keyset-paginated delivery history query.
pub async fn query_notifications(
    service: web::Data<ReportService>,
    filter: web::Json<NotificationReportFilter>,
) -> AppResult<HttpResponse> {
    let page = service.query_notifications(&filter).await?;
    Ok(HttpResponse::Ok().json(page))
}

/// GET /v1/report/notificationMessage/{application}/{notification_id}
/// Resolves the stored notification's message body on demand.
pub async fn get_notification_message(
    service: web::Data<ReportService>,
    path: web::Path<(String, String)>,
) -> AppResult<HttpResponse> {
    let (application, notification_id) = path.into_inner();
    validate_application(&application)?;

    let body = service
        .get_notification_message(&application, &notification_id)
        .await?;
    Ok(HttpResponse::Ok().json(body))
}

/// Configure report routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/v1/report")
            .route("/notifications", web::post().to(query_notifications))
            .route(
                "/notificationMessage/{application}/{notification_id}",
                web::get().to(get_notification_message),
            ),
    );
}
