//! Service graph assembly.
//!
//! Wires the repository, queue gateway, body resolver, provider, and
//! orchestrator together once at startup. The settings snapshot is loaded
//! here and never reloaded; changing delivery settings requires a restart.

use std::path::Path;
use std::sync::Arc;

use crate::config::{AppSettings, Config};
use crate::error::AppError;
use crate::db::DbPool;
use crate::error::AppResult;
use crate::queue::{FileQueueGateway, QueueGateway};
use crate::repository::{PgNotificationRepository, PgTemplateStore};
use crate::services::{
    create_provider, AccountSelector, DispatchOrchestrator, MessageBodyResolver,
    NoopProtector, NotificationFactory, ReportService, TokenMergeEngine,
};

/// Shared handles for the HTTP layer and the queue worker
pub struct ServiceContext {
    pub orchestrator: Arc<DispatchOrchestrator>,
    pub report: Arc<ReportService>,
    pub queue: Arc<dyn QueueGateway>,
}

/// Builds the full dispatch pipeline from configuration
pub fn build_services(config: &Config, pool: DbPool) -> AppResult<ServiceContext> {
    let settings = Arc::new(
        AppSettings::from_file(Path::new(&config.settings_path))
            .map_err(|e| AppError::Configuration(e.to_string()))?,
    );
    log::info!(
        "Loaded delivery settings: provider={}, {} application(s)",
        settings.provider,
        settings.mail_settings.len()
    );

    let repository = Arc::new(PgNotificationRepository::new(pool.clone()));
    let templates = Arc::new(PgTemplateStore::new(pool));
    let queue: Arc<dyn QueueGateway> = Arc::new(FileQueueGateway::new(config.queue_dir.clone()));

    let protector = Arc::new(NoopProtector);
    let resolver = Arc::new(MessageBodyResolver::new(
        templates,
        Arc::new(TokenMergeEngine),
        protector.clone(),
    ));

    let selector = Arc::new(AccountSelector::new());
    let provider = create_provider(settings.clone(), selector, resolver.clone())?;

    let factory = Arc::new(NotificationFactory::new(protector));

    let orchestrator = Arc::new(DispatchOrchestrator::new(
        repository.clone(),
        queue.clone(),
        provider,
        settings,
        factory,
    ));

    let report = Arc::new(ReportService::new(repository, resolver));

    Ok(ServiceContext {
        orchestrator,
        report,
        queue,
    })
}
