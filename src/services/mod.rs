pub mod accounts;
pub mod body;
pub mod chunk;
pub mod dispatch;
pub mod factory;
pub mod protect;
pub mod provider;
pub mod report;

pub use accounts::AccountSelector;
pub use body::{MergeEngine, MessageBodyResolver, TokenMergeEngine};
pub use chunk::split_list;
pub use dispatch::DispatchOrchestrator;
pub use factory::NotificationFactory;
pub use protect::{ContentProtector, NoopProtector};
pub use provider::{create_provider, DeliveryOutcome, NotificationProvider};
pub use report::ReportService;
