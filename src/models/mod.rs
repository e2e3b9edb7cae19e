pub mod notification;
pub mod report;
pub mod settings;
pub mod template;

pub use notification::{
    Attachment, EmailNotificationItem, MeetingNotificationItem, MeetingRecurrence,
    NotificationEntity, NotificationKind, NotificationReceipt, NotificationStatus, QueueEnvelope,
    QueueNotificationItem, RecurrencePattern,
};
pub use report::{NotificationReportFilter, NotificationReportPage};
pub use settings::{
    AccountCredential, ApplicationAccounts, DirectSendSetting, GraphSetting, MailSettings,
    ProviderType, RetrySetting, SmtpSetting,
};
pub use template::{MailTemplate, MessageBody, TemplateType};
