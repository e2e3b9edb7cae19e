//! iCalendar invite builder for SMTP meeting delivery.
//!
//! Graph creates calendar events natively; over SMTP the invite travels as a
//! `text/calendar` MIME part built here. Output follows RFC 5545 closely
//! enough for Outlook and Gmail to render an actionable invite.

use chrono::Utc;

use super::ResolvedRecipients;
use crate::error::{AppError, AppResult};
use crate::models::{NotificationEntity, RecurrencePattern};

const DT_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Renders one VCALENDAR document for the entity
pub(crate) fn build_invite(
    entity: &NotificationEntity,
    organizer: &str,
    recipients: &ResolvedRecipients,
) -> AppResult<String> {
    let starts_at = entity.starts_at.ok_or_else(|| {
        AppError::Validation(format!(
            "Meeting '{}' has no start time",
            entity.notification_id
        ))
    })?;
    let ends_at = entity.ends_at.ok_or_else(|| {
        AppError::Validation(format!(
            "Meeting '{}' has no end time",
            entity.notification_id
        ))
    })?;

    let method = if entity.is_cancel { "CANCEL" } else { "REQUEST" };
    let uid = entity
        .ical_uid
        .as_deref()
        .filter(|u| !u.is_empty())
        .unwrap_or(&entity.notification_id);

    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:-//mailrelay//EN".to_string(),
        format!("METHOD:{}", method),
        "BEGIN:VEVENT".to_string(),
        format!("UID:{}", uid),
        format!("SEQUENCE:{}", entity.sequence_number),
        format!("DTSTAMP:{}", Utc::now().format(DT_FORMAT)),
        format!("DTSTART:{}", starts_at.format(DT_FORMAT)),
        format!("DTEND:{}", ends_at.format(DT_FORMAT)),
        format!("SUMMARY:{}", escape_text(&entity.subject)),
        format!("ORGANIZER:mailto:{}", organizer),
    ];

    for attendee in &recipients.to {
        lines.push(format!(
            "ATTENDEE;ROLE=REQ-PARTICIPANT;RSVP=TRUE:mailto:{}",
            attendee
        ));
    }
    for attendee in &recipients.cc {
        lines.push(format!(
            "ATTENDEE;ROLE=OPT-PARTICIPANT;RSVP=TRUE:mailto:{}",
            attendee
        ));
    }

    if let Some(rrule) = build_rrule(entity) {
        lines.push(rrule);
    }

    if entity.is_cancel {
        lines.push("STATUS:CANCELLED".to_string());
    }

    lines.push("END:VEVENT".to_string());
    lines.push("END:VCALENDAR".to_string());

    Ok(lines.join("\r\n"))
}

fn build_rrule(entity: &NotificationEntity) -> Option<String> {
    let recurrence = entity.recurrence_rule()?;

    let freq = match recurrence.pattern {
        RecurrencePattern::Daily => "DAILY",
        RecurrencePattern::Weekly => "WEEKLY",
        RecurrencePattern::Monthly => "MONTHLY",
    };

    let mut rule = format!("RRULE:FREQ={}", freq);
    if recurrence.interval > 1 {
        rule.push_str(&format!(";INTERVAL={}", recurrence.interval));
    }
    if !recurrence.days_of_week.is_empty() {
        let days: Vec<String> = recurrence
            .days_of_week
            .iter()
            .map(|d| byday_code(d))
            .collect();
        rule.push_str(&format!(";BYDAY={}", days.join(",")));
    }
    if let Some(occurrences) = recurrence.occurrences {
        rule.push_str(&format!(";COUNT={}", occurrences));
    } else if let Some(until) = recurrence.until {
        rule.push_str(&format!(";UNTIL={}", until.format(DT_FORMAT)));
    }

    Some(rule)
}

/// Two-letter BYDAY code, tolerant of full day names and casing
fn byday_code(day: &str) -> String {
    let lower = day.to_lowercase();
    match lower.as_str() {
        "monday" | "mo" => "MO",
        "tuesday" | "tu" => "TU",
        "wednesday" | "we" => "WE",
        "thursday" | "th" => "TH",
        "friday" | "fr" => "FR",
        "saturday" | "sa" => "SA",
        "sunday" | "su" => "SU",
        _ => return day.to_uppercase().chars().take(2).collect(),
    }
    .to_string()
}

/// RFC 5545 TEXT escaping
fn escape_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NotificationKind, NotificationStatus};
    use chrono::TimeZone;
    use uuid::Uuid;

    fn meeting() -> NotificationEntity {
        let now = Utc::now();
        NotificationEntity {
            id: Uuid::new_v4(),
            notification_id: "n-1".to_string(),
            application: "crm".to_string(),
            kind: NotificationKind::Meeting,
            to_addresses: vec!["a@example.com".to_string()],
            cc_addresses: vec!["b@example.com".to_string()],
            bcc_addresses: Vec::new(),
            reply_to_addresses: Vec::new(),
            from_address: None,
            subject: "Planning; part 1".to_string(),
            body: Some("agenda".to_string()),
            template_id: None,
            template_data: None,
            status: NotificationStatus::Processing,
            error_message: None,
            try_count: 1,
            account_used: None,
            tracking_id: None,
            attachments: serde_json::Value::Array(Vec::new()),
            send_on_utc: None,
            starts_at: Some(Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap()),
            ends_at: Some(Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()),
            recurrence: None,
            is_cancel: false,
            is_online_meeting: false,
            sequence_number: 3,
            ical_uid: Some("uid-42".to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    fn recipients(entity: &NotificationEntity) -> ResolvedRecipients {
        ResolvedRecipients {
            to: entity.to_addresses.clone(),
            cc: entity.cc_addresses.clone(),
            bcc: Vec::new(),
            reply_to: Vec::new(),
        }
    }

    #[test]
    fn test_request_invite_structure() {
        let entity = meeting();
        let ics = build_invite(&entity, "org@example.com", &recipients(&entity)).unwrap();

        assert!(ics.starts_with("BEGIN:VCALENDAR"));
        assert!(ics.contains("METHOD:REQUEST"));
        assert!(ics.contains("UID:uid-42"));
        assert!(ics.contains("SEQUENCE:3"));
        assert!(ics.contains("DTSTART:20260302T090000Z"));
        assert!(ics.contains("DTEND:20260302T100000Z"));
        assert!(ics.contains("SUMMARY:Planning\\; part 1"));
        assert!(ics.contains("ORGANIZER:mailto:org@example.com"));
        assert!(ics.contains("ATTENDEE;ROLE=REQ-PARTICIPANT;RSVP=TRUE:mailto:a@example.com"));
        assert!(ics.contains("ATTENDEE;ROLE=OPT-PARTICIPANT;RSVP=TRUE:mailto:b@example.com"));
        assert!(!ics.contains("STATUS:CANCELLED"));
        assert!(ics.ends_with("END:VCALENDAR"));
    }

    #[test]
    fn test_cancel_invite_sets_method_and_status() {
        let mut entity = meeting();
        entity.is_cancel = true;
        let ics = build_invite(&entity, "org@example.com", &recipients(&entity)).unwrap();

        assert!(ics.contains("METHOD:CANCEL"));
        assert!(ics.contains("STATUS:CANCELLED"));
    }

    #[test]
    fn test_uid_falls_back_to_notification_id() {
        let mut entity = meeting();
        entity.ical_uid = None;
        let ics = build_invite(&entity, "org@example.com", &recipients(&entity)).unwrap();

        assert!(ics.contains("UID:n-1"));
    }

    #[test]
    fn test_missing_start_is_validation_error() {
        let mut entity = meeting();
        entity.starts_at = None;
        let result = build_invite(&entity, "org@example.com", &recipients(&entity));
        assert!(result.is_err());
    }

    #[test]
    fn test_weekly_rrule() {
        let mut entity = meeting();
        entity.recurrence = Some(serde_json::json!({
            "pattern": "weekly",
            "interval": 2,
            "days_of_week": ["monday", "wednesday"],
            "occurrences": 10
        }));

        let ics = build_invite(&entity, "org@example.com", &recipients(&entity)).unwrap();
        assert!(ics.contains("RRULE:FREQ=WEEKLY;INTERVAL=2;BYDAY=MO,WE;COUNT=10"));
    }

    #[test]
    fn test_until_rrule_when_no_count() {
        let mut entity = meeting();
        entity.recurrence = Some(serde_json::json!({
            "pattern": "daily",
            "until": "2026-06-30T00:00:00Z"
        }));

        let ics = build_invite(&entity, "org@example.com", &recipients(&entity)).unwrap();
        assert!(ics.contains("RRULE:FREQ=DAILY;UNTIL=20260630T000000Z"));
    }
}
