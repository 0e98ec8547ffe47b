//! Boundary validation of inbound requests.
//!
//! Validation runs before any state change; a malformed batch rejects the
//! whole request, never a partial apply.

use crate::{
    error::{Error, Result},
    message::{PullRequest, PushBatch, MAX_BATCH_EVENTS},
};

/// Validate an inbound push batch.
pub fn validate_batch(batch: &PushBatch) -> Result<()> {
    if batch.device_id.is_empty() {
        return Err(Error::Validation("deviceId must not be empty".into()));
    }
    if batch.batch_id.is_empty() {
        return Err(Error::Validation("batchId must not be empty".into()));
    }
    if batch.events.len() > MAX_BATCH_EVENTS {
        return Err(Error::Validation(format!(
            "batch carries {} events, limit is {MAX_BATCH_EVENTS}",
            batch.events.len()
        )));
    }

    for event in &batch.events {
        if event.event_id.is_empty() {
            return Err(Error::Validation("eventId must not be empty".into()));
        }
        if event.entity_type.is_empty() || event.entity_id.is_empty() {
            return Err(Error::Validation(format!(
                "event {}: entityType and entityId must not be empty",
                event.event_id
            )));
        }
        if let Some(ts) = &event.occurred_at {
            if !is_rfc3339_utc(ts) {
                return Err(Error::Validation(format!(
                    "event {}: occurredAt is not an RFC 3339 UTC timestamp",
                    event.event_id
                )));
            }
        }
    }

    Ok(())
}

/// Validate an inbound pull request.
pub fn validate_pull(request: &PullRequest) -> Result<()> {
    if request.device_id.is_empty() {
        return Err(Error::Validation("deviceId must not be empty".into()));
    }
    Ok(())
}

/// Structural check for `YYYY-MM-DDTHH:MM:SS[.fff]Z`.
///
/// Timestamps must be UTC with a `Z` suffix so that string comparison
/// agrees with chronological order.
pub fn is_rfc3339_utc(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.len() < 20 || bytes[bytes.len() - 1] != b'Z' {
        return false;
    }

    let digits = |range: std::ops::Range<usize>| bytes[range].iter().all(u8::is_ascii_digit);
    let shape = digits(0..4)
        && bytes[4] == b'-'
        && digits(5..7)
        && bytes[7] == b'-'
        && digits(8..10)
        && bytes[10] == b'T'
        && digits(11..13)
        && bytes[13] == b':'
        && digits(14..16)
        && bytes[16] == b':'
        && digits(17..19);
    if !shape {
        return false;
    }

    // Optional fractional seconds between the seconds field and the Z
    let tail = &bytes[19..bytes.len() - 1];
    if !tail.is_empty() && (tail[0] != b'.' || tail.len() < 2 || !tail[1..].iter().all(u8::is_ascii_digit)) {
        return false;
    }

    let field = |range: std::ops::Range<usize>| -> u32 {
        s[range].parse().unwrap_or(0)
    };
    (1..=12).contains(&field(5..7))
        && (1..=31).contains(&field(8..10))
        && field(11..13) < 24
        && field(14..16) < 60
        && field(17..19) < 61
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SyncEvent;
    use serde_json::json;

    fn batch_with(events: Vec<SyncEvent>) -> PushBatch {
        PushBatch {
            device_id: "device-1".into(),
            batch_id: "device-1:1".into(),
            events,
        }
    }

    #[test]
    fn accepts_well_formed_batch() {
        let batch = batch_with(vec![SyncEvent::upsert(
            "evt-1",
            "notes",
            "note-1",
            json!({"title": "hello"}),
            "2024-03-01T10:00:00Z",
        )]);
        assert!(validate_batch(&batch).is_ok());
    }

    #[test]
    fn rejects_empty_identifiers() {
        let mut batch = batch_with(vec![]);
        batch.device_id.clear();
        assert!(matches!(validate_batch(&batch), Err(Error::Validation(_))));

        let mut batch = batch_with(vec![]);
        batch.batch_id.clear();
        assert!(matches!(validate_batch(&batch), Err(Error::Validation(_))));

        let batch = batch_with(vec![SyncEvent::upsert(
            "",
            "notes",
            "note-1",
            json!({}),
            "2024-03-01T10:00:00Z",
        )]);
        assert!(matches!(validate_batch(&batch), Err(Error::Validation(_))));
    }

    #[test]
    fn rejects_oversized_batch() {
        let events = (0..MAX_BATCH_EVENTS + 1)
            .map(|i| {
                SyncEvent::upsert(
                    format!("evt-{i}"),
                    "notes",
                    format!("note-{i}"),
                    json!({}),
                    "2024-03-01T10:00:00Z",
                )
            })
            .collect();
        assert!(matches!(
            validate_batch(&batch_with(events)),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn rejects_bad_timestamps() {
        let batch = batch_with(vec![SyncEvent::upsert(
            "evt-1",
            "notes",
            "note-1",
            json!({}),
            "March 1st, 2024",
        )]);
        assert!(matches!(validate_batch(&batch), Err(Error::Validation(_))));
    }

    #[test]
    fn missing_timestamp_is_allowed() {
        let mut event = SyncEvent::upsert(
            "evt-1",
            "notes",
            "note-1",
            json!({}),
            "2024-03-01T10:00:00Z",
        );
        event.occurred_at = None;
        assert!(validate_batch(&batch_with(vec![event])).is_ok());
    }

    #[test]
    fn pull_requires_device_id() {
        let mut request = PullRequest::for_device("device-1");
        assert!(validate_pull(&request).is_ok());

        request.device_id.clear();
        assert!(matches!(validate_pull(&request), Err(Error::Validation(_))));
    }

    #[test]
    fn timestamp_shapes() {
        assert!(is_rfc3339_utc("2024-03-01T10:00:00Z"));
        assert!(is_rfc3339_utc("2024-03-01T10:00:00.250Z"));

        assert!(!is_rfc3339_utc("2024-03-01T10:00:00"));
        assert!(!is_rfc3339_utc("2024-03-01T10:00:00+02:00"));
        assert!(!is_rfc3339_utc("2024-13-01T10:00:00Z"));
        assert!(!is_rfc3339_utc("2024-03-01T25:00:00Z"));
        assert!(!is_rfc3339_utc("2024-03-01T10:00:00.Z"));
        assert!(!is_rfc3339_utc("not a timestamp"));
    }
}
