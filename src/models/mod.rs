mod key;
mod pin;
mod upload;
mod user;

use chrono::{DateTime, SecondsFormat, Utc};

pub use key::{AuthKey, CreateKeyRequest, CreatedKey};
pub use pin::{Pin, PinStatus, UnknownPinStatus};
pub use upload::{CreateUploadRequest, RenameUploadRequest, Upload};
pub use user::{Account, User};

/// Current time in the canonical storage format.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Render a timestamp as RFC 3339 UTC with millisecond precision.
///
/// Every stored `created`/`updated` value uses this fixed-width form so that
/// string comparison in SQL agrees with chronological order.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Normalize any RFC 3339 timestamp into the canonical storage format.
pub fn canonical_timestamp(raw: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|at| format_timestamp(at.with_timezone(&Utc)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_form_is_fixed_width_utc() {
        assert_eq!(
            canonical_timestamp("2024-03-01T10:00:00+02:00").as_deref(),
            Some("2024-03-01T08:00:00.000Z")
        );
        assert_eq!(
            canonical_timestamp("2024-03-01T08:00:00.123456Z").as_deref(),
            Some("2024-03-01T08:00:00.123Z")
        );
        assert_eq!(canonical_timestamp("yesterday"), None);
        assert_eq!(now_timestamp().len(), "2024-03-01T08:00:00.000Z".len());
    }
}
