use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::DecodeError;

/**
    An absolute instant, used for certificate validity, CRL windows, and
    license rights `start`/`end`. A type alias (not a newtype) so it composes
    directly with `x509-parser`'s own `ASN1Time -> OffsetDateTime` conversion
    and with `time`'s RFC 3339 parsing for license JSON dates.
*/
pub type Instant = OffsetDateTime;

pub fn parse_rfc3339(s: &str) -> Result<Instant, DecodeError> {
    OffsetDateTime::parse(s, &Rfc3339).map_err(|e| DecodeError {
        kind: "RFC 3339 date",
        reason: e.to_string(),
    })
}

pub fn format_rfc3339(instant: Instant) -> Result<String, DecodeError> {
    instant.format(&Rfc3339).map_err(|e| DecodeError {
        kind: "RFC 3339 date",
        reason: e.to_string(),
    })
}

/**
    A source of "now", injected everywhere the spec calls for evaluating
    against "the host clock" (rights windows, cert validity, CRL freshness)
    so tests can simulate arbitrary instants without sleeping.
*/
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/**
    [`Clock`] backed by the real system clock.
*/
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        OffsetDateTime::now_utc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_rfc3339() {
        let s = "2021-06-10T12:00:00Z";
        let parsed = parse_rfc3339(s).unwrap();
        assert_eq!(parsed.year(), 2021);
        let formatted = format_rfc3339(parsed).unwrap();
        assert_eq!(formatted, "2021-06-10T12:00:00Z");
    }

    #[test]
    fn rejects_malformed_date() {
        assert!(parse_rfc3339("not a date").is_err());
    }
}
