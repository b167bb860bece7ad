//! Time related utils.

use crate::Error;
use crate::Result;
use chrono::SecondsFormat;
use chrono::Utc;

/// DateTime is the alias of `chrono::DateTime<Utc>`.
pub type DateTime = chrono::DateTime<Utc>;

/// Return the current UTC time.
pub fn now() -> DateTime {
    Utc::now()
}

/// Format time into HTTP date: `Fri, 21 Nov 1997 09:55:06 GMT`
///
/// ## Note
///
/// HTTP date is slightly different from RFC 2822: timezone is fixed to GMT.
pub fn format_http_date(t: DateTime) -> String {
    t.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Format time into RFC 3339 without fraction: `2022-03-01T08:12:34Z`
///
/// This is the format shared-access-signature timestamps use on the wire.
pub fn format_rfc3339(t: DateTime) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Parse an RFC 2822 date like the `Last-Modified` response header.
pub fn parse_rfc2822(s: &str) -> Result<DateTime> {
    chrono::DateTime::parse_from_rfc2822(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::unexpected(format!("parse '{s}' as rfc2822 failed")).with_source(e))
}

/// Parse an RFC 3339 date like SAS expiry timestamps.
pub fn parse_rfc3339(s: &str) -> Result<DateTime> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::unexpected(format!("parse '{s}' as rfc3339 failed")).with_source(e))
}
