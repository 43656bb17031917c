use time::format_description::well_known::Rfc3339;
use time::format_description::{self, BorrowedFormatItem};
use time::{OffsetDateTime, PrimitiveDateTime, UtcOffset};

use crate::error::AppError;

/// Storage form: fixed-width RFC3339 UTC with milliseconds, so string order is time order.
const CANONICAL_FORMAT: &str =
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z";

const DISPLAY_FORMAT: &str = "[year]-[month]-[day] [hour]:[minute]:[second]";

/// Zone-less forms accepted from callers; interpreted as UTC.
const ZONELESS_ALLOWLIST: [&str; 4] = [
    "[year]-[month]-[day] [hour]:[minute]:[second]",
    "[year]-[month]-[day] [hour]:[minute]",
    "[year]-[month]-[day]T[hour]:[minute]:[second]",
    "[year]-[month]-[day]T[hour]:[minute]",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedTimestamp {
    pub canonical: String,
    /// True when the input carried no zone and UTC was assumed.
    pub assumed_utc: bool,
}

fn format_items(fmt: &'static str) -> Result<Vec<BorrowedFormatItem<'static>>, AppError> {
    format_description::parse(fmt).map_err(|e| {
        AppError::new("TS_FORMAT_CONFIG_FAILED", "Timestamp format config error")
            .with_details(format!("fmt={fmt}; err={e}"))
    })
}

fn canonicalize(dt: OffsetDateTime) -> Result<String, AppError> {
    let items = format_items(CANONICAL_FORMAT)?;
    dt.to_offset(UtcOffset::UTC)
        .format(&items)
        .map_err(AppError::wrap("TS_FORMAT_FAILED", "Failed to format timestamp"))
}

fn parse_any(raw: &str) -> Result<Option<(OffsetDateTime, bool)>, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if let Ok(dt) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Ok(Some((dt, false)));
    }
    // Subsecond-tolerant zone-less ISO (e.g. `2026-01-01T10:00:00.250`).
    let (head, frac) = match trimmed.split_once('.') {
        Some((h, f)) if !f.is_empty() && f.len() <= 9 && f.bytes().all(|b| b.is_ascii_digit()) => {
            (h, Some(f))
        }
        _ => (trimmed, None),
    };
    for fmt in ZONELESS_ALLOWLIST {
        let items = format_items(fmt)?;
        if let Ok(pdt) = PrimitiveDateTime::parse(head, &items) {
            let mut dt = pdt.assume_utc();
            if let Some(f) = frac {
                let nanos: u32 = format!("{f:0<9}").parse().unwrap_or(0);
                dt = dt.replace_nanosecond(nanos).unwrap_or(dt);
            }
            return Ok(Some((dt, true)));
        }
    }
    Ok(None)
}

/// Normalize a caller-provided timestamp into canonical UTC.
///
/// Returns `Ok(None)` for blank or unrecognised input; callers decide whether that is a
/// rejection. RFC3339 is preferred; the zone-less allowlist is a fallback and is flagged.
pub fn normalize_timestamp(raw: &str) -> Result<Option<NormalizedTimestamp>, AppError> {
    match parse_any(raw)? {
        Some((dt, assumed_utc)) => Ok(Some(NormalizedTimestamp {
            canonical: canonicalize(dt)?,
            assumed_utc,
        })),
        None => Ok(None),
    }
}

/// `YYYY-MM-DD HH:MM:SS` (UTC) rendering of a stored timestamp, for notification bodies.
pub fn display_timestamp(canonical: &str) -> Result<String, AppError> {
    let dt = OffsetDateTime::parse(canonical, &Rfc3339).map_err(|e| {
        AppError::new("TS_PARSE_FAILED", "Failed to parse stored timestamp")
            .with_details(format!("value={canonical}; err={e}"))
    })?;
    let items = format_items(DISPLAY_FORMAT)?;
    dt.to_offset(UtcOffset::UTC)
        .format(&items)
        .map_err(AppError::wrap("TS_FORMAT_FAILED", "Failed to format timestamp"))
}

pub fn now_canonical() -> Result<String, AppError> {
    canonicalize(OffsetDateTime::now_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_inputs_are_converted_to_utc() {
        let n = normalize_timestamp("2026-01-15T12:30:00+02:00").unwrap().unwrap();
        assert_eq!(n.canonical, "2026-01-15T10:30:00.000Z");
        assert!(!n.assumed_utc);
    }

    #[test]
    fn zoneless_inputs_assume_utc() {
        let n = normalize_timestamp("2026-01-15 10:30:00").unwrap().unwrap();
        assert_eq!(n.canonical, "2026-01-15T10:30:00.000Z");
        assert!(n.assumed_utc);

        let n = normalize_timestamp("2026-01-15T10:30:00.25").unwrap().unwrap();
        assert_eq!(n.canonical, "2026-01-15T10:30:00.250Z");
    }

    #[test]
    fn garbage_and_blank_are_none() {
        assert_eq!(normalize_timestamp("").unwrap(), None);
        assert_eq!(normalize_timestamp("   ").unwrap(), None);
        assert_eq!(normalize_timestamp("Jan 15, 2026").unwrap(), None);
        assert_eq!(normalize_timestamp("2026-01-15T25:00:00Z").unwrap(), None);
    }

    #[test]
    fn display_drops_subseconds() {
        assert_eq!(
            display_timestamp("2026-01-15T10:30:00.250Z").unwrap(),
            "2026-01-15 10:30:00"
        );
    }

    #[test]
    fn canonical_form_sorts_chronologically() {
        let a = normalize_timestamp("2026-01-15T10:30:00Z").unwrap().unwrap();
        let b = normalize_timestamp("2026-01-15T10:30:00.5Z").unwrap().unwrap();
        assert!(a.canonical < b.canonical);
    }
}
