//! Domino datetime normalization: `YYYYMMDDTHHMMSS,ffffff[±HHMM]` -> ISO-8601.

use chrono::{FixedOffset, NaiveDateTime, TimeZone};

/// Parses a native Domino timestamp and returns its ISO-8601 form, or the
/// input unchanged if it can't be parsed. Never fails.
#[must_use]
pub fn parse_dxl_datetime(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    let (base, sign, tz_str) = split_timezone(raw);

    let Some((date_part, time_part)) = base.split_once('T') else {
        if base.len() == 8 && base.chars().all(|c| c.is_ascii_digit()) {
            return format!("{}-{}-{}", &base[0..4], &base[4..6], &base[6..8]);
        }
        log::warn!("invalid DXL datetime format (missing T): '{raw}'");
        return raw.to_string();
    };

    let (sec_part, micro) = match time_part.split_once(',') {
        Some((sec, frac)) => (sec, normalize_micros(frac)),
        None => (time_part, "000000".to_string()),
    };

    if date_part.len() != 8 || sec_part.len() != 6 {
        log::warn!("invalid DXL date/time format (length mismatch): '{raw}'");
        return raw.to_string();
    }

    let Ok(naive) = NaiveDateTime::parse_from_str(&format!("{date_part}{sec_part}"), "%Y%m%d%H%M%S")
    else {
        log::warn!("failed to parse DXL datetime '{raw}'");
        return raw.to_string();
    };
    let micros: u32 = micro.parse().unwrap_or(0);
    let naive = naive.with_nanosecond_from_micros(micros);

    let tz_str = normalize_tz_len(&tz_str);
    let Some(offset) = build_offset(sign, &tz_str) else {
        log::warn!("invalid DXL timezone offset '{sign}{tz_str}' derived from '{raw}'. Defaulting to +0000.");
        return naive
            .and_local_timezone(FixedOffset::east_opt(0).unwrap())
            .single()
            .map_or_else(|| raw.to_string(), |dt| dt.to_rfc3339());
    };

    naive
        .and_local_timezone(offset)
        .single()
        .map_or_else(|| raw.to_string(), |dt| dt.to_rfc3339())
}

/// Finds a trailing `[+-]HHMM` or `[+-]HH` timezone suffix. Returns the base
/// string (date/time portion), the sign, and the digits (un-padded).
fn split_timezone(raw: &str) -> (&str, char, String) {
    let last_plus = raw.rfind('+');
    let last_minus = raw.rfind('-');
    let idx = match (last_plus, last_minus) {
        (Some(p), Some(m)) => Some(p.max(m)),
        (Some(p), None) => Some(p),
        (None, Some(m)) => Some(m),
        (None, None) => None,
    };

    if let Some(idx) = idx {
        if idx > 0 {
            let candidate = &raw[idx + 1..];
            if !candidate.is_empty()
                && candidate.chars().all(|c| c.is_ascii_digit())
                && (candidate.len() == 2 || candidate.len() == 4)
            {
                let sign = raw.as_bytes()[idx] as char;
                return (&raw[..idx], sign, candidate.to_string());
            }
        }
    }
    (raw, '+', "0000".to_string())
}

fn normalize_micros(frac: &str) -> String {
    let mut s = frac.to_string();
    while s.len() < 6 {
        s.push('0');
    }
    s.truncate(6);
    s
}

fn normalize_tz_len(tz: &str) -> String {
    if tz.len() == 2 {
        format!("{tz}00")
    } else {
        tz.to_string()
    }
}

fn build_offset(sign: char, tz4: &str) -> Option<FixedOffset> {
    if tz4.len() != 4 {
        return None;
    }
    let hours: i32 = tz4[0..2].parse().ok()?;
    let mins: i32 = tz4[2..4].parse().ok()?;
    let total_secs = (hours * 3600 + mins * 60) * if sign == '-' { -1 } else { 1 };
    if total_secs.unsigned_abs() > 23 * 3600 + 59 * 60 {
        return None;
    }
    FixedOffset::east_opt(total_secs)
}

trait WithNanosFromMicros {
    fn with_nanosecond_from_micros(self, micros: u32) -> Self;
}

impl WithNanosFromMicros for NaiveDateTime {
    fn with_nanosecond_from_micros(self, micros: u32) -> Self {
        use chrono::Timelike;
        self.with_nanosecond(micros * 1000).unwrap_or(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_date() {
        assert_eq!(parse_dxl_datetime("20240115"), "2024-01-15");
    }

    #[test]
    fn parses_datetime_without_timezone() {
        let result = parse_dxl_datetime("20240115T133000");
        assert!(result.starts_with("2024-01-15T13:30:00"));
    }

    #[test]
    fn parses_datetime_with_fraction_and_timezone() {
        let result = parse_dxl_datetime("20240115T133000,500000+0900");
        assert!(result.starts_with("2024-01-15T13:30:00.5"));
        assert!(result.ends_with("+09:00"));
    }

    #[test]
    fn pads_two_digit_timezone() {
        let result = parse_dxl_datetime("20240115T133000+09");
        assert!(result.ends_with("+09:00"));
    }

    #[test]
    fn out_of_range_offset_defaults_to_utc() {
        let result = parse_dxl_datetime("20240115T133000+9900");
        assert!(result.ends_with("+00:00") || result == "20240115T133000+9900");
    }

    #[test]
    fn malformed_input_returned_verbatim() {
        assert_eq!(parse_dxl_datetime("not-a-date"), "not-a-date");
    }

    #[test]
    fn empty_input_returns_empty() {
        assert_eq!(parse_dxl_datetime(""), "");
    }

    #[test]
    fn malformed_length_returned_verbatim() {
        assert_eq!(parse_dxl_datetime("2024011T1330"), "2024011T1330");
    }
}
