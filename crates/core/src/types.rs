//! Shared primitive aliases: timestamps and durations. Both are milliseconds
//! since the Unix epoch, UTC, represented as `i64` (matching the on-disk
//! varint encoding).

/// Milliseconds since the Unix epoch, UTC.
pub type Timestamp = i64;

/// A duration in milliseconds.
pub type DurationMs = i64;

/// Align `ts` down to the nearest multiple of `interval_ms`.
///
/// Bucket start times are always aligned this way: a bucket's `startTime`
/// is a multiple of its interval in UTC ticks.
pub fn align_down(ts: Timestamp, interval_ms: DurationMs) -> Timestamp {
    debug_assert!(interval_ms > 0);
    ts.div_euclid(interval_ms) * interval_ms
}

/// Counter name validation: begins with `/`, contains no path-separator
/// mischief (`.` / `..` segments), and uses only characters valid in a path
/// component on any common host platform.
pub fn validate_counter_name(name: &str) -> Result<(), String> {
    if !name.starts_with('/') {
        return Err(format!("counter name must start with '/': {name}"));
    }
    if name.contains("..") {
        return Err(format!("counter name must not contain '..': {name}"));
    }
    if name.chars().any(|c| c.is_control() || matches!(c, '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
    {
        return Err(format!("counter name contains invalid characters: {name}"));
    }
    if name.split('/').any(|segment| segment.is_empty() && name != "/") && name.ends_with('/') {
        return Err(format!("counter name must not end with '/': {name}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_down_rounds_to_interval() {
        assert_eq!(align_down(1_999, 1_000), 1_000);
        assert_eq!(align_down(2_000, 1_000), 2_000);
        assert_eq!(align_down(0, 60_000), 0);
    }

    #[test]
    fn align_down_handles_negative_timestamps() {
        assert_eq!(align_down(-1, 1_000), -1_000);
    }

    #[test]
    fn counter_name_validation() {
        assert!(validate_counter_name("/svc/requests").is_ok());
        assert!(validate_counter_name("svc/requests").is_err());
        assert!(validate_counter_name("/svc/../etc").is_err());
        assert!(validate_counter_name("/svc/requests/").is_err());
        assert!(validate_counter_name("/svc:bad").is_err());
    }
}
