use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Parse a duration such as `10`, `250ms`, `30s`, `5m` or `1h`. A bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration '{}'", s))?;
    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "" | "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        _ => Err(format!("unknown duration unit '{}' in '{}'", unit, s)),
    }
}

/// Short human age, e.g. `42s`, `7m`, `3h`, `2d`.
pub fn format_age(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let total_secs = now.signed_duration_since(since).num_seconds().max(0);
    if total_secs < 60 {
        format!("{}s", total_secs)
    } else if total_secs < 3600 {
        format!("{}m", total_secs / 60)
    } else if total_secs < 86400 {
        format!("{}h", total_secs / 3600)
    } else {
        format!("{}d", total_secs / 86400)
    }
}

/// Convert a k8s-openapi `Time`/`MicroTime` into chrono.
///
/// Goes through the RFC 3339 wire form so it works whichever timestamp backend
/// k8s-openapi was built with.
pub fn to_utc<T: Serialize>(time: &T) -> Option<DateTime<Utc>> {
    match serde_json::to_value(time).ok()? {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        _ => None,
    }
}

pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404)
}
