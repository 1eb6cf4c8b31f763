//! Pure normalization of raw PRTG sensor rows.
//!
//! The table endpoint returns loosely-typed JSON: localized dates, comma
//! decimal separators, percent suffixes and HTML fragments inside text
//! fields. Every normalizer here returns `None` for malformed input
//! instead of erroring, so partial data never aborts a sync.

use chrono::NaiveDateTime;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use crate::db::SensorStatus;

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").unwrap())
}

fn bracket_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[.*?\]").unwrap())
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Strip HTML tags from a text fragment.
pub fn strip_tags(input: &str) -> String {
    tag_re().replace_all(input, "").into_owned()
}

/// Tag-stripped, trimmed body snippet capped at 180 characters, used in
/// error messages and failure logs.
pub fn body_snippet(body: &str) -> String {
    strip_tags(body).trim().chars().take(180).collect()
}

/// The typed view of one raw sensor row.
#[derive(Debug, Clone, Default)]
pub struct NormalizedSensor {
    pub name: Option<String>,
    pub probe: Option<String>,
    pub group: Option<String>,
    pub device: Option<String>,
    pub status: Option<SensorStatus>,
    pub last_value: Option<String>,
    pub last_check: Option<NaiveDateTime>,
    pub last_up: Option<NaiveDateTime>,
    pub last_down: Option<NaiveDateTime>,
    pub uptime: Option<f64>,
    pub downtime: Option<f64>,
    pub coverage: Option<f64>,
    pub interval_secs: Option<i64>,
    pub message: Option<String>,
    pub priority: Option<i64>,
}

/// Normalize one raw row from the table endpoint.
pub fn normalize_row(row: &Map<String, Value>) -> NormalizedSensor {
    let text = |key: &str| row.get(key).and_then(loose_string);
    let date = |key: &str| text(key).as_deref().and_then(to_datetime);
    let float = |key: &str| row.get(key).and_then(to_float);
    let int = |key: &str| row.get(key).and_then(to_int);

    NormalizedSensor {
        name: text("name"),
        probe: text("probe"),
        group: text("group"),
        device: text("device"),
        status: map_status(
            row.get("status").and_then(Value::as_str),
            row.get("status_raw"),
        ),
        last_value: text("lastvalue"),
        last_check: date("lastcheck"),
        last_up: date("lastup"),
        last_down: date("lastdown"),
        uptime: float("uptime"),
        downtime: float("downtime"),
        coverage: float("coverage"),
        interval_secs: int("interval"),
        message: text("message").as_deref().and_then(clean_message),
        priority: int("priority"),
    }
}

/// Map PRTG status onto the internal state.
///
/// A numeric raw code wins over the text column. Unmatched text passes
/// through (lowercased) instead of collapsing to unknown.
pub fn map_status(text: Option<&str>, raw: Option<&Value>) -> Option<SensorStatus> {
    if let Some(code) = raw.and_then(numeric_code) {
        return Some(match code {
            3 => SensorStatus::Up,
            4 => SensorStatus::Warning,
            5 => SensorStatus::Down,
            6 | 7 => SensorStatus::Paused,
            _ => SensorStatus::Unknown,
        });
    }

    let text = text.map(|t| t.trim().to_lowercase())?;
    if text.is_empty() {
        return None;
    }

    Some(match text.as_str() {
        "up" | "ok" => SensorStatus::Up,
        "warning" | "unusual" => SensorStatus::Warning,
        "down" => SensorStatus::Down,
        "paused" | "paused by user" | "paused by dependency" | "paused until" => {
            SensorStatus::Paused
        }
        _ => SensorStatus::Other(text),
    })
}

fn numeric_code(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

/// Parse a PRTG-localized timestamp into a canonical datetime.
///
/// Tags and bracketed annotations (e.g. trailing age markers) are
/// stripped first. Day-first parsing is attempted before month-first;
/// the bias for ambiguous dates mirrors the upstream locale and is
/// intentional.
pub fn to_datetime(value: &str) -> Option<NaiveDateTime> {
    let clean = strip_tags(value);
    let clean = bracket_re().replace_all(&clean, "");
    let clean = clean.trim();
    if clean.is_empty() {
        return None;
    }

    for format in ["%d/%m/%Y %H:%M:%S", "%m/%d/%Y %H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(clean, format) {
            return Some(parsed);
        }
    }

    None
}

/// Parse a number that may carry a percent suffix and a comma decimal
/// separator.
pub fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let normalized: String = s
                .chars()
                .filter(|c| *c != '%' && *c != ' ')
                .map(|c| if c == ',' { '.' } else { c })
                .collect();
            if normalized.is_empty() {
                None
            } else {
                normalized.parse().ok()
            }
        }
        _ => None,
    }
}

/// Parse an integer, ignoring any non-digit decoration.
pub fn to_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let digits: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '-')
                .collect();
            if digits.is_empty() {
                None
            } else {
                digits.parse().ok()
            }
        }
        _ => None,
    }
}

/// Tag-strip and whitespace-collapse a message field.
pub fn clean_message(value: &str) -> Option<String> {
    let stripped = strip_tags(value);
    let collapsed = whitespace_re().replace_all(&stripped, " ");
    let trimmed = collapsed.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn loose_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn test_float_locale_quirks() {
        assert_eq!(to_float(&json!("12,5%")), Some(12.5));
        assert_eq!(to_float(&json!("  7 ")), Some(7.0));
        assert_eq!(to_float(&json!("abc")), None);
        assert_eq!(to_float(&json!(99.97)), Some(99.97));
        assert_eq!(to_float(&json!(null)), None);
    }

    #[test]
    fn test_int_strips_decoration() {
        assert_eq!(to_int(&json!("60 s")), Some(60));
        assert_eq!(to_int(&json!("-5")), Some(-5));
        assert_eq!(to_int(&json!(30)), Some(30));
        assert_eq!(to_int(&json!("")), None);
        assert_eq!(to_int(&json!("n/a")), None);
    }

    #[test]
    fn test_status_raw_code_wins_over_text() {
        assert_eq!(
            map_status(Some("Down"), Some(&json!(3))),
            Some(SensorStatus::Up)
        );
        assert_eq!(
            map_status(Some("Up"), Some(&json!("5"))),
            Some(SensorStatus::Down)
        );
        assert_eq!(map_status(None, Some(&json!(7))), Some(SensorStatus::Paused));
    }

    #[test]
    fn test_status_unmapped_raw_code_is_unknown() {
        assert_eq!(
            map_status(Some("Up"), Some(&json!(9))),
            Some(SensorStatus::Unknown)
        );
    }

    #[test]
    fn test_status_text_fallback() {
        assert_eq!(
            map_status(Some("Paused by user"), None),
            Some(SensorStatus::Paused)
        );
        assert_eq!(map_status(Some("OK"), None), Some(SensorStatus::Up));
        assert_eq!(
            map_status(Some("Unusual"), Some(&json!("n/a"))),
            Some(SensorStatus::Warning)
        );
        assert_eq!(
            map_status(Some("Collecting"), None),
            Some(SensorStatus::Other("collecting".to_string()))
        );
        assert_eq!(map_status(None, None), None);
        assert_eq!(map_status(Some("  "), None), None);
    }

    #[test]
    fn test_datetime_day_first_preferred() {
        assert_eq!(
            to_datetime("15/03/2024 08:30:00"),
            Some(dt(2024, 3, 15, 8, 30, 0))
        );
        // Both parts <= 12: day-first wins, so this is April 3rd.
        assert_eq!(
            to_datetime("03/04/2024 12:00:00"),
            Some(dt(2024, 4, 3, 12, 0, 0))
        );
    }

    #[test]
    fn test_datetime_month_first_fallback() {
        assert_eq!(
            to_datetime("12/31/2024 23:59:59"),
            Some(dt(2024, 12, 31, 23, 59, 59))
        );
    }

    #[test]
    fn test_datetime_iso_and_decorations() {
        assert_eq!(
            to_datetime("<span>2024-03-15 08:30:00</span> [=1s ago]"),
            Some(dt(2024, 3, 15, 8, 30, 0))
        );
        assert_eq!(to_datetime("notadate"), None);
        assert_eq!(to_datetime(""), None);
    }

    #[test]
    fn test_clean_message() {
        assert_eq!(
            clean_message("<b>OK:</b>  sensor   is\n fine "),
            Some("OK: sensor is fine".to_string())
        );
        assert_eq!(clean_message("<div></div>"), None);
    }

    #[test]
    fn test_body_snippet_caps_length() {
        let long = format!("<html>{}</html>", "a".repeat(500));
        let snippet = body_snippet(&long);
        assert_eq!(snippet.chars().count(), 180);
        assert!(!snippet.contains('<'));
    }

    #[test]
    fn test_normalize_row() {
        let row = json!({
            "name": "Ping",
            "probe": "Local Probe",
            "group": "Core",
            "device": "fw-01",
            "status": "Up",
            "status_raw": 3,
            "lastvalue": "4 msec",
            "lastcheck": "15/03/2024 08:30:00 [=2s ago]",
            "lastup": "15/03/2024 08:30:00",
            "lastdown": "",
            "uptime": "99,98%",
            "downtime": "0,02%",
            "coverage": "100 %",
            "interval": "60 s",
            "message": "<div class=\"status\">OK</div>",
            "priority": "3"
        });

        let normalized = normalize_row(row.as_object().unwrap());
        assert_eq!(normalized.name.as_deref(), Some("Ping"));
        assert_eq!(normalized.status, Some(SensorStatus::Up));
        assert_eq!(normalized.last_check, Some(dt(2024, 3, 15, 8, 30, 0)));
        assert_eq!(normalized.last_down, None);
        assert_eq!(normalized.uptime, Some(99.98));
        assert_eq!(normalized.coverage, Some(100.0));
        assert_eq!(normalized.interval_secs, Some(60));
        assert_eq!(normalized.message.as_deref(), Some("OK"));
        assert_eq!(normalized.priority, Some(3));
    }
}
