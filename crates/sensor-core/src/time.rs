//! Time-of-day helpers shared by the sensor and automation layers

use chrono::NaiveTime;

/// Format used for every time of day on the wire (24-hour `HH:MM`)
pub const HHMM_FORMAT: &str = "%H:%M";

/// Parse a 24-hour `HH:MM` string
pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), HHMM_FORMAT).ok()
}

/// Format a time of day as `HH:MM`
pub fn format_hhmm(time: &NaiveTime) -> String {
    time.format(HHMM_FORMAT).to_string()
}

/// Serde adapter for `NaiveTime` fields stored as `HH:MM`
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_hhmm(time))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let s = String::deserialize(deserializer)?;
        super::parse_hhmm(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid HH:MM time: {s}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(parse_hhmm("22:00"), NaiveTime::from_hms_opt(22, 0, 0));
        assert_eq!(parse_hhmm(" 08:05 "), NaiveTime::from_hms_opt(8, 5, 0));
        assert_eq!(parse_hhmm("25:00"), None);
        assert_eq!(parse_hhmm(""), None);
    }

    #[test]
    fn test_format_hhmm_drops_seconds() {
        let t = NaiveTime::from_hms_opt(9, 7, 42).unwrap();
        assert_eq!(format_hhmm(&t), "09:07");
    }
}
