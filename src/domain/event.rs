// Event domain model for the warehouse table
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;

pub const SAMPLE_DEVICE_ID: &str = "device-123";
pub const SAMPLE_TEMPERATURE: f64 = 27.35;

/// One row of the events table.
/// `event_id` doubles as the insert deduplication token.
#[derive(Debug, Clone, PartialEq)]
pub struct EventRow {
    pub event_id: String,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    pub temperature: Option<f64>,
}

impl EventRow {
    pub fn new(
        event_id: String,
        device_id: String,
        timestamp: DateTime<Utc>,
        temperature: Option<f64>,
    ) -> Self {
        Self {
            event_id,
            device_id,
            timestamp,
            temperature,
        }
    }

    /// Sample reading stamped at `now`, id derived from its nanoseconds
    pub fn sample(now: DateTime<Utc>) -> Self {
        let nanos = now
            .timestamp_nanos_opt()
            .unwrap_or_else(|| now.timestamp_micros() * 1_000);
        Self::new(
            format!("evt-{}", nanos),
            SAMPLE_DEVICE_ID.to_string(),
            now,
            Some(SAMPLE_TEMPERATURE),
        )
    }

    fn format_temperature(&self) -> String {
        match self.temperature {
            Some(t) => format!("{:.2}°C", t),
            None => "NULL".to_string(),
        }
    }
}

impl fmt::Display for EventRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Event: {}, Device: {}, Time: {}, Temp: {}",
            self.event_id,
            self.device_id,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.format_temperature()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_display_with_temperature() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let row = EventRow::new("evt-1".into(), "sensor-42".into(), ts, Some(27.349));
        assert_eq!(
            row.to_string(),
            "Event: evt-1, Device: sensor-42, Time: 2024-05-01T12:30:00Z, Temp: 27.35°C"
        );
    }

    #[test]
    fn test_display_null_temperature() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let row = EventRow::new("evt-2".into(), "sensor-42".into(), ts, None);
        assert!(row.to_string().ends_with("Temp: NULL"));
    }

    #[test]
    fn test_sample() {
        let now = Utc.timestamp_nanos(1_700_000_000_123_456_789);
        let row = EventRow::sample(now);
        assert_eq!(row.event_id, "evt-1700000000123456789");
        assert_eq!(row.device_id, SAMPLE_DEVICE_ID);
        assert_eq!(row.timestamp, now);
        assert_eq!(row.temperature, Some(SAMPLE_TEMPERATURE));
    }
}
