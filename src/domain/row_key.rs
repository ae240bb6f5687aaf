// Row key layout for the wide-column store
use chrono::{DateTime, Utc};

/// Separator between the device id and the inverted timestamp
pub const KEY_SEPARATOR: char = '#';

/// Build a row key as `<device_id>#<!millis>`.
///
/// The millisecond timestamp is reinterpreted as `u64` and bit-inverted, so
/// newer writes for the same device sort first under ascending key order and
/// recent writes don't pile up at the end of the key space.
pub fn row_key(device_id: &str, at: DateTime<Utc>) -> String {
    let reversed = !(at.timestamp_millis() as u64);
    format!("{}{}{}", device_id, KEY_SEPARATOR, reversed)
}

/// Prefix that covers every row written for a device
pub fn device_prefix(device_id: &str) -> String {
    format!("{}{}", device_id, KEY_SEPARATOR)
}

/// Smallest key that sorts after every key starting with `prefix`.
/// Returns `None` when no such bound exists (empty or all-0xff prefix).
pub fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let last = prefix.iter().rposition(|b| *b != 0xff)?;
    let mut end = prefix[..=last].to_vec();
    end[last] += 1;
    Some(end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    #[test]
    fn test_row_key_inverts_millis() {
        let key = row_key("sensor-42", at(1_700_000_000_000));
        assert_eq!(key, format!("sensor-42#{}", u64::MAX - 1_700_000_000_000));
        assert_eq!(key, "sensor-42#18446742373709551615");
    }

    #[test]
    fn test_row_key_is_deterministic() {
        let t = at(1_712_345_678_901);
        assert_eq!(row_key("device-1", t), row_key("device-1", t));
    }

    #[test]
    fn test_newer_keys_sort_first() {
        let t1 = at(1_700_000_000_000);
        let t2 = t1 + Duration::milliseconds(1);

        let older = row_key("sensor-42", t1);
        let newer = row_key("sensor-42", t2);

        assert_ne!(older, newer);
        assert!(newer < older);
    }

    #[test]
    fn test_descending_order_across_many_timestamps() {
        let base = at(1_600_000_000_000);
        let keys: Vec<String> = [0i64, 1, 999, 60_000, 86_400_000, 31_536_000_000]
            .iter()
            .map(|offset| row_key("d", base + Duration::milliseconds(*offset)))
            .collect();

        for pair in keys.windows(2) {
            assert!(pair[1] < pair[0], "{} should sort before {}", pair[1], pair[0]);
        }
    }

    #[test]
    fn test_epoch_and_pre_epoch() {
        assert_eq!(row_key("d", at(0)), format!("d#{}", u64::MAX));
        // -1 ms reinterprets as u64::MAX, whose complement is zero
        assert_eq!(row_key("d", at(-1)), "d#0");
    }

    #[test]
    fn test_keys_stay_within_device_prefix() {
        let key = row_key("sensor-42", Utc::now());
        assert!(key.starts_with(&device_prefix("sensor-42")));
        assert!(!key.starts_with(&device_prefix("sensor-4")));
    }

    #[test]
    fn test_prefix_successor() {
        assert_eq!(prefix_successor(b"sensor-42#"), Some(b"sensor-42$".to_vec()));
        assert_eq!(prefix_successor(&[b'a', 0xff, 0xff]), Some(vec![b'b']));
        assert_eq!(prefix_successor(&[0xff, 0xff]), None);
        assert_eq!(prefix_successor(b""), None);
    }
}
