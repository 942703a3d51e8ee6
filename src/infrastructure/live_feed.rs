// Parsing of live device messages pushed by the data feed
//
// A message is a JSON array of objects such as
// `{"DeviceId": "sensor-1", "timeStamp": "2024-01-01T10:00:00Z", "temp": 21.5}`.
// Every key besides `DeviceId` and `timeStamp` is a property reading.
use crate::domain::error::{DashboardError, Result};
use crate::domain::telemetry::LiveReading;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

const DEVICE_ID_KEY: &str = "DeviceId";
const TIMESTAMP_KEY: &str = "timeStamp";

pub fn parse_live_message(message: &str) -> Result<Vec<LiveReading>> {
    let events: Vec<serde_json::Map<String, Value>> = serde_json::from_str(message)
        .map_err(|e| DashboardError::MalformedLiveUpdate(e.to_string()))?;

    let mut readings = Vec::new();
    for event in events {
        let device_id = event
            .get(DEVICE_ID_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| DashboardError::MalformedLiveUpdate(format!("missing {}", DEVICE_ID_KEY)))?;
        let timestamp = event.get(TIMESTAMP_KEY).and_then(parse_timestamp);

        for (key, value) in &event {
            if key == DEVICE_ID_KEY || key == TIMESTAMP_KEY {
                continue;
            }
            match value.as_f64() {
                Some(value) => readings.push(LiveReading {
                    device_id: device_id.to_string(),
                    property_id: key.clone(),
                    value,
                    timestamp,
                }),
                None => tracing::debug!("Ignoring non-numeric {} for {}", key, device_id),
            }
        }
    }
    Ok(readings)
}

/// RFC 3339 strings or epoch milliseconds.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(|ms| Utc.timestamp_millis_opt(ms).single()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_extra_key_is_a_property() {
        let readings = parse_live_message(
            r#"[{"DeviceId":"sensor-1","timeStamp":"2024-01-01T10:00:00Z","temp":21.5,"co2":640}]"#,
        )
        .unwrap();

        assert_eq!(readings.len(), 2);
        let temp = readings.iter().find(|r| r.property_id == "temp").unwrap();
        assert_eq!(temp.device_id, "sensor-1");
        assert_eq!(temp.value, 21.5);
        assert_eq!(
            temp.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_epoch_millis_timestamp() {
        let readings =
            parse_live_message(r#"[{"DeviceId":"d","timeStamp":1704103200000,"temp":1}]"#).unwrap();
        assert_eq!(
            readings[0].timestamp,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_missing_device_id_is_rejected() {
        let err = parse_live_message(r#"[{"temp":21.5}]"#).unwrap_err();
        assert!(matches!(err, DashboardError::MalformedLiveUpdate(_)));

        assert!(parse_live_message("not json").is_err());
    }

    #[test]
    fn test_non_numeric_values_are_skipped() {
        let readings =
            parse_live_message(r#"[{"DeviceId":"d","status":"ok","temp":20}]"#).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].property_id, "temp");
    }
}
