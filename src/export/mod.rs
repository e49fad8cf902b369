//! # CSV Export Module
//!
//! Writes snapshots of the two logs to timestamped CSV files.
//!
//! Export works purely on snapshots handed to it; it never touches the
//! live log store, so no lock is held across file I/O.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde_json::Value;
use tracing::info;

use crate::error::Result;
use crate::record::{ConfigEvent, SensorReading};

/// Save both snapshots as CSV files in `data_dir`
///
/// Creates the directory if needed and writes
/// `sensor_data_<timestamp>.csv` and `config_data_<timestamp>.csv`.
/// Following the original tool, nothing is written when the sensor
/// snapshot is empty.
///
/// # Returns
///
/// * `Ok(Some((sensor_path, config_path)))` - Both files written
/// * `Ok(None)` - Sensor snapshot was empty; nothing written
///
/// # Errors
///
/// Returns error if the directory cannot be created or a file cannot be
/// written.
pub fn save_snapshots(
    data_dir: &Path,
    sensor: &[SensorReading],
    config: &[ConfigEvent],
) -> Result<Option<(PathBuf, PathBuf)>> {
    if sensor.is_empty() {
        return Ok(None);
    }

    if !data_dir.exists() {
        fs::create_dir_all(data_dir)?;
        info!("Created directory: {}", data_dir.display());
    }

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let sensor_path = data_dir.join(format!("sensor_data_{}.csv", timestamp));
    let config_path = data_dir.join(format!("config_data_{}.csv", timestamp));

    write_sensor_csv(&sensor_path, sensor)?;
    write_config_csv(&config_path, config)?;

    info!("Data saved to {}", sensor_path.display());
    Ok(Some((sensor_path, config_path)))
}

fn write_sensor_csv(path: &Path, readings: &[SensorReading]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["timestamp_ms", "names", "temperatures"])?;

    for reading in readings {
        writer.write_record([
            reading.timestamp_ms.to_string(),
            field_text(&reading.names),
            field_text(&reading.temperatures),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

fn write_config_csv(path: &Path, events: &[ConfigEvent]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["timestamp_ms", "payload"])?;

    for event in events {
        writer.write_record([event.timestamp_ms.to_string(), field_text(&event.payload)])?;
    }

    writer.flush()?;
    Ok(())
}

/// Render one JSON field for a CSV cell
///
/// Missing values (JSON null) become the empty string; everything else is
/// written as its JSON text.
fn field_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reading(timestamp_ms: i64, names: Value, temperatures: Value) -> SensorReading {
        SensorReading {
            timestamp_ms,
            names,
            temperatures,
        }
    }

    #[test]
    fn test_empty_sensor_snapshot_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let result = save_snapshots(dir.path(), &[], &[]).unwrap();
        assert!(result.is_none());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_save_writes_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let sensor = vec![
            reading(100, json!(["A", "B"]), json!([20.5, 21.0])),
            reading(200, json!(["A", "B"]), json!([20.6, 21.1])),
        ];
        let config = vec![ConfigEvent {
            timestamp_ms: 150,
            payload: json!({"sampling_interval_ms": 500}),
        }];

        let (sensor_path, config_path) = save_snapshots(dir.path(), &sensor, &config)
            .unwrap()
            .unwrap();

        let sensor_csv = fs::read_to_string(&sensor_path).unwrap();
        let mut lines = sensor_csv.lines();
        assert_eq!(lines.next().unwrap(), "timestamp_ms,names,temperatures");
        assert_eq!(lines.next().unwrap(), r#"100,"[""A"",""B""]","[20.5,21.0]""#);
        assert_eq!(sensor_csv.lines().count(), 3);

        let config_csv = fs::read_to_string(&config_path).unwrap();
        assert!(config_csv.starts_with("timestamp_ms,payload"));
        assert!(config_csv.contains("150"));
        assert!(config_csv.contains("sampling_interval_ms"));
    }

    #[test]
    fn test_null_fields_become_empty_cells() {
        let dir = tempfile::tempdir().unwrap();
        let sensor = vec![reading(100, Value::Null, json!([20.5]))];

        let (sensor_path, _) = save_snapshots(dir.path(), &sensor, &[]).unwrap().unwrap();

        let sensor_csv = fs::read_to_string(&sensor_path).unwrap();
        assert!(sensor_csv.lines().nth(1).unwrap().starts_with("100,,"));
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("sensor_data");
        let sensor = vec![reading(1, json!(["A"]), json!([1.0]))];

        let result = save_snapshots(&nested, &sensor, &[]).unwrap();
        assert!(result.is_some());
        assert!(nested.exists());
    }
}
