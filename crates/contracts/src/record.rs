//! Record - the unit of telemetry flowing from producer to consumers
//!
//! A record only ever persists as its serialized line form.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{Clock, MetadataProvider};

/// Type tag written for every sensor observation
pub const SENSOR_RECORD_TYPE: &str = "sensor";

/// One telemetry observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Wall-clock timestamp (milliseconds since epoch)
    pub timestamp_ms: i64,

    /// Record type tag
    #[serde(rename = "type")]
    pub record_type: String,

    /// Owner of the recording session
    pub user_id: String,

    /// Foreground app display name at capture time
    pub foreground_app_name: String,

    /// Foreground app package identifier at capture time
    pub foreground_package_name: String,

    /// Sensor kind ("accelerometer", "gyroscope", ...)
    pub sensor_name: String,

    /// Three float channels
    pub values: SensorValues,

    /// Accuracy code reported by the sensor
    pub accuracy: i32,
}

/// Three-channel sensor reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorValues {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Record {
    /// Serialize to one newline-terminated JSON line
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Raw tuple supplied by the producer feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub sensor_name: String,
    pub x: f32,
    pub y: f32,
    pub z: f32,
    #[serde(default)]
    pub accuracy: i32,
}

/// Attaches clock and metadata context to producer samples
#[derive(Clone)]
pub struct RecordBuilder {
    metadata: Arc<dyn MetadataProvider>,
    clock: Arc<dyn Clock>,
}

impl RecordBuilder {
    /// Create a builder over the given collaborators
    pub fn new(metadata: Arc<dyn MetadataProvider>, clock: Arc<dyn Clock>) -> Self {
        Self { metadata, clock }
    }

    /// Build an immutable record from a producer sample
    pub fn build(&self, sample: SensorSample) -> Record {
        let app = self.metadata.foreground_app();
        Record {
            timestamp_ms: self.clock.now_ms(),
            record_type: SENSOR_RECORD_TYPE.to_string(),
            user_id: self.metadata.user_id(),
            foreground_app_name: app.name,
            foreground_package_name: app.package,
            sensor_name: sample.sensor_name,
            values: SensorValues {
                x: sample.x,
                y: sample.y,
                z: sample.z,
            },
            accuracy: sample.accuracy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FixedClock, StaticMetadata};

    fn sample_record() -> Record {
        Record {
            timestamp_ms: 1_700_000_000_123,
            record_type: SENSOR_RECORD_TYPE.to_string(),
            user_id: "alice".to_string(),
            foreground_app_name: "Maps".to_string(),
            foreground_package_name: "com.example.maps".to_string(),
            sensor_name: "accelerometer".to_string(),
            values: SensorValues {
                x: 0.5,
                y: -1.0,
                z: 9.75,
            },
            accuracy: 3,
        }
    }

    #[test]
    fn test_wire_form_field_names() {
        let line = sample_record().to_line().unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);

        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["timestamp_ms"], 1_700_000_000_123i64);
        assert_eq!(value["type"], "sensor");
        assert_eq!(value["user_id"], "alice");
        assert_eq!(value["foreground_app_name"], "Maps");
        assert_eq!(value["foreground_package_name"], "com.example.maps");
        assert_eq!(value["sensor_name"], "accelerometer");
        assert_eq!(value["values"]["z"], 9.75);
        assert_eq!(value["accuracy"], 3);
    }

    #[test]
    fn test_builder_attaches_context() {
        let metadata = Arc::new(StaticMetadata::new("bob"));
        metadata.set_foreground_app("Camera", "com.example.camera");
        let builder = RecordBuilder::new(metadata, Arc::new(FixedClock::new(42)));

        let record = builder.build(SensorSample {
            sensor_name: "gyroscope".to_string(),
            x: 1.0,
            y: 2.0,
            z: 3.0,
            accuracy: 2,
        });

        assert_eq!(record.timestamp_ms, 42);
        assert_eq!(record.user_id, "bob");
        assert_eq!(record.foreground_package_name, "com.example.camera");
        assert_eq!(record.record_type, "sensor");
        assert_eq!(record.values.y, 2.0);
    }
}
