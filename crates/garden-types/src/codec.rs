//! JSON wire format for status records and telemetry frames.
//!
//! The controller writes JSON objects keyed by snake_case field names, both
//! into the status record (pull transports) and onto the status topic (push
//! transports). Full records and partial frames share the same keys; a frame
//! simply omits what did not change.
//!
//! ```
//! use garden_types::{decode_patch, decode_snapshot, Mode};
//!
//! let snapshot = decode_snapshot(br#"{"_id": "main_status", "mode": "manual", "pump_on": false}"#)?;
//! assert_eq!(snapshot.mode, Some(Mode::Manual));
//!
//! let frame = decode_patch(br#"{"air_temp": 28.4}"#)?;
//! assert_eq!(frame.len(), 1);
//! # Ok::<(), garden_types::DecodeError>(())
//! ```

use serde::Deserialize;
use serde_json::Value;

use crate::error::{DecodeError, DecodeResult};
use crate::patch::SnapshotPatch;
use crate::types::DeviceSnapshot;

/// Decode a telemetry frame.
///
/// # Errors
///
/// Returns [`DecodeError`] if the payload is not a JSON object or a recognized
/// key holds a value of the wrong type. Unknown keys are ignored.
pub fn decode_patch(payload: &[u8]) -> DecodeResult<SnapshotPatch> {
    let value: Value = serde_json::from_slice(payload)?;
    patch_from_value(value)
}

/// Decode a full status record.
///
/// # Errors
///
/// Same conditions as [`decode_patch`].
pub fn decode_snapshot(payload: &[u8]) -> DecodeResult<DeviceSnapshot> {
    decode_patch(payload).map(DeviceSnapshot::from)
}

/// Decode a frame from an already parsed JSON value.
///
/// # Errors
///
/// Same conditions as [`decode_patch`].
pub fn patch_from_value(value: Value) -> DecodeResult<SnapshotPatch> {
    match value {
        Value::Object(_) => Ok(SnapshotPatch::deserialize(value)?),
        Value::Null => Err(DecodeError::NotAnObject("null")),
        Value::Bool(_) => Err(DecodeError::NotAnObject("a boolean")),
        Value::Number(_) => Err(DecodeError::NotAnObject("a number")),
        Value::String(_) => Err(DecodeError::NotAnObject("a string")),
        Value::Array(_) => Err(DecodeError::NotAnObject("an array")),
    }
}

/// Encode a snapshot as a JSON object, omitting absent fields.
///
/// # Errors
///
/// Returns [`DecodeError::InvalidField`] if `last_motion_time` cannot be
/// written as RFC 3339 (years outside 0..=9999).
pub fn encode_snapshot(snapshot: &DeviceSnapshot) -> DecodeResult<String> {
    serde_json::to_string(snapshot).map_err(|e| DecodeError::InvalidField {
        field: "last_motion_time",
        message: e.to_string(),
    })
}

/// Encode a frame as a JSON object, writing `null` for cleared keys.
///
/// # Errors
///
/// Same conditions as [`encode_snapshot`].
pub fn encode_patch(patch: &SnapshotPatch) -> DecodeResult<String> {
    serde_json::to_string(patch).map_err(|e| DecodeError::InvalidField {
        field: "last_motion_time",
        message: e.to_string(),
    })
}

/// Timestamp handling.
///
/// Timestamps are written as RFC 3339 strings. On read, a bare number is
/// accepted as Unix seconds since some controller firmwares write
/// `time.time()` directly.
pub(crate) mod wire_time {
    use serde::de::Error as _;
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use time::OffsetDateTime;
    use time::format_description::well_known::Rfc3339;

    use crate::patch::Field;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum WireTime {
        Text(String),
        Unix(f64),
    }

    impl WireTime {
        fn into_datetime(self) -> Result<OffsetDateTime, String> {
            match self {
                WireTime::Text(text) => {
                    OffsetDateTime::parse(&text, &Rfc3339).map_err(|e| e.to_string())
                }
                WireTime::Unix(secs) if secs.is_finite() => {
                    let nanos = (secs * 1_000_000_000.0).round() as i128;
                    OffsetDateTime::from_unix_timestamp_nanos(nanos).map_err(|e| e.to_string())
                }
                WireTime::Unix(secs) => Err(format!("{secs} is not a valid timestamp")),
            }
        }
    }

    pub fn deserialize_field<'de, D>(deserializer: D) -> Result<Field<OffsetDateTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<WireTime>::deserialize(deserializer)? {
            None => Ok(Some(None)),
            Some(raw) => raw
                .into_datetime()
                .map(|dt| Some(Some(dt)))
                .map_err(D::Error::custom),
        }
    }

    pub fn serialize_field<S>(
        value: &Field<OffsetDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(inner) => serialize_option(inner, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn serialize_option<S>(
        value: &Option<OffsetDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => {
                let text = dt.format(&Rfc3339).map_err(S::Error::custom)?;
                serializer.serialize_str(&text)
            }
            None => serializer.serialize_none(),
        }
    }
}


/// Property-based tests for the wire codec.
#[cfg(test)]
mod proptests {
    use proptest::option;
    use proptest::prelude::*;
    use time::OffsetDateTime;

    use super::*;
    use crate::types::Mode;

    fn arb_mode() -> impl Strategy<Value = Mode> {
        prop_oneof![Just(Mode::Auto), Just(Mode::Manual), Just(Mode::Unknown)]
    }

    fn arb_time() -> impl Strategy<Value = OffsetDateTime> {
        (0i64..4_102_444_800i64, 0u32..1_000_000_000u32).prop_map(|(secs, nanos)| {
            OffsetDateTime::from_unix_timestamp(secs).unwrap()
                + time::Duration::nanoseconds(i64::from(nanos))
        })
    }

    prop_compose! {
        fn arb_snapshot()(
            mode in option::of(arb_mode()),
            pump_on in option::of(any::<bool>()),
            air_temp in option::of(-40.0f64..60.0),
            air_humidity in option::of(0.0f64..100.0),
            light_lux in option::of(0.0f64..120_000.0),
            soil_moisture in option::of(any::<i64>()),
            water_level in option::of(any::<i64>()),
            finger_count in option::of(0i64..=10),
            last_motion_time in option::of(arb_time()),
            city in option::of(".{0,24}"),
            forecast_description in option::of(".{0,64}"),
            video_stream_url in option::of("https?://[a-z]{1,12}\\.[a-z]{2,3}/[a-z_]{0,12}"),
            command in option::of("[A-Z_]{0,12}"),
        ) -> DeviceSnapshot {
            DeviceSnapshot {
                mode,
                pump_on,
                air_temp,
                air_humidity,
                light_lux,
                soil_moisture,
                water_level,
                finger_count,
                last_motion_time,
                city,
                forecast_description,
                video_stream_url,
                command,
            }
        }
    }

    proptest! {
        /// Encoding then decoding yields the same value for every present field.
        #[test]
        fn snapshot_survives_the_wire(snapshot in arb_snapshot()) {
            let json = encode_snapshot(&snapshot).unwrap();
            let decoded = decode_snapshot(json.as_bytes()).unwrap();
            prop_assert_eq!(decoded, snapshot);
        }

        /// Decoding arbitrary bytes never panics.
        #[test]
        fn decode_never_panics(data: Vec<u8>) {
            let _ = decode_patch(&data);
        }
    }
}
