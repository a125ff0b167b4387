//! Partial snapshots as carried by push telemetry frames.

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

use crate::codec::wire_time;
use crate::types::{DeviceSnapshot, Mode};

/// A single field of a [`SnapshotPatch`].
///
/// - `None`: key absent from the frame, keep the prior value
/// - `Some(None)`: key present as `null`, clear the value
/// - `Some(Some(v))`: key present, overwrite with `v`
pub type Field<T> = Option<Option<T>>;

/// A partial device snapshot.
///
/// Telemetry frames only carry the keys that changed. Applying a patch writes
/// exactly those keys and leaves every other field of the snapshot alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotPatch {
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub mode: Field<Mode>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub pump_on: Field<bool>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub air_temp: Field<f64>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub air_humidity: Field<f64>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub light_lux: Field<f64>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub soil_moisture: Field<i64>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub water_level: Field<i64>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub finger_count: Field<i64>,
    #[serde(
        deserialize_with = "wire_time::deserialize_field",
        serialize_with = "wire_time::serialize_field",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_motion_time: Field<OffsetDateTime>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub city: Field<String>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub forecast_description: Field<String>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub video_stream_url: Field<String>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub command: Field<String>,
}

/// Marks a key as present, whether it holds a value or `null`.
fn present<'de, D, T>(deserializer: D) -> Result<Field<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

macro_rules! for_each_field {
    ($mac:ident) => {
        $mac!(
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
            command
        )
    };
}

impl SnapshotPatch {
    /// Number of keys carried by this patch.
    #[must_use]
    pub fn len(&self) -> usize {
        macro_rules! count {
            ($($field:ident),*) => {
                0 $(+ usize::from(self.$field.is_some()))*
            };
        }
        for_each_field!(count)
    }

    /// Whether the patch carries no recognized key.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write the carried keys into `snapshot`.
    pub(crate) fn apply_to(&self, snapshot: &mut DeviceSnapshot) {
        macro_rules! apply {
            ($($field:ident),*) => {{
                $(
                    if let Some(value) = &self.$field {
                        snapshot.$field = value.clone();
                    }
                )*
            }};
        }
        for_each_field!(apply)
    }

    /// Layer `later` on top of this patch, as if both were applied in order.
    #[must_use]
    pub fn then(mut self, later: &SnapshotPatch) -> SnapshotPatch {
        macro_rules! layer {
            ($($field:ident),*) => {{
                $(
                    if later.$field.is_some() {
                        self.$field = later.$field.clone();
                    }
                )*
            }};
        }
        for_each_field!(layer);
        self
    }
}

impl From<DeviceSnapshot> for SnapshotPatch {
    /// A patch that sets every field present in the snapshot.
    fn from(snapshot: DeviceSnapshot) -> Self {
        macro_rules! lift {
            ($($field:ident),*) => {
                SnapshotPatch {
                    $($field: snapshot.$field.map(Some)),*
                }
            };
        }
        for_each_field!(lift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_null_and_value() {
        let patch: SnapshotPatch =
            serde_json::from_str(r#"{"air_temp": 21.5, "finger_count": null}"#).unwrap();

        assert_eq!(patch.air_temp, Some(Some(21.5)));
        assert_eq!(patch.finger_count, Some(None));
        assert_eq!(patch.pump_on, None);
        assert_eq!(patch.len(), 2);
    }

    #[test]
    fn test_merge_only_touches_present_keys() {
        let mut snapshot = DeviceSnapshot {
            mode: Some(Mode::Auto),
            pump_on: Some(true),
            finger_count: Some(2),
            ..Default::default()
        };

        let patch = SnapshotPatch {
            pump_on: Some(Some(false)),
            finger_count: Some(None),
            ..Default::default()
        };
        snapshot.merge(&patch);

        assert_eq!(snapshot.mode, Some(Mode::Auto));
        assert_eq!(snapshot.pump_on, Some(false));
        assert_eq!(snapshot.finger_count, None);
    }

    #[test]
    fn test_empty_patch_is_noop() {
        let mut snapshot = DeviceSnapshot {
            city: Some("Chiang Mai".to_string()),
            ..Default::default()
        };
        let before = snapshot.clone();

        let patch = SnapshotPatch::default();
        assert!(patch.is_empty());
        snapshot.merge(&patch);

        assert_eq!(snapshot, before);
    }

    #[test]
    fn test_unknown_keys_are_not_fields() {
        let patch: SnapshotPatch =
            serde_json::from_str(r#"{"_id": "main_status", "battery": 80}"#).unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn test_then_keeps_latest_value_per_field() {
        let first = SnapshotPatch {
            air_temp: Some(Some(20.0)),
            soil_moisture: Some(Some(400)),
            ..Default::default()
        };
        let second = SnapshotPatch {
            air_temp: Some(Some(22.0)),
            ..Default::default()
        };

        let combined = first.then(&second);
        assert_eq!(combined.air_temp, Some(Some(22.0)));
        assert_eq!(combined.soil_moisture, Some(Some(400)));
    }

    #[test]
    fn test_from_snapshot_sets_present_fields_only() {
        let snapshot = DeviceSnapshot {
            water_level: Some(120),
            city: Some("Lampang".to_string()),
            ..Default::default()
        };
        let patch = SnapshotPatch::from(snapshot.clone());

        assert_eq!(patch.len(), 2);
        assert_eq!(DeviceSnapshot::from(patch), snapshot);
    }

    #[test]
    fn test_null_serializes_as_null() {
        let patch = SnapshotPatch {
            finger_count: Some(None),
            ..Default::default()
        };
        let json = serde_json::to_string(&patch).unwrap();
        assert_eq!(json, r#"{"finger_count":null}"#);
    }
}
