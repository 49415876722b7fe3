//! One-time fix-up for sensor presets persisted before the `sensor.`
//! namespace existed: flat field names are rewritten to their namespaced
//! form. Gated by the installed version being at or below
//! [`LEGACY_SENSOR_VERSION_CEILING`].

use std::path::Path;

use serde_json::Value;

use crate::core::{Result, UpgradeError, fsx};

pub const LEGACY_SENSOR_VERSION_CEILING: &str = "2.55.9999";

/// Sensor `type` → namespaced `name`.
const SENSOR_TYPE_NAMES: &[(&str, &str)] = &[
    ("camera", "sensor.camera"),
    ("fisheye", "sensor.fisheye"),
    ("lidar", "sensor.lidar"),
    ("radar", "sensor.radar"),
    ("truth", "sensor.truth"),
    ("imu", "sensor.imu"),
    ("gps", "sensor.gps"),
    ("ultrasonic", "sensor.ultrasonic"),
    ("obu", "sensor.obu"),
];

/// Keys inside a sensor's `advancedInfo` bag whose `name` field gets the
/// `sensor.` prefix.
const ADVANCED_INFO_KEYS: &[&str] = &[
    "Frequency",
    "DisplayMode",
    "Res_Horizontal",
    "Res_Vertical",
    "Blur_Intensity",
    "MotionBlur_Amount",
    "Vignette_Intensity",
    "Noise_Intensity",
    "Distortion_Parameters",
    "InsideParam",
    "Intrinsic_Matrix",
    "exquisite",
    "LensFlares",
    "Bloom",
    "ExposureMode",
    "Compensation",
    "ShutterSpeed",
    "ISO",
    "Aperture",
    "ColorTemperature",
    "WhiteHint",
    "Transmittance",
    "FOV_Horizontal",
    "FOV_Vertical",
    "CCD_Width",
    "CCD_Height",
    "Focal_Length",
    "dBmin",
    "Radius",
    "NoiseFactor",
    "NoiseStd",
    "AttachmentType",
    "AttachmentRange",
    "drange",
    "IndirectDistance",
    "PulseMoment",
    "PulsePeriod",
    "PollTurn",
    "frontGpu",
    "FrequencyBSM",
    "DistanceOpen",
    "DistanceCity",
    "Band",
    "Mbps",
    "SystemDelay",
    "CommuDelay",
    "TriggerImmediately",
    "PosAccuracy",
    "NoTeam",
    "DisableRSU",
    "PreBSM",
    "ConnectionDistance",
    "v2x_loss_type",
    "v2x_loss_rand_prob",
    "v2x_loss_burs_prob",
];

fn sensor_type_name(sensor_type: &str) -> Option<&'static str> {
    SENSOR_TYPE_NAMES
        .iter()
        .find(|(ty, _)| *ty == sensor_type)
        .map(|(_, name)| *name)
}

fn advanced_key_name(key: &str) -> Option<String> {
    ADVANCED_INFO_KEYS
        .contains(&key)
        .then(|| format!("sensor.{key}"))
}

/// Rewrites the persisted sensor-preset blob (a list of sensor lists) to the
/// namespaced field names. The file is written back only after the full
/// traversal succeeds and only if something actually changed; a missing file
/// is a no-op. Returns whether a rewrite happened.
pub async fn migrate_sensor_field_names(path: &Path) -> Result<bool> {
    if !fsx::path_exists(path).await {
        return Ok(false);
    }
    let text = fsx::read_to_string(path).await?;
    let mut blob: Value =
        serde_json::from_str(&text).map_err(|err| UpgradeError::Serialize(err.to_string()))?;

    let mut changed = false;
    if let Some(groups) = blob.as_array_mut() {
        for group in groups {
            if let Some(sensors) = group.as_array_mut() {
                for sensor in sensors {
                    changed |= rewrite_sensor(sensor);
                }
            }
        }
    }

    if changed {
        let text = serde_json::to_string_pretty(&blob)
            .map_err(|err| UpgradeError::Serialize(err.to_string()))?;
        fsx::write_atomic(path, &text).await?;
    }
    Ok(changed)
}

fn rewrite_sensor(sensor: &mut Value) -> bool {
    let Some(record) = sensor.as_object_mut() else {
        return false;
    };
    let mut changed = false;

    if let Some(sensor_type) = record.get("type").and_then(Value::as_str) {
        if let Some(namespaced) = sensor_type_name(sensor_type) {
            if record.get("name").and_then(Value::as_str) != Some(namespaced) {
                record.insert("name".to_string(), Value::String(namespaced.to_string()));
                changed = true;
            }
        }
    }

    if let Some(advanced) = record.get_mut("advancedInfo").and_then(Value::as_object_mut) {
        for (key, entry) in advanced.iter_mut() {
            let Some(namespaced) = advanced_key_name(key) else {
                continue;
            };
            if let Some(entry) = entry.as_object_mut() {
                if entry.get("name").and_then(Value::as_str) != Some(namespaced.as_str()) {
                    entry.insert("name".to_string(), Value::String(namespaced));
                    changed = true;
                }
            }
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rewrites_known_types_and_advanced_keys() {
        let mut sensor = json!({
            "type": "camera",
            "name": "camera",
            "advancedInfo": {
                "Frequency": { "name": "Frequency", "value": 25 },
                "Custom": { "name": "Custom", "value": 1 }
            }
        });
        assert!(rewrite_sensor(&mut sensor));
        assert_eq!(sensor["name"], "sensor.camera");
        assert_eq!(sensor["advancedInfo"]["Frequency"]["name"], "sensor.Frequency");
        // Unknown keys are left alone.
        assert_eq!(sensor["advancedInfo"]["Custom"]["name"], "Custom");
        // Second pass finds nothing to do.
        assert!(!rewrite_sensor(&mut sensor));
    }

    #[test]
    fn unknown_type_is_untouched() {
        let mut sensor = json!({ "type": "sonar", "name": "sonar" });
        assert!(!rewrite_sensor(&mut sensor));
        assert_eq!(sensor["name"], "sonar");
    }
}
