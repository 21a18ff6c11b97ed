//! Gain value helpers shared by the mixer and scene descriptions.

use serde::de::{Error as DeError, Visitor};
use serde::Deserializer;
use std::fmt;

use crate::constants::UNITY_GAIN;

/// Convert a dB value to linear gain.
pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Convert a linear gain to dB, flooring silence at the smallest positive float.
pub fn linear_to_db(gain: f32) -> f32 {
    20.0 * gain.max(f32::MIN_POSITIVE).log10()
}

/// Clamp a track gain into `[0, 1]`.
///
/// # Returns
/// `None` when `gain` is not finite.
pub fn clamp_track_gain(gain: f32) -> Option<f32> {
    gain.is_finite().then(|| gain.clamp(0.0, UNITY_GAIN))
}

/// Deserialize a linear gain given either as a number or as a `"-6db"` string.
pub fn deserialize_linear_gain<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    struct LinearGainVisitor;

    impl<'de> Visitor<'de> for LinearGainVisitor {
        type Value = f32;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a linear gain or a string like \"-6db\"")
        }

        fn visit_f64<E: DeError>(self, value: f64) -> Result<Self::Value, E> {
            Ok(value as f32)
        }

        fn visit_i64<E: DeError>(self, value: i64) -> Result<Self::Value, E> {
            Ok(value as f32)
        }

        fn visit_u64<E: DeError>(self, value: u64) -> Result<Self::Value, E> {
            Ok(value as f32)
        }

        fn visit_str<E: DeError>(self, value: &str) -> Result<Self::Value, E> {
            parse_linear_gain(value)
                .ok_or_else(|| DeError::custom(format!("invalid gain value \"{}\"", value)))
        }
    }

    deserializer.deserialize_any(LinearGainVisitor)
}

/// Parse `"0.5"` or `"-6db"` style text into a linear gain.
pub fn parse_linear_gain(value: &str) -> Option<f32> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    match lower.strip_suffix("db") {
        Some(db) => db.trim().parse::<f32>().ok().map(db_to_linear),
        None => lower.parse::<f32>().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Level {
        #[serde(deserialize_with = "deserialize_linear_gain")]
        gain: f32,
    }

    fn approx_eq(a: f32, b: f32, eps: f32) -> bool {
        (a - b).abs() <= eps
    }

    #[test]
    fn db_strings_convert_to_linear() {
        let level: Level = serde_json::from_str(r#"{"gain": "-6db"}"#).expect("deserialize");
        assert!(approx_eq(level.gain, db_to_linear(-6.0), 1e-6));
        assert_eq!(parse_linear_gain(" 0 dB "), Some(1.0));
    }

    #[test]
    fn numbers_pass_through() {
        let level: Level = serde_json::from_str(r#"{"gain": 0.25}"#).expect("deserialize");
        assert_eq!(level.gain, 0.25);
        let level: Level = serde_json::from_str(r#"{"gain": 1}"#).expect("deserialize");
        assert_eq!(level.gain, 1.0);
    }

    #[test]
    fn garbage_strings_are_rejected() {
        assert!(serde_json::from_str::<Level>(r#"{"gain": "loud"}"#).is_err());
        assert_eq!(parse_linear_gain(""), None);
    }

    #[test]
    fn track_gains_clamp_to_unity() {
        assert_eq!(clamp_track_gain(1.5), Some(1.0));
        assert_eq!(clamp_track_gain(-0.5), Some(0.0));
        assert_eq!(clamp_track_gain(f32::NAN), None);
    }

    #[test]
    fn db_round_trip() {
        assert!(approx_eq(linear_to_db(db_to_linear(-12.0)), -12.0, 1e-4));
    }
}
