//! Serde adapters for `Duration`

/// Durations as integer nanoseconds, for machine-readable results
pub mod nanos {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // u64 nanos covers ~584 years and keeps TOML/JSON happy
        (duration.as_nanos() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let nanos = u64::deserialize(deserializer)?;
        Ok(Duration::from_nanos(nanos))
    }
}

/// Durations as human-readable strings such as "100ms" or "1m 30s"
pub mod human {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Timings {
        #[serde(with = "super::human")]
        grace: Duration,
        #[serde(with = "super::nanos")]
        elapsed: Duration,
    }

    #[test]
    fn test_human_and_nanos_formats() {
        let timings = Timings {
            grace: Duration::from_secs(90),
            elapsed: Duration::from_millis(3),
        };
        let toml_str = toml::to_string(&timings).unwrap();
        assert!(toml_str.contains("grace = \"1m 30s\""));
        assert!(toml_str.contains("elapsed = 3000000"));

        let back: Timings = toml::from_str(&toml_str).unwrap();
        assert_eq!(back, timings);
    }

    #[test]
    fn test_human_rejects_garbage() {
        let result: Result<Timings, _> = toml::from_str("grace = \"soon\"\nelapsed = 1\n");
        assert!(result.is_err());
    }
}
