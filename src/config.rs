//! Knobs for the test drivers. Defaults are the classic ones, each can be overridden
//! from the environment, e.g. `SYNCHPROBS_THREADS=32`.

use std::env;

use crate::error::HarnessError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// readers and writers spawned by rwt1, each
    pub threads: u32,
    /// create/destroy rounds before rwt1 keeps a lock
    pub create_loops: u32,
    /// checks each rwt1 reader does under its read lock
    pub read_loops: u32,
    /// writes the rwt1 main thread does while the others run
    pub write_loops: u32,
    /// males, females and matchmakers spawned by sp1, each
    pub whales: u32,
    /// upper bound (exclusive) of yields between steps
    pub max_yield: u32,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            threads: 12,
            create_loops: 12,
            read_loops: 150,
            write_loops: 15,
            whales: 5,
            max_yield: 4,
        }
    }
}

impl HarnessConfig {
    pub fn from_env() -> Result<Self, HarnessError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// unset variables keep their defaults
    pub fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self, HarnessError> {
        let mut config = Self::default();
        for (var, field) in [
            ("SYNCHPROBS_THREADS", &mut config.threads),
            ("SYNCHPROBS_CREATE_LOOPS", &mut config.create_loops),
            ("SYNCHPROBS_READ_LOOPS", &mut config.read_loops),
            ("SYNCHPROBS_WRITE_LOOPS", &mut config.write_loops),
            ("SYNCHPROBS_WHALES", &mut config.whales),
            ("SYNCHPROBS_MAX_YIELD", &mut config.max_yield),
        ] {
            if let Some(value) = lookup(var) {
                *field = value
                    .trim()
                    .parse()
                    .map_err(|source| HarnessError::Config { var, value, source })?;
            }
        }
        Ok(config)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.threads, 12);
        assert_eq!(config.read_loops, 150);
    }

    #[test]
    fn test_override() {
        let config = HarnessConfig::from_lookup(|var| match var {
            "SYNCHPROBS_THREADS" => Some("3".to_string()),
            "SYNCHPROBS_MAX_YIELD" => Some(" 1 ".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.threads, 3);
        assert_eq!(config.max_yield, 1);
        assert_eq!(config.whales, 5);
    }

    #[test]
    fn test_bad_value() {
        let err = HarnessConfig::from_lookup(|var| {
            (var == "SYNCHPROBS_WHALES").then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, HarnessError::Config { var: "SYNCHPROBS_WHALES", .. }));
        assert_eq!(err.to_string(), "bad value `lots` for SYNCHPROBS_WHALES");
    }
}
