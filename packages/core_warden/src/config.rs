use std::fs;
use std::path::Path;
use std::time::Duration;

use toml::{Table, Value};

use crate::{CoreIndex, Error, Result, core_list};

const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_STEP_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Timing of the protection loop and of timed protection runs.
///
/// # Example
///
/// ```
/// use std::time::Duration;
///
/// use core_warden::ProtectionConfig;
///
/// let mut config = ProtectionConfig::default();
/// config.sweep_interval = Duration::from_millis(500);
///
/// assert_eq!(config.step_interval, Duration::from_secs(1));
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub struct ProtectionConfig {
    /// How long the protection loop waits between sweeps. Defaults to 5 seconds.
    pub sweep_interval: Duration,

    /// How long a timed protection run waits between steps. Defaults to 1 second.
    pub step_interval: Duration,

    /// How long stopping the protection loop waits for it to exit before giving up.
    /// Defaults to 5 seconds.
    pub stop_timeout: Duration,

    /// How long the protection loop waits after starting before its first sweep.
    /// Defaults to zero.
    pub first_sweep_delay: Duration,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            step_interval: DEFAULT_STEP_INTERVAL,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            first_sweep_delay: Duration::ZERO,
        }
    }
}

/// Settings read from a TOML configuration file.
///
/// Every key is optional:
///
/// ```toml
/// cores = "6-7"
/// sweep_interval_ms = 5000
/// step_interval_ms = 1000
/// stop_timeout_ms = 5000
/// first_sweep_delay_ms = 0
/// ```
///
/// Missing timing keys keep their [`ProtectionConfig`] defaults. Unknown keys are rejected so
/// that typos do not go unnoticed.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConfigFile {
    protection: ProtectionConfig,
    cores: Option<Vec<CoreIndex>>,
}

impl ConfigFile {
    /// Parses configuration file contents.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use core_warden::ConfigFile;
    ///
    /// let file = ConfigFile::parse("cores = \"2-3\"\nsweep_interval_ms = 250").unwrap();
    ///
    /// assert_eq!(file.cores(), Some(&[2, 3][..]));
    /// assert_eq!(file.protection().sweep_interval, Duration::from_millis(250));
    /// ```
    pub fn parse(contents: &str) -> Result<Self> {
        let table: Table =
            toml::from_str(contents).map_err(|e| Error::InvalidConfig(e.to_string()))?;

        let mut file = Self::default();

        for (key, value) in &table {
            match key.as_str() {
                "cores" => {
                    let list = value.as_str().ok_or_else(|| {
                        Error::InvalidConfig("'cores' must be a core list string".to_string())
                    })?;

                    file.cores = Some(core_list::parse(list)?);
                }
                "sweep_interval_ms" => {
                    file.protection.sweep_interval = positive_millis(key, value)?;
                }
                "step_interval_ms" => {
                    file.protection.step_interval = positive_millis(key, value)?;
                }
                "stop_timeout_ms" => {
                    file.protection.stop_timeout = millis(key, value)?;
                }
                "first_sweep_delay_ms" => {
                    file.protection.first_sweep_delay = millis(key, value)?;
                }
                other => {
                    return Err(Error::InvalidConfig(format!("unknown key '{other}'")));
                }
            }
        }

        Ok(file)
    }

    /// Reads and parses a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;

        Self::parse(&contents)
    }

    /// The timing settings, with defaults for any key the file does not set.
    #[must_use]
    pub fn protection(&self) -> &ProtectionConfig {
        &self.protection
    }

    /// The cores to reserve, if the file names any.
    #[must_use]
    pub fn cores(&self) -> Option<&[CoreIndex]> {
        self.cores.as_deref()
    }
}

fn millis(key: &str, value: &Value) -> Result<Duration> {
    let millis = value
        .as_integer()
        .and_then(|v| u64::try_from(v).ok())
        .ok_or_else(|| {
            Error::InvalidConfig(format!("'{key}' must be a non-negative integer"))
        })?;

    Ok(Duration::from_millis(millis))
}

/// Like [`millis`] but also rejects zero, for intervals that pace a loop.
fn positive_millis(key: &str, value: &Value) -> Result<Duration> {
    let duration = millis(key, value)?;

    if duration.is_zero() {
        return Err(Error::InvalidConfig(format!(
            "'{key}' must be a positive integer"
        )));
    }

    Ok(duration)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ProtectionConfig::default();

        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.step_interval, Duration::from_secs(1));
        assert_eq!(config.stop_timeout, Duration::from_secs(5));
        assert_eq!(config.first_sweep_delay, Duration::ZERO);
    }

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(ConfigFile::parse("").unwrap(), ConfigFile::default());
    }

    #[test]
    fn full_file() {
        let file = ConfigFile::parse(
            r#"
            cores = "6-7"
            sweep_interval_ms = 100
            step_interval_ms = 20
            stop_timeout_ms = 300
            first_sweep_delay_ms = 5
            "#,
        )
        .unwrap();

        assert_eq!(file.cores(), Some(&[6, 7][..]));
        assert_eq!(
            file.protection(),
            &ProtectionConfig {
                sweep_interval: Duration::from_millis(100),
                step_interval: Duration::from_millis(20),
                stop_timeout: Duration::from_millis(300),
                first_sweep_delay: Duration::from_millis(5),
            }
        );
    }

    #[test]
    fn rejects_bad_input() {
        for contents in [
            "sweep_interval_ms = -1",
            "sweep_interval_ms = \"fast\"",
            "cores = 3",
            "cores = \"3-1\"",
            "colour = \"blue\"",
            "this is not toml",
        ] {
            ConfigFile::parse(contents).unwrap_err();
        }
    }

    #[test]
    fn rejects_zero_loop_intervals() {
        for key in ["sweep_interval_ms", "step_interval_ms"] {
            let error = ConfigFile::parse(&format!("{key} = 0")).unwrap_err();

            assert!(error.to_string().contains("must be a positive integer"));
        }

        let file = ConfigFile::parse("stop_timeout_ms = 0\nfirst_sweep_delay_ms = 0").unwrap();

        assert_eq!(file.protection().stop_timeout, Duration::ZERO);
        assert_eq!(file.protection().first_sweep_delay, Duration::ZERO);
    }

    #[test]
    fn missing_file_is_invalid_config() {
        let error = ConfigFile::load(Path::new("/definitely/not/here.toml")).unwrap_err();

        assert!(matches!(error, Error::InvalidConfig(_)));
    }
}
