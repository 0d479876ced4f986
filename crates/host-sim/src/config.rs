//! Simulator configuration loaded from the environment.
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while reading simulator configuration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} has an invalid value: {value:?}")]
    Invalid { key: &'static str, value: String },

    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}

/// Knobs for one simulated host session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimConfig {
    pub tick_interval: Duration,
    pub ticks: u64,
    /// Probes answered "not ready" before the host comes up.
    pub warmup_probes: u32,
    pub multiplayer: bool,
    pub authority: bool,
    /// Grids present before the session initializes.
    pub grids: u64,
    pub blocks_per_grid: u64,
    /// Turns on error notices and profiling for the demo source.
    pub debug: bool,
    pub log_dir: PathBuf,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(16),
            ticks: 240,
            warmup_probes: 3,
            multiplayer: false,
            authority: true,
            grids: 2,
            blocks_per_grid: 3,
            debug: false,
            log_dir: env::temp_dir().join("host-sim").join("logs"),
        }
    }
}

impl SimConfig {
    /// Construct configuration from process environment variables.
    ///
    /// Environment variables:
    /// - `SIM_TICK_MS` - Milliseconds between ticks (default: 16)
    /// - `SIM_TICKS` - Ticks to run before closing (default: 240)
    /// - `SIM_WARMUP_PROBES` - Probes before the host reports ready (default: 3)
    /// - `SIM_MULTIPLAYER` - Simulate a multiplayer session (default: false)
    /// - `SIM_AUTHORITY` - Act as the authoritative host (default: true)
    /// - `SIM_GRIDS` - Grids present at start (default: 2)
    /// - `SIM_BLOCKS_PER_GRID` - Blocks on each grid (default: 3)
    /// - `SIM_DEBUG` - Debug mode for the demo source (default: false)
    /// - `SIM_LOG_DIR` - Log directory (default: `$TMPDIR/host-sim/logs`)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(ms) = read_env::<u64>("SIM_TICK_MS")? {
            if ms == 0 {
                return Err(ConfigError::Zero { key: "SIM_TICK_MS" });
            }
            config.tick_interval = Duration::from_millis(ms);
        }
        if let Some(ticks) = read_env("SIM_TICKS")? {
            config.ticks = ticks;
        }
        if let Some(probes) = read_env("SIM_WARMUP_PROBES")? {
            config.warmup_probes = probes;
        }
        if let Some(multiplayer) = read_flag("SIM_MULTIPLAYER")? {
            config.multiplayer = multiplayer;
        }
        if let Some(authority) = read_flag("SIM_AUTHORITY")? {
            config.authority = authority;
        }
        if let Some(grids) = read_env("SIM_GRIDS")? {
            config.grids = grids;
        }
        if let Some(blocks) = read_env("SIM_BLOCKS_PER_GRID")? {
            config.blocks_per_grid = blocks;
        }
        if let Some(debug) = read_flag("SIM_DEBUG")? {
            config.debug = debug;
        }
        if let Ok(dir) = env::var("SIM_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        Ok(config)
    }
}

fn read_env<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
{
    match env::var(key) {
        Ok(value) => parse(key, &value).map(Some),
        Err(_) => Ok(None),
    }
}

/// Like [`read_env`], but a variable set to nothing counts as `true`.
fn read_flag(key: &'static str) -> Result<Option<bool>, ConfigError> {
    match env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(Some(true)),
        Ok(value) => parse_flag(key, &value).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_owned(),
    })
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag_accepts_common_spellings() {
        assert_eq!(parse_flag("K", "Yes"), Ok(true));
        assert_eq!(parse_flag("K", " 0 "), Ok(false));
        assert_eq!(
            parse_flag("K", "maybe"),
            Err(ConfigError::Invalid {
                key: "K",
                value: "maybe".into()
            })
        );
    }

    #[test]
    fn test_parse_rejects_garbage_numbers() {
        assert_eq!(parse::<u64>("SIM_TICKS", " 42"), Ok(42));
        assert!(matches!(
            parse::<u64>("SIM_TICKS", "-1"),
            Err(ConfigError::Invalid { key: "SIM_TICKS", .. })
        ));
    }

    #[test]
    fn test_defaults_describe_single_player_authority() {
        let config = SimConfig::default();
        assert!(!config.multiplayer);
        assert!(config.authority);
        assert!(config.ticks > 0);
    }
}
