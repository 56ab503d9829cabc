// Application configuration, loaded from environment variables and CLI flags.

use std::time::Duration;

use crate::engine::config::DEFAULT_BOSS_TURN_DELAY_MS;
use crate::engine::{RaidSettings, RegistrySettings};

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Delay between the end of a player round and the boss attack.
    pub boss_turn_delay: Duration,
    /// Per-turn time limit. Turns never time out when unset.
    pub turn_timeout: Option<Duration>,
    /// Upper bound on concurrently live raids.
    pub max_raids: usize,
    /// Whether new raids start with debug actions enabled.
    pub debug_default: bool,
}

impl Config {
    /// Load configuration from environment variables and CLI arguments.
    ///
    /// Environment variables:
    /// - `PORT` - HTTP server port (default: 3000)
    /// - `BOSS_TURN_DELAY_MS` - Boss turn delay in milliseconds (default: 1500)
    /// - `TURN_TIMEOUT_SECS` - Per-turn time limit in seconds (default: none)
    /// - `MAX_RAIDS` - Maximum live raids (default: 100)
    /// - `RAID_DEBUG_DEFAULT` - Set to `true` to enable debug mode on new raids
    ///
    /// CLI flags:
    /// - `--port <PORT>` - Override the port
    /// - `--debug` - Same as `RAID_DEBUG_DEFAULT=true`
    pub fn load() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    /// Build a config from CLI args and a variable lookup.
    fn from_sources(args: &[String], var: impl Fn(&str) -> Option<String>) -> Self {
        // Port: CLI flag --port takes precedence, then env var, then default
        let port = Self::parse_cli_value(args, "--port")
            .and_then(|v| v.parse().ok())
            .or_else(|| var("PORT").and_then(|v| v.parse().ok()))
            .unwrap_or(3000);

        let boss_turn_delay = var("BOSS_TURN_DELAY_MS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(Duration::from_millis(DEFAULT_BOSS_TURN_DELAY_MS));

        let turn_timeout = var("TURN_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let max_raids = var("MAX_RAIDS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(100);

        let debug_default = args.iter().any(|a| a == "--debug")
            || var("RAID_DEBUG_DEFAULT")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false);

        Config {
            port,
            boss_turn_delay,
            turn_timeout,
            max_raids,
            debug_default,
        }
    }

    /// Parse a CLI flag value like `--port 8080`.
    fn parse_cli_value(args: &[String], flag: &str) -> Option<String> {
        args.windows(2).find_map(|pair| {
            if pair[0] == flag {
                Some(pair[1].clone())
            } else {
                None
            }
        })
    }

    /// Settings handed to the session registry.
    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            raid: RaidSettings {
                boss_turn_delay: self.boss_turn_delay,
                turn_timeout: self.turn_timeout,
                debug_default: self.debug_default,
            },
            max_raids: self.max_raids,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(&args(&["bin"]), |_| None);
        assert_eq!(config.port, 3000);
        assert_eq!(config.boss_turn_delay, Duration::from_millis(1500));
        assert_eq!(config.turn_timeout, None);
        assert_eq!(config.max_raids, 100);
        assert!(!config.debug_default);
    }

    #[test]
    fn test_env_values() {
        let env: HashMap<&str, &str> = [
            ("PORT", "8080"),
            ("BOSS_TURN_DELAY_MS", "250"),
            ("TURN_TIMEOUT_SECS", "45"),
            ("MAX_RAIDS", "7"),
            ("RAID_DEBUG_DEFAULT", "TRUE"),
        ]
        .into_iter()
        .collect();
        let config = Config::from_sources(&args(&["bin"]), |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.port, 8080);
        assert_eq!(config.boss_turn_delay, Duration::from_millis(250));
        assert_eq!(config.turn_timeout, Some(Duration::from_secs(45)));
        assert_eq!(config.max_raids, 7);
        assert!(config.debug_default);
    }

    #[test]
    fn test_cli_overrides_env() {
        let config = Config::from_sources(&args(&["bin", "--port", "9000", "--debug"]), |k| {
            (k == "PORT").then(|| "8080".to_string())
        });
        assert_eq!(config.port, 9000);
        assert!(config.debug_default);
    }

    #[test]
    fn test_zero_timeout_means_none() {
        let config = Config::from_sources(&args(&["bin"]), |k| {
            (k == "TURN_TIMEOUT_SECS").then(|| "0".to_string())
        });
        assert_eq!(config.turn_timeout, None);
    }
}
