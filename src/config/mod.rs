//! Configuration
//!
//! Typed configuration loaded from environment variables, with defaults
//! for everything except the optional Discord token.

use crate::channels::DiscordConfig;
use crate::logging::LoggingConfig;
use crate::polls::OverwritePolicy;
use serde::{Deserialize, Serialize};

/// Environment variable selecting log verbosity
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "VOTEBOX_LOG_FORMAT";
pub const ENV_OVERWRITE_POLICY: &str = "VOTEBOX_OVERWRITE_POLICY";
pub const ENV_SWEEP_INTERVAL: &str = "VOTEBOX_SWEEP_INTERVAL_SECS";
pub const ENV_SWEEP_GRACE: &str = "VOTEBOX_SWEEP_GRACE_SECS";
pub const ENV_DISCORD_TOKEN: &str = "DISCORD_BOT_TOKEN";

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Session sweep settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Seconds between sweeps
    pub interval_secs: u64,
    /// Seconds a session is kept after it expires
    pub grace_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            grace_secs: 300,
        }
    }
}

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteboxConfig {
    pub logging: LoggingConfig,
    /// What happens when a vote starts in a channel that already has one
    #[serde(default)]
    pub overwrite_policy: OverwritePolicy,
    #[serde(default)]
    pub sweep: SweepConfig,
    /// Discord bot token, needed only for the Discord surface
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discord_token: Option<String>,
}

impl VoteboxConfig {
    /// Copy with secrets masked, for display
    pub fn redacted(&self) -> Self {
        Self {
            discord_token: self.discord_token.as_ref().map(|_| "***".to_string()),
            ..self.clone()
        }
    }

    /// Discord surface settings, when a bot token is configured
    pub fn discord(&self) -> Option<DiscordConfig> {
        self.discord_token.as_deref().map(DiscordConfig::new)
    }
}

/// Load configuration from the process environment
pub fn load_config() -> Result<VoteboxConfig, ConfigError> {
    load_from(|key| std::env::var(key).ok())
}

/// Load configuration through an arbitrary variable lookup
pub fn load_from(lookup: impl Fn(&str) -> Option<String>) -> Result<VoteboxConfig, ConfigError> {
    let mut config = VoteboxConfig::default();
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(level) = get(ENV_LOG_LEVEL) {
        config.logging.level = level.trim().to_string();
    }
    if let Some(format) = get(ENV_LOG_FORMAT) {
        config.logging.format = parse(ENV_LOG_FORMAT, &format)?;
    }
    if let Some(policy) = get(ENV_OVERWRITE_POLICY) {
        config.overwrite_policy = parse(ENV_OVERWRITE_POLICY, &policy)?;
    }
    if let Some(secs) = get(ENV_SWEEP_INTERVAL) {
        config.sweep.interval_secs = parse_secs(ENV_SWEEP_INTERVAL, &secs)?;
    }
    if let Some(secs) = get(ENV_SWEEP_GRACE) {
        config.sweep.grace_secs = parse(ENV_SWEEP_GRACE, &secs)?;
    }
    config.discord_token = get(ENV_DISCORD_TOKEN);

    Ok(config)
}

fn parse<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

fn parse_secs(key: &str, raw: &str) -> Result<u64, ConfigError> {
    let secs: u64 = parse(key, raw)?;
    if secs == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be greater than 0".to_string(),
        });
    }
    Ok(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogFormat;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<VoteboxConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        load_from(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Text);
        assert_eq!(config.overwrite_policy, OverwritePolicy::Replace);
        assert_eq!(config.sweep, SweepConfig::default());
        assert!(config.discord_token.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = load(&[
            ("LOG_LEVEL", "debug"),
            ("VOTEBOX_LOG_FORMAT", "json"),
            ("VOTEBOX_OVERWRITE_POLICY", "reject"),
            ("VOTEBOX_SWEEP_INTERVAL_SECS", "15"),
            ("VOTEBOX_SWEEP_GRACE_SECS", "0"),
            ("DISCORD_BOT_TOKEN", "abc"),
        ])
        .unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.overwrite_policy, OverwritePolicy::Reject);
        assert_eq!(config.sweep.interval_secs, 15);
        assert_eq!(config.sweep.grace_secs, 0);
        assert_eq!(config.discord_token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_invalid_values() {
        let err = load(&[("VOTEBOX_OVERWRITE_POLICY", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("VOTEBOX_OVERWRITE_POLICY"));

        assert!(load(&[("VOTEBOX_SWEEP_INTERVAL_SECS", "0")]).is_err());
        assert!(load(&[("VOTEBOX_SWEEP_GRACE_SECS", "soon")]).is_err());
    }

    #[test]
    fn test_blank_values_ignored() {
        let config = load(&[("LOG_LEVEL", "  "), ("DISCORD_BOT_TOKEN", "")]).unwrap();
        assert_eq!(config.logging.level, "info");
        assert!(config.discord_token.is_none());
    }

    #[test]
    fn test_redacted() {
        let config = load(&[("DISCORD_BOT_TOKEN", "secret")]).unwrap();
        let json = serde_json::to_string(&config.redacted()).unwrap();
        assert!(!json.contains("secret"));
        assert!(json.contains("***"));
    }

    #[test]
    fn test_discord_config_from_token() {
        assert!(load(&[]).unwrap().discord().is_none());

        let config = load(&[("DISCORD_BOT_TOKEN", "tok")]).unwrap();
        let discord = config.discord().unwrap();
        assert_eq!(discord.bot_token, "tok");
        assert!(crate::channels::DiscordChannel::new(discord).is_ok());
    }
}
