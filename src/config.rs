use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::PathBuf;

/// Parser configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Bind the IPv4 ICMP dispatch callback
    pub icmp: bool,
    /// Bind the ICMPv6 dispatch callback
    pub icmpv6: bool,
    /// Category the ICMP fields are declared under
    pub field_category: String,
    /// File the configuration was read from
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            icmp: true,
            icmpv6: true,
            field_category: "general".to_string(),
            config_path: None,
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let config_path = if let Some(path) = path {
            PathBuf::from(path)
        } else {
            Self::find_config_file()?
        };

        if !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let mut config = Self::parse(&content);
        config.config_path = Some(config_path);
        Ok(config)
    }

    /// Parse `key: value` lines on top of the defaults
    pub fn parse(content: &str) -> Self {
        let mut config = Config::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(pos) = line.find(':') {
                let key = line[..pos].trim();
                let value = line[pos + 1..].trim();

                match key {
                    "icmp" => {
                        if let Some(enabled) = parse_bool(value) {
                            config.icmp = enabled;
                        }
                    }
                    "icmpv6" => {
                        if let Some(enabled) = parse_bool(value) {
                            config.icmpv6 = enabled;
                        }
                    }
                    "field_category" => {
                        if !value.is_empty() {
                            config.field_category = value.to_string();
                        }
                    }
                    _ => {
                        log::debug!("Ignoring unknown config key: {}", key);
                    }
                }
            }
        }

        config
    }

    /// Find configuration file
    fn find_config_file() -> Result<PathBuf> {
        // Try XDG config directory first
        if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            let xdg_path = PathBuf::from(xdg_config).join("icmp-sessions/config.yml");
            if xdg_path.exists() {
                return Ok(xdg_path);
            }
        }

        let home = Self::get_home_dir()?;
        let home_config = home.join(".config/icmp-sessions/config.yml");
        if home_config.exists() {
            return Ok(home_config);
        }

        let current_config = PathBuf::from("icmp-sessions.yml");
        if current_config.exists() {
            return Ok(current_config);
        }

        Ok(home_config)
    }

    /// Get home directory
    fn get_home_dir() -> Result<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            return Ok(PathBuf::from(home));
        }

        if let Ok(userprofile) = std::env::var("USERPROFILE") {
            return Ok(PathBuf::from(userprofile));
        }

        Err(anyhow!("Could not determine home directory"))
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}
