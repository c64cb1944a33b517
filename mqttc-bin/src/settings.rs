use std::ops::Deref;
use std::str::FromStr;

use config::{Config, ConfigError, Environment, File};
use serde::de::{self, Deserializer};
use serde::Deserialize;

use mqttc::Options;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "Settings::url_default")]
    pub url: String,
    #[serde(default)]
    pub log: Log,
    #[serde(default)]
    pub client: Options,
}

impl Settings {
    fn url_default() -> String {
        "mqtt://127.0.0.1:1883".into()
    }

    /// `./mqttc.{toml,yaml,json}` if present, then `cfg_name`, then `MQTTC_*` variables.
    /// Nested keys use `__`, e.g. `MQTTC_CLIENT__KEEPALIVE=30s`.
    pub fn load(cfg_name: Option<&str>) -> Result<Settings, ConfigError> {
        let mut builder = Config::builder().add_source(File::with_name("mqttc").required(false));
        if let Some(cfg) = cfg_name {
            builder = builder.add_source(File::with_name(cfg));
        }
        builder
            .add_source(
                Environment::with_prefix("mqttc").prefix_separator("_").separator("__").try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    #[serde(default = "Log::to_default")]
    pub to: To,
    #[serde(default = "Log::level_default")]
    pub level: Level,
    #[serde(default = "Log::file_default")]
    pub file: String,
}

impl Default for Log {
    #[inline]
    fn default() -> Self {
        Self { to: Self::to_default(), level: Self::level_default(), file: Self::file_default() }
    }
}

impl Log {
    #[inline]
    fn to_default() -> To {
        To::Console
    }
    #[inline]
    fn level_default() -> Level {
        Level { inner: slog::Level::Info }
    }
    #[inline]
    fn file_default() -> String {
        "mqttc.log".into()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum To {
    Off,
    File,
    Console,
    Both,
}

impl<'de> Deserialize<'de> for To {
    #[inline]
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let to = match (String::deserialize(deserializer)?).to_ascii_lowercase().as_str() {
            "off" => To::Off,
            "file" => To::File,
            "console" => To::Console,
            _ => To::Both,
        };
        Ok(to)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Level {
    inner: slog::Level,
}

impl Level {
    #[inline]
    pub fn inner(&self) -> slog::Level {
        self.inner
    }
}

impl Deref for Level {
    type Target = slog::Level;
    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<'de> Deserialize<'de> for Level {
    #[inline]
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level = String::deserialize(deserializer)?;
        let inner = slog::Level::from_str(&level).map_err(|_| de::Error::custom(format!("invalid level, {level}")))?;
        Ok(Level { inner })
    }
}
