use anyhow::Context;
use log::LevelFilter;
use serde::{de, Deserialize, Deserializer};
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub device_origin: String,
    #[serde(
        default = "default_reconnect_delay",
        deserialize_with = "deserialize_duration_from_str"
    )]
    pub reconnect_delay: Duration,
    #[serde(
        default = "default_request_timeout",
        deserialize_with = "deserialize_duration_from_str"
    )]
    pub request_timeout: Duration,
    #[serde(default = "default_true")]
    pub sync_time_on_start: bool,
    #[serde(
        default = "default_log_level",
        deserialize_with = "deserialize_level_filter_from_str"
    )]
    pub log_level: LevelFilter,
    #[serde(default)]
    pub use_syslog: bool,
}

fn default_reconnect_delay() -> Duration {
    Duration::from_millis(3000)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> LevelFilter {
    LevelFilter::Info
}

fn deserialize_duration_from_str<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    parse_duration::parse(s.as_str()).map_err(de::Error::custom)
}

fn deserialize_level_filter_from_str<'de, D>(deserializer: D) -> Result<LevelFilter, D::Error>
where
    D: Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    s.trim()
        .parse::<LevelFilter>()
        .map_err(|_| de::Error::custom(format!("unknown log level {}", s)))
}

impl Config {
    pub fn read_from_file(path: &str) -> anyhow::Result<Config> {
        let mut settings = config::Config::default();
        settings
            .merge(config::File::with_name(path))
            .with_context(|| format!("Config::read_from_file(): open file {}", path))?;
        settings
            .merge(config::Environment::with_prefix("HEATER_SYNC").separator("__"))
            .with_context(|| "Config::read_from_file(): environment")?;

        settings
            .get("main")
            .with_context(|| "Config::read_from_file(): deserialize")
    }
}
