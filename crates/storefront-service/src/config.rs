use std::collections::BTreeMap;
use std::env;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, de};
use tracing::level_filters::LevelFilter;
use url::Url;

/// The CMS instance used when nothing else is configured.
pub const DEFAULT_CMS_URL: &str = "https://exuberant-comfort-0c2f94bc2b.strapiapp.com";

/// Environment variable overriding [`CmsConfig::url`].
pub const CMS_URL_ENV: &str = "STOREFRONT_API_URL";

/// Requests to the CMS are never given less time than this.
pub const MIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Controls the log format
#[derive(Clone, Copy, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect (pretty for tty, simplified for other)
    Auto,
    /// With colors
    Pretty,
    /// Simplified log output
    Simplified,
    /// Dump out JSON lines
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Logging {
    /// The log level for the storefront.
    #[serde(deserialize_with = "deserialize_level_filter")]
    pub level: LevelFilter,
    /// Controls the log format.
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: LevelFilter::INFO,
            format: LogFormat::Auto,
        }
    }
}

/// Control the metrics.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Metrics {
    /// host/port of statsd instance
    pub statsd: Option<String>,
    /// The prefix that should be added to all metrics.
    pub prefix: String,
    /// A map containing custom tags and their values.
    ///
    /// These tags will be appended to every metric.
    pub custom_tags: BTreeMap<String, String>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            statsd: env::var("STATSD_SERVER").ok(),
            prefix: "storefront".into(),
            custom_tags: BTreeMap::new(),
        }
    }
}

/// Connection and caching settings for the headless CMS.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CmsConfig {
    /// Base URL of the CMS, without the `/api` prefix.
    pub url: Url,

    /// The timeout for a single request to the CMS.
    ///
    /// Values below [`MIN_REQUEST_TIMEOUT`] are raised to it.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// The locale that is sent along with every request.
    pub locale: String,

    /// How long a successful response is served from memory.
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
}

impl CmsConfig {
    /// The effective request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout.max(MIN_REQUEST_TIMEOUT)
    }
}

impl Default for CmsConfig {
    fn default() -> Self {
        CmsConfig {
            url: DEFAULT_CMS_URL.parse().expect("default CMS URL is valid"),
            timeout: MIN_REQUEST_TIMEOUT,
            locale: "ru".into(),
            cache_ttl: Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The CMS to fetch catalog data from.
    pub cms: CmsConfig,

    /// Configuration for internal logging.
    pub logging: Logging,

    /// Configuration for reporting metrics to a statsd instance.
    pub metrics: Metrics,
}

impl Config {
    /// Loads the configuration from `path`, or the defaults if no path is given.
    ///
    /// In both cases the [`CMS_URL_ENV`] environment variable takes precedence over the
    /// configured CMS URL.
    pub fn get(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_reader(
                fs::File::open(path).context("failed to open configuration file")?,
            )?,
            None => Config::default(),
        };

        if let Ok(url) = env::var(CMS_URL_ENV) {
            config.cms.url = url
                .parse()
                .with_context(|| format!("invalid URL in {CMS_URL_ENV}"))?;
        }

        Ok(config)
    }

    fn from_reader(mut reader: impl std::io::Read) -> Result<Self> {
        let mut config = String::new();
        reader
            .read_to_string(&mut config)
            .context("failed reading config file")?;
        // check for empty files explicitly
        if config.trim().is_empty() {
            anyhow::bail!("config file empty");
        }
        serde_yaml::from_str(&config).context("failed to parse config YAML")
    }
}

#[derive(Debug)]
struct LevelFilterVisitor;

impl de::Visitor<'_> for LevelFilterVisitor {
    type Value = LevelFilter;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> std::fmt::Result {
        write!(
            formatter,
            r#"one of the strings "off", "error", "warn", "info", "debug", or "trace""#
        )
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        match v {
            "off" => Ok(LevelFilter::OFF),
            "error" => Ok(LevelFilter::ERROR),
            "warn" => Ok(LevelFilter::WARN),
            "info" => Ok(LevelFilter::INFO),
            "debug" => Ok(LevelFilter::DEBUG),
            "trace" => Ok(LevelFilter::TRACE),
            _ => Err(de::Error::unknown_variant(
                v,
                &["off", "error", "warn", "info", "debug", "trace"],
            )),
        }
    }
}

fn deserialize_level_filter<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<LevelFilter, D::Error> {
    deserializer.deserialize_str(LevelFilterVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cms_config() {
        let cfg = Config::default();
        assert_eq!(cfg.cms, CmsConfig::default());
        assert_eq!(cfg.cms.cache_ttl, Duration::from_secs(300));

        // individual values can be set without affecting the other defaults
        let yaml = r#"
            cms:
              url: http://localhost:1337
              cache_ttl: 2m
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(cfg.cms.url.as_str(), "http://localhost:1337/");
        assert_eq!(cfg.cms.cache_ttl, Duration::from_secs(120));
        assert_eq!(cfg.cms.locale, "ru");
        assert_eq!(cfg.cms.timeout(), MIN_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_timeout_has_lower_bound() {
        let yaml = r#"
            cms:
              timeout: 5s
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(cfg.cms.timeout, Duration::from_secs(5));
        assert_eq!(cfg.cms.timeout(), MIN_REQUEST_TIMEOUT);

        let yaml = r#"
            cms:
              timeout: 1m
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(cfg.cms.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_logging_config() {
        let yaml = r#"
            logging:
              level: debug
              format: json
        "#;
        let cfg = Config::from_reader(yaml.as_bytes()).unwrap();
        assert_eq!(cfg.logging.level, LevelFilter::DEBUG);
        assert_eq!(cfg.logging.format, LogFormat::Json);

        let yaml = r#"
            logging:
              level: loud
        "#;
        assert!(Config::from_reader(yaml.as_bytes()).is_err());
    }

    #[test]
    fn test_empty_config_file() {
        assert!(Config::from_reader("  \n".as_bytes()).is_err());
    }
}
