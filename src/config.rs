use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Path to the feed list (text format, `#` lines open categories)
    #[serde(default = "default_feed_file")]
    pub feed_file: String,
    /// Bundled copy used to seed the feed list when it is missing
    #[serde(default)]
    pub seed_file: Option<String>,
    /// Scheduled refresh interval in minutes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    /// Cache time-to-live in minutes
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl: u64,
    /// Shorter time-to-live used after a failed rebuild, in minutes
    #[serde(default = "default_error_cache_ttl")]
    pub error_cache_ttl: u64,
    #[serde(default = "default_entries_per_page")]
    pub entries_per_page: usize,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_feed_file() -> String {
    "feeds.txt".to_string()
}

fn default_refresh_interval() -> u64 {
    30
}

fn default_cache_ttl() -> u64 {
    30
}

fn default_error_cache_ttl() -> u64 {
    5
}

fn default_entries_per_page() -> usize {
    9
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_file: default_feed_file(),
            seed_file: None,
            refresh_interval: default_refresh_interval(),
            cache_ttl: default_cache_ttl(),
            error_cache_ttl: default_error_cache_ttl(),
            entries_per_page: default_entries_per_page(),
            bind_addr: default_bind_addr(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.feed_file, "feeds.txt");
        assert_eq!(config.refresh_interval, 30);
        assert_eq!(config.cache_ttl, 30);
        assert_eq!(config.error_cache_ttl, 5);
        assert_eq!(config.entries_per_page, 9);
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert!(config.seed_file.is_none());
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
            feed_file = "data/feed-urls.txt"
            seed_file = "data/feed-urls.seed.txt"
            refresh_interval = 15
            cache_ttl = 60
            entries_per_page = 12
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.feed_file, "data/feed-urls.txt");
        assert_eq!(config.seed_file.as_deref(), Some("data/feed-urls.seed.txt"));
        assert_eq!(config.refresh_interval, 15);
        assert_eq!(config.cache_ttl, 60);
        assert_eq!(config.entries_per_page, 12);
        // Untouched fields keep their defaults
        assert_eq!(config.error_cache_ttl, 5);
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
    }

    #[test]
    fn test_empty_config_uses_all_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.feed_file, "feeds.txt");
        assert_eq!(config.cache_ttl, 30);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let content = "this is not valid toml {{{";

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let result = Config::load(temp_file.path());
        assert!(result.is_err());
    }
}
