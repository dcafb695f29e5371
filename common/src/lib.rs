/*!
common/src/lib.rs

Shared configuration types and storage helpers for Morning Brief.

This file provides:
- Config data structures (deserialized from TOML)
- A loader that merges a default config file with an optional override
- A helper to open the SQLite database backing the persistent store
*/

use anyhow::{Context, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use url::Url;

/// Key under which the serialized digest is stored.
pub const DEFAULT_DATA_KEY: &str = "photovoltaic_news_data";
/// Reserved key for persisted UI configuration. Nothing reads it yet.
pub const DEFAULT_CONFIG_KEY: &str = "photovoltaic_config";

/// Storage configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the sqlite database file (e.g. "data/morningbrief.db")
    pub path: String,
    pub data_key: String,
    pub config_key: String,
    /// Byte quota for the in-memory store (`--ephemeral`). `None` means unlimited.
    pub quota_bytes: Option<usize>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: "data/morningbrief.db".to_string(),
            data_key: DEFAULT_DATA_KEY.to_string(),
            config_key: DEFAULT_CONFIG_KEY.to_string(),
            quota_bytes: None,
        }
    }
}

/// Branding and presentation settings used by the renderers and the exporter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BriefConfig {
    pub title: String,
    pub subtitle: String,
    /// File name prefix for exported JSON files
    pub export_prefix: String,
    /// Directory exported files are written to
    pub export_dir: String,
    /// Origin of the page hosting the brief; the plain-text footer links to `<origin>/index.html`
    pub site_origin: Url,
    /// Offset used when displaying the last update time (8 = China Standard Time)
    pub display_utc_offset_hours: i32,
}

impl Default for BriefConfig {
    fn default() -> Self {
        Self {
            title: "光伏早报".to_string(),
            subtitle: "30秒速读前沿新闻".to_string(),
            export_prefix: "光伏早报".to_string(),
            export_dir: ".".to_string(),
            site_origin: Url::parse("http://localhost:8000").expect("static url"),
            display_utc_offset_hours: 8,
        }
    }
}

impl BriefConfig {
    /// Resolve the configured display offset, rejecting values outside +/-23 hours.
    pub fn display_offset(&self) -> Result<FixedOffset> {
        self.display_utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .with_context(|| {
                format!(
                    "invalid display_utc_offset_hours: {}",
                    self.display_utc_offset_hours
                )
            })
    }
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub brief: BriefConfig,
}

impl Config {
    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence). Missing files are
    /// skipped, and any key left unset falls back to the built-in default.
    pub async fn load_with_defaults(
        default_path: Option<&Path>,
        override_path: Option<&Path>,
    ) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in [default_path, override_path].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value
            .try_into()
            .context("Failed to parse merged configuration")?;
        cfg.brief.display_offset()?;
        Ok(cfg)
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Initialize an SQLite connection pool.
///
/// Creates the parent directory if necessary and returns a small pool. A single writer is
/// assumed, so one connection is plenty.
///
/// Example:
///   let pool = init_db_pool("data/morningbrief.db").await?;
pub async fn init_db_pool(path: &str) -> Result<SqlitePool> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create DB parent directory: {}", parent.display())
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to sqlite database at path: {}", path))?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let cfg: Config = toml::from_str("").expect("parse config");
        assert_eq!(cfg.storage.data_key, DEFAULT_DATA_KEY);
        assert_eq!(cfg.storage.config_key, DEFAULT_CONFIG_KEY);
        assert_eq!(cfg.brief.title, "光伏早报");
        assert_eq!(cfg.brief.display_utc_offset_hours, 8);
        assert!(cfg.storage.quota_bytes.is_none());
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let toml = r#"
            [brief]
            site_origin = "https://brief.example.com"
        "#;
        let cfg: Config = toml::from_str(toml).expect("parse config");
        assert_eq!(cfg.brief.site_origin.as_str(), "https://brief.example.com/");
        assert_eq!(cfg.brief.subtitle, "30秒速读前沿新闻");
    }

    #[test]
    fn merge_prefers_override_values() {
        let mut base: toml::Value = toml::from_str(
            r#"
            [storage]
            path = "a.db"
            data_key = "k"
            "#,
        )
        .unwrap();
        let over: toml::Value = toml::from_str(
            r#"
            [storage]
            path = "b.db"
            "#,
        )
        .unwrap();
        merge_toml(&mut base, over);
        let cfg: Config = base.try_into().unwrap();
        assert_eq!(cfg.storage.path, "b.db");
        assert_eq!(cfg.storage.data_key, "k");
    }

    #[test]
    fn rejects_out_of_range_offset() {
        for hours in [24, 30, -24, 600_000, i32::MAX, i32::MIN] {
            let cfg = BriefConfig {
                display_utc_offset_hours: hours,
                ..BriefConfig::default()
            };
            assert!(cfg.display_offset().is_err(), "offset {} accepted", hours);
        }
        let cfg = BriefConfig {
            display_utc_offset_hours: -5,
            ..BriefConfig::default()
        };
        assert_eq!(cfg.display_offset().unwrap().local_minus_utc(), -5 * 3600);
    }

    #[tokio::test]
    async fn load_with_defaults_and_db_pool() {
        let dir = tempfile::tempdir().expect("tempdir");
        let default_path = dir.path().join("config.default.toml");
        let override_path = dir.path().join("config.toml");
        tokio::fs::write(&default_path, "[brief]\ntitle = \"Default\"\nsubtitle = \"Sub\"\n")
            .await
            .unwrap();
        tokio::fs::write(&override_path, "[brief]\ntitle = \"Override\"\n")
            .await
            .unwrap();

        let cfg = Config::load_with_defaults(Some(default_path.as_path()), Some(override_path.as_path()))
            .await
            .expect("load config");
        assert_eq!(cfg.brief.title, "Override");
        assert_eq!(cfg.brief.subtitle, "Sub");

        let missing = dir.path().join("nope.toml");
        let cfg = Config::load_with_defaults(Some(missing.as_path()), None)
            .await
            .expect("load defaults");
        assert_eq!(cfg.brief.title, "光伏早报");

        let db_path = dir.path().join("nested").join("brief.db");
        let pool = init_db_pool(&db_path.to_string_lossy()).await.expect("init pool");
        let conn = pool.acquire().await.expect("acquire conn");
        drop(conn);
    }
}
