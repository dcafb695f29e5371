//! Digest persistence, updates, import/export and rendering entry points.
//!
//! # Invariants
//! - The digest lives under a single key; every write replaces the whole value.
//! - Updates validate category and slot before loading or writing anything.
//! - `load_data` never fails: missing, unreadable or malformed values yield the default digest.

use anyhow::Result;
use chrono::FixedOffset;
use common::{BriefConfig, Config};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::{DigestError, DigestResult};
use crate::model::{timestamp_string, Category, NewsDigest, NewsItem, NewsItemPatch, Slot};
use crate::render::{self, ApiDigest};
use crate::storage::KeyValueStore;

/// Result of an import: the typed digest, or the raw value when it does not have the
/// digest shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Imported {
    Digest(NewsDigest),
    Raw(Value),
}

impl Imported {
    pub fn digest(&self) -> Option<&NewsDigest> {
        match self {
            Imported::Digest(d) => Some(d),
            Imported::Raw(_) => None,
        }
    }

    pub fn into_digest(self) -> Option<NewsDigest> {
        match self {
            Imported::Digest(d) => Some(d),
            Imported::Raw(_) => None,
        }
    }
}

/// Owns access to the stored digest. Construct one per store and pass it around.
pub struct DigestManager {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    brief: BriefConfig,
    data_key: String,
    config_key: String,
    display_offset: FixedOffset,
}

impl DigestManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Result<Self> {
        Ok(Self {
            store,
            clock,
            display_offset: config.brief.display_offset()?,
            brief: config.brief.clone(),
            data_key: config.storage.data_key.clone(),
            config_key: config.storage.config_key.clone(),
        })
    }

    pub fn data_key(&self) -> &str {
        &self.data_key
    }

    /// Key reserved for persisted UI settings; no operation reads or writes it.
    pub fn config_key(&self) -> &str {
        &self.config_key
    }

    pub fn brief(&self) -> &BriefConfig {
        &self.brief
    }

    /// Digest dated today with the placeholder item in every slot.
    pub fn default_digest(&self) -> NewsDigest {
        NewsDigest::placeholder(self.clock.now())
    }

    /// Stored digest, `Ok(None)` if nothing is stored.
    pub async fn try_load_data(&self) -> DigestResult<Option<NewsDigest>> {
        let raw = self
            .store
            .get_item(&self.data_key)
            .await
            .map_err(DigestError::Storage)?;
        match raw {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(DigestError::Parse),
            None => Ok(None),
        }
    }

    /// Stored digest, or the default digest if none is usable.
    pub async fn load_data(&self) -> NewsDigest {
        match self.try_load_data().await {
            Ok(Some(digest)) => digest,
            Ok(None) => {
                debug!(key = %self.data_key, "no stored digest, using default");
                self.default_digest()
            }
            Err(e) => {
                warn!(%e, key = %self.data_key, "failed to load digest, using default");
                self.default_digest()
            }
        }
    }

    /// Stamp `lastUpdate` and persist `digest`.
    pub async fn save_data(&self, digest: &mut NewsDigest) -> DigestResult<()> {
        digest.last_update = Some(timestamp_string(self.clock.now()));
        let raw = serde_json::to_string(digest).map_err(DigestError::Serialize)?;
        self.write_raw(&raw).await?;
        info!(date = %digest.date, "digest saved");
        Ok(())
    }

    async fn write_raw(&self, raw: &str) -> DigestResult<()> {
        self.store.set_item(&self.data_key, raw).await.map_err(|e| {
            error!(e = %format!("{:#}", e), key = %self.data_key, "failed to save digest");
            DigestError::Storage(e)
        })
    }

    pub async fn clear_data(&self) -> DigestResult<()> {
        self.store
            .remove_item(&self.data_key)
            .await
            .map_err(DigestError::Storage)?;
        info!(key = %self.data_key, "digest cleared");
        Ok(())
    }

    /// Replace one slot. `slot` is 1-based.
    pub async fn update_single_news(
        &self,
        category: &str,
        slot: usize,
        title: &str,
        link: &str,
    ) -> DigestResult<()> {
        let category: Category = category.parse()?;
        let slot = Slot::from_number(slot).ok_or(DigestError::UnknownSlot(slot))?;

        let mut digest = self.load_data().await;
        *digest.section_mut(category).get_mut(slot) = NewsItem::new(title, link);
        self.save_data(&mut digest).await
    }

    /// Patch a section field by field. Item `i` targets slot `i + 1`; `None` entries, inputs
    /// past the third slot and empty fields are ignored.
    pub async fn update_category_news(
        &self,
        category: &str,
        items: &[Option<NewsItemPatch>],
    ) -> DigestResult<()> {
        let category: Category = category.parse()?;

        let mut digest = self.load_data().await;
        let section = digest.section_mut(category);
        for (i, patch) in items.iter().enumerate() {
            let Some(slot) = Slot::from_number(i + 1) else {
                debug!(position = i + 1, %category, "ignoring update past last slot");
                continue;
            };
            let Some(patch) = patch else {
                continue;
            };
            let updated = patch.apply(section.get(slot));
            *section.get_mut(slot) = updated;
        }
        self.save_data(&mut digest).await
    }

    /// Export file name for `digest` at the current instant.
    pub fn export_filename(&self, digest: &NewsDigest) -> String {
        format!(
            "{}_{}_{}.json",
            self.brief.export_prefix,
            file_safe(&digest.date),
            self.clock.now().timestamp_millis()
        )
    }

    /// Write the current digest as pretty JSON into `dir`. Returns the file name.
    pub async fn export_to_json(&self, dir: &Path) -> DigestResult<String> {
        let digest = self.load_data().await;
        let filename = self.export_filename(&digest);
        let body = serde_json::to_string_pretty(&digest).map_err(DigestError::Serialize)?;
        let path: PathBuf = dir.join(&filename);
        tokio::fs::write(&path, body)
            .await
            .map_err(|source| DigestError::Export {
                path: path.clone(),
                source,
            })?;
        info!(path = %path.display(), "digest exported");
        Ok(filename)
    }

    /// Read a JSON file, persist it, and return what was stored.
    pub async fn import_from_json(&self, path: &Path) -> DigestResult<Imported> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| DigestError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let imported = self.import_from_str(&text).await?;
        info!(
            path = %path.display(),
            typed = imported.digest().is_some(),
            "digest imported"
        );
        Ok(imported)
    }

    /// Persist any well-formed JSON value. Only malformed text is rejected, and then nothing
    /// is written. Objects get `lastUpdate` stamped; other values are stored as given.
    pub async fn import_from_str(&self, text: &str) -> DigestResult<Imported> {
        let mut value: Value = serde_json::from_str(text).map_err(|e| {
            warn!(%e, "rejected digest import");
            DigestError::Parse(e)
        })?;
        if let Value::Object(map) = &mut value {
            map.insert(
                "lastUpdate".to_string(),
                Value::String(timestamp_string(self.clock.now())),
            );
        }
        let raw = serde_json::to_string(&value).map_err(DigestError::Serialize)?;
        self.write_raw(&raw).await?;

        match serde_json::from_value::<NewsDigest>(value.clone()) {
            Ok(digest) => Ok(Imported::Digest(digest)),
            Err(e) => {
                warn!(%e, "imported value is not a digest; later loads use the default");
                Ok(Imported::Raw(value))
            }
        }
    }

    pub async fn generate_api_data(&self) -> ApiDigest {
        render::api_data(&self.load_data().await, &self.brief)
    }

    pub async fn generate_wechat_message(&self) -> String {
        render::wechat_message(&self.load_data().await, &self.brief)
    }

    pub async fn generate_markdown(&self) -> String {
        render::markdown(&self.load_data().await, &self.brief)
    }

    pub async fn is_today(&self) -> bool {
        render::is_today(&self.load_data().await, self.clock.now())
    }

    pub async fn get_last_update_time(&self) -> String {
        render::last_update_display(&self.load_data().await, self.display_offset)
    }
}

fn file_safe(s: &str) -> String {
    s.chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '-' } else { c })
        .collect()
}
