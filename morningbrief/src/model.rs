use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DigestError;

/// Title shown in every slot of a freshly created digest
pub const PLACEHOLDER_TITLE: &str = "请更新新闻标题";
/// Link shown in every slot of a freshly created digest
pub const PLACEHOLDER_LINK: &str = "#";

/// A single headline with its link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub link: String,
}

impl NewsItem {
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
        }
    }

    pub fn placeholder() -> Self {
        Self::new(PLACEHOLDER_TITLE, PLACEHOLDER_LINK)
    }
}

/// Partial update for one slot. Absent or empty fields keep the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsItemPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
}

impl NewsItemPatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            link: None,
        }
    }

    pub fn link(link: impl Into<String>) -> Self {
        Self {
            title: None,
            link: Some(link.into()),
        }
    }

    /// Apply this patch on top of `current`, field by field.
    pub fn apply(&self, current: &NewsItem) -> NewsItem {
        fn pick(new: &Option<String>, old: &str) -> String {
            match new.as_deref() {
                Some(v) if !v.is_empty() => v.to_string(),
                _ => old.to_string(),
            }
        }
        NewsItem {
            title: pick(&self.title, &current.title),
            link: pick(&self.link, &current.link),
        }
    }
}

/// Slot position within a section (news1..news3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    News1,
    News2,
    News3,
}

impl Slot {
    pub const ALL: [Slot; 3] = [Slot::News1, Slot::News2, Slot::News3];

    /// Slot for a 1-based position, if one exists.
    pub fn from_number(n: usize) -> Option<Self> {
        match n {
            1 => Some(Slot::News1),
            2 => Some(Slot::News2),
            3 => Some(Slot::News3),
            _ => None,
        }
    }

    pub fn number(self) -> usize {
        match self {
            Slot::News1 => 1,
            Slot::News2 => 2,
            Slot::News3 => 3,
        }
    }

    /// Storage key of the slot (`news1`..`news3`)
    pub fn key(self) -> &'static str {
        match self {
            Slot::News1 => "news1",
            Slot::News2 => "news2",
            Slot::News3 => "news3",
        }
    }
}

/// One category of the brief: exactly three news slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub news1: NewsItem,
    pub news2: NewsItem,
    pub news3: NewsItem,
}

impl Section {
    pub fn placeholder() -> Self {
        Self {
            news1: NewsItem::placeholder(),
            news2: NewsItem::placeholder(),
            news3: NewsItem::placeholder(),
        }
    }

    pub fn get(&self, slot: Slot) -> &NewsItem {
        match slot {
            Slot::News1 => &self.news1,
            Slot::News2 => &self.news2,
            Slot::News3 => &self.news3,
        }
    }

    pub fn get_mut(&mut self, slot: Slot) -> &mut NewsItem {
        match slot {
            Slot::News1 => &mut self.news1,
            Slot::News2 => &mut self.news2,
            Slot::News3 => &mut self.news3,
        }
    }

    /// Items in slot order
    pub fn items(&self) -> [&NewsItem; 3] {
        [&self.news1, &self.news2, &self.news3]
    }
}

/// The three fixed categories, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Policy,
    Industry,
    Tech,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Policy, Category::Industry, Category::Tech];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Policy => "policy",
            Category::Industry => "industry",
            Category::Tech => "tech",
        }
    }

    /// Human-readable section name
    pub fn display_name(self) -> &'static str {
        match self {
            Category::Policy => "宏观政策",
            Category::Industry => "产经动态",
            Category::Tech => "产技创新",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Category::Policy => "📊",
            Category::Industry => "💼",
            Category::Tech => "🔬",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "policy" => Ok(Category::Policy),
            "industry" => Ok(Category::Industry),
            "tech" => Ok(Category::Tech),
            other => Err(DigestError::UnknownCategory(other.to_string())),
        }
    }
}

/// The persisted aggregate: one date, three sections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsDigest {
    /// Subject date, `YYYY-MM-DD`
    pub date: String,
    /// RFC 3339 timestamp of the last save
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
    pub policy: Section,
    pub industry: Section,
    pub tech: Section,
}

impl NewsDigest {
    /// Fresh digest dated `now`, with the placeholder in all nine slots.
    pub fn placeholder(now: DateTime<Utc>) -> Self {
        Self {
            date: date_string(now),
            last_update: Some(timestamp_string(now)),
            policy: Section::placeholder(),
            industry: Section::placeholder(),
            tech: Section::placeholder(),
        }
    }

    pub fn section(&self, category: Category) -> &Section {
        match category {
            Category::Policy => &self.policy,
            Category::Industry => &self.industry,
            Category::Tech => &self.tech,
        }
    }

    pub fn section_mut(&mut self, category: Category) -> &mut Section {
        match category {
            Category::Policy => &mut self.policy,
            Category::Industry => &mut self.industry,
            Category::Tech => &mut self.tech,
        }
    }
}

/// Calendar date in the representation stored in `date`.
pub fn date_string(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

/// Timestamp in the representation stored in `lastUpdate`.
pub fn timestamp_string(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Millis, true)
}
