//! Output formats for a digest: API object, plain-text chat message and Markdown card.
//!
//! All functions here are pure; the manager loads the digest and passes it in.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc};
use common::BriefConfig;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::model::{date_string, Category, NewsDigest, NewsItem};

/// Shown by [`last_update_display`] when no usable timestamp is stored
pub const UNKNOWN_UPDATE_TIME: &str = "未知";

const RULE: &str = "━━━━━━━━━━━━";

/// API-shaped digest consumed by messaging integrations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDigest {
    pub title: String,
    pub subtitle: String,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
    pub sections: Vec<ApiSection>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSection {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Category,
    pub news: Vec<NewsItem>,
}

pub fn api_data(digest: &NewsDigest, brief: &BriefConfig) -> ApiDigest {
    ApiDigest {
        title: brief.title.clone(),
        subtitle: brief.subtitle.clone(),
        date: digest.date.clone(),
        update_time: digest.last_update.clone(),
        sections: Category::ALL
            .into_iter()
            .map(|category| ApiSection {
                name: category.display_name().to_string(),
                kind: category,
                news: digest
                    .section(category)
                    .items()
                    .into_iter()
                    .cloned()
                    .collect(),
            })
            .collect(),
    }
}

/// Plain-text message: numbered titles per section, links omitted.
pub fn wechat_message(digest: &NewsDigest, brief: &BriefConfig) -> String {
    let mut message = format!("【{}】{}\n", brief.title, month_day(&digest.date));
    message.push_str(RULE);
    message.push_str("\n\n");

    for category in Category::ALL {
        message.push_str(&format!("{} {}\n", category.emoji(), category.display_name()));
        for (i, item) in digest.section(category).items().iter().enumerate() {
            message.push_str(&format!("{}. {}\n", i + 1, item.title));
        }
        message.push('\n');
    }

    message.push_str(RULE);
    message.push('\n');
    message.push_str(&format!("详情点击：{}", detail_link(&brief.site_origin)));
    message
}

/// Markdown card with `[title](link)` entries.
pub fn markdown(digest: &NewsDigest, brief: &BriefConfig) -> String {
    let mut out = format!("# {} {}\n\n", brief.title, month_day(&digest.date));
    out.push_str(&format!("> {}\n\n", brief.subtitle));

    let sections: Vec<String> = Category::ALL
        .into_iter()
        .map(|category| {
            let mut block = format!("## {} {}\n", category.emoji(), category.display_name());
            for (i, item) in digest.section(category).items().iter().enumerate() {
                block.push_str(&format!("{}. [{}]({})\n", i + 1, item.title, item.link));
            }
            block
        })
        .collect();
    out.push_str(&sections.join("\n"));
    out
}

/// True when the digest is dated on the UTC calendar day of `now`.
pub fn is_today(digest: &NewsDigest, now: DateTime<Utc>) -> bool {
    digest.date == date_string(now)
}

/// `lastUpdate` as `YYYY/M/D HH:MM:SS` in `offset`, or [`UNKNOWN_UPDATE_TIME`].
pub fn last_update_display(digest: &NewsDigest, offset: FixedOffset) -> String {
    digest
        .last_update
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| {
            ts.with_timezone(&offset)
                .format("%Y/%-m/%-d %H:%M:%S")
                .to_string()
        })
        .unwrap_or_else(|| UNKNOWN_UPDATE_TIME.to_string())
}

/// `{M}月{D}日` for a `YYYY-MM-DD` date; the raw string if it does not parse.
fn month_day(date: &str) -> String {
    match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        Ok(d) => format!("{}月{}日", d.month(), d.day()),
        Err(_) => date.to_string(),
    }
}

fn detail_link(site_origin: &Url) -> String {
    format!("{}/index.html", site_origin.origin().ascii_serialization())
}
