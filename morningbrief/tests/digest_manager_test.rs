use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use common::Config;
use morningbrief::model::PLACEHOLDER_TITLE;
use morningbrief::{
    Category, DigestError, DigestManager, FixedClock, Imported, KeyValueStore, MemoryStore,
    NewsItem, NewsItemPatch,
};
use std::sync::Arc;

struct Harness {
    store: Arc<MemoryStore>,
    clock: Arc<FixedClock>,
    manager: DigestManager,
}

fn setup_with_store(store: MemoryStore) -> Harness {
    let store = Arc::new(store);
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
    ));
    let manager = DigestManager::new(store.clone(), clock.clone(), &Config::default())
        .expect("Failed to build manager");
    Harness {
        store,
        clock,
        manager,
    }
}

fn setup() -> Harness {
    setup_with_store(MemoryStore::new())
}

/// Store whose reads and writes always fail
struct BrokenStore;

#[async_trait]
impl KeyValueStore for BrokenStore {
    async fn get_item(&self, _key: &str) -> Result<Option<String>> {
        Err(anyhow!("disk on fire"))
    }
    async fn set_item(&self, _key: &str, _value: &str) -> Result<()> {
        Err(anyhow!("disk on fire"))
    }
    async fn remove_item(&self, _key: &str) -> Result<()> {
        Err(anyhow!("disk on fire"))
    }
}

#[tokio::test]
async fn test_empty_store_yields_placeholder_digest() {
    let h = setup();
    let digest = h.manager.load_data().await;

    assert_eq!(digest.date, "2024-06-01");
    for category in Category::ALL {
        for item in digest.section(category).items() {
            assert_eq!(item, &NewsItem::new(PLACEHOLDER_TITLE, "#"));
        }
    }
    assert!(h.manager.try_load_data().await.unwrap().is_none());
}

#[tokio::test]
async fn test_save_then_load_refreshes_last_update() {
    let h = setup();
    let mut digest = h.manager.load_data().await;
    digest.industry.news2 = NewsItem::new("Module prices fall", "https://example.com/prices");
    let before = digest.last_update.clone();

    h.clock.advance(Duration::seconds(90));
    h.manager.save_data(&mut digest).await.expect("save");

    let loaded = h.manager.load_data().await;
    assert_eq!(loaded, digest);
    assert_eq!(loaded.last_update.as_deref(), Some("2024-06-01T08:01:30.000Z"));
    assert!(loaded.last_update > before);
}

#[tokio::test]
async fn test_update_single_news_touches_one_slot() {
    let h = setup();
    h.manager
        .update_single_news("policy", 2, "T", "L")
        .await
        .expect("update");

    let digest = h.manager.load_data().await;
    assert_eq!(digest.policy.news2, NewsItem::new("T", "L"));

    let untouched: Vec<&NewsItem> = Category::ALL
        .into_iter()
        .flat_map(|c| digest.section(c).items())
        .filter(|item| item.title == PLACEHOLDER_TITLE)
        .collect();
    assert_eq!(untouched.len(), 8);
}

#[tokio::test]
async fn test_update_category_news_is_field_wise() {
    let h = setup();
    h.manager
        .update_single_news("tech", 2, "Keep me", "https://keep")
        .await
        .unwrap();

    let patches = vec![
        Some(NewsItemPatch::title("A")),
        Some(NewsItemPatch::default()),
        Some(NewsItemPatch::link("X")),
    ];
    h.manager
        .update_category_news("tech", &patches)
        .await
        .expect("update category");

    let tech = h.manager.load_data().await.tech;
    assert_eq!(tech.news1, NewsItem::new("A", "#"));
    assert_eq!(tech.news2, NewsItem::new("Keep me", "https://keep"));
    assert_eq!(tech.news3, NewsItem::new(PLACEHOLDER_TITLE, "X"));
}

#[tokio::test]
async fn test_update_category_news_ignores_extra_items_and_empty_strings() {
    let h = setup();
    let patches = vec![
        Some(NewsItemPatch {
            title: Some(String::new()),
            link: Some("https://one".into()),
        }),
        Some(NewsItemPatch::default()),
        Some(NewsItemPatch::default()),
        Some(NewsItemPatch::title("ignored")),
    ];
    h.manager.update_category_news("policy", &patches).await.unwrap();

    let policy = h.manager.load_data().await.policy;
    assert_eq!(policy.news1, NewsItem::new(PLACEHOLDER_TITLE, "https://one"));
    assert!(policy.items().iter().all(|i| i.title != "ignored"));
}

#[tokio::test]
async fn test_update_category_news_skips_null_entries() {
    let h = setup();
    h.manager
        .update_single_news("industry", 1, "Stays", "https://stays")
        .await
        .unwrap();

    let patches: Vec<Option<NewsItemPatch>> =
        serde_json::from_str(r#"[null, {"link": "X"}, null]"#).expect("parse patches");
    h.manager
        .update_category_news("industry", &patches)
        .await
        .expect("update category");

    let industry = h.manager.load_data().await.industry;
    assert_eq!(industry.news1, NewsItem::new("Stays", "https://stays"));
    assert_eq!(industry.news2, NewsItem::new(PLACEHOLDER_TITLE, "X"));
    assert_eq!(industry.news3, NewsItem::placeholder());
}

#[tokio::test]
async fn test_unknown_category_leaves_store_unmodified() {
    let h = setup();
    let err = h
        .manager
        .update_single_news("nonexistent", 1, "T", "L")
        .await
        .unwrap_err();
    assert!(matches!(err, DigestError::UnknownCategory(ref c) if c == "nonexistent"));
    assert_eq!(h.store.get_item(h.manager.data_key()).await.unwrap(), None);

    let err = h
        .manager
        .update_category_news("nonexistent", &[Some(NewsItemPatch::title("A"))])
        .await
        .unwrap_err();
    assert!(matches!(err, DigestError::UnknownCategory(_)));
    assert_eq!(h.store.get_item(h.manager.data_key()).await.unwrap(), None);
}

#[tokio::test]
async fn test_markdown_contains_link_line() {
    let h = setup();
    h.manager
        .update_single_news("policy", 1, "Foo", "http://x")
        .await
        .unwrap();
    let md = h.manager.generate_markdown().await;
    assert!(md.contains("1. [Foo](http://x)"));
    assert!(md.starts_with("# 光伏早报 6月1日"));
}

#[tokio::test]
async fn test_wechat_and_api_follow_stored_digest() {
    let h = setup();
    h.manager
        .update_single_news("industry", 3, "New fab opens", "https://fab")
        .await
        .unwrap();

    let msg = h.manager.generate_wechat_message().await;
    assert!(msg.contains("💼 产经动态\n1. 请更新新闻标题\n2. 请更新新闻标题\n3. New fab opens\n"));
    assert!(msg.ends_with("详情点击：http://localhost:8000/index.html"));

    let api = h.manager.generate_api_data().await;
    assert_eq!(api.sections[1].kind, Category::Industry);
    assert_eq!(api.sections[1].news[2], NewsItem::new("New fab opens", "https://fab"));
    assert_eq!(api.update_time.as_deref(), Some("2024-06-01T08:00:00.000Z"));
}

#[tokio::test]
async fn test_is_today_tracks_date() {
    let h = setup();
    let mut digest = h.manager.load_data().await;
    h.manager.save_data(&mut digest).await.unwrap();
    assert!(h.manager.is_today().await);

    digest.date = "2024-05-31".into();
    h.manager.save_data(&mut digest).await.unwrap();
    assert!(!h.manager.is_today().await);

    h.clock.set(Utc.with_ymd_and_hms(2024, 5, 31, 12, 0, 0).unwrap());
    assert!(h.manager.is_today().await);
}

#[tokio::test]
async fn test_last_update_time_display() {
    let h = setup();
    let mut digest = h.manager.load_data().await;
    h.manager.save_data(&mut digest).await.unwrap();
    // 08:00 UTC shown in UTC+8
    assert_eq!(h.manager.get_last_update_time().await, "2024/6/1 16:00:00");

    digest.last_update = None;
    h.store
        .set_item(h.manager.data_key(), &serde_json::to_string(&digest).unwrap())
        .await
        .unwrap();
    assert_eq!(h.manager.get_last_update_time().await, "未知");
}

#[tokio::test]
async fn test_malformed_import_keeps_previous_digest() {
    let h = setup();
    h.manager
        .update_single_news("tech", 1, "Perovskite record", "https://pv")
        .await
        .unwrap();
    let before = h.store.get_item(h.manager.data_key()).await.unwrap();

    let err = h.manager.import_from_str("{ this is not json").await.unwrap_err();
    assert!(matches!(err, DigestError::Parse(_)));
    assert_eq!(h.store.get_item(h.manager.data_key()).await.unwrap(), before);
}

#[tokio::test]
async fn test_import_accepts_well_formed_json_of_any_shape() {
    let h = setup();
    h.clock.advance(Duration::minutes(1));

    let imported = h
        .manager
        .import_from_str(r#"{"date":"x","foo":1}"#)
        .await
        .expect("well-formed JSON is accepted");
    let Imported::Raw(value) = &imported else {
        panic!("expected raw value, got {:?}", imported);
    };
    assert_eq!(value["foo"], 1);
    assert_eq!(value["lastUpdate"], "2024-06-01T08:01:00.000Z");

    // Persisted as given, but not usable as a digest.
    let raw = h.store.get_item(h.manager.data_key()).await.unwrap().expect("stored");
    let stored: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(&stored, value);
    assert!(matches!(h.manager.try_load_data().await, Err(DigestError::Parse(_))));
    assert_eq!(h.manager.load_data().await, h.manager.default_digest());

    // Non-object values are stored unstamped.
    let imported = h.manager.import_from_str("[1, 2]").await.expect("array accepted");
    assert_eq!(imported, Imported::Raw(serde_json::json!([1, 2])));
    assert_eq!(
        h.store.get_item(h.manager.data_key()).await.unwrap().as_deref(),
        Some("[1,2]")
    );
}

#[tokio::test]
async fn test_import_missing_file_is_read_error() {
    let h = setup();
    let dir = tempfile::tempdir().unwrap();
    let err = h
        .manager
        .import_from_json(&dir.path().join("missing.json"))
        .await
        .unwrap_err();
    assert!(matches!(err, DigestError::Read { .. }));
}

#[tokio::test]
async fn test_export_then_import_roundtrip() {
    let h = setup();
    h.manager
        .update_single_news("policy", 3, "Subsidy extended", "https://gov")
        .await
        .unwrap();
    let dir = tempfile::tempdir().unwrap();

    let filename = h.manager.export_to_json(dir.path()).await.expect("export");
    assert!(filename.starts_with("光伏早报_2024-06-01_"));
    assert!(filename.ends_with(".json"));
    let body = tokio::fs::read_to_string(dir.path().join(&filename)).await.unwrap();
    assert!(body.contains("\n  \"date\": \"2024-06-01\""));

    h.manager.clear_data().await.unwrap();
    assert_eq!(h.manager.load_data().await.policy.news3.title, PLACEHOLDER_TITLE);

    h.clock.advance(Duration::minutes(5));
    let imported = h
        .manager
        .import_from_json(&dir.path().join(&filename))
        .await
        .expect("import")
        .into_digest()
        .expect("typed digest");
    assert_eq!(imported.policy.news3, NewsItem::new("Subsidy extended", "https://gov"));
    assert_eq!(imported.last_update.as_deref(), Some("2024-06-01T08:05:00.000Z"));
    assert_eq!(h.manager.load_data().await, imported);
}

#[tokio::test]
async fn test_quota_exceeded_save_reports_storage_error() {
    let h = setup_with_store(MemoryStore::with_quota(64));
    let mut digest = h.manager.load_data().await;
    let err = h.manager.save_data(&mut digest).await.unwrap_err();
    assert!(matches!(err, DigestError::Storage(_)));
    assert_eq!(h.store.get_item(h.manager.data_key()).await.unwrap(), None);
}

#[tokio::test]
async fn test_broken_store_degrades_to_default() {
    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
    ));
    let manager = DigestManager::new(Arc::new(BrokenStore), clock, &Config::default()).unwrap();

    assert!(matches!(manager.try_load_data().await, Err(DigestError::Storage(_))));
    assert_eq!(manager.load_data().await, manager.default_digest());
    assert!(matches!(
        manager.update_single_news("policy", 1, "T", "L").await,
        Err(DigestError::Storage(_))
    ));
    assert!(matches!(manager.clear_data().await, Err(DigestError::Storage(_))));
}
