//! 记录库集成测试（SQLite 内存库 + 临时文件）
//!
//!   cargo test --test test_record_store

use std::sync::Arc;

use dragon_faith::db::blob_store::BlobStore;
use dragon_faith::db::database::Database;
use dragon_faith::models::record::{SentimentRecord, TopSector};
use dragon_faith::services::persistence::{PersistenceAnalyzer, SectorPersistence};
use dragon_faith::services::record_store::RecordStore;

fn open_store() -> (Arc<Database>, RecordStore) {
    let db = Arc::new(Database::open_in_memory().expect("内存库"));
    let store = RecordStore::new(db.clone(), "records_test");
    (db, store)
}

fn record(date: &str, sectors: &[&str]) -> SentimentRecord {
    let mut r = SentimentRecord::new(date);
    for (slot, name) in r.top_sectors.iter_mut().zip(sectors) {
        *slot = TopSector {
            name: name.to_string(),
            ..Default::default()
        };
    }
    r
}

#[test]
fn test_same_date_replaces_and_order_is_desc() {
    let (_db, store) = open_store();
    store.upsert(record("2024-03-06", &["AI"])).unwrap();
    store.upsert(record("2024-03-08", &["机器人"])).unwrap();
    store.upsert(record("2024-03-07", &["低空经济"])).unwrap();

    let mut replacement = record("2024-03-07", &["算力"]);
    replacement.limit_up_count = 77;
    let total = store.upsert(replacement).unwrap();
    assert_eq!(total, 3, "同日保存应替换而不是新增");

    let dates = store.dates().unwrap();
    assert_eq!(dates, vec!["2024-03-08", "2024-03-07", "2024-03-06"]);

    let r = store.require("2024-03-07").unwrap();
    assert_eq!(r.limit_up_count, 77);
    assert_eq!(r.top_sectors[0].name, "算力");
}

#[test]
fn test_records_survive_reopen_from_sqlite_blob() {
    let (db, store) = open_store();
    store.upsert(record("2024-03-08", &["AI"])).unwrap();

    let blob = db.load("records_test").unwrap().expect("已写入");
    assert!(blob.starts_with('['));

    let reopened = RecordStore::new(db.clone(), "records_test");
    assert_eq!(reopened.dates().unwrap(), vec!["2024-03-08"]);

    let other = RecordStore::new(db, "records_other");
    assert!(other.load_all().unwrap().is_empty(), "不同键互不影响");
}

#[test]
fn test_corrupt_blob_is_quarantined() {
    let (db, store) = open_store();
    db.save("records_test", "{not an array").unwrap();

    assert!(store.load_all().unwrap().is_empty());
    assert_eq!(db.load("records_test").unwrap().as_deref(), Some("[]"));

    // 备份键带时间戳，直接查 kv 表不方便，这里确认重置后可以正常写入
    store.upsert(record("2024-03-08", &[])).unwrap();
    assert_eq!(store.dates().unwrap().len(), 1);
}

#[test]
fn test_export_then_import_into_fresh_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.json");

    let (_db, store) = open_store();
    store.upsert(record("2024-03-07", &["AI"])).unwrap();
    store.upsert(record("2024-03-08", &["AI", "机器人"])).unwrap();
    assert_eq!(store.export_to(&path).unwrap(), 2);

    let (_db2, fresh) = open_store();
    fresh.upsert(record("2024-03-08", &["旧数据"])).unwrap();
    assert_eq!(fresh.import_from(&path).unwrap(), 2);

    let all = fresh.load_all().unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].top_sectors[1].name, "机器人", "导入覆盖同日记录");
}

#[test]
fn test_import_rejects_bad_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, r#"[{"date": "03/08"}]"#).unwrap();

    let (_db, store) = open_store();
    assert!(store.import_from(&path).is_err());
    assert!(store.import_from(&dir.path().join("missing.json")).is_err());
    assert!(store.load_all().unwrap().is_empty());
}

#[test]
fn test_persistence_over_stored_history() {
    let (_db, store) = open_store();
    store.upsert(record("2024-03-04", &["AI", "机器人"])).unwrap();
    store.upsert(record("2024-03-05", &["AI"])).unwrap();
    store.upsert(record("2024-03-06", &["AI", "机器人"])).unwrap();
    // 同日旧记录不参与统计
    store.upsert(record("2024-03-07", &["低空经济"])).unwrap();

    let current = record("2024-03-07", &["AI", "低空经济"]);
    let history = store.load_all().unwrap();
    let result = PersistenceAnalyzer::analyze(&current, &history);

    assert_eq!(
        result,
        vec![
            SectorPersistence { name: "AI".to_string(), count: 4 },
            SectorPersistence { name: "机器人".to_string(), count: 2 },
        ]
    );
}
