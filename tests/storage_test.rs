// ==========================================
// SQLite 存储集成测试
// ==========================================
// 职责: 验证排程/访问写入与读取、算法指标批量落盘与台账恢复
// ==========================================

mod helpers;

use std::sync::Arc;

use chrono::{Local, NaiveTime};
use helpers::test_data_builder::{date, INSTALLATION_CODE};
use service_visit_aps::db::{ensure_schema, open_sqlite_connection, read_schema_version, CURRENT_SCHEMA_VERSION};
use service_visit_aps::domain::result::{StrategyResult, StrategyRun};
use service_visit_aps::domain::schedule::{total_hours, Schedule, Visit};
use service_visit_aps::domain::types::{StrategyKind, VisitType};
use service_visit_aps::engine::PerformanceLedger;
use service_visit_aps::repository::collaborators::{MetricsStore, ScheduleStore};
use service_visit_aps::repository::metrics_repo::SqliteMetricsStore;
use service_visit_aps::repository::schedule_repo::SqliteScheduleStore;
use tempfile::NamedTempFile;

// ==========================================
// 测试辅助函数
// ==========================================

fn temp_db() -> (NamedTempFile, String) {
    let file = NamedTempFile::new().unwrap();
    let path = file.path().to_str().unwrap().to_string();
    (file, path)
}

fn sample_schedule(id: &str) -> Schedule {
    let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
    let visits = vec![
        Visit::new(date(2026, 3, 3), nine, 2.5, VisitType::Initial),
        Visit::new(date(2026, 3, 10), nine, 2.5, VisitType::FollowUp).with_notes("revisión"),
        Visit::new(date(2026, 3, 24), nine, 2.0, VisitType::Final),
    ];
    Schedule {
        schedule_id: id.to_string(),
        partner_id: "B".to_string(),
        partner_name: "Partner B".to_string(),
        installation_code: INSTALLATION_CODE.to_string(),
        contract_code: "CT-1".to_string(),
        start_date: date(2026, 3, 1),
        end_date: date(2026, 3, 31),
        total_hours: total_hours(&visits),
        strategy_name: "rule_based".to_string(),
        final_score: 0.82,
        confidence: 0.77,
        visits,
        created_at: Local::now().naive_local(),
    }
}

fn run(id: &str, kind: StrategyKind, feasible: bool, score: f64) -> StrategyRun {
    let result = StrategyResult::new(
        id,
        kind,
        "A",
        "Partner A",
        score,
        feasible,
        0.6,
        Vec::new(),
        serde_json::json!({}),
    )
    .with_execution_time(40);
    StrategyRun::completed(result)
}

// ==========================================
// 测试用例
// ==========================================

#[test]
fn test_schema_is_idempotent() {
    let (_file, path) = temp_db();
    let conn = open_sqlite_connection(&path).unwrap();
    ensure_schema(&conn).unwrap();
    ensure_schema(&conn).unwrap();
    assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
}

#[tokio::test]
async fn test_schedule_round_trip_with_visits() {
    let (_file, path) = temp_db();
    let store = SqliteScheduleStore::new(&path).unwrap();

    let schedule = sample_schedule("S-1");
    let id = store.create_schedule(&schedule).await.unwrap();
    assert_eq!(id, "S-1");
    assert_eq!(store.create_visits(&id, &schedule.visits).await.unwrap(), 3);

    let loaded = store.find_by_id("S-1").unwrap().unwrap();
    assert_eq!(loaded.partner_id, "B");
    assert_eq!(loaded.visits, schedule.visits);
    assert!((loaded.total_hours - 7.0).abs() < 1e-9);
    assert_eq!(loaded.visits[1].notes.as_deref(), Some("revisión"));

    assert!(store.find_by_id("S-404").unwrap().is_none());
    assert_eq!(store.list_ids_by_installation(INSTALLATION_CODE).unwrap(), vec!["S-1".to_string()]);
}

#[tokio::test]
async fn test_duplicate_schedule_is_rejected() {
    let (_file, path) = temp_db();
    let store = SqliteScheduleStore::new(&path).unwrap();
    store.create_schedule(&sample_schedule("S-1")).await.unwrap();
    assert!(store.create_schedule(&sample_schedule("S-1")).await.is_err());
}

#[tokio::test]
async fn test_metrics_flush_and_ledger_restore() {
    let (_file, path) = temp_db();
    let store = Arc::new(SqliteMetricsStore::new(&path).unwrap());

    let ledger = PerformanceLedger::with_store(store.clone());
    ledger.register("rule_based", StrategyKind::RuleBased, "2.0.0", serde_json::json!({"strict_mode": true}));
    ledger
        .record_runs(
            "RUN-1",
            &[
                run("rule_based", StrategyKind::RuleBased, true, 0.8),
                run("genetic_algorithm", StrategyKind::GeneticAlgorithm, false, 0.3),
            ],
        )
        .await;
    ledger
        .record_runs("RUN-2", &[run("rule_based", StrategyKind::RuleBased, true, 0.6)])
        .await;

    assert_eq!(store.count_runs("RUN-1").unwrap(), 2);
    assert_eq!(store.count_runs("RUN-2").unwrap(), 1);

    let records = store.load_records().await.unwrap();
    assert_eq!(records.len(), 2);
    let rule = records.iter().find(|r| r.name == "rule_based").unwrap();
    assert_eq!(rule.total_runs, 2);
    assert_eq!(rule.successful_runs, 2);
    assert_eq!(rule.version, "2.0.0");
    assert!((rule.avg_score - 0.7).abs() < 1e-9);

    // 新实例从存储恢复后可靠度一致
    let restored = PerformanceLedger::with_store(store.clone());
    assert_eq!(restored.restore().await.unwrap(), 2);
    assert!((restored.reliability("rule_based") - ledger.reliability("rule_based")).abs() < 1e-12);
    assert!((restored.reliability("genetic_algorithm") - 1.0 / 3.0).abs() < 1e-12);
}

#[tokio::test]
async fn test_identity_upsert_keeps_counters() {
    let (_file, path) = temp_db();
    let store = Arc::new(SqliteMetricsStore::new(&path).unwrap());
    let ledger = PerformanceLedger::with_store(store.clone());
    ledger
        .record_runs("RUN-1", &[run("linear_programming", StrategyKind::LinearProgramming, true, 0.9)])
        .await;

    ledger.register(
        "linear_programming",
        StrategyKind::LinearProgramming,
        "1.1.0",
        serde_json::json!({"distance_penalty": 0.2}),
    );
    store
        .upsert_identity(&ledger.record("linear_programming").unwrap())
        .unwrap();

    let records = store.load_records().await.unwrap();
    assert_eq!(records[0].version, "1.1.0");
    assert_eq!(records[0].parameters["distance_penalty"], 0.2);
    assert_eq!(records[0].total_runs, 1);
}
