// ==========================================
// 排程编排器集成测试
// ==========================================
// 场景:
// - 五种真实策略并发执行，择优并写入存储
// - 单策略永不返回时，其余结果在超时窗口内返回
// - 全部策略失败时走综合评分兜底
// - 兜底也找不到合作方时返回明确错误
// - 请求校验失败在调度前中止
// - 违反日历约束的结果被拒绝
// - 同分按可靠度与策略标识决胜，相同请求结果稳定
// ==========================================

mod helpers;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{Datelike, Weekday};
use helpers::mock_strategies::{
    FailingStrategy, FixedPartnerStrategy, MisconfiguredStrategy, NeverReturningStrategy,
    OffCalendarStrategy,
};
use helpers::test_data_builder::{
    assert_visit_invariants, directory, history, period, request, PartnerBuilder,
};
use service_visit_aps::domain::result::StrategyRun;
use service_visit_aps::domain::types::{RunStatus, StrategyKind};
use service_visit_aps::domain::ScheduleRequest;
use service_visit_aps::engine::error::{SchedulingError, SchedulingResult};
use service_visit_aps::engine::strategies::advisor::prompt::AdvisorPrompt;
use service_visit_aps::engine::strategies::{
    AdvisorTransport, EvolutionaryStrategy, ExternalAdvisorStrategy, HeuristicGreedyStrategy,
    PatternMatchStrategy, RuleEngineStrategy,
};
use service_visit_aps::engine::{
    OrchestratorSettings, PerformanceLedger, SchedulingOrchestrator, SchedulingRepositories,
    StrategyConfig,
};
use service_visit_aps::repository::memory::{InMemoryDirectory, InMemoryMetricsStore, InMemoryScheduleStore};

// ==========================================
// 测试辅助函数
// ==========================================

struct StubAdvisor {
    reply: String,
    calls: AtomicUsize,
}

#[async_trait]
impl AdvisorTransport for StubAdvisor {
    async fn complete(&self, _prompt: &AdvisorPrompt) -> SchedulingResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

struct Harness {
    orchestrator: SchedulingOrchestrator,
    schedules: Arc<InMemoryScheduleStore>,
    metrics: Arc<InMemoryMetricsStore>,
}

fn harness(dir: Arc<InMemoryDirectory>, settings: OrchestratorSettings) -> Harness {
    let schedules = Arc::new(InMemoryScheduleStore::new());
    let metrics = Arc::new(InMemoryMetricsStore::new());
    let ledger = Arc::new(PerformanceLedger::with_store(metrics.clone()));
    let repos = SchedulingRepositories::from_directory(dir, schedules.clone());
    Harness {
        orchestrator: SchedulingOrchestrator::new(repos, ledger, settings),
        schedules,
        metrics,
    }
}

fn default_partners() -> Vec<service_visit_aps::domain::Partner> {
    vec![
        PartnerBuilder::new("A").city("Madrid").rate(40.0).build(),
        PartnerBuilder::new("B").city("Getafe").rate(35.0).build(),
        PartnerBuilder::new("C")
            .city("Sevilla")
            .specialty("Higiene Industrial")
            .rate(30.0)
            .build(),
    ]
}

async fn register_all_strategies(orchestrator: &mut SchedulingOrchestrator, advisor_reply: &str) {
    orchestrator
        .register(HeuristicGreedyStrategy::new(), &StrategyConfig::default())
        .await
        .unwrap();
    orchestrator
        .register(
            EvolutionaryStrategy::new(),
            &StrategyConfig::with_parameters(serde_json::json!({
                "population_size": 10,
                "generations": 5,
                "seed": 42
            })),
        )
        .await
        .unwrap();
    orchestrator
        .register(RuleEngineStrategy::new(), &StrategyConfig::default())
        .await
        .unwrap();
    orchestrator
        .register(PatternMatchStrategy::new(), &StrategyConfig::default())
        .await
        .unwrap();
    let transport = Arc::new(StubAdvisor {
        reply: advisor_reply.to_string(),
        calls: AtomicUsize::new(0),
    });
    orchestrator
        .register(
            ExternalAdvisorStrategy::with_transport(transport),
            &StrategyConfig::with_parameters(serde_json::json!({ "backoff_base_ms": 1 })),
        )
        .await
        .unwrap();
}

const ADVISOR_REPLY: &str = r#"{"recommended_partner_id":"A","confidence":0.8,"reasoning":"same city",
"visit_parameters":{"duration_hours":2.5,"visits_per_month":2,"preferred_start_time":"09:00"}}"#;

// ==========================================
// 测试用例
// ==========================================

#[tokio::test]
async fn test_all_strategies_run_and_winner_is_persisted() {
    let mut h = harness(
        directory(default_partners(), vec![history("H1", "A", 0.9)]),
        OrchestratorSettings::default(),
    );
    register_all_strategies(&mut h.orchestrator, ADVISOR_REPLY).await;
    assert_eq!(h.orchestrator.strategy_ids().len(), 5);

    let outcome = h.orchestrator.generate(&request()).await.unwrap();

    assert!(!outcome.used_fallback);
    assert_eq!(outcome.performance_comparison.len(), 5);
    assert_eq!(
        outcome.performance_comparison.iter().filter(|c| c.selected).count(),
        1
    );
    // 胜出者之外的四个运行作为备选返回
    assert_eq!(outcome.alternatives.len(), 4);

    let schedule = &outcome.schedule;
    assert!(["A", "B", "C"].contains(&schedule.partner_id.as_str()));
    assert_eq!(schedule.strategy_name, outcome.selected.strategy_id);
    assert!((0.0..=1.0).contains(&schedule.final_score));
    assert_visit_invariants(&schedule.visits, schedule.total_hours);

    // 已写入存储
    assert_eq!(h.schedules.schedule_count(), 1);
    let stored = h.schedules.find_schedule(&schedule.schedule_id).unwrap();
    assert_eq!(stored.partner_id, schedule.partner_id);
    assert_eq!(h.schedules.visits_for(&schedule.schedule_id).len(), schedule.visits.len());

    // 台账每个策略记一次，批量落盘一次
    let records = h.orchestrator.ledger().snapshot();
    assert_eq!(records.len(), 5);
    assert!(records.iter().all(|r| r.total_runs == 1));
    assert_eq!(h.metrics.batch_count(), 1);
}

#[tokio::test]
async fn test_never_returning_strategy_times_out() {
    let settings = OrchestratorSettings {
        strategy_timeout: Duration::from_millis(200),
        ..Default::default()
    };
    let mut h = harness(directory(default_partners(), Vec::new()), settings);
    h.orchestrator
        .register(NeverReturningStrategy::new("stuck"), &StrategyConfig::default())
        .await
        .unwrap();
    h.orchestrator
        .register(HeuristicGreedyStrategy::new(), &StrategyConfig::default())
        .await
        .unwrap();
    h.orchestrator
        .register(FixedPartnerStrategy::new("fixed", "B", 0.7, 0.9), &StrategyConfig::default())
        .await
        .unwrap();

    let started = Instant::now();
    let outcome = h.orchestrator.generate(&request()).await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_millis(200) + Duration::from_secs(2), "elapsed {:?}", elapsed);
    let stuck = outcome
        .performance_comparison
        .iter()
        .find(|c| c.strategy_id == "stuck")
        .unwrap();
    assert_eq!(stuck.status, RunStatus::TimedOut);
    assert!(!stuck.selected);
    assert_ne!(outcome.selected.strategy_id, "stuck");
    assert!(!outcome.used_fallback);

    // 超时计为一次不成功的运行
    let record = h.orchestrator.ledger().record("stuck").unwrap();
    assert_eq!(record.total_runs, 1);
    assert_eq!(record.successful_runs, 0);
}

#[tokio::test]
async fn test_all_failures_use_composite_fallback() {
    let mut h = harness(directory(default_partners(), Vec::new()), OrchestratorSettings::default());
    for (id, kind) in [
        ("linear_programming", StrategyKind::LinearProgramming),
        ("genetic_algorithm", StrategyKind::GeneticAlgorithm),
        ("machine_learning", StrategyKind::MachineLearning),
        ("rule_based", StrategyKind::RuleBased),
        ("llm_based", StrategyKind::LlmBased),
    ] {
        h.orchestrator
            .register(FailingStrategy::new(id, kind), &StrategyConfig::default())
            .await
            .unwrap();
    }

    let outcome = h.orchestrator.generate(&request()).await.unwrap();
    assert!(outcome.used_fallback);
    assert_eq!(outcome.selected.strategy_id, "fallback");
    assert_eq!(outcome.selected.kind, StrategyKind::Fallback);
    assert_eq!(outcome.alternatives.len(), 5);
    assert!(outcome
        .alternatives
        .iter()
        .all(|run| run.status == RunStatus::Failed && run.error.is_some()));
    assert!(outcome.performance_comparison.iter().all(|c| !c.selected));
    assert_visit_invariants(&outcome.schedule.visits, outcome.schedule.total_hours);
    assert_eq!(h.schedules.schedule_count(), 1);
}

#[tokio::test]
async fn test_infeasible_results_are_not_ranked() {
    let mut h = harness(directory(default_partners(), Vec::new()), OrchestratorSettings::default());
    h.orchestrator
        .register(
            FixedPartnerStrategy::new("weak", "C", 0.99, 0.99).infeasible(),
            &StrategyConfig::default(),
        )
        .await
        .unwrap();
    h.orchestrator
        .register(FixedPartnerStrategy::new("solid", "A", 0.5, 0.5), &StrategyConfig::default())
        .await
        .unwrap();

    let outcome = h.orchestrator.generate(&request()).await.unwrap();
    assert_eq!(outcome.selected.strategy_id, "solid");
    assert_eq!(outcome.schedule.partner_id, "A");
}

#[tokio::test]
async fn test_result_with_unknown_partner_is_rejected() {
    let mut h = harness(directory(default_partners(), Vec::new()), OrchestratorSettings::default());
    h.orchestrator
        .register(FixedPartnerStrategy::new("ghost", "ZZZ", 1.0, 1.0), &StrategyConfig::default())
        .await
        .unwrap();
    h.orchestrator
        .register(FixedPartnerStrategy::new("solid", "B", 0.4, 0.4), &StrategyConfig::default())
        .await
        .unwrap();

    let outcome = h.orchestrator.generate(&request()).await.unwrap();
    assert_eq!(outcome.selected.strategy_id, "solid");
    let ghost = outcome
        .alternatives
        .iter()
        .find(|r| r.strategy_id == "ghost")
        .unwrap();
    assert_eq!(ghost.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_no_candidates_is_no_feasible_schedule() {
    let partners = vec![PartnerBuilder::new("X").inactive().build()];
    let mut h = harness(directory(partners, Vec::new()), OrchestratorSettings::default());
    h.orchestrator
        .register(FailingStrategy::new("rule_based", StrategyKind::RuleBased), &StrategyConfig::default())
        .await
        .unwrap();

    let err = h.orchestrator.generate(&request()).await.unwrap_err();
    assert!(matches!(err, SchedulingError::NoFeasibleSchedule));
    assert_eq!(err.to_string(), "No feasible schedule found by any algorithm");
    assert_eq!(h.schedules.schedule_count(), 0);
}

#[tokio::test]
async fn test_validation_failure_stops_before_dispatch() {
    let mut h = harness(directory(default_partners(), Vec::new()), OrchestratorSettings::default());
    let failing = h
        .orchestrator
        .register(FailingStrategy::new("rule_based", StrategyKind::RuleBased), &StrategyConfig::default())
        .await
        .unwrap()
        .unwrap();

    let mut missing = request();
    missing.service_type = None;
    missing.end_date = None;
    match h.orchestrator.generate(&missing).await.unwrap_err() {
        SchedulingError::Validation(msg) => {
            assert!(msg.contains("service_type"));
            assert!(msg.contains("end_date"));
        }
        other => panic!("unexpected error: {other}"),
    }

    let unknown = ScheduleRequest {
        installation_code: Some("NOPE".to_string()),
        ..request()
    };
    assert!(matches!(
        h.orchestrator.generate(&unknown).await.unwrap_err(),
        SchedulingError::Validation(_)
    ));

    assert_eq!(failing.calls.load(Ordering::SeqCst), 0);
    assert!(h.orchestrator.ledger().snapshot().is_empty());
}

#[tokio::test]
async fn test_registration_rules() {
    let mut h = harness(directory(default_partners(), Vec::new()), OrchestratorSettings::default());

    let err = h
        .orchestrator
        .register(MisconfiguredStrategy, &StrategyConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SchedulingError::Configuration(_)));
    assert_eq!(h.orchestrator.excluded().len(), 1);

    let disabled = StrategyConfig {
        enabled: false,
        ..Default::default()
    };
    assert!(h
        .orchestrator
        .register(HeuristicGreedyStrategy::new(), &disabled)
        .await
        .unwrap()
        .is_none());

    h.orchestrator
        .register(HeuristicGreedyStrategy::new(), &StrategyConfig::default())
        .await
        .unwrap();
    assert!(matches!(
        h.orchestrator
            .register(HeuristicGreedyStrategy::new(), &StrategyConfig::default())
            .await
            .unwrap_err(),
        SchedulingError::Configuration(_)
    ));
    assert_eq!(h.orchestrator.strategy_ids(), vec!["linear_programming".to_string()]);
}

#[tokio::test]
async fn test_ledger_accumulates_runs_and_persists_each_batch() {
    let mut h = harness(directory(default_partners(), Vec::new()), OrchestratorSettings::default());
    h.orchestrator
        .register(FixedPartnerStrategy::new("steady", "A", 0.6, 0.6), &StrategyConfig::default())
        .await
        .unwrap();

    for _ in 0..3 {
        h.orchestrator.generate(&request()).await.unwrap();
    }
    let record = h.orchestrator.ledger().record("steady").unwrap();
    assert_eq!(record.total_runs, 3);
    assert_eq!(record.successful_runs, 3);
    // (3 + 1) / (3 + 2)
    assert!((h.orchestrator.ledger().reliability("steady") - 0.8).abs() < 1e-9);
    assert_eq!(h.metrics.batch_count(), 3);
    assert_eq!(h.schedules.schedule_count(), 3);
}

#[tokio::test]
async fn test_reliability_decides_between_equal_scores() {
    let mut h = harness(directory(default_partners(), Vec::new()), OrchestratorSettings::default());
    h.orchestrator
        .register(FixedPartnerStrategy::new("alpha", "A", 0.6, 0.6), &StrategyConfig::default())
        .await
        .unwrap();
    h.orchestrator
        .register(FixedPartnerStrategy::new("beta", "B", 0.6, 0.6), &StrategyConfig::default())
        .await
        .unwrap();

    // 可靠度相同时按策略标识
    let first = h.orchestrator.generate(&request()).await.unwrap();
    assert_eq!(first.selected.strategy_id, "alpha");
    assert_eq!(first.schedule.partner_id, "A");

    // alpha 之前失败三次: (1 + 1) / (4 + 2) < beta (1 + 1) / (1 + 2)
    let failures: Vec<StrategyRun> = (0..3)
        .map(|_| StrategyRun::failed("alpha", StrategyKind::RuleBased, "连接中断", 5))
        .collect();
    h.orchestrator.ledger().record_runs("HISTORY", &failures).await;
    assert!(h.orchestrator.ledger().reliability("alpha") < h.orchestrator.ledger().reliability("beta"));

    let second = h.orchestrator.generate(&request()).await.unwrap();
    assert_eq!(second.selected.strategy_id, "beta");
    assert_eq!(second.schedule.partner_id, "B");
}

#[tokio::test]
async fn test_equal_scores_rank_by_strategy_id_regardless_of_registration_order() {
    for ids in [["zeta", "eta"], ["eta", "zeta"]] {
        let mut h = harness(directory(default_partners(), Vec::new()), OrchestratorSettings::default());
        for (id, partner) in ids.iter().zip(["A", "B"]) {
            h.orchestrator
                .register(FixedPartnerStrategy::new(id, partner, 0.7, 0.7), &StrategyConfig::default())
                .await
                .unwrap();
        }
        let outcome = h.orchestrator.generate(&request()).await.unwrap();
        assert_eq!(outcome.selected.strategy_id, "eta");
    }
}

#[tokio::test]
async fn test_identical_requests_select_same_partner() {
    let mut picks = Vec::new();
    for _ in 0..2 {
        let mut h = harness(
            directory(
                default_partners(),
                (0..12).map(|i| history(&format!("H{}", i), "A", 0.8)).collect(),
            ),
            OrchestratorSettings::default(),
        );
        register_all_strategies(&mut h.orchestrator, ADVISOR_REPLY).await;
        let outcome = h.orchestrator.generate(&request()).await.unwrap();
        picks.push((outcome.selected.strategy_id.clone(), outcome.schedule.partner_id.clone()));
    }
    assert_eq!(picks[0], picks[1]);
}

#[tokio::test]
async fn test_repeated_generate_on_same_orchestrator_is_stable() {
    let mut h = harness(directory(default_partners(), Vec::new()), OrchestratorSettings::default());
    register_all_strategies(&mut h.orchestrator, ADVISOR_REPLY).await;

    let first = h.orchestrator.generate(&request()).await.unwrap();
    let second = h.orchestrator.generate(&request()).await.unwrap();
    assert_eq!(first.selected.strategy_id, second.selected.strategy_id);
    assert_eq!(first.schedule.partner_id, second.schedule.partner_id);
}

#[tokio::test]
async fn test_off_calendar_result_is_rejected() {
    let mut h = harness(directory(default_partners(), Vec::new()), OrchestratorSettings::default());
    h.orchestrator
        .register(OffCalendarStrategy::new("night_shift", "C"), &StrategyConfig::default())
        .await
        .unwrap();
    h.orchestrator
        .register(FixedPartnerStrategy::new("solid", "A", 0.3, 0.3), &StrategyConfig::default())
        .await
        .unwrap();

    let outcome = h.orchestrator.generate(&request()).await.unwrap();
    assert_eq!(outcome.selected.strategy_id, "solid");
    let night = outcome
        .alternatives
        .iter()
        .find(|r| r.strategy_id == "night_shift")
        .unwrap();
    assert_eq!(night.status, RunStatus::Failed);
    assert!(night.error.is_some());

    let (start, end) = period();
    for visit in &outcome.schedule.visits {
        assert!(visit.date >= start && visit.date <= end, "排程期外: {}", visit.date);
        assert!(!matches!(visit.date.weekday(), Weekday::Sat | Weekday::Sun));
    }
}

#[tokio::test]
async fn test_only_off_calendar_result_falls_back() {
    let mut h = harness(directory(default_partners(), Vec::new()), OrchestratorSettings::default());
    h.orchestrator
        .register(OffCalendarStrategy::new("night_shift", "C"), &StrategyConfig::default())
        .await
        .unwrap();

    let outcome = h.orchestrator.generate(&request()).await.unwrap();
    assert!(outcome.used_fallback);
    assert_eq!(outcome.selected.strategy_id, "fallback");
    let (start, end) = period();
    assert!(outcome
        .schedule
        .visits
        .iter()
        .all(|v| v.date >= start && v.date <= end && v.date.weekday() != Weekday::Sat));
    assert_eq!(h.schedules.schedule_count(), 1);
}
