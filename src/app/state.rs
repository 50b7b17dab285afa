// ==========================================
// 服务排程编排系统 - 应用状态
// ==========================================
// 职责: 组装目录、SQLite 存储、算法台账、编排器与默认策略集
// 启动顺序:
// 1. 打开数据库并建表（排程与台账共享一个连接）
// 2. 从存储恢复算法台账
// 3. 逐个初始化并注册策略（失败的策略被排除，不影响启动）
// 4. 排程API挂接模式匹配反馈（采用结果回灌样本集）
// ==========================================

use std::path::Path;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::api::{ApiError, ApiResult, ScheduleApi};
use crate::config::SchedulerConfig;
use crate::db::{ensure_schema, open_sqlite_connection};
use crate::engine::error::SchedulingResult;
use crate::engine::ledger::PerformanceLedger;
use crate::engine::orchestrator::SchedulingOrchestrator;
use crate::engine::repositories::SchedulingRepositories;
use crate::engine::strategies::{
    EvolutionaryStrategy, ExternalAdvisorStrategy, HeuristicGreedyStrategy, PatternMatchStrategy,
    RuleEngineStrategy,
};
use crate::engine::strategy::SchedulingStrategy;
use crate::importer::load_directory;
use crate::repository::memory::InMemoryDirectory;
use crate::repository::metrics_repo::SqliteMetricsStore;
use crate::repository::schedule_repo::SqliteScheduleStore;

/// 应用状态
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    pub config: SchedulerConfig,

    /// 合作方/服务点/合同/历史目录
    pub directory: Arc<InMemoryDirectory>,

    pub schedule_store: Arc<SqliteScheduleStore>,
    pub metrics_store: Arc<SqliteMetricsStore>,

    pub ledger: Arc<PerformanceLedger>,
    pub orchestrator: Arc<SchedulingOrchestrator>,

    /// 模式匹配策略句柄（用于反馈与重训练）
    pub pattern_strategy: Option<Arc<PatternMatchStrategy>>,

    /// 排程API
    pub schedule_api: Arc<ScheduleApi>,
}

impl AppState {
    /// 从 CSV 数据目录创建
    pub async fn from_data_dir(data_dir: &Path, config: SchedulerConfig) -> ApiResult<Self> {
        let directory = load_directory(data_dir)?;
        Self::new(directory, config).await
    }

    pub async fn new(directory: InMemoryDirectory, config: SchedulerConfig) -> ApiResult<Self> {
        let db_path = config.resolved_db_path();
        info!(db_path = %db_path, "初始化AppState");

        let conn = open_sqlite_connection(&db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(format!("无法打开数据库: {}", e)))?;
        ensure_schema(&conn)
            .map_err(|e| ApiError::DatabaseError(format!("数据库建表失败: {}", e)))?;
        let conn = Arc::new(Mutex::new(conn));

        // ==========================================
        // 初始化存储与台账
        // ==========================================
        let schedule_store = Arc::new(SqliteScheduleStore::from_connection(conn.clone()));
        let metrics_store = Arc::new(SqliteMetricsStore::from_connection(conn));

        let ledger = Arc::new(PerformanceLedger::with_store(metrics_store.clone()));
        let restored = ledger.restore().await?;

        let directory = Arc::new(directory);
        let repos = SchedulingRepositories::from_directory(directory.clone(), schedule_store.clone());

        // ==========================================
        // 注册默认策略集
        // ==========================================
        let mut orchestrator =
            SchedulingOrchestrator::new(repos, ledger.clone(), config.orchestrator_settings());

        register_logged(&mut orchestrator, &config, HeuristicGreedyStrategy::new()).await;
        register_logged(&mut orchestrator, &config, EvolutionaryStrategy::new()).await;
        register_logged(&mut orchestrator, &config, RuleEngineStrategy::new()).await;
        let pattern_strategy =
            register_logged(&mut orchestrator, &config, PatternMatchStrategy::new()).await;
        register_logged(&mut orchestrator, &config, ExternalAdvisorStrategy::new()).await;

        // 已注册策略的版本与参数落盘（不影响累计计数）
        for record in ledger.snapshot() {
            metrics_store.upsert_identity(&record)?;
        }

        info!(
            registered = ?orchestrator.strategy_ids(),
            excluded = orchestrator.excluded().len(),
            restored_records = restored,
            "AppState 初始化完成"
        );

        let orchestrator = Arc::new(orchestrator);
        let mut schedule_api =
            ScheduleApi::new(orchestrator.clone()).with_schedule_reader(schedule_store.clone());
        if let Some(strategy) = pattern_strategy.clone() {
            schedule_api = schedule_api.with_pattern_feedback(strategy);
        }
        let schedule_api = Arc::new(schedule_api);

        Ok(Self {
            db_path,
            config,
            directory,
            schedule_store,
            metrics_store,
            ledger,
            orchestrator,
            pattern_strategy,
            schedule_api,
        })
    }

    /// 重训练模式匹配模型，返回形成的模式数（未注册时为 None）
    pub fn retrain_pattern_model(&self) -> SchedulingResult<Option<usize>> {
        self.pattern_strategy
            .as_ref()
            .map(|strategy| strategy.retrain())
            .transpose()
    }
}

/// 注册单个策略；初始化失败只记录日志，策略被排除
async fn register_logged<S>(
    orchestrator: &mut SchedulingOrchestrator,
    config: &SchedulerConfig,
    strategy: S,
) -> Option<Arc<S>>
where
    S: SchedulingStrategy + 'static,
{
    let id = strategy.id().to_string();
    match orchestrator.register(strategy, &config.strategy(&id)).await {
        Ok(handle) => handle,
        Err(e) => {
            warn!(strategy = %id, error = %e, "策略未注册");
            None
        }
    }
}
