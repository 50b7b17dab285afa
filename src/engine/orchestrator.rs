// ==========================================
// 服务排程编排系统 - 排程编排器
// ==========================================
// 流程:
// 1. 校验请求（唯一前置检查）
// 2. 从协作方构造只读上下文（Arc 共享）
// 3. 每个策略一个任务并发执行，各自带超时；join-all 收集
// 4. 记账（同一把锁内更新，一次批量落盘）
// 5. 可行结果按 0.6×评分 + 0.25×置信度 + 0.15×可靠度 排名
// 6. 没有可行结果时走综合评分兜底；兜底也失败才返回错误
// 7. 胜出结果转为正式排程并写入存储
// ==========================================

use crate::domain::context::{ScheduleRequest, SchedulingContext, ValidatedRequest};
use crate::domain::result::{StrategyComparison, StrategyResult, StrategyRun};
use crate::domain::schedule::{total_hours, Schedule};
use crate::domain::types::StrategyKind;
use crate::engine::calendar::{self, CalendarViolation};
use crate::engine::error::{SchedulingError, SchedulingResult};
use crate::engine::ledger::PerformanceLedger;
use crate::engine::repositories::SchedulingRepositories;
use crate::engine::scoring::CompositeWeights;
use crate::engine::strategy::{composite_selection, SchedulingStrategy, StrategyConfig};
use crate::engine::validation::validate_schedule_request;
use chrono::Local;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// 兜底结果的策略标识
pub const FALLBACK_STRATEGY_ID: &str = "fallback";

// ==========================================
// 编排参数
// ==========================================

/// 排名权重
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankingWeights {
    pub score: f64,
    pub confidence: f64,
    pub reliability: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            score: 0.6,
            confidence: 0.25,
            reliability: 0.15,
        }
    }
}

impl RankingWeights {
    pub fn ranking_score(&self, result: &StrategyResult, reliability: f64) -> f64 {
        self.score * result.score + self.confidence * result.confidence + self.reliability * reliability
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub strategy_timeout: Duration,   // 单策略超时
    pub history_limit: usize,         // 读取历史排程条数
    pub ranking: RankingWeights,
    pub fallback_weights: CompositeWeights,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            strategy_timeout: Duration::from_secs(300),
            history_limit: 50,
            ranking: RankingWeights::default(),
            fallback_weights: CompositeWeights::default(),
        }
    }
}

// ==========================================
// OrchestrationOutcome - 编排结果
// ==========================================
#[derive(Debug, Clone, Serialize)]
pub struct OrchestrationOutcome {
    pub run_id: String,
    pub schedule: Schedule,                            // 已持久化的正式排程
    pub selected: StrategyResult,                      // 胜出结果
    pub used_fallback: bool,                           // 是否走了兜底
    pub alternatives: Vec<StrategyRun>,                // 其余全部运行
    pub performance_comparison: Vec<StrategyComparison>,
    #[serde(skip)]
    pub context: Arc<SchedulingContext>,               // 本次编排的上下文（供反馈学习）
}

/// 排名条目
#[derive(Debug, Clone)]
struct RankedEntry {
    index: usize,
    ranking_score: f64,
}

// ==========================================
// SchedulingOrchestrator - 排程编排器
// ==========================================
pub struct SchedulingOrchestrator {
    repos: SchedulingRepositories,
    ledger: Arc<PerformanceLedger>,
    settings: OrchestratorSettings,
    strategies: Vec<Arc<dyn SchedulingStrategy>>,
    excluded: Vec<(String, String)>,
}

impl SchedulingOrchestrator {
    pub fn new(repos: SchedulingRepositories, ledger: Arc<PerformanceLedger>, settings: OrchestratorSettings) -> Self {
        Self {
            repos,
            ledger,
            settings,
            strategies: Vec::new(),
            excluded: Vec::new(),
        }
    }

    /// 初始化并注册策略，返回带具体类型的句柄
    ///
    /// # 返回
    /// - Ok(Some(handle)): 注册成功
    /// - Ok(None): 配置中已禁用
    /// - Err(Configuration): 初始化失败，策略被排除
    pub async fn register<S>(&mut self, mut strategy: S, config: &StrategyConfig) -> SchedulingResult<Option<Arc<S>>>
    where
        S: SchedulingStrategy + 'static,
    {
        let id = strategy.id().to_string();
        if !config.enabled {
            info!(strategy = %id, "策略已在配置中禁用");
            return Ok(None);
        }
        if self.strategies.iter().any(|s| s.id() == id) {
            return Err(SchedulingError::Configuration(format!("策略重复注册: {}", id)));
        }

        if let Err(e) = strategy.initialize(config).await {
            warn!(strategy = %id, error = %e, "策略初始化失败，已排除");
            self.excluded.push((id, e.to_string()));
            return Err(e);
        }

        self.ledger
            .register(&id, strategy.kind(), strategy.version(), strategy.parameters());
        let handle = Arc::new(strategy);
        self.strategies.push(handle.clone());
        info!(strategy = %id, version = handle.version(), "策略已注册");
        Ok(Some(handle))
    }

    pub fn strategy_ids(&self) -> Vec<String> {
        self.strategies.iter().map(|s| s.id().to_string()).collect()
    }

    /// 初始化失败被排除的策略（标识, 原因）
    pub fn excluded(&self) -> &[(String, String)] {
        &self.excluded
    }

    pub fn ledger(&self) -> &Arc<PerformanceLedger> {
        &self.ledger
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// 清空全部策略的实例缓存
    pub fn clear_caches(&self) {
        for strategy in &self.strategies {
            strategy.clear_cache();
        }
    }

    // ==========================================
    // 上下文构造
    // ==========================================

    pub async fn build_context(&self, request: &ValidatedRequest, run_id: &str) -> SchedulingResult<SchedulingContext> {
        let installation = self
            .repos
            .installations
            .find_installation(&request.installation_code)
            .await?
            .ok_or_else(|| SchedulingError::Validation(format!("服务点不存在: {}", request.installation_code)))?;
        let contract = self
            .repos
            .contracts
            .find_contract(&request.contract_code)
            .await?
            .ok_or_else(|| SchedulingError::Validation(format!("合同不存在: {}", request.contract_code)))?;
        let partners = self.repos.partners.list_active_partners(&request.partner_filter).await?;
        let history = self
            .repos
            .history
            .completed_schedules(&installation.code, self.settings.history_limit)
            .await?;
        let requirement = self.repos.regulatory.requirement_for(&installation);

        debug!(
            run_id,
            partners = partners.len(),
            history = history.len(),
            min_hours = requirement.minimum_hours_per_month,
            "排程上下文已构造"
        );

        Ok(SchedulingContext {
            run_id: run_id.to_string(),
            installation,
            contract,
            partners,
            requirement,
            constraints: request.constraints.clone(),
            history,
            service_type: request.service_type.clone(),
            start_date: request.start_date,
            end_date: request.end_date,
        })
    }

    // ==========================================
    // 编排主流程
    // ==========================================

    pub async fn generate(&self, request: &ScheduleRequest) -> SchedulingResult<OrchestrationOutcome> {
        let validated = validate_schedule_request(request)?;
        let run_id = uuid::Uuid::new_v4().to_string();
        let context = Arc::new(self.build_context(&validated, &run_id).await?);
        self.run(context, &validated).await
    }

    /// 在已构造的上下文上执行编排
    #[instrument(skip_all, fields(run_id = %context.run_id))]
    pub async fn run(&self, context: Arc<SchedulingContext>, request: &ValidatedRequest) -> SchedulingResult<OrchestrationOutcome> {
        let started = Instant::now();
        info!(
            installation = %context.installation.code,
            contract = %context.contract.code,
            strategies = self.strategies.len(),
            "开始排程编排"
        );

        let runs = self.dispatch(context.clone()).await;
        self.ledger.record_runs(&context.run_id, &runs).await;

        let ranked = self.rank(&runs);
        let (selected, ranking_score, used_fallback) = match ranked.first() {
            Some(top) => {
                let result = runs[top.index]
                    .result
                    .clone()
                    .ok_or_else(|| SchedulingError::Internal("排名条目缺少结果".to_string()))?;
                (result, top.ranking_score, false)
            }
            None => {
                warn!("没有策略产生可行结果，执行综合评分兜底");
                let result = self.fallback(&context)?;
                let score = result.score;
                (result, score, true)
            }
        };

        let schedule = self.to_schedule(&context, request, &selected, ranking_score)?;
        let schedule_id = self.repos.schedules.create_schedule(&schedule).await?;
        let written = self.repos.schedules.create_visits(&schedule_id, &schedule.visits).await?;

        let comparison = self.compare(&runs, &ranked, used_fallback);
        let alternatives: Vec<StrategyRun> = runs
            .into_iter()
            .enumerate()
            .filter(|(i, _)| used_fallback || ranked.first().map(|t| t.index) != Some(*i))
            .map(|(_, run)| run)
            .collect();

        info!(
            schedule_id = %schedule_id,
            strategy = %selected.strategy_id,
            partner = %selected.partner_id,
            visits = written,
            used_fallback,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "排程编排完成"
        );

        Ok(OrchestrationOutcome {
            run_id: context.run_id.clone(),
            schedule,
            selected,
            used_fallback,
            alternatives,
            performance_comparison: comparison,
            context,
        })
    }

    // ==========================================
    // 并发调度
    // ==========================================

    /// 每个策略一个任务，超时即放弃；等待全部任务结束
    async fn dispatch(&self, context: Arc<SchedulingContext>) -> Vec<StrategyRun> {
        let timeout = self.settings.strategy_timeout;
        let tasks = self.strategies.iter().map(|strategy| {
            let strategy = strategy.clone();
            let context = context.clone();
            async move {
                let id = strategy.id().to_string();
                let kind = strategy.kind();
                let started = Instant::now();
                let ctx = context.clone();
                let handle = tokio::spawn(async move { strategy.generate_schedule(ctx).await });
                let abort = handle.abort_handle();
                let outcome = tokio::time::timeout(timeout, handle).await;
                let elapsed_ms = started.elapsed().as_millis() as u64;

                let run = match outcome {
                    Ok(Ok(Ok(result))) => match check_result(&result, &context) {
                        Ok(()) => StrategyRun::completed(result.with_execution_time(elapsed_ms)),
                        Err(reason) => StrategyRun::failed(&id, kind, reason, elapsed_ms),
                    },
                    Ok(Ok(Err(e))) => StrategyRun::failed(&id, kind, e.into_scheduling().to_string(), elapsed_ms),
                    Ok(Err(join_error)) => {
                        StrategyRun::failed(&id, kind, format!("策略任务异常终止: {}", join_error), elapsed_ms)
                    }
                    Err(_) => {
                        abort.abort();
                        StrategyRun::timed_out(&id, kind, elapsed_ms)
                    }
                };

                debug!(
                    strategy = %id,
                    status = %run.status,
                    elapsed_ms,
                    "策略运行结束"
                );
                run
            }
        });
        join_all(tasks).await
    }

    // ==========================================
    // 排名与兜底
    // ==========================================

    /// 可行结果排名（降序；同分按策略标识，不受耗时影响）
    fn rank(&self, runs: &[StrategyRun]) -> Vec<RankedEntry> {
        let mut ranked: Vec<RankedEntry> = runs
            .iter()
            .enumerate()
            .filter_map(|(index, run)| {
                run.feasible_result().map(|result| RankedEntry {
                    index,
                    ranking_score: self
                        .settings
                        .ranking
                        .ranking_score(result, self.ledger.reliability(&run.strategy_id)),
                })
            })
            .collect();
        ranked.sort_by(|a, b| {
            let (ra, rb) = (&runs[a.index], &runs[b.index]);
            b.ranking_score
                .partial_cmp(&a.ranking_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| ra.strategy_id.cmp(&rb.strategy_id))
        });
        ranked
    }

    fn fallback(&self, context: &SchedulingContext) -> SchedulingResult<StrategyResult> {
        composite_selection(
            FALLBACK_STRATEGY_ID,
            StrategyKind::Fallback,
            context,
            &self.settings.fallback_weights,
            "所有策略均未产生可行结果",
        )
        .map_err(|e| {
            warn!(error = %e, "兜底也未找到可行合作方");
            SchedulingError::NoFeasibleSchedule
        })
    }

    fn compare(&self, runs: &[StrategyRun], ranked: &[RankedEntry], used_fallback: bool) -> Vec<StrategyComparison> {
        let winner = if used_fallback { None } else { ranked.first().map(|t| t.index) };
        runs.iter()
            .enumerate()
            .map(|(index, run)| {
                let ranking_score = ranked
                    .iter()
                    .find(|e| e.index == index)
                    .map(|e| e.ranking_score)
                    .unwrap_or(0.0);
                StrategyComparison {
                    strategy_id: run.strategy_id.clone(),
                    kind: run.kind,
                    status: run.status,
                    partner_id: run.result.as_ref().map(|r| r.partner_id.clone()),
                    score: run.score(),
                    confidence: run.result.as_ref().map(|r| r.confidence).unwrap_or(0.0),
                    reliability: self.ledger.reliability(&run.strategy_id),
                    ranking_score,
                    execution_time_ms: run.execution_time_ms,
                    selected: winner == Some(index),
                }
            })
            .collect()
    }

    /// 胜出结果转为正式排程（访问列表再做一次规范化）
    fn to_schedule(
        &self,
        context: &SchedulingContext,
        request: &ValidatedRequest,
        selected: &StrategyResult,
        final_score: f64,
    ) -> SchedulingResult<Schedule> {
        let visits = calendar::normalize_visits(context, selected.visits.clone());
        if visits.is_empty() {
            return Err(SchedulingError::Scheduling(format!(
                "胜出结果规范化后没有可排访问: {}",
                selected.strategy_id
            )));
        }
        Ok(Schedule {
            schedule_id: uuid::Uuid::new_v4().to_string(),
            partner_id: selected.partner_id.clone(),
            partner_name: selected.partner_name.clone(),
            installation_code: context.installation.code.clone(),
            contract_code: context.contract.code.clone(),
            start_date: request.start_date,
            end_date: request.end_date,
            total_hours: total_hours(&visits),
            strategy_name: selected.strategy_id.clone(),
            final_score: final_score.clamp(0.0, 1.0),
            confidence: selected.confidence,
            visits,
            created_at: Local::now().naive_local(),
        })
    }
}

/// 结果完整性检查
///
/// - 合作方必须在候选中，访问列表非空
/// - 访问不得落在排程期外、时间窗外、不可排日期，不得重叠，时长在上下限内
/// - 规范化后仍须留有访问
fn check_result(result: &StrategyResult, context: &SchedulingContext) -> Result<(), String> {
    if context.find_partner(&result.partner_id).is_none() {
        return Err(format!("结果中的合作方不在候选列表: {}", result.partner_id));
    }
    if result.visits.is_empty() {
        return Err("结果访问列表为空".to_string());
    }
    let hard: Vec<CalendarViolation> = calendar::validate_visits(context, &result.visits)
        .into_iter()
        .filter(|v| v.is_hard())
        .collect();
    if let Some(first) = hard.first() {
        return Err(format!("访问违反日历约束（{} 项），首项: {:?}", hard.len(), first));
    }
    if calendar::normalize_visits(context, result.visits.clone()).is_empty() {
        return Err("规范化后访问列表为空".to_string());
    }
    Ok(())
}

