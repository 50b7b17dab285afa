// ==========================================
// 服务排程编排系统 - 遗传进化策略（"genetic_algorithm"）
// ==========================================
// 流程（每代）: 评估 → 精英保留 → 锦标赛选父代 → 单点交叉 → 变异 → 补满种群
// 终止: 达到代数上限，或连续 N 代最优适应度提升 < 收敛阈值
// 随机性: 显式注入的 StdRng（可设种子，保证可复现）
// 执行: 代循环在阻塞线程池上运行（spawn_blocking），
//       编排层超时后直接放弃等待
// ==========================================

pub mod individual;
pub mod operators;

use crate::domain::context::SchedulingContext;
use crate::domain::result::StrategyResult;
use crate::domain::types::StrategyKind;
use crate::engine::calendar;
use crate::engine::error::{SchedulingError, SchedulingResult};
use crate::engine::scoring::CompositeWeights;
use crate::engine::strategies::weights_from_config;
use crate::engine::strategy::{composite_selection, SchedulingStrategy, StrategyConfig, MIN_FEASIBLE_CONFIDENCE};
use async_trait::async_trait;
use individual::{FitnessModel, ScheduleIndividual};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

// ==========================================
// GaParameters - 进化参数
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GaParameters {
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub elitism_rate: f64,
    pub tournament_size: usize,
    pub stagnation_limit: usize,
    pub convergence_threshold: f64,
    /// None 表示使用系统熵
    pub seed: Option<u64>,
    pub weights: CompositeWeights,
}

impl Default for GaParameters {
    fn default() -> Self {
        Self {
            population_size: 50,
            generations: 100,
            mutation_rate: 0.1,
            crossover_rate: 0.8,
            elitism_rate: 0.1,
            tournament_size: 5,
            stagnation_limit: 20,
            convergence_threshold: 0.001,
            seed: None,
            weights: CompositeWeights::default(),
        }
    }
}

impl GaParameters {
    pub fn with_population_size(mut self, n: usize) -> Self {
        self.population_size = n;
        self
    }

    pub fn with_generations(mut self, n: usize) -> Self {
        self.generations = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// 精英数量: max(1, round(种群 × 精英比例))
    pub fn elite_count(&self) -> usize {
        ((self.population_size as f64 * self.elitism_rate).round() as usize)
            .max(1)
            .min(self.population_size)
    }

    pub fn validate(&self) -> SchedulingResult<()> {
        if self.population_size < 2 {
            return Err(SchedulingError::Configuration(
                "population_size 至少为 2".to_string(),
            ));
        }
        if self.generations == 0 {
            return Err(SchedulingError::Configuration(
                "generations 必须大于 0".to_string(),
            ));
        }
        if self.tournament_size == 0 {
            return Err(SchedulingError::Configuration(
                "tournament_size 必须大于 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// 进化结果
#[derive(Debug, Clone)]
pub struct EvolutionOutcome {
    pub best: ScheduleIndividual,
    pub generations_run: usize,
    pub stagnated: bool,
    pub fitness_history: Vec<f64>,
}

/// 进化主循环
pub fn evolve<R: Rng>(model: &FitnessModel<'_>, params: &GaParameters, rng: &mut R) -> Option<EvolutionOutcome> {
    if model.partner_count() == 0 {
        return None;
    }

    // 初始种群: 一个基线个体 + 随机个体
    let mut population: Vec<ScheduleIndividual> = Vec::with_capacity(params.population_size);
    population.push(model.baseline());
    while population.len() < params.population_size {
        population.push(model.random_individual(rng));
    }
    for ind in population.iter_mut() {
        ind.fitness = model.evaluate(ind);
    }

    let mut best = find_best(&population)?.clone();
    let mut fitness_history = vec![best.fitness];
    let mut stagnation = 0usize;
    let elite_count = params.elite_count();

    for generation in 0..params.generations {
        population.sort_by(|a, b| {
            b.fitness
                .partial_cmp(&a.fitness)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut next_gen: Vec<ScheduleIndividual> = population[..elite_count].to_vec();

        while next_gen.len() < params.population_size {
            let p1 = operators::tournament_select(&population, params.tournament_size, rng);
            let p2 = operators::tournament_select(&population, params.tournament_size, rng);

            let children = if rng.random_bool(params.crossover_rate) {
                let (c1, c2) = operators::crossover(&population[p1], &population[p2], rng);
                vec![c1, c2]
            } else {
                vec![population[p1].clone()]
            };

            for mut child in children {
                if next_gen.len() >= params.population_size {
                    break;
                }
                if rng.random_bool(params.mutation_rate) {
                    operators::mutate(&mut child, model, rng);
                }
                child.fitness = model.evaluate(&child);
                next_gen.push(child);
            }
        }

        population = next_gen;

        let gen_best = find_best(&population)?;
        if gen_best.fitness - best.fitness > params.convergence_threshold {
            best = gen_best.clone();
            stagnation = 0;
        } else {
            if gen_best.fitness > best.fitness {
                best = gen_best.clone();
            }
            stagnation += 1;
        }
        fitness_history.push(best.fitness);

        if params.stagnation_limit > 0 && stagnation >= params.stagnation_limit {
            return Some(EvolutionOutcome {
                best,
                generations_run: generation + 1,
                stagnated: true,
                fitness_history,
            });
        }
    }

    Some(EvolutionOutcome {
        best,
        generations_run: params.generations,
        stagnated: false,
        fitness_history,
    })
}

fn find_best(population: &[ScheduleIndividual]) -> Option<&ScheduleIndividual> {
    population.iter().max_by(|a, b| {
        a.fitness
            .partial_cmp(&b.fitness)
            .unwrap_or(std::cmp::Ordering::Equal)
    })
}

/// 置信度: 随适应度上升；运行满 80% 代数额外加成
pub fn confidence_for(fitness: f64, generations_run: usize, generations: usize) -> f64 {
    let mut confidence = fitness.clamp(0.0, 1.0) * 0.8;
    if generations > 0 && generations_run as f64 >= generations as f64 * 0.8 {
        confidence += 0.15;
    }
    confidence.clamp(0.0, 1.0)
}

// ==========================================
// EvolutionaryStrategy
// ==========================================
pub struct EvolutionaryStrategy {
    id: String,
    version: String,
    params: GaParameters,
}

impl EvolutionaryStrategy {
    pub fn new() -> Self {
        Self::with_parameters(GaParameters::default())
    }

    pub fn with_parameters(params: GaParameters) -> Self {
        Self {
            id: StrategyKind::GeneticAlgorithm.as_str().to_string(),
            version: "1.0.0".to_string(),
            params,
        }
    }

    pub fn params(&self) -> &GaParameters {
        &self.params
    }

    fn run_blocking(ctx: &SchedulingContext, params: &GaParameters) -> Option<EvolutionOutcome> {
        let model = FitnessModel::new(ctx, &params.weights);
        let mut rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        evolve(&model, params, &mut rng)
    }

    fn to_result(&self, ctx: &SchedulingContext, outcome: EvolutionOutcome) -> SchedulingResult<StrategyResult> {
        let best = outcome.best;
        let partner = ctx
            .partners
            .get(best.partner_index)
            .ok_or_else(|| SchedulingError::Internal("最优个体的合作方下标越界".to_string()))?;

        let mut visits = calendar::normalize_visits(ctx, best.visits.clone());
        if visits.is_empty() {
            visits = calendar::default_visits(ctx);
        }
        if visits.is_empty() {
            return Err(SchedulingError::Scheduling("排程期内没有可排日期".to_string()));
        }

        let confidence = confidence_for(best.fitness, outcome.generations_run, self.params.generations);
        Ok(StrategyResult::new(
            self.id.clone(),
            StrategyKind::GeneticAlgorithm,
            partner.id.clone(),
            partner.name.clone(),
            best.fitness,
            best.fitness > 0.0 && confidence >= MIN_FEASIBLE_CONFIDENCE,
            confidence,
            visits,
            serde_json::json!({
                "generations_run": outcome.generations_run,
                "stagnated": outcome.stagnated,
                "best_fitness": best.fitness,
                "visit_duration": best.duration_hours,
                "visits_per_month": best.visits_per_month,
                "fitness_history": outcome.fitness_history,
                "seed": self.params.seed,
            }),
        ))
    }
}

impl Default for EvolutionaryStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchedulingStrategy for EvolutionaryStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::GeneticAlgorithm
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::to_value(&self.params).unwrap_or_default()
    }

    async fn initialize(&mut self, config: &StrategyConfig) -> SchedulingResult<()> {
        let mut params = self.params.clone();
        if let Some(v) = config.param_u64("population_size")? {
            params.population_size = v as usize;
        }
        if let Some(v) = config.param_u64("generations")? {
            params.generations = v as usize;
        }
        if let Some(v) = config.param_ratio("mutation_rate")? {
            params.mutation_rate = v;
        }
        if let Some(v) = config.param_ratio("crossover_rate")? {
            params.crossover_rate = v;
        }
        if let Some(v) = config.param_ratio("elitism_rate")? {
            params.elitism_rate = v;
        }
        if let Some(v) = config.param_u64("tournament_size")? {
            params.tournament_size = v as usize;
        }
        if let Some(v) = config.param_u64("stagnation_limit")? {
            params.stagnation_limit = v as usize;
        }
        if let Some(v) = config.param_f64("convergence_threshold")? {
            params.convergence_threshold = v.max(0.0);
        }
        if let Some(v) = config.param_u64("seed")? {
            params.seed = Some(v);
        }
        if let Some(w) = weights_from_config(config)? {
            params.weights = w;
        }
        params.validate()?;
        self.params = params;
        self.version = config.version.clone();
        Ok(())
    }

    #[instrument(skip_all, fields(run_id = %context.run_id))]
    async fn generate_schedule(&self, context: Arc<SchedulingContext>) -> SchedulingResult<StrategyResult> {
        if context.partners.is_empty() {
            return Err(SchedulingError::Scheduling("没有候选合作方".to_string()));
        }

        let params = self.params.clone();
        let ctx = Arc::clone(&context);
        let joined = tokio::task::spawn_blocking(move || Self::run_blocking(&ctx, &params)).await;

        match joined {
            Ok(Some(outcome)) => {
                info!(
                    generations = outcome.generations_run,
                    stagnated = outcome.stagnated,
                    fitness = outcome.best.fitness,
                    "遗传进化完成"
                );
                match self.to_result(&context, outcome) {
                    Ok(result) => Ok(result),
                    Err(SchedulingError::Internal(msg)) => {
                        warn!(error = %msg, "遗传进化结果转换失败，退化为综合评分");
                        composite_selection(&self.id, self.kind(), &context, &self.params.weights, &msg)
                    }
                    Err(e) => Err(e),
                }
            }
            Ok(None) => {
                debug!("遗传进化未产生个体，退化为综合评分");
                composite_selection(&self.id, self.kind(), &context, &self.params.weights, "empty_population")
            }
            Err(join_err) => {
                warn!(error = %join_err, "遗传进化线程异常，退化为综合评分");
                composite_selection(
                    &self.id,
                    self.kind(),
                    &context,
                    &self.params.weights,
                    &join_err.to_string(),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::installation::{Contract, Installation, WorkingHours};
    use crate::domain::partner::{AvailabilityLedger, Partner};
    use crate::domain::requirement::{RegulatoryRequirement, SchedulingConstraints};
    use crate::domain::types::{RiskCategory, VisitFrequency};
    use chrono::NaiveDate;

    fn partner(id: &str) -> Partner {
        Partner {
            id: id.to_string(),
            name: format!("Partner {}", id),
            specialty: "Medicina del Trabajo".to_string(),
            city: "Madrid".to_string(),
            hourly_rate: 40.0,
            max_weekly_hours: 20.0,
            availability: Some(AvailabilityLedger {
                available_hours: 40.0,
                booked_hours: 0.0,
            }),
            satisfaction_score: None,
            active: true,
        }
    }

    fn context(partners: Vec<Partner>) -> SchedulingContext {
        let start = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 4, 30).unwrap();
        SchedulingContext {
            run_id: "RUN".to_string(),
            installation: Installation {
                code: "INST1".to_string(),
                name: "Planta".to_string(),
                address: "Calle Mayor 1, Madrid".to_string(),
                employee_count: 80,
                risk_category: RiskCategory::Medium,
                service_type: "medical_surveillance".to_string(),
                working_hours: WorkingHours::default(),
            },
            contract: Contract {
                code: "C1".to_string(),
                client_name: "Cliente".to_string(),
                budget_limit: Some(5_000.0),
                start_date: start,
                end_date: end,
                contract_value: 5_000.0,
            },
            partners,
            requirement: RegulatoryRequirement {
                minimum_hours_per_month: 8.0,
                maximum_hours_per_month: 16.0,
                required_visit_frequency: VisitFrequency::Monthly,
            },
            constraints: SchedulingConstraints::default(),
            history: Vec::new(),
            service_type: "medical_surveillance".to_string(),
            start_date: start,
            end_date: end,
        }
    }

    #[test]
    fn test_elite_count_at_least_one() {
        assert_eq!(GaParameters::default().elite_count(), 5);
        assert_eq!(GaParameters::default().with_population_size(4).elite_count(), 1);
    }

    #[test]
    fn test_evolve_terminates_within_generation_cap() {
        let ctx = context(vec![partner("A"), partner("B"), partner("C")]);
        let params = GaParameters::default()
            .with_population_size(10)
            .with_generations(5)
            .with_seed(7);
        let model = FitnessModel::new(&ctx, &params.weights);
        let mut rng = StdRng::seed_from_u64(7);
        let outcome = evolve(&model, &params, &mut rng).unwrap();
        assert!(outcome.generations_run <= 5);
        assert!(outcome.best.fitness > 0.0);
        assert_eq!(outcome.fitness_history.len(), outcome.generations_run + 1);
    }

    #[test]
    fn test_best_fitness_never_decreases() {
        let ctx = context(vec![partner("A"), partner("B")]);
        let params = GaParameters::default().with_population_size(12).with_generations(15);
        let model = FitnessModel::new(&ctx, &params.weights);
        let mut rng = StdRng::seed_from_u64(11);
        let outcome = evolve(&model, &params, &mut rng).unwrap();
        for pair in outcome.fitness_history.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
    }

    #[tokio::test]
    async fn test_seeded_runs_are_reproducible() {
        let ctx = Arc::new(context(vec![partner("A"), partner("B"), partner("C")]));
        let params = GaParameters::default()
            .with_population_size(16)
            .with_generations(10)
            .with_seed(42);
        let a = EvolutionaryStrategy::with_parameters(params.clone())
            .generate_schedule(Arc::clone(&ctx))
            .await
            .unwrap();
        let b = EvolutionaryStrategy::with_parameters(params)
            .generate_schedule(ctx)
            .await
            .unwrap();
        assert_eq!(a.partner_id, b.partner_id);
        assert_eq!(a.visits, b.visits);
        assert!((a.score - b.score).abs() < 1e-12);
    }

    #[test]
    fn test_frequency_gene_respects_monthly_maximum() {
        let ctx = context(vec![partner("A")]);
        let params = GaParameters::default();
        let model = FitnessModel::new(&ctx, &params.weights);
        // 上限 16h: 4h → 最多 4 次，2h → 8 次
        assert_eq!(model.clamp_frequency(10, 4.0), 4);
        assert_eq!(model.clamp_frequency(10, 2.0), 8);
        assert_eq!(model.clamp_frequency(0, 4.0), 1);
    }

    #[tokio::test]
    async fn test_result_stays_within_monthly_maximum() {
        let ctx = Arc::new(context(vec![partner("A"), partner("B")]));
        let params = GaParameters::default()
            .with_population_size(12)
            .with_generations(8)
            .with_seed(3);
        let result = EvolutionaryStrategy::with_parameters(params)
            .generate_schedule(Arc::clone(&ctx))
            .await
            .unwrap();
        for (s, e) in calendar::month_slices(ctx.start_date, ctx.end_date) {
            let hours: f64 = result
                .visits
                .iter()
                .filter(|v| v.date >= s && v.date <= e)
                .map(|v| v.duration_hours)
                .sum();
            assert!(hours <= ctx.requirement.maximum_hours_per_month + 1e-9);
        }
    }

    #[tokio::test]
    async fn test_initialize_rejects_tiny_population() {
        let mut strategy = EvolutionaryStrategy::new();
        let cfg = StrategyConfig::with_parameters(serde_json::json!({"population_size": 1}));
        assert!(matches!(
            strategy.initialize(&cfg).await,
            Err(SchedulingError::Configuration(_))
        ));
    }
}
