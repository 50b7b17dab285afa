// ==========================================
// 服务排程编排系统 - 贪心规划策略（"linear_programming"）
// ==========================================
// 说明: 名称沿用“线性规划”，实际为带惩罚系数的约束贪心，不是单纯形求解
// 建模:
// - 每个合作方一个 0/1 决策变量，目标系数 = 综合评分
// - 约束通过系数归零/惩罚体现，而非约束传播:
//   可用工时不足 → 0；超出通勤距离 → ×0.5；
//   费用超预算 → 0；专业匹配 < 0.5 → ×0.2
// - 只选一个（取系数最大且通过复核者）
// ==========================================

use crate::domain::context::SchedulingContext;
use crate::domain::partner::Partner;
use crate::domain::result::StrategyResult;
use crate::domain::types::StrategyKind;
use crate::engine::calendar;
use crate::engine::error::{SchedulingError, SchedulingResult};
use crate::engine::scoring::{self, CompositeWeights};
use crate::engine::strategies::weights_from_config;
use crate::engine::strategy::{SchedulingStrategy, StrategyConfig, MIN_FEASIBLE_CONFIDENCE};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument};

// ==========================================
// 参数
// ==========================================
#[derive(Debug, Clone, Serialize)]
pub struct GreedyParameters {
    pub distance_penalty: f64,      // 超距惩罚系数
    pub specialty_penalty: f64,     // 专业不匹配惩罚系数
    pub specialty_threshold: f64,   // 专业匹配阈值
    pub availability_recheck: f64,  // 复核时可用工时比例
    pub fallback_penalty: f64,      // 无候选通过复核时的降分比例
    pub weights: CompositeWeights,
}

impl Default for GreedyParameters {
    fn default() -> Self {
        Self {
            distance_penalty: 0.5,
            specialty_penalty: 0.2,
            specialty_threshold: 0.5,
            availability_recheck: 0.9,
            fallback_penalty: 0.2,
            weights: CompositeWeights::default(),
        }
    }
}

/// 单个决策变量
#[derive(Debug, Clone, Serialize)]
struct DecisionVariable {
    partner_id: String,
    coefficient: f64,
    composite: f64,
    distance: f64,
    estimated_cost: f64,
    specialty: f64,
    free_hours: Option<f64>,
}

#[derive(Debug)]
pub struct HeuristicGreedyStrategy {
    id: String,
    version: String,
    params: GreedyParameters,
}

impl HeuristicGreedyStrategy {
    pub fn new() -> Self {
        Self {
            id: StrategyKind::LinearProgramming.as_str().to_string(),
            version: "1.0.0".to_string(),
            params: GreedyParameters::default(),
        }
    }

    fn build_variable(&self, partner: &Partner, ctx: &SchedulingContext) -> DecisionVariable {
        let composite = scoring::composite_score(partner, ctx, &self.params.weights).score;
        let required_monthly = ctx.required_hours_per_month();
        let free_hours = partner.free_hours();
        let distance = scoring::estimate_distance(&partner.city, &ctx.installation.address);
        let estimated_cost = partner.estimated_cost(ctx.total_required_hours());
        let specialty = scoring::specialty_score(&partner.specialty, &ctx.service_type);

        let mut coefficient = composite;
        // 可用工时约束
        if matches!(free_hours, Some(free) if free < required_monthly) {
            coefficient = 0.0;
        }
        // 通勤距离约束
        if distance > ctx.constraints.max_travel_distance {
            coefficient *= self.params.distance_penalty;
        }
        // 预算约束
        if matches!(ctx.contract.budget_limit, Some(budget) if estimated_cost > budget) {
            coefficient = 0.0;
        }
        // 专业约束
        if specialty < self.params.specialty_threshold {
            coefficient *= self.params.specialty_penalty;
        }

        DecisionVariable {
            partner_id: partner.id.clone(),
            coefficient,
            composite,
            distance,
            estimated_cost,
            specialty,
            free_hours,
        }
    }

    /// 可行性复核
    fn passes_recheck(&self, var: &DecisionVariable, ctx: &SchedulingContext) -> bool {
        let availability_ok = var
            .free_hours
            .map(|free| free >= ctx.required_hours_per_month() * self.params.availability_recheck)
            .unwrap_or(true);
        let distance_ok = var.distance <= ctx.constraints.max_travel_distance;
        let cost_ok = ctx
            .contract
            .budget_limit
            .map(|budget| var.estimated_cost <= budget)
            .unwrap_or(true);
        let specialty_ok = var.specialty >= 0.2;
        availability_ok && distance_ok && cost_ok && specialty_ok
    }

    /// 求解: 返回 (选中变量, 是否收敛)
    fn solve(&self, ctx: &SchedulingContext) -> SchedulingResult<(DecisionVariable, bool, Vec<DecisionVariable>)> {
        let mut variables: Vec<DecisionVariable> = ctx
            .partners
            .iter()
            .map(|p| self.build_variable(p, ctx))
            .collect();

        if variables.iter().all(|v| v.coefficient <= 0.0) {
            return Err(SchedulingError::Scheduling(
                "所有合作方的目标系数均为 0".to_string(),
            ));
        }

        variables.sort_by(|a, b| {
            b.coefficient
                .partial_cmp(&a.coefficient)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.partner_id.cmp(&b.partner_id))
        });

        let chosen = variables
            .iter()
            .filter(|v| v.coefficient > 0.0)
            .find(|v| self.passes_recheck(v, ctx))
            .cloned();

        match chosen {
            Some(var) => Ok((var, true, variables)),
            None => {
                let mut top = variables[0].clone();
                top.coefficient *= 1.0 - self.params.fallback_penalty;
                Ok((top, false, variables))
            }
        }
    }
}

impl Default for HeuristicGreedyStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchedulingStrategy for HeuristicGreedyStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::LinearProgramming
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::to_value(&self.params).unwrap_or_default()
    }

    async fn initialize(&mut self, config: &StrategyConfig) -> SchedulingResult<()> {
        let mut params = GreedyParameters::default();
        if let Some(v) = config.param_ratio("distance_penalty")? {
            params.distance_penalty = v;
        }
        if let Some(v) = config.param_ratio("specialty_penalty")? {
            params.specialty_penalty = v;
        }
        if let Some(v) = config.param_ratio("specialty_threshold")? {
            params.specialty_threshold = v;
        }
        if let Some(v) = config.param_ratio("availability_recheck")? {
            params.availability_recheck = v;
        }
        if let Some(v) = config.param_ratio("fallback_penalty")? {
            params.fallback_penalty = v;
        }
        if let Some(w) = weights_from_config(config)? {
            params.weights = w;
        }
        self.params = params;
        self.version = config.version.clone();
        Ok(())
    }

    #[instrument(skip_all, fields(run_id = %context.run_id))]
    async fn generate_schedule(&self, context: Arc<SchedulingContext>) -> SchedulingResult<StrategyResult> {
        let ctx = context.as_ref();
        let (chosen, converged, variables) = self.solve(ctx)?;

        let partner = ctx
            .find_partner(&chosen.partner_id)
            .ok_or_else(|| SchedulingError::Internal(format!("合作方不存在: {}", chosen.partner_id)))?;

        let visits = calendar::default_visits(ctx);
        if visits.is_empty() {
            return Err(SchedulingError::Scheduling("排程期内没有可排日期".to_string()));
        }

        let confidence = if converged {
            0.5 + 0.5 * chosen.coefficient
        } else {
            0.5 * chosen.coefficient
        };

        debug!(
            partner = %partner.id,
            coefficient = chosen.coefficient,
            converged,
            "贪心规划完成求解"
        );
        info!(
            partner = %partner.id,
            visits = visits.len(),
            "贪心规划生成排程"
        );

        Ok(StrategyResult::new(
            self.id.clone(),
            StrategyKind::LinearProgramming,
            partner.id.clone(),
            partner.name.clone(),
            chosen.coefficient,
            converged || confidence >= MIN_FEASIBLE_CONFIDENCE,
            confidence,
            visits,
            serde_json::json!({
                "convergence": converged,
                "objective_value": chosen.coefficient,
                "composite": chosen.composite,
                "variables": variables,
            }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::installation::{Contract, Installation, WorkingHours};
    use crate::domain::partner::AvailabilityLedger;
    use crate::domain::requirement::{RegulatoryRequirement, SchedulingConstraints};
    use crate::domain::types::{RiskCategory, VisitFrequency};
    use chrono::NaiveDate;

    fn partner(id: &str, free: f64, specialty: &str) -> Partner {
        Partner {
            id: id.to_string(),
            name: format!("Partner {}", id),
            specialty: specialty.to_string(),
            city: "Madrid".to_string(),
            hourly_rate: 40.0,
            max_weekly_hours: 20.0,
            availability: Some(AvailabilityLedger {
                available_hours: free,
                booked_hours: 0.0,
            }),
            satisfaction_score: None,
            active: true,
        }
    }

    fn context(partners: Vec<Partner>, budget: Option<f64>) -> SchedulingContext {
        let start = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2026, 3, 31).unwrap();
        SchedulingContext {
            run_id: "RUN".to_string(),
            installation: Installation {
                code: "INST1".to_string(),
                name: "Planta".to_string(),
                address: "Calle Mayor 1, Madrid".to_string(),
                employee_count: 120,
                risk_category: RiskCategory::Medium,
                service_type: "medical_surveillance".to_string(),
                working_hours: WorkingHours::default(),
            },
            contract: Contract {
                code: "C1".to_string(),
                client_name: "Cliente".to_string(),
                budget_limit: budget,
                start_date: start,
                end_date: end,
                contract_value: 10_000.0,
            },
            partners,
            requirement: RegulatoryRequirement {
                minimum_hours_per_month: 20.0,
                maximum_hours_per_month: 40.0,
                required_visit_frequency: VisitFrequency::Weekly,
            },
            constraints: SchedulingConstraints::default(),
            history: Vec::new(),
            service_type: "medical_surveillance".to_string(),
            start_date: start,
            end_date: end,
        }
    }

    #[tokio::test]
    async fn test_selects_available_matching_partner() {
        let ctx = Arc::new(context(
            vec![
                partner("A", 10.0, "Medicina del Trabajo"),
                partner("B", 25.0, "Medicina del Trabajo"),
                partner("C", 30.0, "Higiene Industrial"),
            ],
            None,
        ));
        let strategy = HeuristicGreedyStrategy::new();
        let result = strategy.generate_schedule(ctx).await.unwrap();
        assert_eq!(result.partner_id, "B");
        assert!(result.feasible);
        assert_eq!(result.metadata["convergence"], true);
    }

    #[tokio::test]
    async fn test_all_zero_coefficients_fail() {
        // 预算 100 远低于任何费用
        let ctx = Arc::new(context(vec![partner("A", 25.0, "Medicina del Trabajo")], Some(100.0)));
        let strategy = HeuristicGreedyStrategy::new();
        let err = strategy.generate_schedule(ctx).await.unwrap_err();
        assert!(matches!(err, SchedulingError::Scheduling(_)));
    }

    #[tokio::test]
    async fn test_unconverged_top_candidate_penalized() {
        let mut far = partner("F", 25.0, "Medicina del Trabajo");
        far.city = "Toledo".to_string();
        let ctx = Arc::new(context(vec![far], None));
        let strategy = HeuristicGreedyStrategy::new();
        let result = strategy.generate_schedule(ctx).await.unwrap();
        assert_eq!(result.partner_id, "F");
        assert_eq!(result.metadata["convergence"], false);
    }

    #[tokio::test]
    async fn test_initialize_rejects_invalid_ratio() {
        let mut strategy = HeuristicGreedyStrategy::new();
        let cfg = StrategyConfig::with_parameters(serde_json::json!({"distance_penalty": 3.0}));
        assert!(matches!(
            strategy.initialize(&cfg).await,
            Err(SchedulingError::Configuration(_))
        ));
    }
}
