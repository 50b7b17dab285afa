// ==========================================
// 服务排程编排系统 - 规则引擎策略（"rule_based"）
// ==========================================
// 评估: 每个合作方执行全部规则，
//       加权分 = Σ(score·weight) / Σ(weight)（不含已违反的硬约束）
//       严格模式下任一硬约束违反 → 总分归零并短路
// 选择: 排序 → 剔除硬约束违反者（灵活度高且非严格模式时放宽）
//       → 次级决胜规则（历史 → 成本 → 距离），
//          仅当备选分数 ≥ 领先者 90% 时可改选
// 复核: 排程生成后执行排程类规则；违反时做一次校正
//       （间隔 < 3 天的访问重新间隔、窗外访问拉回窗内）
// ==========================================

pub mod rules;

use crate::domain::context::SchedulingContext;
use crate::domain::partner::Partner;
use crate::domain::result::StrategyResult;
use crate::domain::schedule::Visit;
use crate::domain::types::{FlexibilityLevel, StrategyKind};
use crate::engine::calendar;
use crate::engine::error::{SchedulingError, SchedulingResult};
use crate::engine::scoring::{self, CompositeWeights, ScoreBreakdown};
use crate::engine::strategies::weights_from_config;
use crate::engine::strategy::{composite_selection, SchedulingStrategy, StrategyConfig, MIN_FEASIBLE_CONFIDENCE};
use async_trait::async_trait;
use rules::{default_rules, Rule, RuleAction, RuleInput, TieBreakRule};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 决胜规则可改选的分数下限（相对领先者）
pub const TIE_BREAK_RATIO: f64 = 0.9;

// ==========================================
// 评估结果
// ==========================================
#[derive(Debug, Clone, Serialize)]
pub struct PartnerEvaluation {
    pub partner_id: String,
    pub weighted_score: f64,
    pub hard_failures: Vec<String>,
    pub rule_scores: Vec<(String, f64)>,
    #[serde(skip)]
    pub breakdown: Option<ScoreBreakdown>,
}

impl PartnerEvaluation {
    pub fn has_critical_violation(&self) -> bool {
        !self.hard_failures.is_empty()
    }
}

/// 选择结果
#[derive(Debug, Clone, Serialize)]
pub struct Selection {
    pub partner_id: String,
    pub weighted_score: f64,
    pub relaxed: bool,
    pub tie_break: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleEngineParameters {
    pub strict_mode: bool,
    pub tie_break_ratio: f64,
    pub weights: CompositeWeights,
}

impl Default for RuleEngineParameters {
    fn default() -> Self {
        Self {
            strict_mode: true,
            tie_break_ratio: TIE_BREAK_RATIO,
            weights: CompositeWeights::default(),
        }
    }
}

pub struct RuleEngineStrategy {
    id: String,
    version: String,
    params: RuleEngineParameters,
    rules: Vec<Rule>,
}

impl RuleEngineStrategy {
    pub fn new() -> Self {
        let mut rules = default_rules();
        rules.sort_by_key(|r| r.priority);
        Self {
            id: StrategyKind::RuleBased.as_str().to_string(),
            version: "1.0.0".to_string(),
            params: RuleEngineParameters::default(),
            rules,
        }
    }

    pub fn with_strict_mode(mut self, strict: bool) -> Self {
        self.params.strict_mode = strict;
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    // ==========================================
    // 评估
    // ==========================================

    pub fn evaluate_partner(&self, partner: &Partner, ctx: &SchedulingContext, planned: &[Visit]) -> PartnerEvaluation {
        let breakdown = scoring::score_breakdown(partner, ctx);
        let input = RuleInput {
            partner,
            ctx,
            breakdown: &breakdown,
            visits: planned,
        };

        let mut hard_failures = Vec::new();
        let mut rule_scores = Vec::new();
        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;

        for rule in &self.rules {
            if rule.is_schedule_aware() {
                continue;
            }
            let score = rule.evaluate(&input);
            rule_scores.push((rule.id.to_string(), score));

            if rule.is_hard() && score < 1.0 {
                hard_failures.push(rule.id.to_string());
                if self.params.strict_mode {
                    return PartnerEvaluation {
                        partner_id: partner.id.clone(),
                        weighted_score: 0.0,
                        hard_failures,
                        rule_scores,
                        breakdown: Some(breakdown),
                    };
                }
                continue;
            }

            let contribution = match rule.action {
                RuleAction::BoostScore => (score * 1.1).min(1.0),
                _ => score,
            };
            weighted_sum += contribution * rule.weight;
            weight_total += rule.weight;
        }

        let weighted_score = if weight_total > 0.0 {
            (weighted_sum / weight_total).clamp(0.0, 1.0)
        } else {
            0.0
        };

        PartnerEvaluation {
            partner_id: partner.id.clone(),
            weighted_score,
            hard_failures,
            rule_scores,
            breakdown: Some(breakdown),
        }
    }

    // ==========================================
    // 选择
    // ==========================================

    pub fn select(&self, ctx: &SchedulingContext, evaluations: &[PartnerEvaluation]) -> SchedulingResult<Selection> {
        let mut ranked: Vec<&PartnerEvaluation> = evaluations.iter().collect();
        ranked.sort_by(|a, b| {
            b.weighted_score
                .partial_cmp(&a.weighted_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.partner_id.cmp(&b.partner_id))
        });

        let mut relaxed = false;
        let mut candidates: Vec<&PartnerEvaluation> = ranked
            .iter()
            .copied()
            .filter(|e| !e.has_critical_violation())
            .collect();

        if candidates.is_empty() {
            let can_relax =
                ctx.constraints.flexibility == FlexibilityLevel::High && !self.params.strict_mode;
            if !can_relax {
                return Err(SchedulingError::Scheduling(
                    "所有合作方均违反硬约束".to_string(),
                ));
            }
            relaxed = true;
            candidates = ranked.iter().copied().filter(|e| e.weighted_score > 0.0).collect();
        }

        let leader = *candidates
            .first()
            .ok_or_else(|| SchedulingError::Scheduling("没有可选合作方".to_string()))?;
        if leader.weighted_score <= 0.0 {
            return Err(SchedulingError::Scheduling("所有合作方规则评分为 0".to_string()));
        }

        // 次级决胜: 在 90% 分数带内按规则顺序逐级筛选
        let threshold = leader.weighted_score * self.params.tie_break_ratio;
        let mut pool: Vec<&PartnerEvaluation> = candidates
            .iter()
            .copied()
            .filter(|e| e.weighted_score >= threshold)
            .collect();
        let mut decided_by = None;

        for tie_break in TieBreakRule::ordered() {
            if pool.len() <= 1 {
                break;
            }
            let value = |e: &PartnerEvaluation| tie_break.criterion(&e.breakdown.unwrap_or(ZERO_BREAKDOWN));
            let best = pool.iter().map(|e| value(*e)).fold(f64::MIN, f64::max);
            let leader_kept = pool
                .iter()
                .any(|e| e.partner_id == leader.partner_id && value(*e) >= best - 1e-9);
            pool.retain(|e| value(*e) >= best - 1e-9);
            if !leader_kept && decided_by.is_none() {
                decided_by = Some(tie_break);
            }
        }

        let winner = pool.first().copied().unwrap_or(leader);
        if let Some(rule) = decided_by {
            debug!(
                rule = rule.as_str(),
                leader = %leader.partner_id,
                winner = %winner.partner_id,
                "决胜规则改选合作方"
            );
        }

        Ok(Selection {
            partner_id: winner.partner_id.clone(),
            weighted_score: winner.weighted_score,
            relaxed,
            tie_break: decided_by.map(|r| r.as_str().to_string()),
        })
    }

    // ==========================================
    // 排程复核 / 校正
    // ==========================================

    /// 执行排程类规则，返回未通过的规则ID
    pub fn validate_schedule(&self, partner: &Partner, ctx: &SchedulingContext, visits: &[Visit]) -> Vec<String> {
        let breakdown = scoring::score_breakdown(partner, ctx);
        let input = RuleInput {
            partner,
            ctx,
            breakdown: &breakdown,
            visits,
        };
        let mut failed: Vec<String> = self
            .rules
            .iter()
            .filter(|r| r.is_schedule_aware())
            .filter(|r| r.evaluate(&input) < 1.0)
            .map(|r| r.id.to_string())
            .collect();

        let too_close = calendar::validate_visits(ctx, visits)
            .iter()
            .any(|v| matches!(v, calendar::CalendarViolation::TooClose { .. }));
        if too_close {
            failed.push("min_spacing".to_string());
        }
        failed
    }

    /// 尽力校正: 重新间隔 + 拉回时间窗
    pub fn correct_schedule(&self, ctx: &SchedulingContext, visits: &mut Vec<Visit>) -> usize {
        let moved = calendar::respace_visits(ctx, visits);
        let pulled = calendar::pull_into_window(ctx, visits);
        moved + pulled
    }

    fn run(&self, ctx: &SchedulingContext) -> SchedulingResult<StrategyResult> {
        if ctx.partners.is_empty() {
            return Err(SchedulingError::Scheduling("没有候选合作方".to_string()));
        }

        let mut visits = calendar::default_visits(ctx);
        if visits.is_empty() {
            return Err(SchedulingError::Scheduling("排程期内没有可排日期".to_string()));
        }

        let evaluations: Vec<PartnerEvaluation> = ctx
            .partners
            .iter()
            .map(|p| self.evaluate_partner(p, ctx, &visits))
            .collect();

        let selection = self.select(ctx, &evaluations)?;
        let partner = ctx
            .find_partner(&selection.partner_id)
            .ok_or_else(|| SchedulingError::Internal(format!("合作方不存在: {}", selection.partner_id)))?;

        let violations = self.validate_schedule(partner, ctx, &visits);
        let mut corrections = 0;
        let mut remaining = Vec::new();
        if !violations.is_empty() {
            corrections = self.correct_schedule(ctx, &mut visits);
            remaining = self.validate_schedule(partner, ctx, &visits);
            debug!(
                violations = ?violations,
                corrections,
                remaining = ?remaining,
                "规则引擎排程校正"
            );
        }

        let chosen_eval = evaluations.iter().find(|e| e.partner_id == selection.partner_id);
        let chosen_hard_failures = chosen_eval.map(|e| e.hard_failures.clone()).unwrap_or_default();

        let mut confidence = selection.weighted_score * (1.0 - 0.1 * remaining.len() as f64);
        if selection.relaxed {
            confidence *= 0.5;
        }
        let feasible = chosen_hard_failures.is_empty() && confidence >= MIN_FEASIBLE_CONFIDENCE;

        info!(
            partner = %partner.id,
            score = selection.weighted_score,
            relaxed = selection.relaxed,
            "规则引擎选定合作方"
        );

        Ok(StrategyResult::new(
            self.id.clone(),
            StrategyKind::RuleBased,
            partner.id.clone(),
            partner.name.clone(),
            selection.weighted_score,
            feasible,
            confidence,
            visits,
            serde_json::json!({
                "strict_mode": self.params.strict_mode,
                "selection": selection,
                "hard_failures": chosen_hard_failures,
                "schedule_violations": violations,
                "remaining_violations": remaining,
                "corrections": corrections,
                "evaluations": evaluations,
            }),
        ))
    }
}

const ZERO_BREAKDOWN: ScoreBreakdown = ScoreBreakdown {
    location: 0.0,
    availability: 0.0,
    cost: 0.0,
    specialty: 0.0,
    historical: 0.0,
};

impl Default for RuleEngineStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SchedulingStrategy for RuleEngineStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::RuleBased
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "strict_mode": self.params.strict_mode,
            "tie_break_ratio": self.params.tie_break_ratio,
            "weights": self.params.weights,
            "rules": self.rules.iter().map(|r| serde_json::json!({
                "id": r.id,
                "type": r.rule_type,
                "priority": r.priority,
                "weight": r.weight,
                "action": r.action,
            })).collect::<Vec<_>>(),
        })
    }

    async fn initialize(&mut self, config: &StrategyConfig) -> SchedulingResult<()> {
        let mut params = RuleEngineParameters::default();
        if let Some(v) = config.param_bool("strict_mode")? {
            params.strict_mode = v;
        }
        if let Some(v) = config.param_ratio("tie_break_ratio")? {
            params.tie_break_ratio = v;
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
        match self.run(&context) {
            Err(SchedulingError::Internal(msg)) => {
                warn!(error = %msg, "规则引擎内部错误，退化为综合评分");
                composite_selection(&self.id, self.kind(), &context, &self.params.weights, &msg)
            }
            other => other,
        }
    }
}
